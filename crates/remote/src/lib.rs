//! Client side of the remote survey backend.
//!
//! The orchestrator talks to the backend only through the
//! [`SurveyBackend`] trait. Two implementations ship here:
//!
//! - [`HttpBackend`]: JSON REST client built on [`reqwest`], with the
//!   video binary streamed from disk.
//! - [`InMemoryBackend`]: self-contained backend for local demo mode and
//!   tests, with knobs to inject failures and script remote statuses.

pub mod backend;
pub mod http;
pub mod memory;
pub mod types;

pub use backend::{RemoteError, SurveyBackend};
pub use http::HttpBackend;
pub use memory::{BackendCall, InMemoryBackend, StoredVideo};
pub use types::*;
