//! Request handlers.
//!
//! Handlers translate HTTP input into [`IngestManager`] calls and map
//! failures via [`AppError`].
//!
//! [`IngestManager`]: roadscan_ingest::IngestManager
//! [`AppError`]: crate::error::AppError

pub mod videos;
