//! Survey-video ingestion and processing orchestration.
//!
//! The [`IngestManager`] takes selected video files (or a media-library
//! reference), drives each one through upload, thumbnail and GPS-track
//! attachment, AI-processing kickoff and remote-status reconciliation, and
//! keeps a live, observable record of every video in the
//! [`RecordStore`](store::RecordStore).

pub mod config;
pub mod demo_cache;
pub mod error;
pub mod manager;
pub mod media;
pub mod poller;
pub mod processing;
pub mod record;
pub mod store;
pub mod thumbnail;
pub mod upload;

pub use config::IngestConfig;
pub use error::IngestError;
pub use manager::IngestManager;
pub use processing::ProcessingOutcome;
pub use record::{SurveyContext, VideoRecord};
pub use store::StoreSnapshot;
pub use upload::{GpxFile, LibraryImport, UploadFile};
