//! Shared building blocks for the roadscan ingestion workspace.
//!
//! Identifier aliases, the domain error type, the video status state
//! machine, the demo-video registry, and the FFmpeg/FFprobe helpers used
//! for duration probing and thumbnail extraction.

pub mod demo;
pub mod error;
pub mod ffmpeg;
pub mod types;
pub mod video_status;
pub mod ws_messages;
