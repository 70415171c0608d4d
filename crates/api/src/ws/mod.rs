//! WebSocket infrastructure for the dashboard feed.
//!
//! Provides connection management, heartbeat pings, the HTTP upgrade
//! handler, and the forwarder that turns store snapshots and notifications
//! into JSON frames.

pub mod forwarder;
mod handler;
mod heartbeat;
pub mod manager;

pub use forwarder::start_forwarder;
pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
