//! User-facing notification bus for the ingestion workspace.
//!
//! - [`NotificationBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`Notification`]: a toast-style message about one video or batch,
//!   with a [`NotificationLevel`].

pub mod bus;

pub use bus::{Notification, NotificationBus, NotificationLevel};
