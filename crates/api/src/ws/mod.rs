//! WebSocket observers of individual tasks.
//!
//! Each connection subscribes to one task through the engine's
//! broadcaster and receives its snapshots as JSON text frames.

mod handler;

pub use handler::{task_updates_handler, NOT_FOUND_MESSAGE};
