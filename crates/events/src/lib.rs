//! Partbridge task change feed.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`TaskEvent`]: notification that a task's observable state changed.
//!
//! The task registry publishes a [`TaskEvent`] after every successful
//! mutation; the broadcaster consumes them and pushes fresh snapshots to
//! observers. Events carry no task state, only which task changed and why.

pub mod bus;

pub use bus::{EventBus, TaskEvent, TaskEventKind};
