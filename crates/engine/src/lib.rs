//! Task lifecycle engine.
//!
//! One [`TaskContext`] per running service owns all shared mutable state
//! (task registry, pending queue, observer table) behind a single guard.
//! Around it:
//!
//! - [`Worker`]: the only consumer of the pending queue; runs one
//!   conversion at a time on a blocking thread.
//! - [`Broadcaster`]: fans task snapshots out to observers whenever the
//!   change feed reports a mutation.
//! - [`WorkerController`]: starts the worker and drains the queue before
//!   stopping it.

pub mod broadcaster;
pub mod context;
pub mod lifecycle;
pub mod queue;
pub mod registry;
pub mod worker;

pub use broadcaster::{Broadcaster, Subscription, SubscriberId};
pub use context::{ClaimedJob, TaskContext};
pub use lifecycle::WorkerController;
pub use queue::PendingQueue;
pub use registry::TaskRegistry;
pub use worker::Worker;
