//! Domain types and pure logic for the partbridge conversion service.
//!
//! This crate has no internal dependencies. It defines the job
//! specification submitted by clients, the task record state machine,
//! the converter contract consumed by the worker, and the synchronous
//! library/filesystem helpers exposed next to the task API.

pub mod converter;
pub mod error;
pub mod fs_browse;
pub mod job;
pub mod library;
pub mod task;
pub mod types;
