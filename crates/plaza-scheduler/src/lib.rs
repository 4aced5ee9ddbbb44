//! Background workers: auto-complete due scheduled requests, archive
//! terminated orders, and reap idle sessions.
//!
//! Each worker is a process-level singleton with an explicit spawn/stop
//! lifecycle driven by a `watch` channel: a running batch finishes, no new
//! batch starts. Multi-instance deployments must arbitrate externally (an
//! advisory lock); the workers themselves assume one instance.

pub mod archiver;
pub mod completer;
pub mod error;
pub mod reaper;
pub mod schedule;

pub use archiver::ArchiveWorker;
pub use completer::ScheduledRequestCompleter;
pub use error::{Result, SchedulerError};
pub use reaper::SessionReaper;
