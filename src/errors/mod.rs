//! Centralized error handling for the scraperd application
//!
//! Errors are split by layer: schedule-document problems are fatal at
//! startup, job-resolution problems are reported and skipped, and run
//! failures are captured as lifecycle events rather than propagated.
//! "Target already running" is deliberately not an error anywhere: it
//! is an expected outcome surfaced as a boolean.

pub mod types;

pub use types::*;

/// Convenience type alias for schedule-loading results
pub type ScheduleResult<T> = Result<T, ScheduleError>;
