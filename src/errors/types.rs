//! Error type definitions for the scraperd application

use thiserror::Error;

/// Errors raised while loading or validating the schedule document
///
/// Any of these aborts startup: the process must not run with a schedule
/// it cannot fully understand.
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// The document exists but could not be read
    #[error("failed to read schedule document '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The document exists but is not valid TOML
    #[error("failed to parse schedule document '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// Two entries share the same id
    #[error("duplicate job id '{id}' in schedule document")]
    DuplicateJobId { id: String },

    /// A cron expression does not parse to a recurring rule
    #[error("job '{id}' has invalid cron expression '{cron}': {reason}")]
    InvalidCron {
        id: String,
        cron: String,
        reason: String,
    },

    /// A timezone override is not a known IANA zone
    #[error("job '{id}' has invalid timezone '{timezone}'")]
    InvalidTimezone { id: String, timezone: String },
}

/// Errors raised while resolving a job name to an action
#[derive(Error, Debug)]
pub enum JobError {
    /// The requested target is neither a registered job nor an alias
    #[error("unknown job '{target}'")]
    UnknownJob { target: String },
}
