//! Core data types for job scheduling and execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Kind of entry in the schedule document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Run the named spider directly
    Spider,
    /// `target` is an alias resolved through the registry
    Alias,
}

impl Default for JobKind {
    fn default() -> Self {
        JobKind::Spider
    }
}

/// One scheduled job as declared in the schedule document
///
/// `cron` accepts standard 5-field syntax or 6-field syntax with a
/// leading seconds column. `timezone` overrides the process default
/// for this job only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: JobKind,
    pub target: String,
    pub cron: String,
    pub timezone: Option<String>,
}

/// Ephemeral record of one execution attempt
///
/// Created when the execution guard grants a slot, removed when the run
/// completes. While present in the guard table the target is considered
/// running.
#[derive(Debug, Clone, Serialize)]
pub struct RunHandle {
    pub run_id: Uuid,
    pub target: String,
    pub started_at: DateTime<Utc>,
}

impl RunHandle {
    pub fn new(target: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            target: target.to_string(),
            started_at: Utc::now(),
        }
    }
}

/// Terminal status of one job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

/// Output file produced by a run, located by the artifact scan
#[derive(Debug, Clone, Serialize)]
pub struct RunArtifact {
    pub path: PathBuf,
    /// Record count when the file is a JSON array
    pub records: Option<usize>,
}

/// Outcome of one job run as observed by the runner
#[derive(Debug, Clone)]
pub struct RunResult {
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    pub artifact: Option<RunArtifact>,
}

/// Lifecycle phase of a job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPhase {
    Started,
    Completed,
    Failed,
}

/// Immutable notification about one job run transition
///
/// Produced by the runner, consumed by the notifier. Delivery failures
/// never feed back into the run.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    pub target: String,
    pub phase: EventPhase,
    pub timestamp: DateTime<Utc>,
    pub detail: Option<String>,
}

impl LifecycleEvent {
    pub fn started(target: &str) -> Self {
        Self::new(target, EventPhase::Started, None)
    }

    pub fn completed(target: &str, detail: Option<String>) -> Self {
        Self::new(target, EventPhase::Completed, detail)
    }

    pub fn failed(target: &str, detail: Option<String>) -> Self {
        Self::new(target, EventPhase::Failed, detail)
    }

    fn new(target: &str, phase: EventPhase, detail: Option<String>) -> Self {
        Self {
            target: target.to_string(),
            phase,
            timestamp: Utc::now(),
            detail,
        }
    }
}
