//! Schedule document loading and validation
//!
//! The schedule document is a TOML file of `[[jobs]]` tables. When no
//! document exists the loader synthesizes a single job from the
//! fallback cron expression, so the service always has at least one
//! schedule. A document that exists but cannot be fully validated
//! aborts startup.

use cron::Schedule;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::info;

use crate::config::SchedulerConfig;
use crate::errors::{ScheduleError, ScheduleResult};
use crate::models::JobDefinition;

#[derive(Debug, Deserialize)]
struct ScheduleDocument {
    #[serde(default)]
    jobs: Vec<JobDefinition>,
}

/// Accept 5-field cron syntax by prepending a seconds column
///
/// The `cron` crate requires seconds; operators write standard 5-field
/// expressions. 6- and 7-field expressions pass through untouched.
pub fn normalize_cron(expr: &str) -> Result<String, String> {
    match expr.split_whitespace().count() {
        5 => Ok(format!("0 {}", expr.trim())),
        6 | 7 => Ok(expr.trim().to_string()),
        n => Err(format!("expected 5 to 7 fields, found {n}")),
    }
}

/// Parse a job's cron expression into a recurring schedule
pub fn parse_cron(definition: &JobDefinition) -> ScheduleResult<Schedule> {
    let invalid = |reason: String| ScheduleError::InvalidCron {
        id: definition.id.clone(),
        cron: definition.cron.clone(),
        reason,
    };

    let normalized = normalize_cron(&definition.cron).map_err(&invalid)?;
    Schedule::from_str(&normalized).map_err(|e| invalid(e.to_string()))
}

/// Parse a job's timezone override, if any
pub fn parse_timezone(definition: &JobDefinition) -> ScheduleResult<Option<Tz>> {
    match &definition.timezone {
        None => Ok(None),
        Some(tz) => tz
            .parse::<Tz>()
            .map(Some)
            .map_err(|_| ScheduleError::InvalidTimezone {
                id: definition.id.clone(),
                timezone: tz.clone(),
            }),
    }
}

/// Load job definitions, falling back to a synthesized single-job
/// schedule when the document is absent
pub fn load(config: &SchedulerConfig) -> ScheduleResult<Vec<JobDefinition>> {
    let path = config.effective_schedules_file();
    if path.exists() {
        let definitions = load_document(&path)?;
        info!(
            "Loaded {} job(s) from schedule document {}",
            definitions.len(),
            path.display()
        );
        Ok(definitions)
    } else {
        let definition = fallback_definition(config)?;
        info!(
            "No schedule document at {}. Using fallback cron '{}' for '{}'",
            path.display(),
            definition.cron,
            definition.target
        );
        Ok(vec![definition])
    }
}

/// Load and validate an existing schedule document
pub fn load_document(path: &Path) -> ScheduleResult<Vec<JobDefinition>> {
    let display = path.display().to_string();
    let contents = std::fs::read_to_string(path).map_err(|source| ScheduleError::Read {
        path: display.clone(),
        source,
    })?;

    let document: ScheduleDocument =
        toml::from_str(&contents).map_err(|source| ScheduleError::Parse {
            path: display,
            source,
        })?;

    validate(&document.jobs)?;
    Ok(document.jobs)
}

/// Synthesize the single default job used when no document exists
fn fallback_definition(config: &SchedulerConfig) -> ScheduleResult<JobDefinition> {
    let definition = JobDefinition {
        id: format!("{}_cron_job", config.default_target),
        kind: Default::default(),
        target: config.default_target.clone(),
        cron: config.effective_cron_expression(),
        timezone: None,
    };

    // The fallback expression comes from the environment; a typo there
    // is as fatal as one in the document.
    parse_cron(&definition)?;
    Ok(definition)
}

fn validate(definitions: &[JobDefinition]) -> ScheduleResult<()> {
    let mut seen = HashSet::new();
    for definition in definitions {
        if !seen.insert(definition.id.as_str()) {
            return Err(ScheduleError::DuplicateJobId {
                id: definition.id.clone(),
            });
        }
        parse_cron(definition)?;
        parse_timezone(definition)?;
    }
    Ok(())
}
