//! Cron scheduler loop
//!
//! A single timer task evaluates every job's cron expression against
//! wall-clock time in the job's timezone and dispatches through the
//! execution guard. A due instant that finds its target already running
//! is skipped and logged, never queued: a slow job must not accumulate
//! a backlog of deferred runs.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::errors::{ScheduleError, ScheduleResult};
use crate::jobs::guard::ExecutionGuard;
use crate::jobs::registry::JobRegistry;
use crate::jobs::runner::JobRunner;
use crate::jobs::schedule;
use crate::models::JobDefinition;

/// One schedulable job with its parsed recurrence rule
struct ScheduleEntry {
    definition: JobDefinition,
    schedule: Schedule,
    timezone: Tz,
    /// High-water mark for due-instant detection; a due time fires once
    /// even though the loop ticks many times per minute
    last_evaluated: DateTime<Utc>,
}

/// Decide whether a schedule has a due instant in (last_evaluated, now]
///
/// Pure so that scheduling correctness is testable without a timer
/// loop. Cron fields are interpreted in `tz`; the comparison itself is
/// absolute.
pub fn is_due(
    schedule: &Schedule,
    tz: Tz,
    now: DateTime<Utc>,
    last_evaluated: DateTime<Utc>,
) -> bool {
    schedule
        .after(&last_evaluated.with_timezone(&tz))
        .next()
        .map(|next| next.with_timezone(&Utc) <= now)
        .unwrap_or(false)
}

pub struct SchedulerService {
    entries: Vec<ScheduleEntry>,
    registry: Arc<JobRegistry>,
    guard: ExecutionGuard,
    runner: Arc<JobRunner>,
}

impl SchedulerService {
    /// Build the scheduler from validated job definitions
    ///
    /// `default_timezone` applies to jobs without their own override.
    /// Re-parses cron/timezone, so a caller handing in unvalidated
    /// definitions still cannot start a scheduler with a bad rule.
    pub fn new(
        definitions: Vec<JobDefinition>,
        default_timezone: &str,
        registry: Arc<JobRegistry>,
        guard: ExecutionGuard,
        runner: Arc<JobRunner>,
    ) -> ScheduleResult<Self> {
        let default_tz: Tz = default_timezone.parse().map_err(|_| {
            ScheduleError::InvalidTimezone {
                id: "<default>".to_string(),
                timezone: default_timezone.to_string(),
            }
        })?;

        let now = Utc::now();
        let mut entries = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let parsed = schedule::parse_cron(&definition)?;
            let timezone = schedule::parse_timezone(&definition)?.unwrap_or(default_tz);
            entries.push(ScheduleEntry {
                definition,
                schedule: parsed,
                timezone,
                last_evaluated: now,
            });
        }

        Ok(Self {
            entries,
            registry,
            guard,
            runner,
        })
    }

    /// Run the scheduler loop until cancelled
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Starting scheduler with {} job(s)", self.entries.len());
        self.log_startup_schedule();

        let mut tick = interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.poll(Utc::now());
                }
                _ = cancel.cancelled() => {
                    info!("Scheduler received shutdown signal, stopping");
                    break;
                }
            }
        }
    }

    /// Log the next occurrence of every job at startup
    fn log_startup_schedule(&self) {
        for entry in &self.entries {
            match entry.schedule.upcoming(entry.timezone).next() {
                Some(next) => info!(
                    "Job '{}' (target '{}') - next scheduled run: {} (cron: '{}', tz: {})",
                    entry.definition.id,
                    entry.definition.target,
                    next.format("%Y-%m-%d %H:%M:%S %Z"),
                    entry.definition.cron,
                    entry.timezone,
                ),
                None => warn!(
                    "Job '{}' has no future occurrences (cron: '{}')",
                    entry.definition.id, entry.definition.cron
                ),
            }
        }
    }

    /// Evaluate every entry once and dispatch the due ones
    fn poll(&mut self, now: DateTime<Utc>) {
        for entry in &mut self.entries {
            if !is_due(&entry.schedule, entry.timezone, now, entry.last_evaluated) {
                continue;
            }

            // Advance the mark before dispatching: a denied dispatch
            // consumes its due instant instead of retrying every tick.
            entry.last_evaluated = now;

            let id = entry.definition.id.clone();
            let target = entry.definition.target.clone();
            Self::dispatch(&id, &target, &self.registry, &self.guard, &self.runner);
        }
    }

    /// Resolve and launch one scheduled job without blocking the loop
    fn dispatch(
        id: &str,
        target: &str,
        registry: &Arc<JobRegistry>,
        guard: &ExecutionGuard,
        runner: &Arc<JobRunner>,
    ) {
        let action = match registry.resolve(target) {
            Ok(action) => action,
            Err(e) => {
                error!("Skipping scheduled job '{}': {}", id, e);
                return;
            }
        };

        match guard.try_acquire(&action.target) {
            Some(slot) => {
                info!(
                    "Dispatching scheduled job '{}' (target '{}')",
                    id, action.target
                );
                runner.clone().dispatch(action, slot);
            }
            None => {
                info!(
                    "Skipping scheduled run of '{}': target '{}' is still running",
                    id, action.target
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn daily_at_20() -> Schedule {
        Schedule::from_str("0 0 20 * * *").unwrap()
    }

    #[test]
    fn test_due_when_occurrence_passed() {
        let schedule = daily_at_20();
        let last = Utc.with_ymd_and_hms(2025, 3, 1, 19, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 20, 0, 10).unwrap();

        assert!(is_due(&schedule, chrono_tz::UTC, now, last));
    }

    #[test]
    fn test_not_due_before_occurrence() {
        let schedule = daily_at_20();
        let last = Utc.with_ymd_and_hms(2025, 3, 1, 19, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 19, 59, 59).unwrap();

        assert!(!is_due(&schedule, chrono_tz::UTC, now, last));
    }

    #[test]
    fn test_due_instant_fires_once() {
        let schedule = daily_at_20();
        let mut last = Utc.with_ymd_and_hms(2025, 3, 1, 19, 0, 0).unwrap();

        // First tick after the due instant fires
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 20, 0, 1).unwrap();
        assert!(is_due(&schedule, chrono_tz::UTC, now, last));
        last = now;

        // Subsequent ticks within the same minute do not
        let next_tick = Utc.with_ymd_and_hms(2025, 3, 1, 20, 0, 2).unwrap();
        assert!(!is_due(&schedule, chrono_tz::UTC, next_tick, last));

        // The next day's occurrence fires again
        let tomorrow = Utc.with_ymd_and_hms(2025, 3, 2, 20, 0, 1).unwrap();
        assert!(is_due(&schedule, chrono_tz::UTC, tomorrow, last));
    }

    #[test]
    fn test_cron_fields_follow_job_timezone() {
        let schedule = daily_at_20();
        let last = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();

        // 20:00 Kolkata is 14:30 UTC
        let kolkata: Tz = "Asia/Kolkata".parse().unwrap();
        let before = Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 6, 1, 14, 30, 5).unwrap();

        assert!(!is_due(&schedule, kolkata, before, last));
        assert!(is_due(&schedule, kolkata, after, last));

        // At 20:00 UTC the Kolkata-schedule already fired; in UTC it is
        // due exactly then
        assert!(is_due(
            &schedule,
            chrono_tz::UTC,
            Utc.with_ymd_and_hms(2025, 6, 1, 20, 0, 0).unwrap(),
            last
        ));
    }

    #[tokio::test]
    async fn test_denied_dispatch_creates_no_extra_handles() {
        use crate::config::ScraperConfig;
        use crate::notify::LogNotifier;

        let guard = ExecutionGuard::new();
        let registry = Arc::new(JobRegistry::from_config(&ScraperConfig::default()));
        let runner = Arc::new(JobRunner::new(
            Arc::new(LogNotifier),
            ScraperConfig::default(),
        ));

        // Simulate a run still in flight from an earlier trigger
        let _held = guard.try_acquire("bullseye_press").unwrap();
        assert_eq!(guard.running_count(), 1);

        SchedulerService::dispatch("daily", "bullseye_press", &registry, &guard, &runner);

        // The scheduled firing was skipped: no queued run, no new handle
        assert_eq!(guard.running_count(), 1);
    }

    #[test]
    fn test_new_rejects_bad_default_timezone() {
        let guard = ExecutionGuard::new();
        let registry = Arc::new(JobRegistry::from_config(&Default::default()));
        let runner = Arc::new(JobRunner::new(
            Arc::new(crate::notify::LogNotifier),
            Default::default(),
        ));

        let result = SchedulerService::new(Vec::new(), "Not/A_Zone", registry, guard, runner);
        assert!(matches!(
            result,
            Err(ScheduleError::InvalidTimezone { .. })
        ));
    }
}
