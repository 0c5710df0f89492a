//! Job execution
//!
//! The runner owns the full life of one run: it emits the `started`
//! event, spawns the job's process, streams its output into the log,
//! observes the exit status and emits the terminal event. The guard
//! slot travels into the run as an owned value and is released by drop,
//! so every exit path (success, failure, spawn fault, panic) clears the
//! in-flight entry.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::config::ScraperConfig;
use crate::jobs::artifacts;
use crate::jobs::guard::RunSlot;
use crate::jobs::registry::JobAction;
use crate::models::{LifecycleEvent, RunResult, RunStatus};
use crate::notify::Notifier;

/// Lines of stderr retained for failure detail
const STDERR_TAIL_LINES: usize = 20;
/// Upper bound on the failure detail attached to events
const DETAIL_MAX_CHARS: usize = 1000;

pub struct JobRunner {
    notifier: Arc<dyn Notifier>,
    config: ScraperConfig,
}

impl JobRunner {
    pub fn new(notifier: Arc<dyn Notifier>, config: ScraperConfig) -> Self {
        Self { notifier, config }
    }

    /// Fire-and-forget: run the job on an independent task
    ///
    /// The caller gets nothing back; completion is observable only
    /// through the lifecycle event stream and the guard table.
    pub fn dispatch(self: Arc<Self>, action: JobAction, slot: RunSlot) {
        tokio::spawn(async move {
            self.run(action, slot).await;
        });
    }

    /// Execute one job run to completion
    pub async fn run(&self, action: JobAction, slot: RunSlot) -> RunResult {
        let target = action.target.clone();
        info!(
            "Starting job '{}' (run {})",
            target,
            slot.handle().run_id
        );
        self.notifier
            .notify(&LifecycleEvent::started(&target))
            .await;

        let result = match self.execute(&action).await {
            Ok((status, _)) if status.success() => {
                let artifact = artifacts::find_latest(&self.config.data_dir, &target);
                let detail = artifact.as_ref().map(|a| match a.records {
                    Some(records) => {
                        format!("{} records in {}", records, a.path.display())
                    }
                    None => format!("output file {}", a.path.display()),
                });

                info!("Job '{}' completed successfully", target);
                self.notifier
                    .notify(&LifecycleEvent::completed(&target, detail))
                    .await;

                RunResult {
                    status: RunStatus::Succeeded,
                    exit_code: status.code(),
                    artifact,
                }
            }
            Ok((status, stderr_tail)) => {
                let detail = failure_detail(status, &stderr_tail);
                error!("Job '{}' failed: {}", target, detail);
                self.notifier
                    .notify(&LifecycleEvent::failed(&target, Some(detail)))
                    .await;

                RunResult {
                    status: RunStatus::Failed,
                    exit_code: status.code(),
                    artifact: None,
                }
            }
            Err(e) => {
                let detail = format!("failed to launch '{}': {}", action.program, e);
                error!("Job '{}' could not be launched: {}", target, e);
                self.notifier
                    .notify(&LifecycleEvent::failed(&target, Some(detail)))
                    .await;

                RunResult {
                    status: RunStatus::Failed,
                    exit_code: None,
                    artifact: None,
                }
            }
        };

        // Slot drops here, after the terminal event: release happens on
        // every path out of this function.
        drop(slot);
        result
    }

    /// Spawn the job process and stream its output until exit
    async fn execute(&self, action: &JobAction) -> std::io::Result<(ExitStatus, Vec<String>)> {
        let mut child = Command::new(&action.program)
            .args(&action.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout_task = child.stdout.take().map(|stdout| {
            let job = action.target.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(job = %job, "{}", line);
                }
            })
        });

        let stderr_task = child.stderr.take().map(|stderr| {
            let job = action.target.clone();
            tokio::spawn(async move {
                let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(job = %job, "{}", line);
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                tail.into_iter().collect::<Vec<_>>()
            })
        });

        let status = child.wait().await?;

        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        let stderr_tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        Ok((status, stderr_tail))
    }
}

/// Build the detail string for a failed run: exit status plus the last
/// stderr lines, bounded so the notification stays readable
fn failure_detail(status: ExitStatus, stderr_tail: &[String]) -> String {
    let mut detail = match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    };

    if !stderr_tail.is_empty() {
        let snippet = stderr_tail.join("\n");
        let snippet = if snippet.len() > DETAIL_MAX_CHARS {
            let cut = snippet.len() - DETAIL_MAX_CHARS;
            let mut boundary = cut;
            while !snippet.is_char_boundary(boundary) {
                boundary += 1;
            }
            &snippet[boundary..]
        } else {
            snippet.as_str()
        };
        detail.push('\n');
        detail.push_str(snippet);
    }

    detail
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::guard::ExecutionGuard;
    use crate::models::EventPhase;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<LifecycleEvent>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, event: &LifecycleEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    impl RecordingNotifier {
        fn phases(&self) -> Vec<EventPhase> {
            self.events.lock().unwrap().iter().map(|e| e.phase).collect()
        }
    }

    fn runner_with(notifier: Arc<RecordingNotifier>) -> JobRunner {
        let config = ScraperConfig {
            data_dir: std::env::temp_dir().join("scraperd-test-artifacts"),
            ..Default::default()
        };
        JobRunner::new(notifier, config)
    }

    fn action(target: &str, program: &str, args: &[&str]) -> JobAction {
        JobAction {
            target: target.to_string(),
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_successful_run_emits_started_and_completed() {
        let notifier = Arc::new(RecordingNotifier::default());
        let runner = runner_with(notifier.clone());
        let guard = ExecutionGuard::new();

        let slot = guard.try_acquire("quick_job").unwrap();
        let result = runner.run(action("quick_job", "true", &[]), slot).await;

        assert_eq!(result.status, RunStatus::Succeeded);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(
            notifier.phases(),
            vec![EventPhase::Started, EventPhase::Completed]
        );
        assert!(!guard.is_running("quick_job"));
    }

    #[tokio::test]
    async fn test_failing_run_emits_failed_with_exit_code() {
        let notifier = Arc::new(RecordingNotifier::default());
        let runner = runner_with(notifier.clone());
        let guard = ExecutionGuard::new();

        let slot = guard.try_acquire("flaky_job").unwrap();
        let result = runner.run(action("flaky_job", "false", &[]), slot).await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.exit_code, Some(1));
        assert_eq!(
            notifier.phases(),
            vec![EventPhase::Started, EventPhase::Failed]
        );

        let events = notifier.events.lock().unwrap();
        let failed = events.last().unwrap();
        assert!(failed.detail.as_ref().unwrap().contains("exit code 1"));
        drop(events);

        assert!(!guard.is_running("flaky_job"));
    }

    #[tokio::test]
    async fn test_spawn_fault_still_releases_guard() {
        let notifier = Arc::new(RecordingNotifier::default());
        let runner = runner_with(notifier.clone());
        let guard = ExecutionGuard::new();

        let slot = guard.try_acquire("ghost_job").unwrap();
        let result = runner
            .run(
                action("ghost_job", "/nonexistent/scraperd-test-binary", &[]),
                slot,
            )
            .await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.exit_code, None);
        // Exactly one failed event, and the slot is free again
        assert_eq!(
            notifier.phases(),
            vec![EventPhase::Started, EventPhase::Failed]
        );
        assert!(!guard.is_running("ghost_job"));
        assert!(guard.try_acquire("ghost_job").is_some());
    }

    #[tokio::test]
    async fn test_stderr_tail_appears_in_failure_detail() {
        let notifier = Arc::new(RecordingNotifier::default());
        let runner = runner_with(notifier.clone());
        let guard = ExecutionGuard::new();

        let slot = guard.try_acquire("noisy_job").unwrap();
        runner
            .run(
                action(
                    "noisy_job",
                    "sh",
                    &["-c", "echo boom >&2; exit 3"],
                ),
                slot,
            )
            .await;

        let events = notifier.events.lock().unwrap();
        let failed = events.last().unwrap();
        let detail = failed.detail.as_ref().unwrap();
        assert!(detail.contains("exit code 3"));
        assert!(detail.contains("boom"));
    }

    #[test]
    fn test_failure_detail_is_bounded() {
        let tail: Vec<String> = (0..200).map(|i| format!("line {i} {}", "x".repeat(50))).collect();
        // Synthesize a failed status portably via a quick process run
        let status = std::process::Command::new("false").status().unwrap();
        let detail = failure_detail(status, &tail);
        assert!(detail.len() <= DETAIL_MAX_CHARS + "exit code 1\n".len());
    }
}
