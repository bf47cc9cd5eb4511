//! Behavioral validation - runs the declared validation commands
//!
//! Within one manifest, commands run in declared order and stop at the first
//! failure. Across manifests every manifest runs regardless of the others.
//! Process execution sits behind [`CommandRunner`] so the sequencing can be
//! tested without spawning anything.

use crate::compare::{Issue, ResultCode};
use crate::error::RunnerError;
use async_trait::async_trait;
use maid_chain::{ChainError, ChainResolver};
use maid_manifest::{CommandSpec, Manifest, ManifestId, ManifestSet};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

/// Captured output of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if terminated by a signal
    pub exit_code: Option<i32>,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with status zero
    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Executes validation commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` in `cwd`, giving up after `timeout`
    ///
    /// # Errors
    /// [`RunnerError::Timeout`] when the budget expires,
    /// [`RunnerError::Spawn`] when the process cannot start.
    async fn run(
        &self,
        command: &CommandSpec,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<CommandOutput, RunnerError>;
}

/// Runner spawning real processes through tokio
///
/// Children are killed when their future is dropped, so an expired timeout
/// never leaves a process behind.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<CommandOutput, RunnerError> {
        let Some((program, args)) = command.argv().split_first() else {
            return Err(RunnerError::EmptyCommand);
        };

        let mut process = tokio::process::Command::new(program);
        process
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = process.spawn().map_err(|source| RunnerError::Spawn {
            command: command.to_string(),
            source,
        })?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(source)) => Err(RunnerError::Spawn {
                command: command.to_string(),
                source,
            }),
            Err(_) => Err(RunnerError::Timeout {
                command: command.to_string(),
                timeout,
            }),
        }
    }
}

/// Status of one command in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// Exited with zero
    Passed,
    /// Non-zero exit or spawn failure
    Failed,
    /// Budget expired
    TimedOut,
    /// Not run after an earlier failure
    Skipped,
}

/// Execution record of one command
#[derive(Debug, Clone, Serialize)]
pub struct CommandRun {
    /// Rendered command
    pub command: String,
    /// Outcome
    pub status: CommandStatus,
    /// Exit code when the process finished
    pub exit_code: Option<i32>,
    /// Wall time in milliseconds
    pub duration_ms: u128,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

/// Commands of one manifest
#[derive(Debug, Clone, Serialize)]
pub struct ManifestRun {
    /// Manifest
    pub manifest: ManifestId,
    /// Commands in declared order
    pub commands: Vec<CommandRun>,
    /// First failure, if any
    pub issue: Option<Issue>,
}

impl ManifestRun {
    /// Whether every command passed
    #[inline]
    #[must_use]
    pub fn passed(&self) -> bool {
        self.issue.is_none()
    }
}

/// Outcome of a behavioral run over several manifests
#[derive(Debug, Clone, Default, Serialize)]
pub struct BehaviorReport {
    /// One entry per executed manifest, in id order
    pub runs: Vec<ManifestRun>,
    /// Problems preventing the run (chain errors)
    pub issues: Vec<Issue>,
}

impl BehaviorReport {
    /// Most severe outcome
    #[must_use]
    pub fn code(&self) -> ResultCode {
        ResultCode::most_severe(
            self.issues
                .iter()
                .chain(self.runs.iter().filter_map(|run| run.issue.as_ref()))
                .map(Issue::code),
        )
    }

    /// Manifests that failed
    pub fn failed(&self) -> impl Iterator<Item = &ManifestRun> {
        self.runs.iter().filter(|run| !run.passed())
    }
}

/// Sequences validation commands over a [`CommandRunner`]
#[derive(Debug, Clone)]
pub struct BehaviorRunner<R> {
    runner: R,
    cwd: PathBuf,
    timeout: Duration,
}

impl<R: CommandRunner> BehaviorRunner<R> {
    /// Create runner executing in `cwd` with a per-command `timeout`
    #[must_use]
    pub fn new(runner: R, cwd: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            runner,
            cwd: cwd.into(),
            timeout,
        }
    }

    /// Underlying command runner
    #[inline]
    #[must_use]
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run one manifest's commands, stopping at the first failure
    pub async fn run_manifest(&self, manifest: &Manifest) -> ManifestRun {
        let id = manifest.id().clone();
        let mut commands = Vec::new();
        let mut issue = None;

        for command in manifest.validation_commands() {
            if issue.is_some() {
                commands.push(CommandRun {
                    command: command.to_string(),
                    status: CommandStatus::Skipped,
                    exit_code: None,
                    duration_ms: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                });
                continue;
            }

            tracing::debug!("{}: running `{}`", id, command);
            let started_at = Instant::now();
            let result = self.runner.run(command, &self.cwd, self.timeout).await;
            let duration_ms = started_at.elapsed().as_millis();

            let run = match result {
                Ok(output) if output.success() => CommandRun {
                    command: command.to_string(),
                    status: CommandStatus::Passed,
                    exit_code: output.exit_code,
                    duration_ms,
                    stdout: output.stdout,
                    stderr: output.stderr,
                },
                Ok(output) => {
                    issue = Some(Issue::CommandFailure {
                        manifest: id.clone(),
                        command: command.to_string(),
                        exit_code: output.exit_code,
                        reason: last_line(&output.stderr)
                            .unwrap_or("non-zero exit")
                            .to_string(),
                    });
                    CommandRun {
                        command: command.to_string(),
                        status: CommandStatus::Failed,
                        exit_code: output.exit_code,
                        duration_ms,
                        stdout: output.stdout,
                        stderr: output.stderr,
                    }
                }
                Err(error) => {
                    let status = if let RunnerError::Timeout { timeout, .. } = &error {
                        issue = Some(Issue::CommandTimeout {
                            manifest: id.clone(),
                            command: command.to_string(),
                            timeout_secs: timeout.as_secs(),
                        });
                        CommandStatus::TimedOut
                    } else {
                        issue = Some(Issue::CommandFailure {
                            manifest: id.clone(),
                            command: command.to_string(),
                            exit_code: None,
                            reason: error.to_string(),
                        });
                        CommandStatus::Failed
                    };
                    CommandRun {
                        command: command.to_string(),
                        status,
                        exit_code: None,
                        duration_ms,
                        stdout: String::new(),
                        stderr: format!("runner error: {error}"),
                    }
                }
            };
            commands.push(run);
        }

        if let Some(issue) = &issue {
            tracing::warn!("{}", issue);
        }
        ManifestRun {
            manifest: id,
            commands,
            issue,
        }
    }

    /// Run several manifests in id order; one failure never stops the rest
    pub async fn run_all(&self, manifests: &[&Manifest]) -> BehaviorReport {
        let mut ordered = manifests.to_vec();
        ordered.sort_by(|a, b| a.id().cmp(b.id()));
        ordered.dedup_by(|a, b| a.id() == b.id());

        let mut report = BehaviorReport::default();
        for manifest in ordered {
            report.runs.push(self.run_manifest(manifest).await);
        }
        tracing::info!(
            "ran {} manifests, {} failed",
            report.runs.len(),
            report.failed().count()
        );
        report
    }

    /// Run every non-superseded manifest in the set
    ///
    /// Manifests caught in a supersession cycle are not run; each cycle is
    /// reported against the files its members target.
    pub async fn run_sweep(&self, set: &ManifestSet) -> BehaviorReport {
        let (chain, cycles) = ChainResolver::new(set).resolve_all_isolating();
        let mut report = self.run_all(chain.active()).await;
        for error in cycles {
            let scope = match &error {
                ChainError::Cycle { scope, .. } => scope.clone(),
                ChainError::Ambiguous { file, .. } => file.clone(),
            };
            report.issues.push(chain_issue(&scope, error));
        }
        report
    }
}

/// Map a chain error to its issue record
pub fn chain_issue(file: &str, error: ChainError) -> Issue {
    match error {
        ChainError::Cycle { cycle, .. } => Issue::ChainCycle {
            file: file.to_string(),
            cycle,
        },
        ChainError::Ambiguous {
            artifact,
            first,
            second,
            ..
        } => {
            let reason = format!(
                "ambiguous chain: {first} and {second} declare {artifact} differently without an order between them"
            );
            Issue::MalformedManifest {
                file: file.to_string(),
                manifests: vec![first, second],
                artifact: Some(artifact),
                reason,
            }
        }
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use maid_test_utils::{manifest_set, ManifestBuilder};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Exit codes by program name; `sleep` times out, `missing` cannot spawn
    #[derive(Default)]
    struct MockRunner {
        invocations: Mutex<Vec<String>>,
    }

    impl MockRunner {
        fn invocations(&self) -> Vec<String> {
            self.invocations
                .lock()
                .expect("mock runner lock should not poison")
                .clone()
        }
    }

    #[async_trait]
    impl CommandRunner for MockRunner {
        async fn run(
            &self,
            command: &CommandSpec,
            _cwd: &Path,
            timeout: Duration,
        ) -> Result<CommandOutput, RunnerError> {
            self.invocations
                .lock()
                .expect("mock runner lock should not poison")
                .push(command.to_string());

            let exit_code = match command.program() {
                Some("sleep") => {
                    return Err(RunnerError::Timeout {
                        command: command.to_string(),
                        timeout,
                    })
                }
                Some("missing") => {
                    return Err(RunnerError::Spawn {
                        command: command.to_string(),
                        source: std::io::Error::from(std::io::ErrorKind::NotFound),
                    })
                }
                Some("false") => 1,
                _ => 0,
            };
            Ok(CommandOutput {
                exit_code: Some(exit_code),
                stdout: String::new(),
                stderr: if exit_code == 0 {
                    String::new()
                } else {
                    "assertion failed\n".into()
                },
            })
        }
    }

    fn runner() -> BehaviorRunner<MockRunner> {
        BehaviorRunner::new(MockRunner::default(), ".", Duration::from_secs(5))
    }

    #[tokio::test]
    async fn fail_fast_within_manifest() {
        let runner = runner();
        let manifest = ManifestBuilder::edit("task-001", "a.py")
            .commands(&[&["true"], &["false", "x"], &["true", "never"]])
            .build();

        let run = runner.run_manifest(&manifest).await;
        let statuses: Vec<_> = run.commands.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![CommandStatus::Passed, CommandStatus::Failed, CommandStatus::Skipped]
        );
        assert_eq!(runner.runner().invocations(), vec!["true", "false x"]);
        assert!(matches!(
            run.issue,
            Some(Issue::CommandFailure { exit_code: Some(1), ref reason, .. }) if reason == "assertion failed"
        ));
    }

    #[tokio::test]
    async fn timeout_is_distinct_from_failure() {
        let runner = runner();
        let manifest = ManifestBuilder::edit("task-001", "a.py")
            .commands(&[&["sleep", "10"]])
            .build();

        let run = runner.run_manifest(&manifest).await;
        assert_eq!(run.commands[0].status, CommandStatus::TimedOut);
        assert!(matches!(
            run.issue,
            Some(Issue::CommandTimeout { timeout_secs: 5, .. })
        ));
        assert_eq!(run.issue.unwrap().code(), ResultCode::BehavioralFail);
    }

    #[tokio::test]
    async fn spawn_failure_has_no_exit_code() {
        let runner = runner();
        let manifest = ManifestBuilder::edit("task-001", "a.py")
            .commands(&[&["missing"]])
            .build();

        let run = runner.run_manifest(&manifest).await;
        assert!(matches!(
            run.issue,
            Some(Issue::CommandFailure { exit_code: None, .. })
        ));
    }

    #[tokio::test]
    async fn sweep_runs_every_active_manifest() {
        let runner = runner();
        let set = manifest_set(vec![
            ManifestBuilder::create("task-001", "a.py")
                .commands(&[&["old"]])
                .build(),
            ManifestBuilder::edit("task-002", "a.py")
                .supersedes("task-001")
                .commands(&[&["false"]])
                .build(),
            ManifestBuilder::create("task-003", "b.py")
                .commands(&[&["pytest", "b"]])
                .build(),
        ]);

        let report = runner.run_sweep(&set).await;
        assert_eq!(runner.runner().invocations(), vec!["false", "pytest b"]);
        assert_eq!(report.runs.len(), 2);
        assert_eq!(report.failed().count(), 1);
        assert_eq!(report.code(), ResultCode::BehavioralFail);
    }

    #[tokio::test]
    async fn sweep_with_cycle_is_chain_failure() {
        let runner = runner();
        let set = manifest_set(vec![
            ManifestBuilder::edit("task-001", "a.py").supersedes("task-002").build(),
            ManifestBuilder::edit("task-002", "a.py").supersedes("task-001").build(),
        ]);

        let report = runner.run_sweep(&set).await;
        assert!(runner.runner().invocations().is_empty());
        assert_eq!(report.code(), ResultCode::ChainFail);
    }

    #[tokio::test]
    async fn sweep_runs_manifests_outside_a_cycle() {
        let runner = runner();
        let set = manifest_set(vec![
            ManifestBuilder::create("task-001", "a.py")
                .commands(&[&["pytest", "a"]])
                .build(),
            ManifestBuilder::edit("task-002", "b.py").supersedes("task-003").build(),
            ManifestBuilder::edit("task-003", "b.py").supersedes("task-002").build(),
        ]);

        let report = runner.run_sweep(&set).await;
        assert_eq!(runner.runner().invocations(), vec!["pytest a"]);
        assert_eq!(report.runs.len(), 1);
        assert!(report.runs[0].passed());
        assert_eq!(report.issues.len(), 1);
        assert!(matches!(
            &report.issues[0],
            Issue::ChainCycle { file, cycle } if file == "b.py" && cycle.len() == 2
        ));
        assert_eq!(report.code(), ResultCode::ChainFail);
    }

    #[tokio::test]
    async fn process_runner_reports_exit_codes() {
        let cwd = std::env::temp_dir();
        let ok = ProcessRunner
            .run(
                &CommandSpec::new(vec!["true".into()]),
                &cwd,
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        assert!(ok.success());

        let failed = ProcessRunner
            .run(
                &CommandSpec::new(vec!["false".into()]),
                &cwd,
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        assert_eq!(failed.exit_code, Some(1));
    }

    #[tokio::test]
    async fn process_runner_times_out() {
        let err = ProcessRunner
            .run(
                &CommandSpec::new(vec!["sleep".into(), "5".into()]),
                &std::env::temp_dir(),
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Timeout { .. }));
    }

    #[tokio::test]
    async fn process_runner_spawn_failure() {
        let err = ProcessRunner
            .run(
                &CommandSpec::new(vec!["definitely-not-a-real-program-7f3a".into()]),
                &std::env::temp_dir(),
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
    }
}
