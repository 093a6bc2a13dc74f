//! Core execution pipeline: stage, optionally compile, run, capture.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::error::{describe_exit, Result, RunnerError};
use crate::runner::config::RunnerConfig;
use crate::runner::io::{self, CapturedOutput};
use crate::runner::language::{global_registry, CommandTemplate, LanguageProfile, LanguageRegistry, RunPlan};
use crate::runner::limits::ExecutionLimiter;
use crate::runner::staging::StagedSource;

/// The pipeline step a failed execution stopped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// The source could not be written; no process was started.
    Staging,
    /// The compiler failed or could not be started.
    Compile,
    /// The program failed to start or exited unsuccessfully.
    Run,
    /// The program exceeded the configured timeout and was killed.
    TimedOut,
}

/// Details about how an execution went.
#[derive(Debug, Clone)]
pub struct ExecutionMetadata {
    /// The language identifier the submission ran as.
    pub language: String,
    /// Wall-clock time from staging to completion.
    pub duration: Duration,
    /// Exit code of the final process, when it exited normally.
    pub exit_code: Option<i32>,
    /// Whether the submission was staged in a request-scoped directory.
    pub isolated: bool,
    /// Whether output beyond the configured cap was discarded.
    pub truncated: bool,
}

/// Result of running a submission.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Combined stdout and stderr, followed by a failure narrative if any.
    pub output: String,
    /// Whether every step succeeded.
    pub succeeded: bool,
    /// Where the pipeline stopped, for failed executions.
    pub failure: Option<FailureStage>,
    /// Execution details.
    pub metadata: ExecutionMetadata,
}

impl ExecutionResult {
    /// Check if the execution was successful.
    pub fn is_success(&self) -> bool {
        self.succeeded
    }
}

/// Runs source snippets through host toolchains.
///
/// Cheap to clone; clones share configuration, registry and limiter.
#[derive(Debug, Clone)]
pub struct CodeRunner {
    config: Arc<RunnerConfig>,
    registry: Arc<LanguageRegistry>,
    limiter: ExecutionLimiter,
}

impl CodeRunner {
    /// Create a runner over the built-in language table.
    pub fn new(config: RunnerConfig) -> Self {
        Self::with_registry(config, global_registry())
    }

    /// Create a runner over a custom language table.
    pub fn with_registry(config: RunnerConfig, registry: Arc<LanguageRegistry>) -> Self {
        let limiter = ExecutionLimiter::new(config.max_concurrent_runs, config.admission);
        Self {
            config: Arc::new(config),
            registry,
            limiter,
        }
    }

    /// The runner configuration.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// The language table this runner dispatches through.
    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// The concurrency limiter.
    pub fn limiter(&self) -> &ExecutionLimiter {
        &self.limiter
    }

    /// Look up the profile for a language identifier.
    pub fn resolve(&self, language: &str) -> Result<&LanguageProfile> {
        self.registry
            .resolve(language)
            .ok_or_else(|| RunnerError::UnsupportedLanguage(language.to_string()))
    }

    /// Run `code` as `language`.
    ///
    /// Returns `Err` only when execution cannot begin: an unsupported
    /// language or a rejected admission. Every other failure is reported
    /// in the returned [`ExecutionResult`].
    pub async fn run(&self, language: &str, code: &str) -> Result<ExecutionResult> {
        self.run_with_input(language, code, None).await
    }

    /// Run `code` as `language`, writing `input` to the program's stdin.
    pub async fn run_with_input(
        &self,
        language: &str,
        code: &str,
        input: Option<&str>,
    ) -> Result<ExecutionResult> {
        let profile = self.resolve(language)?;
        let _permit = self.limiter.acquire().await?;
        let started = Instant::now();

        let staged = match StagedSource::stage(
            self.config.staging_mode,
            &self.config.temp_dir,
            &profile.extension,
            code,
        )
        .await
        {
            Ok(staged) => staged,
            Err(e) => {
                tracing::warn!(language, error = %e, "staging failed");
                return Ok(ExecutionResult {
                    output: format!("Error: {}", e),
                    succeeded: false,
                    failure: Some(FailureStage::Staging),
                    metadata: ExecutionMetadata {
                        language: language.to_string(),
                        duration: started.elapsed(),
                        exit_code: None,
                        isolated: false,
                        truncated: false,
                    },
                });
            }
        };

        let (command, program) = match &profile.run_plan {
            RunPlan::Interpret(template) => (
                template.command(staged.source_path(), staged.binary_path()),
                template.program().to_string(),
            ),
            RunPlan::CompileThenRun { compile } => {
                if let Err(e) = self.compile(compile, &staged).await {
                    tracing::info!(language, error = %e, "compilation failed");
                    return Ok(self.compile_failure(language, e, started, &staged));
                }
                (
                    Command::new(staged.binary_path()),
                    staged.binary_path().display().to_string(),
                )
            }
        };

        tracing::debug!(language, program = %program, "running submission");
        let (captured, status) = self.supervise(command, &program, input).await;

        let mut output = captured.to_string_lossy();
        let (succeeded, failure, exit_code) = match status {
            Ok(status) if status.success() => (true, None, status.code()),
            Ok(status) => {
                output.push_str("\nError: ");
                output.push_str(&describe_exit(&status));
                (false, Some(FailureStage::Run), status.code())
            }
            Err(e) => {
                output.push_str(&format!("\nError: {}", e));
                let stage = if e.is_timeout() {
                    FailureStage::TimedOut
                } else {
                    FailureStage::Run
                };
                (false, Some(stage), None)
            }
        };

        let duration = started.elapsed();
        tracing::info!(
            language,
            succeeded,
            duration_ms = duration.as_millis() as u64,
            "execution finished"
        );

        Ok(ExecutionResult {
            output,
            succeeded,
            failure,
            metadata: ExecutionMetadata {
                language: language.to_string(),
                duration,
                exit_code,
                isolated: staged.is_isolated(),
                truncated: captured.is_truncated(),
            },
        })
    }

    /// Compile the staged source into its binary path.
    async fn compile(&self, template: &CommandTemplate, staged: &StagedSource) -> Result<()> {
        let command = template.command(staged.source_path(), staged.binary_path());
        tracing::debug!(compiler = template.program(), "compiling submission");

        let (captured, status) = self.supervise(command, template.program(), None).await;
        let reason = match status {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => describe_exit(&status),
            Err(e) => e.to_string(),
        };

        Err(RunnerError::CompileFailed {
            reason,
            diagnostics: captured.to_string_lossy(),
        })
    }

    fn compile_failure(
        &self,
        language: &str,
        error: RunnerError,
        started: Instant,
        staged: &StagedSource,
    ) -> ExecutionResult {
        let mut output = String::new();
        if self.config.compiler_diagnostics {
            if let RunnerError::CompileFailed { diagnostics, .. } = &error {
                output.push_str(diagnostics);
            }
        }
        output.push_str(&format!("{}\n", error));

        ExecutionResult {
            output,
            succeeded: false,
            failure: Some(FailureStage::Compile),
            metadata: ExecutionMetadata {
                language: language.to_string(),
                duration: started.elapsed(),
                exit_code: None,
                isolated: staged.is_isolated(),
                truncated: false,
            },
        }
    }

    /// Spawn `command`, capture merged output and wait for it to exit.
    ///
    /// The captured output is returned even when the process fails or
    /// times out, holding whatever was read before that point.
    async fn supervise(
        &self,
        mut command: Command,
        program: &str,
        input: Option<&str>,
    ) -> (CapturedOutput, Result<ExitStatus>) {
        let captured = CapturedOutput::with_limit(self.config.max_output_bytes);

        command
            .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own group, so anything the program starts can be killed with it.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                return (
                    captured,
                    Err(RunnerError::Spawn {
                        program: program.to_string(),
                        source,
                    }),
                )
            }
        };
        let group = ProcessGroup::of(&child);

        let feeder = child
            .stdin
            .take()
            .zip(input.map(str::to_owned))
            .map(|(stdin, input)| tokio::spawn(io::feed(stdin, input)));

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let sink = captured.clone();
        let finished = async {
            let (status, drained) = tokio::join!(child.wait(), drain(stdout, stderr, sink));
            drained?;
            status
        };

        let status = match self.config.timeout {
            None => finished.await.map_err(RunnerError::from),
            Some(limit) => {
                let waited = tokio::time::timeout(limit, finished).await;
                match waited {
                    Ok(status) => status.map_err(RunnerError::from),
                    Err(_) => {
                        tracing::warn!(program, timeout = ?limit, "process timed out, killing");
                        group.kill();
                        if let Err(e) = child.kill().await {
                            tracing::warn!(program, error = %e, "failed to kill timed out process");
                        }
                        Err(RunnerError::Timeout(limit))
                    }
                }
            }
        };

        if let Some(feeder) = feeder {
            if status.is_err() {
                feeder.abort();
            } else if let Ok(Err(e)) = feeder.await {
                tracing::debug!(program, error = %e, "writing stdin failed");
            }
        }

        (captured, status)
    }
}

/// The process group a supervised child leads.
///
/// Every process still in the group is killed when this is dropped: after
/// a normal exit, on timeout, or when the run future itself is dropped.
struct ProcessGroup {
    #[cfg_attr(not(unix), allow(dead_code))]
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    fn kill(&self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            let Some(pgid) = self.pgid.and_then(|id| i32::try_from(id).ok()) else {
                return;
            };
            match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
                Err(e) => tracing::debug!(pgid, error = %e, "failed to kill process group"),
            }
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Drain both pipes concurrently into the same sink.
async fn drain(
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    sink: CapturedOutput,
) -> std::io::Result<()> {
    let out = async {
        match stdout {
            Some(pipe) => io::pump(pipe, sink.clone()).await,
            None => Ok(()),
        }
    };
    let err = async {
        match stderr {
            Some(pipe) => io::pump(pipe, sink.clone()).await,
            None => Ok(()),
        }
    };
    tokio::try_join!(out, err).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::language::{Arg, LanguageProfile};

    fn shell_runner(config: RunnerConfig) -> CodeRunner {
        let registry = LanguageRegistry::empty()
            .with_language("sh", LanguageProfile::interpreted("sh", "sh", [Arg::Source]));
        CodeRunner::with_registry(config, Arc::new(registry))
    }

    #[tokio::test]
    async fn test_unsupported_language_is_error() {
        let runner = CodeRunner::new(RunnerConfig::default());
        let err = runner.run("ruby", "puts 1").await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_successful_run() {
        let root = tempfile::tempdir().unwrap();
        let runner = shell_runner(RunnerConfig::builder().temp_dir(root.path()).build());

        let result = runner.run("sh", "echo hi").await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.output, "hi\n");
        assert_eq!(result.failure, None);
        assert_eq!(result.metadata.exit_code, Some(0));
        assert!(result.metadata.isolated);
    }

    #[tokio::test]
    async fn test_nonzero_exit_appends_error() {
        let root = tempfile::tempdir().unwrap();
        let runner = shell_runner(RunnerConfig::builder().temp_dir(root.path()).build());

        let result = runner.run("sh", "echo oops >&2; exit 3").await.unwrap();
        assert!(!result.is_success());
        assert_eq!(result.output, "oops\n\nError: exit status 3");
        assert_eq!(result.failure, Some(FailureStage::Run));
        assert_eq!(result.metadata.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let root = tempfile::tempdir().unwrap();
        let runner = shell_runner(
            RunnerConfig::builder()
                .temp_dir(root.path())
                .timeout(Duration::from_millis(200))
                .build(),
        );

        let result = runner.run("sh", "echo start; exec sleep 30").await.unwrap();
        assert_eq!(result.failure, Some(FailureStage::TimedOut));
        assert!(result.output.starts_with("start\n"));
        assert!(result.output.contains("\nError: execution timed out after"));
        assert!(result.metadata.duration < Duration::from_secs(10));
    }

    /// Gone, or a zombie waiting to be reaped.
    #[cfg(target_os = "linux")]
    fn process_is_dead(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Err(_) => true,
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .is_some_and(|state| state == "Z"),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_background_children() {
        let root = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let pid_file = work.path().join("child");
        let runner = shell_runner(
            RunnerConfig::builder()
                .temp_dir(root.path())
                .timeout(Duration::from_millis(300))
                .build(),
        );

        let code = format!("sleep 30 &\necho $! > '{}'\nwait\n", pid_file.display());
        let result = runner.run("sh", &code).await.unwrap();
        assert_eq!(result.failure, Some(FailureStage::TimedOut));

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(process_is_dead(&pid), "background sleep {} survived the timeout", pid);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_finished_run_leaves_no_strays() {
        let root = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let pid_file = work.path().join("child");
        let runner = shell_runner(RunnerConfig::builder().temp_dir(root.path()).build());

        // The stray does not hold the output pipes, so the run finishes normally.
        let code = format!(
            "sleep 30 >/dev/null 2>&1 &\necho $! > '{}'\necho done\n",
            pid_file.display()
        );
        let result = runner.run("sh", &code).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.output, "done\n");

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(process_is_dead(&pid), "background sleep {} outlived the run", pid);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_exit_is_named() {
        let root = tempfile::tempdir().unwrap();
        let runner = shell_runner(RunnerConfig::builder().temp_dir(root.path()).build());

        let result = runner.run("sh", "echo before; kill -9 $$").await.unwrap();
        assert_eq!(result.output, "before\n\nError: signal: killed");
        assert_eq!(result.failure, Some(FailureStage::Run));
        assert_eq!(result.metadata.exit_code, None);
    }

    #[tokio::test]
    async fn test_stdin_is_null_without_input() {
        let root = tempfile::tempdir().unwrap();
        let runner = shell_runner(RunnerConfig::builder().temp_dir(root.path()).build());

        let result = runner.run("sh", "cat; echo done").await.unwrap();
        assert_eq!(result.output, "done\n");
    }
}
