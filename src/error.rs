//! Error types for the code runner.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while dispatching or executing a submission.
///
/// Only [`RunnerError::UnsupportedLanguage`] and [`RunnerError::Busy`] ever
/// escape [`CodeRunner::run`](crate::CodeRunner::run). The remaining variants
/// describe pipeline failures that are folded into the
/// [`ExecutionResult`](crate::ExecutionResult) narrative.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The language identifier is not in the registry.
    #[error("unsupported language: {0:?}")]
    UnsupportedLanguage(String),

    /// The concurrency limit was reached and the admission policy rejects.
    #[error("too many concurrent executions (limit {limit})")]
    Busy {
        /// Configured maximum of in-flight executions.
        limit: usize,
    },

    /// Writing the submitted source to disk failed.
    #[error("failed to write temp file {}: {source}", .path.display())]
    Staging {
        /// The path that could not be written.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The compiler exited unsuccessfully or could not be started.
    #[error("Compilation failed: {reason}")]
    CompileFailed {
        /// Exit status or start failure of the compiler.
        reason: String,
        /// Combined compiler output.
        diagnostics: String,
    },

    /// A toolchain program could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exceeded the configured wall-clock limit and was killed.
    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error while supervising a process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RunnerError {
    /// Check if this error should be reported as a client-side problem.
    pub fn is_client_error(&self) -> bool {
        matches!(self, RunnerError::UnsupportedLanguage(_))
    }

    /// Check if this error represents admission being refused.
    pub fn is_busy(&self) -> bool {
        matches!(self, RunnerError::Busy { .. })
    }

    /// Check if this error represents a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RunnerError::Timeout(_))
    }

    /// Check if this error happened before any process was spawned.
    pub fn is_staging(&self) -> bool {
        matches!(self, RunnerError::Staging { .. })
    }
}

/// Result type alias for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Describe a process exit status the way it is reported to callers.
///
/// Produces `exit status N` for a normal exit and `signal: <name>` when the
/// process was terminated by a signal, e.g. `signal: killed`. Signals
/// without a known name fall back to their number.
pub fn describe_exit(status: &std::process::ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit status {}", code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            let mut description = match signal_name(signal) {
                Some(name) => format!("signal: {}", name),
                None => format!("signal: {}", signal),
            };
            if status.core_dumped() {
                description.push_str(" (core dumped)");
            }
            return description;
        }
    }

    status.to_string()
}

#[cfg(unix)]
fn signal_name(signal: i32) -> Option<&'static str> {
    use nix::sys::signal::Signal;

    let name = match Signal::try_from(signal).ok()? {
        Signal::SIGHUP => "hangup",
        Signal::SIGINT => "interrupt",
        Signal::SIGQUIT => "quit",
        Signal::SIGILL => "illegal instruction",
        Signal::SIGTRAP => "trace/breakpoint trap",
        Signal::SIGABRT => "aborted",
        Signal::SIGBUS => "bus error",
        Signal::SIGFPE => "floating point exception",
        Signal::SIGKILL => "killed",
        Signal::SIGUSR1 => "user defined signal 1",
        Signal::SIGSEGV => "segmentation fault",
        Signal::SIGUSR2 => "user defined signal 2",
        Signal::SIGPIPE => "broken pipe",
        Signal::SIGALRM => "alarm clock",
        Signal::SIGTERM => "terminated",
        Signal::SIGXCPU => "CPU time limit exceeded",
        Signal::SIGXFSZ => "file size limit exceeded",
        Signal::SIGSYS => "bad system call",
        _ => return None,
    };
    Some(name)
}
