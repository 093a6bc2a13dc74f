//! Runner configuration with builder pattern.

use std::path::PathBuf;
use std::time::Duration;

use crate::runner::limits::AdmissionPolicy;
use crate::runner::staging::StagingMode;

/// Configuration for the code runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directory under which sources and binaries are staged.
    pub temp_dir: PathBuf,
    /// Whether staging paths are shared or unique per request.
    pub staging_mode: StagingMode,
    /// Wall-clock limit per compile or run step. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Maximum number of executions in flight. `None` is unbounded.
    pub max_concurrent_runs: Option<usize>,
    /// What to do with a request when all slots are taken.
    pub admission: AdmissionPolicy,
    /// Cap on captured output bytes. `None` keeps everything.
    pub max_output_bytes: Option<usize>,
    /// Include the compiler's own output in compile-failure results.
    pub compiler_diagnostics: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
            staging_mode: StagingMode::Isolated,
            timeout: None,
            max_concurrent_runs: None,
            admission: AdmissionPolicy::Queue,
            max_output_bytes: None,
            compiler_diagnostics: false,
        }
    }
}

impl RunnerConfig {
    /// Create a new builder for RunnerConfig.
    pub fn builder() -> RunnerConfigBuilder {
        RunnerConfigBuilder::default()
    }
}

/// Builder for creating RunnerConfig instances.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfigBuilder {
    temp_dir: Option<PathBuf>,
    staging_mode: Option<StagingMode>,
    timeout: Option<Duration>,
    max_concurrent_runs: Option<usize>,
    admission: Option<AdmissionPolicy>,
    max_output_bytes: Option<usize>,
    compiler_diagnostics: Option<bool>,
}

impl RunnerConfigBuilder {
    /// Set the staging root directory.
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Set the staging mode.
    pub fn staging_mode(mut self, mode: StagingMode) -> Self {
        self.staging_mode = Some(mode);
        self
    }

    /// Set a hard wall-clock limit for each compile and run step.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bound the number of concurrent executions.
    pub fn max_concurrent_runs(mut self, limit: usize) -> Self {
        self.max_concurrent_runs = Some(limit);
        self
    }

    /// Set the admission policy used when the concurrency bound is reached.
    pub fn admission(mut self, policy: AdmissionPolicy) -> Self {
        self.admission = Some(policy);
        self
    }

    /// Cap the number of captured output bytes.
    pub fn max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = Some(bytes);
        self
    }

    /// Report compiler output when compilation fails.
    pub fn compiler_diagnostics(mut self, enabled: bool) -> Self {
        self.compiler_diagnostics = Some(enabled);
        self
    }

    /// Build the RunnerConfig.
    pub fn build(self) -> RunnerConfig {
        let default = RunnerConfig::default();
        RunnerConfig {
            temp_dir: self.temp_dir.unwrap_or(default.temp_dir),
            staging_mode: self.staging_mode.unwrap_or(default.staging_mode),
            timeout: self.timeout.or(default.timeout),
            max_concurrent_runs: self.max_concurrent_runs.or(default.max_concurrent_runs),
            admission: self.admission.unwrap_or(default.admission),
            max_output_bytes: self.max_output_bytes.or(default.max_output_bytes),
            compiler_diagnostics: self
                .compiler_diagnostics
                .unwrap_or(default.compiler_diagnostics),
        }
    }
}
