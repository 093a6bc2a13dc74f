//! `code-runner` binary: serves the execution API over HTTP.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use code_runner_rs::server::{self, ServerConfig};
use code_runner_rs::{AdmissionPolicy, CodeRunner, RunnerConfig, StagingMode};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Run code snippets in host toolchains over HTTP")]
struct Cli {
    /// Address to listen on.
    #[clap(long, env = "CODE_RUNNER_BIND", default_value = "0.0.0.0:3300")]
    bind: String,

    /// Directory sources and binaries are staged under (defaults to the system temp dir).
    #[clap(long, env = "CODE_RUNNER_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// "isolated" for a fresh directory per request, "shared" for fixed paths.
    #[clap(long, env = "CODE_RUNNER_STAGING", default_value = "isolated")]
    staging: String,

    /// Kill compile and run steps after this many seconds.
    #[clap(long, env = "CODE_RUNNER_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Maximum number of executions in flight.
    #[clap(long, env = "CODE_RUNNER_MAX_CONCURRENT")]
    max_concurrent: Option<usize>,

    /// Answer 503 instead of queueing when the concurrency limit is reached.
    #[clap(long, env = "CODE_RUNNER_REJECT_WHEN_BUSY")]
    reject_when_busy: bool,

    /// Include compiler output when compilation fails.
    #[clap(long, env = "CODE_RUNNER_COMPILER_DIAGNOSTICS")]
    compiler_diagnostics: bool,

    /// Discard captured output beyond this many bytes.
    #[clap(long, env = "CODE_RUNNER_MAX_OUTPUT_BYTES")]
    max_output_bytes: Option<usize>,

    /// Reject request bodies larger than this many bytes (default: no limit).
    #[clap(long, env = "CODE_RUNNER_MAX_BODY_BYTES")]
    max_body_bytes: Option<usize>,

    /// Log level used when RUST_LOG is not set.
    #[clap(long, short, env = "CODE_RUNNER_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn runner_config(&self) -> Result<RunnerConfig> {
        let staging: StagingMode = self.staging.parse()?;

        let mut builder = RunnerConfig::builder()
            .staging_mode(staging)
            .compiler_diagnostics(self.compiler_diagnostics)
            .admission(if self.reject_when_busy {
                AdmissionPolicy::Reject
            } else {
                AdmissionPolicy::Queue
            });

        if let Some(dir) = &self.temp_dir {
            builder = builder.temp_dir(dir);
        }
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(limit) = self.max_concurrent {
            anyhow::ensure!(limit > 0, "--max-concurrent must be at least 1");
            builder = builder.max_concurrent_runs(limit);
        }
        if let Some(bytes) = self.max_output_bytes {
            builder = builder.max_output_bytes(bytes);
        }

        Ok(builder.build())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut server_config = ServerConfig::default()
        .with_bind_addr_str(&cli.bind)
        .context("invalid --bind")?;
    if let Some(limit) = cli.max_body_bytes {
        server_config = server_config.with_max_body_bytes(limit);
    }
    let runner_config = cli.runner_config()?;

    tracing::info!(
        staging = ?runner_config.staging_mode,
        temp_dir = %runner_config.temp_dir.display(),
        timeout = ?runner_config.timeout,
        max_concurrent = ?runner_config.max_concurrent_runs,
        "starting code runner"
    );

    let runner = CodeRunner::new(runner_config);
    server::serve(server_config, runner).await?;

    Ok(())
}
