//! # Code Runner
//!
//! Runs a snippet of source code in a host toolchain and returns what it
//! printed.
//!
//! A submission is a language identifier plus source text. The runner looks
//! the language up in a closed [`LanguageRegistry`], writes the source to a
//! staging file, compiles it if the language needs that, runs it, and returns
//! the merged stdout/stderr of the program:
//!
//! | language | staged as  | invocation                                |
//! |----------|------------|-------------------------------------------|
//! | `python` | `code.py`  | `python3 code.py`                         |
//! | `node`   | `code.js`  | `node code.js`                            |
//! | `go`     | `code.go`  | `go run code.go`                          |
//! | `cpp`    | `code.cpp` | `g++ code.cpp -o program`, then `program` |
//!
//! The [`server`] module exposes this over HTTP (`POST /run`).
//!
//! ## Example
//!
//! ```rust,ignore
//! use code_runner_rs::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = RunnerConfig::builder()
//!         .timeout(Duration::from_secs(10))
//!         .max_concurrent_runs(8)
//!         .build();
//!
//!     let runner = CodeRunner::new(config);
//!     let result = runner.run("python", "print('hi')").await?;
//!
//!     assert_eq!(result.output, "hi\n");
//!     assert!(result.is_success());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Isolation
//!
//! There is none beyond what is configured. Submissions run as the server's
//! user with full access to the host. [`StagingMode::Isolated`] only keeps
//! concurrent submissions from clobbering each other's files; the optional
//! timeout and concurrency bound only limit wall-clock time and process count.
//! Do not expose this to untrusted users without an external sandbox.

pub mod error;
pub mod prelude;
pub mod runner;
pub mod server;

// Re-export main types at crate root for convenience
pub use error::{Result, RunnerError};
pub use runner::config::{RunnerConfig, RunnerConfigBuilder};
pub use runner::executor::{CodeRunner, ExecutionMetadata, ExecutionResult, FailureStage};
pub use runner::language::{global_registry, Arg, CommandTemplate, LanguageProfile, LanguageRegistry, RunPlan};
pub use runner::limits::AdmissionPolicy;
pub use runner::staging::StagingMode;
pub use server::ServerConfig;
