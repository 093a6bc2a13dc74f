//! Prelude module for convenient imports.

pub use crate::error::{Result, RunnerError};
pub use crate::runner::{
    config::RunnerConfig,
    executor::{CodeRunner, ExecutionResult, FailureStage},
    language::{LanguageProfile, LanguageRegistry},
    staging::StagingMode,
};
