//! Language dispatch: maps a language identifier to its staging extension
//! and toolchain invocation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use tokio::process::Command;

/// One argument of a toolchain invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// A fixed argument passed through as-is.
    Literal(String),
    /// The path of the staged source file.
    Source,
    /// The path of the compiled output binary.
    Binary,
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Literal(value.to_string())
    }
}

/// A program plus arguments, rendered against concrete staging paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<Arg>,
}

impl CommandTemplate {
    /// Create a template for `program` with the given arguments.
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = Arg>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().collect(),
        }
    }

    /// The program that will be spawned.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The argument templates.
    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// Render the argument list against concrete paths.
    pub fn render_args(&self, source: &Path, binary: &Path) -> Vec<std::ffi::OsString> {
        self.args
            .iter()
            .map(|arg| match arg {
                Arg::Literal(s) => s.into(),
                Arg::Source => source.as_os_str().to_owned(),
                Arg::Binary => binary.as_os_str().to_owned(),
            })
            .collect()
    }

    /// Build a `tokio` command for this template.
    pub fn command(&self, source: &Path, binary: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command.args(self.render_args(source, binary));
        command
    }
}

/// How a staged source file is turned into a running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPlan {
    /// Hand the source file straight to an interpreter or toolchain runner.
    Interpret(CommandTemplate),
    /// Compile to the output binary first, then execute the binary.
    CompileThenRun {
        /// The compiler invocation.
        compile: CommandTemplate,
    },
}

impl RunPlan {
    /// Whether this plan has a compile step.
    pub fn is_compiled(&self) -> bool {
        matches!(self, RunPlan::CompileThenRun { .. })
    }
}

/// Staging extension and run plan for one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageProfile {
    /// Extension (without the dot) the source is staged under.
    pub extension: String,
    /// How the staged source is executed.
    pub run_plan: RunPlan,
}

impl LanguageProfile {
    /// A profile that runs `program [args..] <source>`.
    pub fn interpreted(
        extension: impl Into<String>,
        program: impl Into<String>,
        args: impl IntoIterator<Item = Arg>,
    ) -> Self {
        Self {
            extension: extension.into(),
            run_plan: RunPlan::Interpret(CommandTemplate::new(program, args)),
        }
    }

    /// A profile that compiles with `compile`, then runs the output binary.
    pub fn compiled(extension: impl Into<String>, compile: CommandTemplate) -> Self {
        Self {
            extension: extension.into(),
            run_plan: RunPlan::CompileThenRun { compile },
        }
    }
}

/// A closed, read-only table of supported languages.
///
/// Lookups are exact string matches: no trimming, case folding or aliasing.
#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    profiles: HashMap<String, LanguageProfile>,
}

impl LanguageRegistry {
    /// Create a registry with no languages.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in table: python, node, go and cpp.
    pub fn builtin() -> Self {
        Self::empty()
            .with_language(
                "python",
                LanguageProfile::interpreted("py", "python3", [Arg::Source]),
            )
            .with_language(
                "node",
                LanguageProfile::interpreted("js", "node", [Arg::Source]),
            )
            .with_language(
                "go",
                LanguageProfile::interpreted("go", "go", [Arg::from("run"), Arg::Source]),
            )
            .with_language(
                "cpp",
                LanguageProfile::compiled(
                    "cpp",
                    CommandTemplate::new(
                        "g++",
                        [Arg::Source, Arg::from("-o"), Arg::Binary],
                    ),
                ),
            )
    }

    /// Add (or replace) a language entry.
    pub fn with_language(mut self, id: impl Into<String>, profile: LanguageProfile) -> Self {
        self.profiles.insert(id.into(), profile);
        self
    }

    /// Look up a language by its exact identifier.
    pub fn resolve(&self, id: &str) -> Option<&LanguageProfile> {
        self.profiles.get(id)
    }

    /// Check whether an identifier is supported.
    pub fn contains(&self, id: &str) -> bool {
        self.profiles.contains_key(id)
    }

    /// Supported identifiers in sorted order.
    pub fn languages(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered languages.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

static GLOBAL_REGISTRY: LazyLock<Arc<LanguageRegistry>> =
    LazyLock::new(|| Arc::new(LanguageRegistry::builtin()));

/// The process-wide built-in registry, constructed once on first use.
pub fn global_registry() -> Arc<LanguageRegistry> {
    Arc::clone(&GLOBAL_REGISTRY)
}
