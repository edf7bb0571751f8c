//! Supported languages and their static runner configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExecError;

/// Every language the editor knows about.
///
/// Only [`Language::SERVER_SIDE`] languages are executed by the service;
/// JavaScript is evaluated locally by [`crate::local`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Java,
    Cpp,
    JavaScript,
}

impl Language {
    /// Languages accepted by `POST /execute`.
    pub const SERVER_SIDE: [Self; 3] = [Self::Python, Self::Java, Self::Cpp];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Java => "java",
            Self::Cpp => "cpp",
            Self::JavaScript => "javascript",
        }
    }

    /// Parse a tag accepted by the execution service.
    ///
    /// Client-only languages are rejected the same way unknown tags are.
    pub fn parse_server_side(tag: &str) -> Result<Self, ExecError> {
        let language: Self = tag.parse()?;
        if Self::SERVER_SIDE.contains(&language) {
            Ok(language)
        } else {
            Err(ExecError::UnsupportedLanguage(tag.to_string()))
        }
    }

    /// Built-in runner configuration, `None` for client-only languages.
    pub fn default_spec(self) -> Option<RunnerSpec> {
        match self {
            Self::Python => Some(RunnerSpec::python()),
            Self::Java => Some(RunnerSpec::java()),
            Self::Cpp => Some(RunnerSpec::cpp()),
            Self::JavaScript => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(Self::Python),
            "java" => Ok(Self::Java),
            "cpp" => Ok(Self::Cpp),
            "javascript" => Ok(Self::JavaScript),
            other => Err(ExecError::UnsupportedLanguage(other.to_string())),
        }
    }
}

pub const DEFAULT_BUILD_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RUN_TIMEOUT_MS: u64 = 5_000;
/// Per-stream capture limit for one step.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// How the source artifact gets its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingRule {
    /// Time-derived token, independent of the source.
    UniqueToken,
    /// Named after the type declared in the source (JVM rule).
    DeclaredType,
}

/// Static per-language configuration.
#[derive(Debug, Clone)]
pub struct RunnerSpec {
    pub extension: &'static str,
    pub naming: NamingRule,
    pub build: Option<CommandTemplate>,
    pub run: CommandTemplate,
    pub build_timeout: Duration,
    pub run_timeout: Duration,
    /// Bytes a step may write to stdout, and separately to stderr.
    pub max_output: usize,
}

impl RunnerSpec {
    /// `python3 <file>`.
    pub fn python() -> Self {
        Self {
            extension: "py",
            naming: NamingRule::UniqueToken,
            build: None,
            run: CommandTemplate::new(["python3", "{source}"]),
            build_timeout: Duration::from_millis(DEFAULT_BUILD_TIMEOUT_MS),
            run_timeout: Duration::from_millis(DEFAULT_RUN_TIMEOUT_MS),
            max_output: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// `javac <Class>.java`, then `java -cp <dir> <Class>`.
    pub fn java() -> Self {
        Self {
            extension: "java",
            naming: NamingRule::DeclaredType,
            build: Some(CommandTemplate::new(["javac", "{source}"])),
            run: CommandTemplate::new(["java", "-cp", "{dir}", "{name}"]),
            build_timeout: Duration::from_millis(DEFAULT_BUILD_TIMEOUT_MS),
            run_timeout: Duration::from_millis(DEFAULT_RUN_TIMEOUT_MS),
            max_output: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// C++17 with warnings, executed directly.
    pub fn cpp() -> Self {
        Self {
            extension: "cpp",
            naming: NamingRule::UniqueToken,
            build: Some(CommandTemplate::new([
                "g++",
                "-std=c++17",
                "-Wall",
                "{source}",
                "-o",
                "{binary}",
            ])),
            run: CommandTemplate::new(["{binary}"]),
            build_timeout: Duration::from_millis(DEFAULT_BUILD_TIMEOUT_MS),
            run_timeout: Duration::from_millis(DEFAULT_RUN_TIMEOUT_MS),
            max_output: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// Apply user overrides on top of this spec.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &SpecOverride) -> Self {
        if let Some(build) = &overrides.build {
            self.build = Some(CommandTemplate(build.clone()));
        }
        if let Some(run) = &overrides.run {
            self.run = CommandTemplate(run.clone());
        }
        if let Some(ms) = overrides.build_timeout_ms {
            self.build_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = overrides.run_timeout_ms {
            self.run_timeout = Duration::from_millis(ms);
        }
        if let Some(bytes) = overrides.max_output_bytes {
            self.max_output = bytes;
        }
        self
    }
}

/// Per-language overrides read from configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpecOverride {
    #[serde(default)]
    pub build: Option<Vec<String>>,
    #[serde(default)]
    pub run: Option<Vec<String>>,
    #[serde(default)]
    pub build_timeout_ms: Option<u64>,
    #[serde(default)]
    pub run_timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_output_bytes: Option<usize>,
}

/// Values substituted into a [`CommandTemplate`].
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    /// Absolute path of the source artifact.
    pub source: String,
    /// Absolute path of the compiled output.
    pub binary: String,
    /// Workspace directory.
    pub dir: String,
    /// Artifact stem (class name for the JVM).
    pub name: String,
}

/// Argument vector with `{source}`, `{binary}`, `{dir}` and `{name}`
/// placeholders. The first element is the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate(pub Vec<String>);

impl CommandTemplate {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(args.into_iter().map(Into::into).collect())
    }

    pub fn render(&self, vars: &TemplateVars) -> Vec<String> {
        self.0
            .iter()
            .map(|arg| {
                arg.replace("{source}", &vars.source)
                    .replace("{binary}", &vars.binary)
                    .replace("{dir}", &vars.dir)
                    .replace("{name}", &vars.name)
            })
            .collect()
    }
}
