//! Error types for the execution service.

use serde::Serialize;
use thiserror::Error;

/// Which step of an execution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Build,
    Run,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Build => f.write_str("build"),
            Self::Run => f.write_str("run"),
        }
    }
}

/// Errors that can end an execution.
///
/// Cleanup problems are deliberately absent: they are logged and swallowed
/// by [`crate::workspace::Workspace`] and never reach the caller.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The language tag is not served by this service.
    #[error("Unsupported language")]
    UnsupportedLanguage(String),

    /// Compiler exited non-zero or timed out.
    #[error("{message}")]
    Build { message: String },

    /// Program exited non-zero, could not be started, or timed out.
    #[error("{message}")]
    Run { message: String },

    /// The per-request scratch directory could not be prepared.
    #[error("Failed to prepare workspace: {0}")]
    Workspace(#[from] std::io::Error),
}

impl ExecError {
    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
        }
    }

    pub fn run(message: impl Into<String>) -> Self {
        Self::Run {
            message: message.into(),
        }
    }

    /// Failed step for build/run failures, `None` for everything else.
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Build { .. } => Some(Stage::Build),
            Self::Run { .. } => Some(Stage::Run),
            Self::UnsupportedLanguage(_) | Self::Workspace(_) => None,
        }
    }

    /// HTTP status for this error.
    ///
    /// Build and run failures are domain outcomes and travel as 200.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::UnsupportedLanguage(_) => 400,
            Self::Build { .. } | Self::Run { .. } => 200,
            Self::Workspace(_) => 500,
        }
    }
}
