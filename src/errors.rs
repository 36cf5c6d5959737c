//! Typed error hierarchy for platgen.
//!
//! Every pipeline step fails with a `TaskError`. The dispatcher is the only
//! place that decides whether an error gets printed: usage errors have already
//! shown the command help, everything else is printed once with an `Error:`
//! prefix.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::core::{config::ConfigError, template::TemplateError};
use crate::system::executor::ExecutionError;

#[derive(Debug, Error)]
pub enum TaskError {
    /// The command already printed its own help text.
    #[error("Invalid usage of '{command}': {reason}")]
    Usage { command: String, reason: String },

    #[error("Missing required executables: {}. Install them and make sure they are on PATH.", .0.join(", "))]
    MissingDependencies(Vec<String>),

    #[error(
        "Could not find the platform root within {hops} parent directories of '{}'. Run this command from inside a platform checkout.",
        .start.display()
    )]
    RootNotFound { start: PathBuf, hops: usize },

    #[error("Stack '{stack}' process exited before it was ready ({})", describe_exit(.code, .signal))]
    StackExited {
        stack: String,
        code: Option<i32>,
        signal: Option<i32>,
    },

    #[error("Stack '{stack}' was not ready after {}s", .timeout.as_secs_f64())]
    StackTimeout { stack: String, timeout: Duration },

    #[error("Stack '{0}' operation was cancelled.")]
    StackCancelled(String),

    #[error("Another operation on stack '{0}' is already running.")]
    StackBusy(String),

    #[error("Tag '{tag}' not found in '{}'", .file.display())]
    TagNotFound { file: PathBuf, tag: String },

    #[error("Filesystem error at '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskError {
    /// Builds an `Io` error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn usage(command: &str, reason: impl Into<String>) -> Self {
        Self::Usage {
            command: command.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the error was already presented to the user.
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Usage { .. })
    }

    /// True when a subprocess was interrupted by the user (Ctrl+C).
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::Interrupted(_)))
            || matches!(self, Self::StackCancelled(_))
    }
}

fn describe_exit(code: &Option<i32>, signal: &Option<i32>) -> String {
    match (*code, *signal) {
        (Some(code), _) => format!("exit code {code}"),
        (None, Some(signal)) => format!("killed by signal {signal}"),
        (None, None) => "unknown exit status".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_errors_are_handled() {
        assert!(TaskError::usage("service", "missing subcommand").is_handled());
        assert!(!TaskError::StackBusy("dev".into()).is_handled());
    }

    #[test]
    fn exit_description_prefers_code() {
        let err = TaskError::StackExited {
            stack: "dev".into(),
            code: Some(2),
            signal: None,
        };
        assert!(err.to_string().contains("exit code 2"));

        let err = TaskError::StackExited {
            stack: "dev".into(),
            code: None,
            signal: Some(15),
        };
        assert!(err.to_string().contains("signal 15"));
    }
}
