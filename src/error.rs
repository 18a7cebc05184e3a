//! Error types shared across the crate.
//!
//! Remote-command failures are typed separately from plain I/O failures so that callers can
//! tell a refused connection or a failing `rm -rf` apart from a local disk problem.

use std::path::PathBuf;

/// Failure of the remote-execution layer.
///
/// `Clone` because one process outcome is handed to every concurrent waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("could not connect to {host}: {reason}")]
    Connect { host: String, reason: String },
    #[error("authentication of {username}@{host} failed: {reason}")]
    Authentication {
        host: String,
        username: String,
        reason: String,
    },
    #[error("host key of {host} could not be verified: {reason}")]
    HostKey { host: String, reason: String },
    #[error("{context}: {reason}")]
    Session { context: String, reason: String },
    #[error("`{command}` exited with status {code}")]
    NonZeroExit { command: String, code: i32 },
    #[error("process was destroyed before it completed")]
    Destroyed,
    #[error("teardown step `{step}` failed: {reason}")]
    Teardown { step: &'static str, reason: String },
}

impl CommandError {
    pub(crate) fn session(context: impl Into<String>, reason: impl ToString) -> Self {
        CommandError::Session {
            context: context.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failure of an [`Environment`](crate::test_environment::Environment) operation.
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("path `{path}` resolves outside of the environment's home directory")]
    PathOutsideHome { path: String },
    #[error("destination `{}` exists and is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("command is empty")]
    EmptyCommand,
    #[error("property `{0}` is not present")]
    NoSuchProperty(String),
    #[error("property `{key}` does not hold a value of type {expected}")]
    PropertyType { key: String, expected: &'static str },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Failure while creating a batch of environments.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("invalid environment configuration: {0}")]
    InvalidConfig(String),
    #[error("could not resolve host `{host}`")]
    UnresolvableHost {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure of `prepare` or `restore`.
#[derive(Debug, thiserror::Error)]
pub enum PreparationError {
    #[error("could not prepare environment {env_id}")]
    Environment {
        env_id: usize,
        #[source]
        source: EnvironmentError,
    },
    #[error("invalid preparation: {0}")]
    Configuration(String),
}

/// Failure of an [`App`](crate::app::App) lifecycle call.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("application has not been started")]
    NotStarted,
    #[error("application is already running")]
    AlreadyRunning,
    #[error("could not expand command template: {0}")]
    Template(String),
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
    #[error(transparent)]
    Command(#[from] CommandError),
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("runner dependency `{0}` was not set")]
    MissingDependency(&'static str),
    #[error("runner has no test scripts")]
    NoScripts,
}
