//! Error types for configuration loading and placeholder resolution.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading or validating a config document.
///
/// Every variant is fatal to the command that loaded the document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file does not exist
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Config file could not be read or written
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON
    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Required key is absent or empty
    #[error("Invalid {config} config, {key} is {problem}")]
    Invalid {
        config: String,
        key: String,
        problem: KeyProblem,
    },

    /// Document has the right keys but the wrong shape
    #[error("Invalid {config} config: {message}")]
    Malformed { config: String, message: String },
}

/// Why a required key failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyProblem {
    Missing,
    Empty,
}

impl std::fmt::Display for KeyProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "not defined"),
            Self::Empty => write!(f, "empty"),
        }
    }
}

/// Errors raised by the secret parameter store.
#[derive(Debug, Error)]
pub enum ParameterError {
    /// The backing command could not be spawned
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The backing command exited unsuccessfully
    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// The command output could not be decoded
    #[error("Unexpected response from {command}: {source}")]
    Decode {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while resolving `${source:key}` placeholders.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// `${tf:key}` names an output the state does not have
    #[error("{0} does not exist in remote state outputs")]
    MissingOutputKey(String),

    /// `${env:key}` names an unset variable
    #[error("{0} environment variable does not exist")]
    MissingEnvKey(String),

    /// `${ssm:key}` could not be fetched
    #[error("Failed to fetch parameter {key}: {source}")]
    Parameter {
        key: String,
        #[source]
        source: ParameterError,
    },
}
