//! # Config Loader
//!
//! Reads JSON config documents from disk, checks required keys, and writes
//! resolved documents back out in a deploy-ready form.
//!
//! Validation failures are not recoverable: callers propagate
//! [`ConfigError`] to the command boundary, which exits non-zero.

use crate::error::{ConfigError, KeyProblem};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, error};

/// Load a JSON document from `path`.
///
/// # Errors
/// Returns `ConfigError::NotFound` if the file is absent and
/// `ConfigError::Parse` if it is not valid JSON.
pub fn load(path: impl AsRef<Path>) -> Result<Value, ConfigError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let document = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    debug!(path = %path.display(), "Loaded config document");
    Ok(document)
}

/// Check that every key in `keys` is present and non-empty in `document`.
///
/// `null` counts as missing. Empty strings, sequences and mappings count as
/// empty. Numbers and booleans are always accepted.
///
/// # Errors
/// Returns `ConfigError::Invalid` naming the first failing key.
pub fn validate_required(
    document: &Value,
    keys: &[&str],
    config_name: &str,
) -> Result<(), ConfigError> {
    for key in keys {
        let problem = match document.get(key) {
            None | Some(Value::Null) => Some(KeyProblem::Missing),
            Some(value) if is_empty(value) => Some(KeyProblem::Empty),
            Some(_) => None,
        };

        if let Some(problem) = problem {
            error!("Invalid {config_name} config, {key} is {problem}");
            return Err(ConfigError::Invalid {
                config: config_name.to_string(),
                key: (*key).to_string(),
                problem,
            });
        }
    }
    Ok(())
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Null | Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Write `document` to `path` as pretty-printed UTF-8 JSON.
///
/// # Errors
/// Returns `ConfigError::Io` if the file cannot be written.
pub fn write_document(document: &Value, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let mut rendered = serde_json::to_string_pretty(document).map_err(|source| {
        ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })?;
    rendered.push('\n');

    std::fs::write(path, rendered).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    debug!(path = %path.display(), "Wrote deploy document");
    Ok(())
}
