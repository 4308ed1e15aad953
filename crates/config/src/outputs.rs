//! Remote state outputs consumed by `${tf:...}` placeholders.

use crate::error::{ConfigError, ParameterError};
use crate::parameters::run_aws;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Materialized output values from a Terraform state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateOutputs {
    values: BTreeMap<String, Value>,
}

impl StateOutputs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for tests.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Extract outputs from a state document.
    ///
    /// Accepts a full state file (`{"outputs": {"k": {"value": ..}}}`) or the
    /// output of `terraform output -json` (`{"k": {"value": ..}}`). Entries
    /// without a `value` field are taken verbatim.
    ///
    /// # Errors
    /// Returns `ConfigError::Malformed` if the outputs are not a mapping.
    pub fn from_document(document: &Value) -> Result<Self, ConfigError> {
        let outputs = match document.get("outputs") {
            Some(outputs) => outputs,
            None => document,
        };

        let Value::Object(entries) = outputs else {
            return Err(ConfigError::Malformed {
                config: "tfstate".to_string(),
                message: "outputs must be a mapping".to_string(),
            });
        };

        let values = entries
            .iter()
            .map(|(name, entry)| {
                let value = entry.get("value").unwrap_or(entry).clone();
                (name.clone(), value)
            })
            .collect();

        Ok(Self { values })
    }

    /// Load outputs from a local state file or an `s3://` URI.
    ///
    /// # Errors
    /// Returns `ConfigError` if the state cannot be read or parsed.
    pub async fn fetch(location: &str) -> Result<Self, ConfigError> {
        let document = if location.starts_with("s3://") {
            let raw = run_aws(&["s3", "cp", location, "-"], None)
                .await
                .map_err(|e| state_io_error(location, e))?;
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: location.into(),
                source,
            })?
        } else {
            crate::loader::load(Path::new(location))?
        };

        let outputs = Self::from_document(&document)?;
        info!(location, count = outputs.len(), "Loaded remote state outputs");
        Ok(outputs)
    }
}

fn state_io_error(location: &str, err: ParameterError) -> ConfigError {
    ConfigError::Io {
        path: location.into(),
        source: std::io::Error::other(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_file_shape() {
        let state = json!({
            "version": 4,
            "outputs": {
                "cluster_name": {"value": "previews", "type": "string"},
                "subnet_ids": {"value": ["subnet-a", "subnet-b"], "type": ["list", "string"]},
            }
        });

        let outputs = StateOutputs::from_document(&state).unwrap();
        assert_eq!(outputs.get("cluster_name"), Some(&json!("previews")));
        assert_eq!(outputs.get("subnet_ids"), Some(&json!(["subnet-a", "subnet-b"])));
    }

    #[test]
    fn test_output_json_shape() {
        let doc = json!({"db_host": {"sensitive": false, "value": "db.internal"}});
        let outputs = StateOutputs::from_document(&doc).unwrap();
        assert_eq!(outputs.get("db_host"), Some(&json!("db.internal")));
    }

    #[test]
    fn test_outputs_must_be_mapping() {
        let err = StateOutputs::from_document(&json!({"outputs": []})).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_fetch_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terraform.tfstate");
        std::fs::write(&path, r#"{"outputs": {"vpc": {"value": "vpc-1"}}}"#).unwrap();

        let outputs = StateOutputs::fetch(path.to_str().unwrap()).await.unwrap();
        assert_eq!(outputs.get("vpc"), Some(&json!("vpc-1")));
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let err = StateOutputs::fetch("/nonexistent/terraform.tfstate").await.unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
