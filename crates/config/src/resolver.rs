//! # Value Resolver
//!
//! Substitutes `${source:key}` placeholders in a JSON document.
//!
//! ## Sources
//!
//! - `tf`: remote state outputs ([`StateOutputs`])
//! - `ssm`: secret parameter store ([`ParameterStore`])
//! - `env`: the explicit [`Environment`] context
//!
//! Resolution is a depth-first rebuild of the document. A string is replaced
//! only when the whole string is a placeholder; everything else passes
//! through untouched. Substituted values are not re-scanned.

use crate::environment::Environment;
use crate::error::ResolveError;
use crate::outputs::StateOutputs;
use crate::parameters::{Credentials, ParameterStore};
use futures::future::{BoxFuture, FutureExt};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::{debug, error, warn};

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\$\{([A-Za-z0-9_]+):([^}]+)\}$").expect("placeholder pattern is valid")
    })
}

/// Backend named by a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Tf,
    Ssm,
    Env,
    Unknown(String),
}

impl From<&str> for Source {
    fn from(name: &str) -> Self {
        match name {
            "tf" => Self::Tf,
            "ssm" => Self::Ssm,
            "env" => Self::Env,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// A parsed `${source:key}` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub source: Source,
    pub key: String,
}

impl Placeholder {
    /// Parse `text` as a placeholder. Returns `None` unless the entire string
    /// matches.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let captures = placeholder_pattern().captures(text)?;
        Some(Self {
            source: Source::from(&captures[1]),
            key: captures[2].to_string(),
        })
    }
}

/// Resolves placeholders against outputs, parameters and environment.
pub struct Resolver<'a> {
    outputs: &'a StateOutputs,
    parameters: &'a dyn ParameterStore,
    env: &'a Environment,
    credentials: Option<&'a Credentials>,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(
        outputs: &'a StateOutputs,
        parameters: &'a dyn ParameterStore,
        env: &'a Environment,
    ) -> Self {
        Self {
            outputs,
            parameters,
            env,
            credentials: None,
        }
    }

    /// Use assumed credentials for `ssm` lookups.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<&'a Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Resolve every placeholder in `value`.
    ///
    /// # Errors
    /// Fails on the first placeholder that cannot be resolved. A missing
    /// `tf` output or `env` variable is a hard error.
    pub async fn resolve(&self, value: &Value) -> Result<Value, ResolveError> {
        self.resolve_value(value).await
    }

    fn resolve_value<'b>(&'b self, value: &'b Value) -> BoxFuture<'b, Result<Value, ResolveError>> {
        async move {
            match value {
                Value::String(text) => self.resolve_string(text).await,
                Value::Array(items) => {
                    let mut resolved = Vec::with_capacity(items.len());
                    for item in items {
                        resolved.push(self.resolve_value(item).await?);
                    }
                    Ok(Value::Array(resolved))
                }
                Value::Object(entries) => {
                    let mut resolved = Map::with_capacity(entries.len());
                    for (key, item) in entries {
                        resolved.insert(key.clone(), self.resolve_value(item).await?);
                    }
                    Ok(Value::Object(resolved))
                }
                Value::Null | Value::Bool(_) | Value::Number(_) => Ok(value.clone()),
            }
        }
        .boxed()
    }

    async fn resolve_string(&self, text: &str) -> Result<Value, ResolveError> {
        let Some(placeholder) = Placeholder::parse(text) else {
            return Ok(Value::String(text.to_string()));
        };
        let key = placeholder.key;

        match placeholder.source {
            Source::Tf => match self.outputs.get(&key) {
                Some(value) => {
                    debug!(key = %key, "Resolved tf placeholder");
                    Ok(value.clone())
                }
                None => {
                    error!("{key} does not exist in TF state");
                    Err(ResolveError::MissingOutputKey(key))
                }
            },
            Source::Ssm => {
                let value = self
                    .parameters
                    .get_parameter(self.credentials, &key)
                    .await
                    .map_err(|source| ResolveError::Parameter {
                        key: key.clone(),
                        source,
                    })?;
                debug!(key = %key, "Resolved ssm placeholder");
                Ok(Value::String(value))
            }
            Source::Env => match self.env.get(&key) {
                Some(value) => Ok(Value::String(value.to_string())),
                None => {
                    error!("{key} environment variable does not exist");
                    Err(ResolveError::MissingEnvKey(key))
                }
            },
            Source::Unknown(source) => {
                warn!(source = %source, "Unknown placeholder source, leaving value unchanged");
                Ok(Value::String(text.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParameterError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StaticParameters {
        values: HashMap<String, String>,
        seen_credentials: Mutex<Vec<Option<String>>>,
    }

    impl StaticParameters {
        fn with(mut self, name: &str, value: &str) -> Self {
            self.values.insert(name.to_string(), value.to_string());
            self
        }
    }

    #[async_trait]
    impl ParameterStore for StaticParameters {
        async fn get_parameter(
            &self,
            credentials: Option<&Credentials>,
            name: &str,
        ) -> Result<String, ParameterError> {
            self.seen_credentials
                .lock()
                .unwrap()
                .push(credentials.map(|c| c.access_key_id.clone()));
            self.values
                .get(name)
                .cloned()
                .ok_or_else(|| ParameterError::CommandFailed {
                    command: "aws ssm".to_string(),
                    stderr: format!("ParameterNotFound: {name}"),
                })
        }
    }

    #[test]
    fn test_placeholder_parse() {
        assert_eq!(
            Placeholder::parse("${ssm:/prenv/db:password}"),
            Some(Placeholder {
                source: Source::Ssm,
                key: "/prenv/db:password".to_string(),
            })
        );
        assert_eq!(
            Placeholder::parse("${custom:thing}").map(|p| p.source),
            Some(Source::Unknown("custom".to_string()))
        );
        assert!(Placeholder::parse("plain").is_none());
        assert!(Placeholder::parse("${env:}").is_none());
        assert!(Placeholder::parse("prefix-${env:FOO}").is_none());
    }

    #[tokio::test]
    async fn test_documents_without_placeholders_are_unchanged() {
        let outputs = StateOutputs::new();
        let params = StaticParameters::default();
        let env = Environment::new();
        let resolver = Resolver::new(&outputs, &params, &env);

        let doc = json!({
            "family": "prenv-web-12",
            "cpu": 256,
            "essential": true,
            "volumes": null,
            "containerDefinitions": [{"name": "web", "portMappings": [{"containerPort": 80}]}],
            "note": "cost ${ about } 5",
        });

        assert_eq!(resolver.resolve(&doc).await.unwrap(), doc);
    }

    #[tokio::test]
    async fn test_env_placeholder() {
        let outputs = StateOutputs::new();
        let params = StaticParameters::default();
        let env = Environment::new().with("FOO", "bar");
        let resolver = Resolver::new(&outputs, &params, &env);

        assert_eq!(resolver.resolve(&json!("${env:FOO}")).await.unwrap(), json!("bar"));

        let err = resolver.resolve(&json!("${env:MISSING}")).await.unwrap_err();
        assert!(matches!(err, ResolveError::MissingEnvKey(ref k) if k == "MISSING"));
    }

    #[tokio::test]
    async fn test_missing_tf_output_is_fatal() {
        // Legacy behavior logged and continued; a miss now fails fast.
        let outputs = StateOutputs::new().with("cluster", "previews");
        let params = StaticParameters::default();
        let env = Environment::new();
        let resolver = Resolver::new(&outputs, &params, &env);

        let doc = json!({"cluster": "${tf:cluster}", "vpc": "${tf:vpc_id}"});
        let err = resolver.resolve(&doc).await.unwrap_err();
        assert!(matches!(err, ResolveError::MissingOutputKey(ref k) if k == "vpc_id"));
    }

    #[tokio::test]
    async fn test_tf_output_can_be_a_list() {
        let outputs = StateOutputs::new().with("subnets", json!(["subnet-a", "subnet-b"]));
        let params = StaticParameters::default();
        let env = Environment::new();
        let resolver = Resolver::new(&outputs, &params, &env);

        let resolved = resolver
            .resolve(&json!({"subnet_ids": "${tf:subnets}"}))
            .await
            .unwrap();
        assert_eq!(resolved, json!({"subnet_ids": ["subnet-a", "subnet-b"]}));
    }

    #[tokio::test]
    async fn test_ssm_uses_assumed_credentials() {
        let outputs = StateOutputs::new();
        let params = StaticParameters::default().with("/db/password", "s3cret");
        let env = Environment::new();
        let creds = Credentials {
            access_key_id: "ASIAROLE".to_string(),
            secret_access_key: "x".to_string(),
            session_token: "y".to_string(),
        };

        let ambient = Resolver::new(&outputs, &params, &env);
        assert_eq!(
            ambient.resolve(&json!("${ssm:/db/password}")).await.unwrap(),
            json!("s3cret")
        );

        let assumed = Resolver::new(&outputs, &params, &env).with_credentials(Some(&creds));
        assumed.resolve(&json!("${ssm:/db/password}")).await.unwrap();

        let seen = params.seen_credentials.lock().unwrap().clone();
        assert_eq!(seen, vec![None, Some("ASIAROLE".to_string())]);
    }

    #[tokio::test]
    async fn test_ssm_failure_names_key() {
        let outputs = StateOutputs::new();
        let params = StaticParameters::default();
        let env = Environment::new();
        let resolver = Resolver::new(&outputs, &params, &env);

        let err = resolver.resolve(&json!(["${ssm:/absent}"])).await.unwrap_err();
        assert!(matches!(err, ResolveError::Parameter { ref key, .. } if key == "/absent"));
    }

    #[tokio::test]
    async fn test_shape_is_preserved() {
        let outputs = StateOutputs::new().with("image", "repo/web:abc");
        let params = StaticParameters::default();
        let env = Environment::new().with("PRENV_PR", "42");
        let resolver = Resolver::new(&outputs, &params, &env);

        let doc = json!({
            "containers": ["${tf:image}", "sidecar", 3, "${env:PRENV_PR}"],
            "tags": {"pr": "${env:PRENV_PR}", "owner": "prenv"},
        });

        let resolved = resolver.resolve(&doc).await.unwrap();
        assert_eq!(
            resolved,
            json!({
                "containers": ["repo/web:abc", "sidecar", 3, "42"],
                "tags": {"pr": "42", "owner": "prenv"},
            })
        );
    }

    #[tokio::test]
    async fn test_substitution_is_single_pass() {
        let outputs = StateOutputs::new();
        let params = StaticParameters::default();
        let env = Environment::new()
            .with("OUTER", "${env:INNER}")
            .with("INNER", "deep");
        let resolver = Resolver::new(&outputs, &params, &env);

        assert_eq!(
            resolver.resolve(&json!("${env:OUTER}")).await.unwrap(),
            json!("${env:INNER}")
        );
    }

    #[tokio::test]
    async fn test_unknown_source_passes_through() {
        let outputs = StateOutputs::new();
        let params = StaticParameters::default();
        let env = Environment::new();
        let resolver = Resolver::new(&outputs, &params, &env);

        assert_eq!(
            resolver.resolve(&json!("${vault:db}")).await.unwrap(),
            json!("${vault:db}")
        );
    }
}
