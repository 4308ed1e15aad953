//! Per-invocation resolution context.

use anyhow::{Context as _, Result};
use prenv_config::{
    assume_role, loader, AwsCliParameterStore, Credentials, Environment, Resolver, StateOutputs,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

pub const ECS_CONFIG: &str = "ecs_config.json";
pub const TASK_DEFINITION_CONFIG: &str = "task_definition.json";
pub const DATABASE_CONFIG: &str = "database_config.json";
pub const DEPLOYMENT_CONFIG: &str = "deployment_config.json";

/// Everything placeholder resolution needs, gathered once per command.
pub struct Context {
    pub config_dir: PathBuf,
    pub env: Environment,
    outputs: StateOutputs,
    credentials: Option<Credentials>,
    parameters: AwsCliParameterStore,
}

impl Context {
    /// Fetch state outputs and assume the parameter role, if configured.
    pub async fn build(
        config_dir: &Path,
        tfstate: Option<&str>,
        ssm_role: Option<&str>,
        env: Environment,
    ) -> Result<Self> {
        let outputs = match tfstate {
            Some(location) => StateOutputs::fetch(location)
                .await
                .with_context(|| format!("Failed to load remote state from {location}"))?,
            None => StateOutputs::new(),
        };

        let credentials = match ssm_role {
            Some(role) => Some(
                assume_role(role)
                    .await
                    .with_context(|| format!("Failed to assume role {role}"))?,
            ),
            None => None,
        };

        Ok(Self {
            config_dir: config_dir.to_path_buf(),
            env,
            outputs,
            credentials,
            parameters: AwsCliParameterStore,
        })
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.config_dir.join(file)
    }

    /// Load and resolve a config file from the config directory.
    pub async fn load_resolved(&self, file: &str) -> Result<Value> {
        let path = self.path(file);
        let raw = loader::load(&path)?;
        self.resolve(&raw)
            .await
            .with_context(|| format!("Failed to resolve placeholders in {}", path.display()))
    }

    /// Like [`Context::load_resolved`], but `None` when the file is absent.
    pub async fn load_optional(&self, file: &str) -> Result<Option<Value>> {
        if !self.path(file).is_file() {
            info!("{file} is not available, skipping");
            return Ok(None);
        }
        self.load_resolved(file).await.map(Some)
    }

    pub async fn resolve(&self, value: &Value) -> Result<Value> {
        let resolved = Resolver::new(&self.outputs, &self.parameters, &self.env)
            .with_credentials(self.credentials.as_ref())
            .resolve(value)
            .await?;
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_load_resolved_uses_environment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(TASK_DEFINITION_CONFIG),
            r#"{"family": "${env:PRENV_TASK_FAMILY}", "cpu": "256"}"#,
        )
        .unwrap();

        let env = Environment::new().with("PRENV_TASK_FAMILY", "prenv-web-3");
        let ctx = Context::build(dir.path(), None, None, env).await.unwrap();

        let resolved = ctx.load_resolved(TASK_DEFINITION_CONFIG).await.unwrap();
        assert_eq!(resolved, json!({"family": "prenv-web-3", "cpu": "256"}));
    }

    #[tokio::test]
    async fn test_load_optional_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::build(dir.path(), None, None, Environment::new())
            .await
            .unwrap();
        assert!(ctx.load_optional(DATABASE_CONFIG).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tfstate_outputs_are_visible() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("terraform.tfstate");
        std::fs::write(&state, r#"{"outputs": {"cluster": {"value": "previews"}}}"#).unwrap();
        std::fs::write(dir.path().join(ECS_CONFIG), r#"{"cluster": "${tf:cluster}"}"#).unwrap();

        let ctx = Context::build(dir.path(), state.to_str(), None, Environment::new())
            .await
            .unwrap();
        let resolved = ctx.load_resolved(ECS_CONFIG).await.unwrap();
        assert_eq!(resolved, json!({"cluster": "previews"}));
    }
}
