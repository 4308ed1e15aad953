//! # Secret Parameter Store
//!
//! `${ssm:...}` placeholders are fetched through the [`ParameterStore`]
//! trait. The production store drives the `aws` CLI, optionally with
//! credentials obtained from [`assume_role`].

use crate::error::ParameterError;
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Session name used when assuming a role.
pub const ROLE_SESSION_NAME: &str = "PrenvSession";

/// Temporary AWS credentials returned by STS.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// Source of secret parameters.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Fetch a decrypted parameter value.
    ///
    /// Uses `credentials` when given, ambient credentials otherwise.
    async fn get_parameter(
        &self,
        credentials: Option<&Credentials>,
        name: &str,
    ) -> Result<String, ParameterError>;
}

/// Parameter store backed by `aws ssm get-parameter`.
#[derive(Debug, Clone, Default)]
pub struct AwsCliParameterStore;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetParameterResponse {
    parameter: ParameterValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParameterValue {
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResponse {
    credentials: Credentials,
}

#[async_trait]
impl ParameterStore for AwsCliParameterStore {
    #[instrument(skip(self, credentials), fields(assumed = credentials.is_some()))]
    async fn get_parameter(
        &self,
        credentials: Option<&Credentials>,
        name: &str,
    ) -> Result<String, ParameterError> {
        let stdout = run_aws(
            &[
                "ssm",
                "get-parameter",
                "--name",
                name,
                "--with-decryption",
                "--output",
                "json",
            ],
            credentials,
        )
        .await?;

        let value = parse_parameter(&stdout)?;
        debug!(name, "Fetched parameter");
        Ok(value)
    }
}

fn parse_parameter(stdout: &str) -> Result<String, ParameterError> {
    let response: GetParameterResponse =
        serde_json::from_str(stdout).map_err(|source| ParameterError::Decode {
            command: "aws ssm get-parameter".to_string(),
            source,
        })?;
    Ok(response.parameter.value)
}

/// Assume `role_arn` and return its temporary credentials.
///
/// # Errors
/// Returns `ParameterError` if the STS call fails or returns an unexpected
/// document.
#[instrument]
pub async fn assume_role(role_arn: &str) -> Result<Credentials, ParameterError> {
    info!("Assuming AWS role");
    let stdout = run_aws(
        &[
            "sts",
            "assume-role",
            "--role-arn",
            role_arn,
            "--role-session-name",
            ROLE_SESSION_NAME,
            "--output",
            "json",
        ],
        None,
    )
    .await?;

    parse_assume_role(&stdout)
}

fn parse_assume_role(stdout: &str) -> Result<Credentials, ParameterError> {
    let response: AssumeRoleResponse =
        serde_json::from_str(stdout).map_err(|source| ParameterError::Decode {
            command: "aws sts assume-role".to_string(),
            source,
        })?;
    Ok(response.credentials)
}

/// Run the `aws` CLI and return its stdout.
pub(crate) async fn run_aws(
    args: &[&str],
    credentials: Option<&Credentials>,
) -> Result<String, ParameterError> {
    let command = format!("aws {}", args.iter().take(2).copied().collect::<Vec<_>>().join(" "));

    let mut cmd = Command::new("aws");
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
    if let Some(creds) = credentials {
        cmd.env("AWS_ACCESS_KEY_ID", &creds.access_key_id)
            .env("AWS_SECRET_ACCESS_KEY", &creds.secret_access_key)
            .env("AWS_SESSION_TOKEN", &creds.session_token);
    }

    let output = cmd.output().await.map_err(|source| ParameterError::Spawn {
        command: command.clone(),
        source,
    })?;

    if !output.status.success() {
        return Err(ParameterError::CommandFailed {
            command,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
