//! Typed ECS and DNS configuration (`ecs_config.json`).

use crate::error::ConfigError;
use crate::loader::validate_required;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const REQUIRED_KEYS: &[&str] = &["subnet_ids", "security_groups", "cluster", "platform"];
const DNS_KEYS: &[&str] = &["hosted_zone", "domain"];

/// Whether the task is given a public IP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PublicIp {
    Enabled,
    #[default]
    Disabled,
}

/// Route53 settings for the preview hostname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsConfig {
    pub hosted_zone: String,
    pub domain: String,
}

/// Validated compute configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcsConfig {
    pub subnet_ids: Vec<String>,
    pub security_groups: Vec<String>,
    pub cluster: String,
    pub platform: String,
    #[serde(default)]
    pub public_ip: PublicIp,
    #[serde(default)]
    pub dns: Option<DnsConfig>,
}

impl EcsConfig {
    /// Validate and convert a resolved `ecs_config.json` document.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if a required key is missing or empty,
    /// and `ConfigError::Malformed` if a value has the wrong type.
    pub fn from_document(document: &Value) -> Result<Self, ConfigError> {
        validate_required(document, REQUIRED_KEYS, "ecs")?;
        if let Some(dns) = document.get("dns").filter(|v| !v.is_null()) {
            validate_required(document, &["dns"], "dns")?;
            validate_required(dns, DNS_KEYS, "dns")?;
        }

        serde_json::from_value(document.clone()).map_err(|e| ConfigError::Malformed {
            config: "ecs".to_string(),
            message: e.to_string(),
        })
    }

    /// Fully-qualified preview hostname, if DNS is configured.
    #[must_use]
    pub fn dns_name(&self, stack_name: &str) -> Option<String> {
        self.dns
            .as_ref()
            .map(|dns| format!("{stack_name}.{}", dns.domain))
    }
}

/// Stack name for a pull request: `<repo><pr>` unless overridden by
/// `<override><pr>`.
#[must_use]
pub fn stack_name(repo: &str, pr: u64, name_override: Option<&str>) -> String {
    format!("{}{pr}", name_override.unwrap_or(repo))
}

/// Task definition family for a pull request.
#[must_use]
pub fn task_family(repo: &str, pr: u64) -> String {
    format!("prenv-{repo}-{pr}")
}
