//! Error types for the label store and the lease allocator.

use prenv_config::ConfigError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a [`LabelStore`](crate::store::LabelStore).
#[derive(Debug, Error)]
pub enum LabelStoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Rate limit exceeded, reset in {reset_in:?}")]
    RateLimitExceeded { reset_in: Duration },

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// More than one managed label on one item. Operator error, not transient.
    #[error("Multiple database labels are attached to item #{item}: {}", labels.join(", "))]
    MultipleLabelsAttached { item: u64, labels: Vec<String> },

    #[error("Item #{0} not found")]
    ItemNotFound(u64),
}

/// Errors raised while allocating or releasing a database lease.
///
/// All of these abort the enclosing command; none are retried.
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error(transparent)]
    Store(#[from] LabelStoreError),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    /// The item's label names a database that is not in the catalog
    #[error("Attached label database {0} is not available in the config")]
    UnknownDatabaseLabel(String),

    /// A non-shareable database is attached to more than one open item
    #[error(
        "Attached label database {0} is already assigned to another PR; \
         with share set to false a database can not be shared with multiple PRs"
    )]
    LabelAlreadyShared(String),

    /// Every exclusive database is taken and none are shareable
    #[error("No databases are available")]
    NoDatabaseAvailable,
}
