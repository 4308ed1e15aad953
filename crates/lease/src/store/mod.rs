//! # Label Store
//!
//! A lease is nothing more than a managed label (`db:<name>`) attached to an
//! open pull request. [`LabelStore`] is the capability the allocator needs
//! from the remote issue tracker; [`GitHubLabelStore`] talks to GitHub and
//! [`InMemoryLabelStore`] backs tests.

pub mod github;
pub mod memory;

pub use github::GitHubLabelStore;
pub use memory::InMemoryLabelStore;

use crate::error::LabelStoreError;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Reserved prefix marking a label as allocation state.
pub const MANAGED_PREFIX: &str = "db:";

/// Managed label for a database name.
#[must_use]
pub fn label_for(database: &str) -> String {
    format!("{MANAGED_PREFIX}{database}")
}

/// Database name carried by a managed label, if `label` is one.
#[must_use]
pub fn database_name(label: &str) -> Option<&str> {
    label.strip_prefix(MANAGED_PREFIX)
}

/// Remote label operations used by the allocator.
///
/// Items are identified by number. All label arguments are full managed
/// label names, prefix included.
#[async_trait]
pub trait LabelStore: Send + Sync {
    /// All labels in the repository that carry [`MANAGED_PREFIX`].
    async fn list_managed_labels(&self) -> Result<BTreeSet<String>, LabelStoreError>;

    /// Create `label`. Creating a label that already exists is not an error.
    async fn create_label(&self, label: &str) -> Result<(), LabelStoreError>;

    /// Whether any open item carries `label`.
    async fn is_attached_to_any_open_item(&self, label: &str) -> Result<bool, LabelStoreError>;

    /// Whether `label` is uncontended: true when zero or one open items carry it.
    async fn is_attached_to_exactly_one_open_item(
        &self,
        label: &str,
    ) -> Result<bool, LabelStoreError>;

    /// Replace the item's managed labels with exactly `label`.
    ///
    /// Any managed label the item held before is released.
    async fn set_label(&self, item: u64, label: &str) -> Result<(), LabelStoreError>;

    /// Remove `label` from the item. Removing an absent label is not an error.
    async fn remove_label(&self, item: u64, label: &str) -> Result<(), LabelStoreError>;

    /// Every label currently on the item.
    async fn item_labels(&self, item: u64) -> Result<Vec<String>, LabelStoreError>;

    /// The single managed label on the item, if any.
    ///
    /// # Errors
    /// Returns `LabelStoreError::MultipleLabelsAttached` if the item carries
    /// more than one managed label.
    async fn attached_managed_label(&self, item: u64) -> Result<Option<String>, LabelStoreError> {
        let mut managed: Vec<String> = self
            .item_labels(item)
            .await?
            .into_iter()
            .filter(|label| label.starts_with(MANAGED_PREFIX))
            .collect();

        match managed.len() {
            0 => Ok(None),
            1 => Ok(managed.pop()),
            _ => Err(LabelStoreError::MultipleLabelsAttached {
                item,
                labels: managed,
            }),
        }
    }

    /// Claim `label` for `item` if no open item holds it.
    ///
    /// Returns `false` when the label is already held. The default is a
    /// check followed by a separate write, so two callers can both succeed;
    /// stores with a conditional write should override it.
    async fn try_acquire(&self, label: &str, item: u64) -> Result<bool, LabelStoreError> {
        if self.is_attached_to_any_open_item(label).await? {
            return Ok(false);
        }
        self.set_label(item, label).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_naming() {
        assert_eq!(label_for("orders"), "db:orders");
        assert_eq!(database_name("db:orders"), Some("orders"));
        assert_eq!(database_name("bug"), None);
    }
}
