//! In-memory [`LabelStore`] for tests and dry runs.
//!
//! Two knobs make interleavings reproducible:
//!
//! - [`InMemoryLabelStore::with_check_barrier`] parks every
//!   `is_attached_to_any_open_item` call on a shared [`Barrier`] after it has
//!   read the state, so concurrent allocations all observe the same snapshot.
//! - [`InMemoryLabelStore::atomic`] makes [`LabelStore::try_acquire`] a
//!   single check-and-set under the store lock.

use super::{LabelStore, MANAGED_PREFIX};
use crate::error::LabelStoreError;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Barrier;

#[derive(Debug, Default)]
struct Item {
    open: bool,
    labels: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct State {
    labels: BTreeSet<String>,
    items: BTreeMap<u64, Item>,
}

impl State {
    fn open_holders(&self, label: &str) -> usize {
        self.items
            .values()
            .filter(|item| item.open && item.labels.contains(label))
            .count()
    }

    fn attach(&mut self, item: u64, label: &str) {
        self.labels.insert(label.to_string());
        let entry = self.items.entry(item).or_insert_with(|| Item {
            open: true,
            labels: BTreeSet::new(),
        });
        entry.labels.retain(|l| !l.starts_with(MANAGED_PREFIX));
        entry.labels.insert(label.to_string());
    }
}

/// Label store held entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryLabelStore {
    state: Mutex<State>,
    atomic: bool,
    check_barrier: Option<Arc<Barrier>>,
}

impl InMemoryLabelStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `try_acquire` an atomic conditional attach.
    #[must_use]
    pub fn atomic(mut self) -> Self {
        self.atomic = true;
        self
    }

    /// Park every open-item check on `barrier` after reading state.
    #[must_use]
    pub fn with_check_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.check_barrier = Some(barrier);
        self
    }

    /// Register an open item with the given labels.
    #[must_use]
    pub fn with_item(self, item: u64, labels: &[&str]) -> Self {
        {
            let mut state = self.lock();
            for label in labels {
                state.labels.insert((*label).to_string());
            }
            state.items.insert(
                item,
                Item {
                    open: true,
                    labels: labels.iter().map(|l| (*l).to_string()).collect(),
                },
            );
        }
        self
    }

    /// Register a repository label that no item carries.
    #[must_use]
    pub fn with_label(self, label: &str) -> Self {
        self.lock().labels.insert(label.to_string());
        self
    }

    /// Mark an item closed; its labels stop counting as leases.
    pub fn close_item(&self, item: u64) {
        if let Some(entry) = self.lock().items.get_mut(&item) {
            entry.open = false;
        }
    }

    /// Open items currently carrying `label`.
    #[must_use]
    pub fn holders(&self, label: &str) -> Vec<u64> {
        self.lock()
            .items
            .iter()
            .filter(|(_, item)| item.open && item.labels.contains(label))
            .map(|(number, _)| *number)
            .collect()
    }

    /// Every label defined in the repository.
    #[must_use]
    pub fn labels(&self) -> BTreeSet<String> {
        self.lock().labels.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LabelStore for InMemoryLabelStore {
    async fn list_managed_labels(&self) -> Result<BTreeSet<String>, LabelStoreError> {
        Ok(self
            .lock()
            .labels
            .iter()
            .filter(|l| l.starts_with(MANAGED_PREFIX))
            .cloned()
            .collect())
    }

    async fn create_label(&self, label: &str) -> Result<(), LabelStoreError> {
        self.lock().labels.insert(label.to_string());
        Ok(())
    }

    async fn is_attached_to_any_open_item(&self, label: &str) -> Result<bool, LabelStoreError> {
        let attached = self.lock().open_holders(label) > 0;
        if let Some(barrier) = &self.check_barrier {
            barrier.wait().await;
        }
        Ok(attached)
    }

    async fn is_attached_to_exactly_one_open_item(
        &self,
        label: &str,
    ) -> Result<bool, LabelStoreError> {
        Ok(self.lock().open_holders(label) <= 1)
    }

    async fn set_label(&self, item: u64, label: &str) -> Result<(), LabelStoreError> {
        self.lock().attach(item, label);
        Ok(())
    }

    async fn remove_label(&self, item: u64, label: &str) -> Result<(), LabelStoreError> {
        if let Some(entry) = self.lock().items.get_mut(&item) {
            entry.labels.remove(label);
        }
        Ok(())
    }

    async fn item_labels(&self, item: u64) -> Result<Vec<String>, LabelStoreError> {
        Ok(self
            .lock()
            .items
            .get(&item)
            .map(|entry| entry.labels.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn try_acquire(&self, label: &str, item: u64) -> Result<bool, LabelStoreError> {
        if !self.atomic {
            if self.is_attached_to_any_open_item(label).await? {
                return Ok(false);
            }
            self.set_label(item, label).await?;
            return Ok(true);
        }

        let mut state = self.lock();
        if state.open_holders(label) > 0 {
            return Ok(false);
        }
        state.attach(item, label);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_label_replaces_managed_labels_only() {
        let store = InMemoryLabelStore::new().with_item(5, &["enhancement", "db:old"]);
        store.set_label(5, "db:new").await.unwrap();

        let mut labels = store.item_labels(5).await.unwrap();
        labels.sort();
        assert_eq!(labels, ["db:new", "enhancement"]);
        assert!(store.holders("db:old").is_empty());
    }

    #[tokio::test]
    async fn test_closed_items_do_not_hold_labels() {
        let store = InMemoryLabelStore::new()
            .with_item(1, &["db:a"])
            .with_item(2, &["db:a"]);
        assert!(!store.is_attached_to_exactly_one_open_item("db:a").await.unwrap());

        store.close_item(2);
        assert!(store.is_attached_to_exactly_one_open_item("db:a").await.unwrap());

        store.close_item(1);
        assert!(!store.is_attached_to_any_open_item("db:a").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_managed_labels() {
        let store = InMemoryLabelStore::new()
            .with_label("db:a")
            .with_label("bug")
            .with_item(1, &["db:b"]);
        let labels = store.list_managed_labels().await.unwrap();
        assert_eq!(labels, BTreeSet::from(["db:a".to_string(), "db:b".to_string()]));
    }

    #[tokio::test]
    async fn test_atomic_try_acquire() {
        let store = InMemoryLabelStore::new().atomic();
        assert!(store.try_acquire("db:a", 1).await.unwrap());
        assert!(!store.try_acquire("db:a", 2).await.unwrap());
        assert_eq!(store.holders("db:a"), vec![1]);
    }
}
