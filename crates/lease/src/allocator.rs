//! # Database Lease Allocator
//!
//! Decides which catalog database a pull request may use. The lease is the
//! managed label on the pull request; nothing else is stored.
//!
//! ## Decision procedure
//!
//! 1. If the item already carries a managed label, re-affirm it: the database
//!    must still be in the catalog, and an exclusive database must not be held
//!    by any other open item.
//! 2. Otherwise build the candidate pool from every exclusive database no open
//!    item holds plus every shareable database, pick one uniformly at random
//!    and attach its label.
//!
//! ## Concurrency
//!
//! Exclusive databases are claimed through [`LabelStore::try_acquire`]. Over
//! a store without a conditional write (GitHub) that is a check followed by a
//! separate write, so two concurrent allocations can both claim the same
//! exclusive database. Stores that override `try_acquire` atomically close
//! that window; a lost claim drops the database from the pool and the
//! allocator picks again.

use crate::catalog::{Catalog, Database};
use crate::error::LeaseError;
use crate::store::{database_name, label_for, LabelStore};
use rand::seq::SliceRandom;
use tracing::{debug, error, info, instrument, warn};

/// A database leased to an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub name: String,
    pub database: Database,
    /// True when the item already held this lease before the call.
    pub reused: bool,
}

/// Allocates catalog databases through a label store.
pub struct Allocator<'a, S: LabelStore + ?Sized> {
    catalog: &'a Catalog,
    store: &'a S,
}

impl<'a, S: LabelStore + ?Sized> Allocator<'a, S> {
    #[must_use]
    pub fn new(catalog: &'a Catalog, store: &'a S) -> Self {
        Self { catalog, store }
    }

    /// Return the database `item` may use, leasing one if necessary.
    ///
    /// # Errors
    /// - `LeaseError::Store` wrapping `MultipleLabelsAttached` if the item
    ///   carries more than one managed label
    /// - `LeaseError::UnknownDatabaseLabel` if the item's label names a
    ///   database missing from the catalog
    /// - `LeaseError::LabelAlreadyShared` if the item's exclusive database is
    ///   also held by another open item
    /// - `LeaseError::NoDatabaseAvailable` if the candidate pool is empty
    #[instrument(skip(self))]
    pub async fn allocate(&self, item: u64) -> Result<Allocation, LeaseError> {
        match self.store.attached_managed_label(item).await? {
            Some(label) => self.reaffirm(item, &label).await,
            None => self.acquire(item).await,
        }
    }

    async fn reaffirm(&self, item: u64, label: &str) -> Result<Allocation, LeaseError> {
        let name = database_name(label).unwrap_or(label);
        let Some(database) = self.catalog.get(name) else {
            error!("Attached label database {name} is not available in the config");
            return Err(LeaseError::UnknownDatabaseLabel(name.to_string()));
        };

        if !self.store.is_attached_to_exactly_one_open_item(label).await? && !database.share {
            error!("Attached label database {name} is already assigned to another PR");
            return Err(LeaseError::LabelAlreadyShared(name.to_string()));
        }

        info!("Reusing database {name} already leased to #{item}");
        Ok(Allocation {
            name: name.to_string(),
            database: database.clone(),
            reused: true,
        })
    }

    async fn acquire(&self, item: u64) -> Result<Allocation, LeaseError> {
        let mut candidates = self.free_exclusive().await?;
        candidates.extend(self.catalog.shareable().map(|(name, _)| name));
        debug!(?candidates, "Candidate pool");

        loop {
            let Some(name) = pick(&candidates) else {
                error!("Databases are not available");
                return Err(LeaseError::NoDatabaseAvailable);
            };
            let Some(database) = self.catalog.get(name) else {
                return Err(LeaseError::UnknownDatabaseLabel(name.to_string()));
            };
            let label = label_for(name);

            if database.share {
                self.store.set_label(item, &label).await?;
            } else if !self.store.try_acquire(&label, item).await? {
                warn!("Database {name} was claimed concurrently, choosing again");
                candidates.retain(|candidate| *candidate != name);
                continue;
            }

            info!("Leased database {name} to #{item}");
            return Ok(Allocation {
                name: name.to_string(),
                database: database.clone(),
                reused: false,
            });
        }
    }

    /// Exclusive databases no open item holds, registering missing labels.
    async fn free_exclusive(&self) -> Result<Vec<&'a str>, LeaseError> {
        let existing = self.store.list_managed_labels().await?;
        let mut free = Vec::new();

        for (name, _) in self.catalog.exclusive() {
            let label = label_for(name);
            if !existing.contains(&label) {
                info!("Adding missing label for database {name}");
                self.store.create_label(&label).await?;
            }
            if !self.store.is_attached_to_any_open_item(&label).await? {
                free.push(name);
            }
        }

        Ok(free)
    }
}

/// Remove the item's lease, if it has one. Returns the released database.
///
/// # Errors
/// Returns `LeaseError::Store` if the store fails or the item carries more
/// than one managed label.
#[instrument(skip(store))]
pub async fn release<S: LabelStore + ?Sized>(
    store: &S,
    item: u64,
) -> Result<Option<String>, LeaseError> {
    let Some(label) = store.attached_managed_label(item).await? else {
        info!("No database leased to #{item}");
        return Ok(None);
    };

    store.remove_label(item, &label).await?;
    let name = database_name(&label).unwrap_or(&label).to_string();
    info!("Released database {name} from #{item}");
    Ok(Some(name))
}

fn pick<'c>(candidates: &[&'c str]) -> Option<&'c str> {
    candidates.choose(&mut rand::thread_rng()).copied()
}
