//! Database leases for preview environments.
//!
//! A pool of named databases is shared between concurrently running pull
//! requests. The only persistence is the issue tracker: a pull request holds
//! a database while it carries the `db:<name>` label.
//!
//! # Architecture
//!
//! - [`Catalog`] / [`Database`]: the databases in `database_config.json`
//! - [`LabelStore`]: label operations the allocator needs from the tracker
//! - [`GitHubLabelStore`]: GitHub REST implementation
//! - [`InMemoryLabelStore`]: in-process implementation with interleaving hooks
//! - [`Allocator`]: the lease decision procedure
//! - [`release`]: the teardown path that drops a pull request's lease

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod allocator;
pub mod catalog;
pub mod error;
pub mod store;

pub use allocator::{release, Allocation, Allocator};
pub use catalog::{Catalog, Database};
pub use error::{LabelStoreError, LeaseError};
pub use store::{label_for, GitHubLabelStore, InMemoryLabelStore, LabelStore, MANAGED_PREFIX};
