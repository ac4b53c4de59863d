//! # Storage Layer
//!
//! The [`MetaStore`] trait is the boundary to the relational store holding
//! meta records. The rest of the crate depends only on the trait.
//!
//! ## Contract
//!
//! - Records are unique per `(owner.kind, owner.id, key)`; [`MetaStore::save`]
//!   is an upsert on that triple.
//! - `save` assigns the record id on first write and refreshes `updated_at`.
//! - Uniqueness races between concurrent writers are the store's concern and
//!   surface unchanged; nothing here retries.
//!
//! All methods take `&self`. Implementations use interior mutability (or an
//! internally synchronised connection), since callers run single-threaded per
//! request.
//!
//! ## Implementations
//!
//! - [`memory::InMemoryStore`]: `RefCell`-backed store for tests and embedding.
//! - [`sqlite::SqliteStore`]: durable store on the `meta` table schema.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::model::{MetaRecord, OwnerRef, TypeTag};

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Abstract interface for meta record persistence.
pub trait MetaStore {
    /// Find the record for `(owner, key)`.
    fn find(&self, owner: &OwnerRef, key: &str) -> Result<Option<MetaRecord>>;

    /// Insert or update `record`, keyed by owner and key.
    /// Sets `record.id` and the timestamps to their persisted values.
    fn save(&self, record: &mut MetaRecord) -> Result<()>;

    /// Delete the record for `(owner, key)`. Returns whether one existed.
    fn delete(&self, owner: &OwnerRef, key: &str) -> Result<bool>;

    /// Delete every record of `owner`. Returns how many were removed.
    fn delete_owner(&self, owner: &OwnerRef) -> Result<usize>;

    /// Distinct keys stored for `owner`.
    fn keys(&self, owner: &OwnerRef) -> Result<BTreeSet<String>>;

    /// Every record of `owner`, ordered by key.
    fn records(&self, owner: &OwnerRef) -> Result<Vec<MetaRecord>>;

    /// Every record with `key` across all owners of `kind`.
    fn records_with_key(&self, kind: &str, key: &str) -> Result<Vec<MetaRecord>>;

    /// Distinct owners that have at least one record.
    fn owners(&self) -> Result<Vec<OwnerRef>>;

    /// Locate the record for `(owner, key)`, or build an unsaved one with an
    /// empty slot of type `hint`.
    fn locate_or_new(&self, owner: &OwnerRef, key: &str, hint: TypeTag) -> Result<MetaRecord> {
        Ok(self
            .find(owner, key)?
            .unwrap_or_else(|| MetaRecord::new(owner.clone(), key, hint)))
    }
}
