use super::MetaStore;
use crate::error::{MetaError, Result};
use crate::model::{MetaId, MetaRecord, OwnerRef};
use chrono::Utc;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

type RecordKey = (String, String, String);

/// In-memory meta store.
///
/// Uses `RefCell` for interior mutability since callers are single-threaded.
/// This keeps the `MetaStore` trait on `&self` without a lock.
pub struct InMemoryStore {
    records: RefCell<BTreeMap<RecordKey, MetaRecord>>,
    next_id: Cell<MetaId>,
    simulate_write_error: Cell<bool>,
    failing_key: RefCell<Option<String>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            records: RefCell::new(BTreeMap::new()),
            next_id: Cell::new(1),
            simulate_write_error: Cell::new(false),
            failing_key: RefCell::new(None),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.simulate_write_error.set(simulate);
    }

    /// Fail writes of one key only, leaving every other key writable.
    pub fn fail_writes_for(&self, key: Option<&str>) {
        *self.failing_key.borrow_mut() = key.map(str::to_string);
    }

    /// Number of records currently held, across all owners.
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    fn check_writable(&self, key: &str) -> Result<()> {
        let failing = self.failing_key.borrow();
        if self.simulate_write_error.get() || failing.as_deref() == Some(key) {
            return Err(MetaError::Store("Simulated write error".to_string()));
        }
        Ok(())
    }
}

fn record_key(owner: &OwnerRef, key: &str) -> RecordKey {
    (owner.kind.clone(), owner.id.clone(), key.to_string())
}

impl MetaStore for InMemoryStore {
    fn find(&self, owner: &OwnerRef, key: &str) -> Result<Option<MetaRecord>> {
        Ok(self.records.borrow().get(&record_key(owner, key)).cloned())
    }

    fn save(&self, record: &mut MetaRecord) -> Result<()> {
        self.check_writable(&record.key)?;

        let mut records = self.records.borrow_mut();
        let slot = record_key(&record.owner, &record.key);

        match records.get(&slot) {
            Some(existing) => {
                record.id = existing.id;
                record.created_at = existing.created_at;
            }
            None => {
                let id = self.next_id.get();
                self.next_id.set(id + 1);
                record.id = Some(id);
            }
        }
        record.updated_at = Utc::now();

        records.insert(slot, record.clone());
        Ok(())
    }

    fn delete(&self, owner: &OwnerRef, key: &str) -> Result<bool> {
        self.check_writable(key)?;
        Ok(self
            .records
            .borrow_mut()
            .remove(&record_key(owner, key))
            .is_some())
    }

    fn delete_owner(&self, owner: &OwnerRef) -> Result<usize> {
        let mut records = self.records.borrow_mut();
        let before = records.len();
        records.retain(|(kind, id, _), _| !(kind == &owner.kind && id == &owner.id));
        Ok(before - records.len())
    }

    fn keys(&self, owner: &OwnerRef) -> Result<BTreeSet<String>> {
        Ok(self
            .records(owner)?
            .into_iter()
            .map(|record| record.key)
            .collect())
    }

    fn records(&self, owner: &OwnerRef) -> Result<Vec<MetaRecord>> {
        Ok(self
            .records
            .borrow()
            .values()
            .filter(|record| &record.owner == owner)
            .cloned()
            .collect())
    }

    fn records_with_key(&self, kind: &str, key: &str) -> Result<Vec<MetaRecord>> {
        Ok(self
            .records
            .borrow()
            .values()
            .filter(|record| record.owner.kind == kind && record.key == key)
            .cloned()
            .collect())
    }

    fn owners(&self) -> Result<Vec<OwnerRef>> {
        let owners: BTreeSet<OwnerRef> = self
            .records
            .borrow()
            .values()
            .map(|record| record.owner.clone())
            .collect();
        Ok(owners.into_iter().collect())
    }
}

// --- Test Fixtures ---

#[cfg(any(test, feature = "test_utils"))]
pub mod fixtures {
    use super::*;
    use crate::codec::ValueCodec;
    use crate::model::MetaValue;

    pub struct StoreFixture {
        pub store: InMemoryStore,
        pub codec: ValueCodec,
    }

    impl Default for StoreFixture {
        fn default() -> Self {
            Self::new()
        }
    }

    impl StoreFixture {
        pub fn new() -> Self {
            Self {
                store: InMemoryStore::new(),
                codec: ValueCodec::default(),
            }
        }

        pub fn with_codec(mut self, codec: ValueCodec) -> Self {
            self.codec = codec;
            self
        }

        /// Store `value` under `key` for `owner`, bypassing any cache.
        ///
        /// # Panics
        ///
        /// Panics if the value cannot be encoded or the store rejects the
        /// write. Fixtures are meant for tests only.
        pub fn with_meta(self, owner: &OwnerRef, key: &str, value: impl Into<MetaValue>) -> Self {
            let value = value.into();
            let mut record = MetaRecord::new(owner.clone(), key, self.codec.detect_type(&value));
            self.codec.encode(&mut record, &value, None).unwrap();
            self.store.save(&mut record).unwrap();
            self
        }
    }
}
