//! # Meta Attachment
//!
//! `MetaAttachment` is the single entry point for reading and writing meta
//! values. It wires the three collaborators together:
//!
//! - a [`MetaStore`] holding the records at rest
//! - a [`MetaCache`] holding resolved values per locale
//! - a [`ValueCodec`] translating between the two
//!
//! ## Write Path
//!
//! `set_meta` locates or creates the record (type hint from detection),
//! encodes the value, saves it, then invalidates the key under every locale.
//! The invalidation happens before the call returns, so a following
//! `get_meta` from the same caller always observes the new value.
//!
//! ## Read Path
//!
//! `get_meta` resolves through the cache. On a miss the record is loaded and
//! decoded; a missing record is cached as null and the caller's default is
//! applied on top.
//!
//! ## Generic Over Collaborators
//!
//! `MetaAttachment<S: MetaStore, C: CacheStore>`:
//! - Production: `MetaAttachment<SqliteStore, MemoryCache>`
//! - Testing: `MetaAttachment<InMemoryStore, MemoryCache>`
//!
//! Owner-scoped calls take an [`OwnerRef`]. [`MetaAttachment::for_owner`]
//! returns an [`OwnerMeta`] handle that remembers the owner.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::cache::{CacheStore, MetaCache};
use crate::codec::ValueCodec;
use crate::config::{LocaleSet, MetaConfig};
use crate::error::Result;
use crate::filter::{FilterOp, MetaFilter};
use crate::model::{MetaRecord, MetaValue, OwnerRef, TypeTag};
use crate::owner::{OwnerRegistry, PruneReport};
use crate::store::MetaStore;

pub struct MetaAttachment<S: MetaStore, C: CacheStore> {
    store: S,
    cache: MetaCache<C>,
    codec: ValueCodec,
}

impl<S: MetaStore, C: CacheStore> MetaAttachment<S, C> {
    pub fn new(store: S, cache_store: C, locales: LocaleSet) -> Self {
        Self {
            store,
            cache: MetaCache::new(cache_store, locales.clone()),
            codec: ValueCodec::new(locales),
        }
    }

    pub fn from_config(store: S, cache_store: C, config: &MetaConfig) -> Result<Self> {
        Ok(Self::new(store, cache_store, config.locale_set()?))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &MetaCache<C> {
        &self.cache
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    pub fn locales(&self) -> &LocaleSet {
        self.codec.locales()
    }

    pub fn for_owner(&self, owner: OwnerRef) -> OwnerMeta<'_, S, C> {
        OwnerMeta {
            attachment: self,
            owner,
        }
    }

    // --- Writes ---

    /// Store `value` under `key`, creating the record on first use.
    pub fn set_meta(
        &self,
        owner: &OwnerRef,
        key: &str,
        value: impl Into<MetaValue>,
        locale: Option<&str>,
    ) -> Result<MetaRecord> {
        let value = value.into();
        let hint = self.codec.detect_type(&value);
        let mut record = self.store.locate_or_new(owner, key, hint)?;
        self.codec.encode(&mut record, &value, locale)?;
        self.persist(record)
    }

    /// Store `value` under `key` as type `tag`, coercing it if needed.
    pub fn set_meta_as(
        &self,
        owner: &OwnerRef,
        key: &str,
        tag: TypeTag,
        value: impl Into<MetaValue>,
        locale: Option<&str>,
    ) -> Result<MetaRecord> {
        let value = value.into();
        let mut record = self.store.locate_or_new(owner, key, tag)?;
        self.codec.encode_as(&mut record, tag, &value, locale)?;
        self.persist(record)
    }

    fn persist(&self, mut record: MetaRecord) -> Result<MetaRecord> {
        self.store.save(&mut record)?;
        self.cache.invalidate(&record.owner, &record.key)?;
        debug!(owner = %record.owner, key = %record.key, tag = %record.type_tag(), "saved meta");
        Ok(record)
    }

    /// Apply `set_meta` to every pair in order.
    ///
    /// Not transactional: pairs written before a failure stay written.
    pub fn sync_meta<I, K, V>(
        &self,
        owner: &OwnerRef,
        pairs: I,
        locale: Option<&str>,
    ) -> Result<Vec<MetaRecord>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<MetaValue>,
    {
        pairs
            .into_iter()
            .map(|(key, value)| self.set_meta(owner, key.as_ref(), value, locale))
            .collect()
    }

    /// Delete `key`. Returns whether a record existed.
    pub fn forget_meta(&self, owner: &OwnerRef, key: &str) -> Result<bool> {
        let removed = self.store.delete(owner, key)?;
        self.cache.invalidate(owner, key)?;
        debug!(owner = %owner, key, removed, "forgot meta");
        Ok(removed)
    }

    /// Delete every record of `owner` and drop its cache entries.
    pub fn purge_owner(&self, owner: &OwnerRef) -> Result<usize> {
        let keys = self.store.keys(owner)?;
        let removed = self.store.delete_owner(owner)?;
        self.cache.invalidate_all(owner, &keys)?;
        debug!(owner = %owner, removed, "purged owner meta");
        Ok(removed)
    }

    // --- Reads ---

    /// Read `key`, or null when absent.
    pub fn get_meta(&self, owner: &OwnerRef, key: &str, locale: Option<&str>) -> Result<MetaValue> {
        self.cache.resolve(owner, key, locale, || {
            Ok(self
                .store
                .find(owner, key)?
                .map(|record| self.codec.decode(&record, locale))
                .unwrap_or_default())
        })
    }

    /// Read `key`, or `default` when absent.
    pub fn get_meta_or(
        &self,
        owner: &OwnerRef,
        key: &str,
        default: impl Into<MetaValue>,
        locale: Option<&str>,
    ) -> Result<MetaValue> {
        let value = self.get_meta(owner, key, locale)?;
        Ok(if value.is_null() { default.into() } else { value })
    }

    /// Whether a value for `key` is currently cached.
    ///
    /// This never consults the store: a record that exists at rest but has
    /// not been read since the last invalidation reports `false`. Use
    /// [`exists_meta`](Self::exists_meta) to ask the store.
    pub fn has_meta(&self, owner: &OwnerRef, key: &str, locale: Option<&str>) -> Result<bool> {
        self.cache.has(owner, key, locale)
    }

    /// Whether a record for `key` exists at rest.
    pub fn exists_meta(&self, owner: &OwnerRef, key: &str) -> Result<bool> {
        Ok(self.store.find(owner, key)?.is_some())
    }

    pub fn meta_keys(&self, owner: &OwnerRef) -> Result<BTreeSet<String>> {
        self.store.keys(owner)
    }

    /// Every stored key of `owner`, decoded for `locale` through the cache.
    pub fn all_meta(
        &self,
        owner: &OwnerRef,
        locale: Option<&str>,
    ) -> Result<BTreeMap<String, MetaValue>> {
        self.store
            .records(owner)?
            .into_iter()
            .map(|record| {
                let value = self.cache.resolve(owner, &record.key, locale, || {
                    Ok(self.codec.decode(&record, locale))
                })?;
                Ok((record.key, value))
            })
            .collect()
    }

    /// Drop cached entries for every key stored for `owner`.
    pub fn flush_cache(&self, owner: &OwnerRef) -> Result<()> {
        let keys = self.store.keys(owner)?;
        self.cache.invalidate_all(owner, &keys)
    }

    // --- Predicates ---

    /// Owners of `kind` with a record satisfying `filter`, sorted and unique.
    pub fn filter_owners(&self, kind: &str, filter: &MetaFilter) -> Result<Vec<OwnerRef>> {
        let owners: BTreeSet<OwnerRef> = self
            .store
            .records_with_key(kind, &filter.key)?
            .into_iter()
            .filter(|record| filter.matches(record, &self.codec))
            .map(|record| record.owner)
            .collect();
        Ok(owners.into_iter().collect())
    }

    pub fn where_meta(
        &self,
        kind: &str,
        key: &str,
        op: FilterOp,
        value: impl Into<MetaValue>,
    ) -> Result<Vec<OwnerRef>> {
        self.filter_owners(kind, &MetaFilter::compare(key, op, value))
    }

    pub fn where_meta_eq(
        &self,
        kind: &str,
        key: &str,
        value: impl Into<MetaValue>,
    ) -> Result<Vec<OwnerRef>> {
        self.filter_owners(kind, &MetaFilter::eq(key, value))
    }

    pub fn where_meta_in<I, V>(&self, kind: &str, key: &str, values: I) -> Result<Vec<OwnerRef>>
    where
        I: IntoIterator<Item = V>,
        V: Into<MetaValue>,
    {
        self.filter_owners(kind, &MetaFilter::one_of(key, values))
    }

    pub fn where_meta_like(&self, kind: &str, key: &str, pattern: &str) -> Result<Vec<OwnerRef>> {
        self.filter_owners(kind, &MetaFilter::like(key, pattern))
    }

    // --- Maintenance ---

    /// Purge meta of owners that no longer exist according to `registry`.
    ///
    /// Owner kinds without a registered source are left alone and listed in
    /// the report.
    pub fn prune_orphans(&self, registry: &OwnerRegistry) -> Result<PruneReport> {
        let mut report = PruneReport::default();

        for owner in self.store.owners()? {
            report.scanned += 1;
            if !registry.is_registered(&owner.kind) {
                report.skipped_kinds.insert(owner.kind.clone());
                continue;
            }
            if registry.owner_exists(&owner.kind, &owner.id)? {
                continue;
            }
            report.removed_records += self.purge_owner(&owner)?;
            report.pruned_owners.push(owner);
        }

        if report.is_clean() {
            debug!(scanned = report.scanned, "no orphaned meta found");
        } else {
            info!(
                scanned = report.scanned,
                pruned = report.pruned_owners.len(),
                removed = report.removed_records,
                "pruned orphaned meta"
            );
        }
        Ok(report)
    }
}

/// Meta operations bound to one owner.
pub struct OwnerMeta<'a, S: MetaStore, C: CacheStore> {
    attachment: &'a MetaAttachment<S, C>,
    owner: OwnerRef,
}

impl<'a, S: MetaStore, C: CacheStore> OwnerMeta<'a, S, C> {
    pub fn owner(&self) -> &OwnerRef {
        &self.owner
    }

    pub fn set(&self, key: &str, value: impl Into<MetaValue>) -> Result<MetaRecord> {
        self.attachment.set_meta(&self.owner, key, value, None)
    }

    pub fn set_in(&self, key: &str, value: impl Into<MetaValue>, locale: &str) -> Result<MetaRecord> {
        self.attachment.set_meta(&self.owner, key, value, Some(locale))
    }

    pub fn set_as(&self, key: &str, tag: TypeTag, value: impl Into<MetaValue>) -> Result<MetaRecord> {
        self.attachment.set_meta_as(&self.owner, key, tag, value, None)
    }

    pub fn get(&self, key: &str) -> Result<MetaValue> {
        self.attachment.get_meta(&self.owner, key, None)
    }

    pub fn get_in(&self, key: &str, locale: &str) -> Result<MetaValue> {
        self.attachment.get_meta(&self.owner, key, Some(locale))
    }

    pub fn get_or(&self, key: &str, default: impl Into<MetaValue>) -> Result<MetaValue> {
        self.attachment.get_meta_or(&self.owner, key, default, None)
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        self.attachment.has_meta(&self.owner, key, None)
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        self.attachment.exists_meta(&self.owner, key)
    }

    pub fn forget(&self, key: &str) -> Result<bool> {
        self.attachment.forget_meta(&self.owner, key)
    }

    pub fn sync<I, K, V>(&self, pairs: I) -> Result<Vec<MetaRecord>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<MetaValue>,
    {
        self.attachment.sync_meta(&self.owner, pairs, None)
    }

    pub fn all(&self) -> Result<BTreeMap<String, MetaValue>> {
        self.attachment.all_meta(&self.owner, None)
    }

    pub fn flush_cache(&self) -> Result<()> {
        self.attachment.flush_cache(&self.owner)
    }

    pub fn purge(&self) -> Result<usize> {
        self.attachment.purge_owner(&self.owner)
    }
}
