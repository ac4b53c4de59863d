//! # Meta Cache
//!
//! Resolved meta values are cached per `(owner, key, locale)` with no expiry;
//! entries only disappear through explicit invalidation.
//!
//! ## Keys
//!
//! ```text
//! meta:{owner_kind}:{owner_id}:{key}:{locale}
//! ```
//!
//! Each field has `%` and `:` percent-encoded, so owner ids and keys that
//! contain the separator cannot collide with another owner's entry.
//!
//! A call without a locale, or with an unsupported one, is keyed under the
//! default locale, so such a read and a read naming the default locale share
//! one entry.
//!
//! ## Invalidation
//!
//! Writes invalidate a key under *every* supported locale, not only the ones
//! that were read, so no locale can keep serving a stale value.
//!
//! ## Absent Values
//!
//! A key with no stored record is cached as [`MetaValue::Null`]. Callers apply
//! their own default on top, so differing defaults never leak between calls.

use tracing::{debug, trace};

use crate::config::LocaleSet;
use crate::error::Result;
use crate::model::{MetaValue, OwnerRef};

pub mod memory;

pub use memory::MemoryCache;

/// Abstract key/value cache with unbounded retention.
pub trait CacheStore {
    /// Fetch a cached value, if present.
    fn get(&self, key: &str) -> Result<Option<MetaValue>>;

    /// Store a value until it is forgotten.
    fn put(&self, key: &str, value: MetaValue) -> Result<()>;

    /// Remove a value. Returns whether it was present.
    fn forget(&self, key: &str) -> Result<bool>;

    /// Whether a non-null value is cached under `key`.
    fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some_and(|value| !value.is_null()))
    }
}

/// Locale-aware cache of resolved meta values.
pub struct MetaCache<C: CacheStore> {
    store: C,
    locales: LocaleSet,
}

impl<C: CacheStore> MetaCache<C> {
    pub fn new(store: C, locales: LocaleSet) -> Self {
        Self { store, locales }
    }

    /// The underlying cache store.
    pub fn store(&self) -> &C {
        &self.store
    }

    pub fn cache_key(&self, owner: &OwnerRef, key: &str, locale: Option<&str>) -> String {
        format!(
            "meta:{}:{}:{}:{}",
            escape(&owner.kind),
            escape(&owner.id),
            escape(key),
            escape(self.locales.resolve(locale))
        )
    }

    /// Return the cached value, or compute it with `loader` and keep it.
    ///
    /// The loader runs at most once per cache key between invalidations
    /// within one actor; concurrent first reads may both compute, which is
    /// harmless because loading is idempotent.
    pub fn resolve<F>(
        &self,
        owner: &OwnerRef,
        key: &str,
        locale: Option<&str>,
        loader: F,
    ) -> Result<MetaValue>
    where
        F: FnOnce() -> Result<MetaValue>,
    {
        let cache_key = self.cache_key(owner, key, locale);
        if let Some(hit) = self.store.get(&cache_key)? {
            trace!(key = %cache_key, "meta cache hit");
            return Ok(hit);
        }

        trace!(key = %cache_key, "meta cache miss");
        let value = loader()?;
        self.store.put(&cache_key, value.clone())?;
        Ok(value)
    }

    /// Whether a non-null value is currently cached. Never consults the store.
    pub fn has(&self, owner: &OwnerRef, key: &str, locale: Option<&str>) -> Result<bool> {
        self.store.has(&self.cache_key(owner, key, locale))
    }

    /// Drop `key` for `owner` under every supported locale.
    pub fn invalidate(&self, owner: &OwnerRef, key: &str) -> Result<()> {
        for locale in self.locales.codes() {
            self.store
                .forget(&self.cache_key(owner, key, Some(locale.as_str())))?;
        }
        debug!(owner = %owner, key, "invalidated meta cache");
        Ok(())
    }

    /// Drop every key in `keys` for `owner`. Callers pass the keys known to
    /// the store, so keys that were written but never read are covered too.
    pub fn invalidate_all<'k, I>(&self, owner: &OwnerRef, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = &'k String>,
    {
        for key in keys {
            self.invalidate(owner, key)?;
        }
        Ok(())
    }
}

fn escape(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains(['%', ':']) {
        field.replace('%', "%25").replace(':', "%3A").into()
    } else {
        field.into()
    }
}
