//! # Host Entities
//!
//! A host is any record type that carries meta. Hosts declare their native
//! names up front in a static [`FieldSpec`] list; every other attribute name
//! is meta.
//!
//! ## Attribute Access
//!
//! | Name resolves to | read | write | has | unset |
//! |------------------|------|-------|-----|-------|
//! | `Column` / `Accessor` | `read_field` | `write_field` | non-null field | field set to null |
//! | `Relation` / `Method` | `read_field` | `ReadOnlyField` | non-null field | `ReadOnlyField` |
//! | meta key | staged value, else `get_meta` | staged | staged or cached | unstaged and forgotten |
//!
//! ## Staged Writes
//!
//! Meta written through the attribute path is staged on the host instead of
//! being stored right away, since the host may not have an id yet. Once the
//! host has been saved, the caller runs [`MetaAttachment::after_persist`],
//! which replays every staged entry through `set_meta` and clears it.
//!
//! ```ignore
//! meta.write_attr(&mut article, "subtitle", "text")?;
//! repo.save(&mut article)?;
//! meta.after_persist(&mut article)?;
//! ```

use tracing::{debug, warn};

use crate::attachment::MetaAttachment;
use crate::cache::CacheStore;
use crate::error::{MetaError, Result};
use crate::model::{MetaValue, OwnerRef};
use crate::store::MetaStore;

/// How a native name is backed on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A persisted column.
    Column,

    /// A computed getter/setter pair.
    Accessor,

    /// A loaded relation. Readable only.
    Relation,

    /// A method whose name must not be shadowed by meta. Readable only.
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }

    pub const fn column(name: &'static str) -> Self {
        Self::new(name, FieldKind::Column)
    }

    pub const fn accessor(name: &'static str) -> Self {
        Self::new(name, FieldKind::Accessor)
    }

    pub const fn relation(name: &'static str) -> Self {
        Self::new(name, FieldKind::Relation)
    }

    pub const fn method(name: &'static str) -> Self {
        Self::new(name, FieldKind::Method)
    }

    pub const fn is_writable(&self) -> bool {
        matches!(self.kind, FieldKind::Column | FieldKind::Accessor)
    }
}

/// Look up a native field by name.
pub fn find_field(fields: &'static [FieldSpec], name: &str) -> Option<&'static FieldSpec> {
    fields.iter().find(|spec| spec.name == name)
}

/// Meta values waiting for the host to be persisted, in staging order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedMeta {
    entries: Vec<(String, MetaValue)>,
}

impl StagedMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `value` for `key`. Re-staging a key replaces its value in place.
    pub fn stage(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return every entry, leaving the queue empty.
    pub fn take(&mut self) -> Vec<(String, MetaValue)> {
        std::mem::take(&mut self.entries)
    }
}

/// A record type that carries meta.
pub trait HasMeta {
    /// Owner kind written to meta records, e.g. `"article"`.
    const OWNER_KIND: &'static str;

    /// Native names. Anything not listed here is treated as meta.
    const FIELDS: &'static [FieldSpec];

    /// Identifier of the persisted host, `None` until it has been saved.
    fn owner_id(&self) -> Option<String>;

    fn read_field(&self, name: &str) -> Option<MetaValue>;

    fn write_field(&mut self, name: &str, value: MetaValue) -> Result<()>;

    fn staged_meta(&self) -> &StagedMeta;

    fn staged_meta_mut(&mut self) -> &mut StagedMeta;

    fn owner_ref(&self) -> Option<OwnerRef> {
        self.owner_id()
            .map(|id| OwnerRef::new(Self::OWNER_KIND, id))
    }
}

/// Where an attribute name is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute<'n> {
    Native(&'static FieldSpec),
    Meta(&'n str),
}

impl<'n> Attribute<'n> {
    pub fn resolve<H: HasMeta>(name: &'n str) -> Self {
        match find_field(H::FIELDS, name) {
            Some(spec) => Attribute::Native(spec),
            None => Attribute::Meta(name),
        }
    }
}

fn writable(spec: &FieldSpec) -> Result<()> {
    if spec.is_writable() {
        Ok(())
    } else {
        Err(MetaError::ReadOnlyField(spec.name.to_string()))
    }
}

impl<S: MetaStore, C: CacheStore> MetaAttachment<S, C> {
    /// Read an attribute. Staged meta wins over stored meta.
    pub fn read_attr<H: HasMeta>(
        &self,
        host: &H,
        name: &str,
        locale: Option<&str>,
    ) -> Result<MetaValue> {
        match Attribute::resolve::<H>(name) {
            Attribute::Native(spec) => Ok(host.read_field(spec.name).unwrap_or_default()),
            Attribute::Meta(key) => {
                if let Some(staged) = host.staged_meta().get(key) {
                    return Ok(staged.clone());
                }
                match host.owner_ref() {
                    Some(owner) => self.get_meta(&owner, key, locale),
                    None => Ok(MetaValue::Null),
                }
            }
        }
    }

    /// Write an attribute. Meta is staged until [`after_persist`](Self::after_persist).
    pub fn write_attr<H: HasMeta>(
        &self,
        host: &mut H,
        name: &str,
        value: impl Into<MetaValue>,
    ) -> Result<()> {
        match Attribute::resolve::<H>(name) {
            Attribute::Native(spec) => {
                writable(spec)?;
                host.write_field(spec.name, value.into())
            }
            Attribute::Meta(key) => {
                host.staged_meta_mut().stage(key, value);
                Ok(())
            }
        }
    }

    /// Whether an attribute is set.
    ///
    /// For meta this checks the staged queue, then the cache only, matching
    /// [`has_meta`](Self::has_meta).
    pub fn has_attr<H: HasMeta>(&self, host: &H, name: &str, locale: Option<&str>) -> Result<bool> {
        match Attribute::resolve::<H>(name) {
            Attribute::Native(spec) => Ok(host
                .read_field(spec.name)
                .is_some_and(|value| !value.is_null())),
            Attribute::Meta(key) => {
                if host.staged_meta().get(key).is_some_and(|v| !v.is_null()) {
                    return Ok(true);
                }
                match host.owner_ref() {
                    Some(owner) => self.has_meta(&owner, key, locale),
                    None => Ok(false),
                }
            }
        }
    }

    /// Unset an attribute. Meta is unstaged and, for a saved host, forgotten.
    pub fn unset_attr<H: HasMeta>(&self, host: &mut H, name: &str) -> Result<()> {
        match Attribute::resolve::<H>(name) {
            Attribute::Native(spec) => {
                writable(spec)?;
                host.write_field(spec.name, MetaValue::Null)
            }
            Attribute::Meta(key) => {
                host.staged_meta_mut().remove(key);
                if let Some(owner) = host.owner_ref() {
                    self.forget_meta(&owner, key)?;
                }
                Ok(())
            }
        }
    }

    /// Flush staged meta after the host was created or updated.
    ///
    /// Every entry is attempted. Entries that fail stay staged and the first
    /// error is returned. Returns the number of entries written.
    pub fn after_persist<H: HasMeta>(&self, host: &mut H) -> Result<usize> {
        let owner = host
            .owner_ref()
            .ok_or_else(|| MetaError::UnsavedOwner(H::OWNER_KIND.to_string()))?;

        let mut written = 0;
        let mut first_error = None;
        for (key, value) in host.staged_meta_mut().take() {
            match self.set_meta(&owner, &key, value.clone(), None) {
                Ok(_) => written += 1,
                Err(err) => {
                    warn!(owner = %owner, key = %key, error = %err, "staged meta left queued");
                    host.staged_meta_mut().stage(key, value);
                    first_error.get_or_insert(err);
                }
            }
        }

        debug!(owner = %owner, written, "flushed staged meta");
        match first_error {
            Some(err) => Err(err),
            None => Ok(written),
        }
    }

    /// Cascade a permanent host deletion to its meta.
    ///
    /// A host that was never saved has nothing stored; its staged queue is
    /// discarded.
    pub fn after_delete<H: HasMeta>(&self, host: &mut H) -> Result<usize> {
        host.staged_meta_mut().take();
        match host.owner_ref() {
            Some(owner) => self.purge_owner(&owner),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::LocaleSet;
    use crate::store::InMemoryStore;

    #[derive(Debug, Default)]
    struct Article {
        id: Option<u64>,
        title: String,
        meta: StagedMeta,
    }

    impl HasMeta for Article {
        const OWNER_KIND: &'static str = "article";
        const FIELDS: &'static [FieldSpec] = &[
            FieldSpec::column("id"),
            FieldSpec::column("title"),
            FieldSpec::accessor("shouting_title"),
            FieldSpec::relation("author"),
            FieldSpec::method("save"),
        ];

        fn owner_id(&self) -> Option<String> {
            self.id.map(|id| id.to_string())
        }

        fn read_field(&self, name: &str) -> Option<MetaValue> {
            match name {
                "id" => Some(self.id.into()),
                "title" => Some(self.title.as_str().into()),
                "shouting_title" => Some(self.title.to_uppercase().into()),
                _ => None,
            }
        }

        fn write_field(&mut self, name: &str, value: MetaValue) -> Result<()> {
            match name {
                "title" | "shouting_title" => self.title = value.as_str().unwrap_or_default().to_string(),
                "id" => self.id = value.as_number().and_then(|n| n.as_u64()),
                _ => {}
            }
            Ok(())
        }

        fn staged_meta(&self) -> &StagedMeta {
            &self.meta
        }

        fn staged_meta_mut(&mut self) -> &mut StagedMeta {
            &mut self.meta
        }
    }

    fn attachment() -> MetaAttachment<InMemoryStore, MemoryCache> {
        MetaAttachment::new(InMemoryStore::new(), MemoryCache::new(), LocaleSet::default())
    }

    fn saved(id: u64) -> Article {
        Article {
            id: Some(id),
            ..Article::default()
        }
    }

    #[test]
    fn resolve_routes_native_and_meta() {
        assert!(matches!(
            Attribute::resolve::<Article>("title"),
            Attribute::Native(spec) if spec.kind == FieldKind::Column
        ));
        assert_eq!(Attribute::resolve::<Article>("subtitle"), Attribute::Meta("subtitle"));
    }

    #[test]
    fn staged_meta_replaces_in_place() {
        let mut staged = StagedMeta::new();
        staged.stage("a", 1);
        staged.stage("b", 2);
        staged.stage("a", 3);

        assert_eq!(staged.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(staged.get("a"), Some(&MetaValue::from(3)));
        assert_eq!(staged.remove("a"), Some(MetaValue::from(3)));
        assert_eq!(staged.len(), 1);
    }

    #[test]
    fn subtitle_is_stored_on_save() {
        let meta = attachment();
        let mut article = Article::default();

        meta.write_attr(&mut article, "subtitle", "text").unwrap();
        assert!(meta.store().is_empty());
        assert_eq!(
            meta.read_attr(&article, "subtitle", None).unwrap(),
            MetaValue::from("text")
        );

        article.id = Some(1);
        assert_eq!(meta.after_persist(&mut article).unwrap(), 1);
        assert!(article.meta.is_empty());

        let owner = OwnerRef::new("article", "1");
        assert_eq!(meta.get_meta(&owner, "subtitle", None).unwrap(), MetaValue::from("text"));
    }

    #[test]
    fn flushing_an_unsaved_host_fails_and_keeps_queue() {
        let meta = attachment();
        let mut article = Article::default();
        meta.write_attr(&mut article, "subtitle", "text").unwrap();

        assert!(matches!(
            meta.after_persist(&mut article),
            Err(MetaError::UnsavedOwner(kind)) if kind == "article"
        ));
        assert!(article.meta.contains("subtitle"));
    }

    #[test]
    fn overwritten_staged_key_keeps_latest() {
        let meta = attachment();
        let mut article = saved(1);
        meta.write_attr(&mut article, "color", "red").unwrap();
        meta.write_attr(&mut article, "color", "blue").unwrap();
        meta.after_persist(&mut article).unwrap();

        assert_eq!(
            meta.read_attr(&article, "color", None).unwrap(),
            MetaValue::from("blue")
        );
    }

    #[test]
    fn failed_entries_stay_staged() {
        let meta = attachment();
        let mut article = saved(1);
        meta.write_attr(&mut article, "good", 1).unwrap();
        meta.write_attr(&mut article, "bad", 2).unwrap();
        meta.store().fail_writes_for(Some("bad"));

        assert!(meta.after_persist(&mut article).is_err());
        assert_eq!(article.meta.keys().collect::<Vec<_>>(), vec!["bad"]);
        assert!(meta.exists_meta(&OwnerRef::new("article", "1"), "good").unwrap());

        meta.store().fail_writes_for(None);
        assert_eq!(meta.after_persist(&mut article).unwrap(), 1);
        assert!(article.meta.is_empty());
    }

    #[test]
    fn native_fields_bypass_meta() {
        let meta = attachment();
        let mut article = saved(1);

        meta.write_attr(&mut article, "title", "hello").unwrap();
        assert_eq!(article.title, "hello");
        assert!(article.meta.is_empty());
        assert_eq!(
            meta.read_attr(&article, "shouting_title", None).unwrap(),
            MetaValue::from("HELLO")
        );
        assert!(meta.has_attr(&article, "title", None).unwrap());
    }

    #[test]
    fn relations_and_methods_are_read_only() {
        let meta = attachment();
        let mut article = saved(1);

        assert!(matches!(
            meta.write_attr(&mut article, "author", "x"),
            Err(MetaError::ReadOnlyField(name)) if name == "author"
        ));
        assert!(matches!(
            meta.unset_attr(&mut article, "save"),
            Err(MetaError::ReadOnlyField(_))
        ));
        assert_eq!(meta.read_attr(&article, "author", None).unwrap(), MetaValue::Null);
    }

    #[test]
    fn has_attr_for_meta_is_cache_backed() {
        let meta = attachment();
        let mut article = saved(1);
        meta.write_attr(&mut article, "subtitle", "text").unwrap();
        assert!(meta.has_attr(&article, "subtitle", None).unwrap());

        meta.after_persist(&mut article).unwrap();
        assert!(!meta.has_attr(&article, "subtitle", None).unwrap());

        meta.read_attr(&article, "subtitle", None).unwrap();
        assert!(meta.has_attr(&article, "subtitle", None).unwrap());
    }

    #[test]
    fn unset_attr_forgets_meta() {
        let meta = attachment();
        let mut article = saved(1);
        meta.write_attr(&mut article, "subtitle", "text").unwrap();
        meta.after_persist(&mut article).unwrap();

        meta.unset_attr(&mut article, "subtitle").unwrap();
        assert!(meta.store().is_empty());
        assert_eq!(meta.read_attr(&article, "subtitle", None).unwrap(), MetaValue::Null);

        meta.unset_attr(&mut article, "title").unwrap();
        assert_eq!(article.title, "");
    }

    #[test]
    fn after_delete_cascades() {
        let meta = attachment();
        let mut article = saved(1);
        meta.write_attr(&mut article, "a", 1).unwrap();
        meta.write_attr(&mut article, "b", 2).unwrap();
        meta.after_persist(&mut article).unwrap();
        meta.set_meta(&OwnerRef::new("article", "2"), "a", 1, None).unwrap();

        assert_eq!(meta.after_delete(&mut article).unwrap(), 2);
        assert_eq!(meta.store().len(), 1);
        assert_eq!(meta.after_delete(&mut Article::default()).unwrap(), 0);
    }

    #[test]
    fn owner_ref_uses_kind_and_id() {
        assert_eq!(saved(5).owner_ref(), Some(OwnerRef::new("article", "5")));
        assert_eq!(Article::default().owner_ref(), None);
    }
}
