//! Owner registry.
//!
//! Meta records point at their owners by `(kind, id)` only. The registry maps
//! each owner kind to an [`OwnerSource`] that can tell whether an id still
//! exists, which is all orphan pruning needs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::error::{MetaError, Result};
use crate::model::OwnerRef;

/// Answers whether an owner id of one kind still exists.
pub trait OwnerSource {
    fn contains(&self, id: &str) -> Result<bool>;
}

impl<F> OwnerSource for F
where
    F: Fn(&str) -> bool,
{
    fn contains(&self, id: &str) -> Result<bool> {
        Ok(self(id))
    }
}

#[derive(Default)]
pub struct OwnerRegistry {
    sources: BTreeMap<String, Box<dyn OwnerSource>>,
}

impl OwnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the source for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, source: impl OwnerSource + 'static) {
        self.sources.insert(kind.into(), Box::new(source));
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.sources.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn owner_exists(&self, kind: &str, id: &str) -> Result<bool> {
        match self.sources.get(kind) {
            Some(source) => source.contains(id),
            None => Err(MetaError::UnknownOwnerKind(kind.to_string())),
        }
    }
}

impl fmt::Debug for OwnerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerRegistry")
            .field("kinds", &self.sources.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Outcome of an orphan pruning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Distinct owners found in the store.
    pub scanned: usize,
    pub pruned_owners: Vec<OwnerRef>,
    pub removed_records: usize,
    /// Owner kinds present in the store but missing from the registry.
    pub skipped_kinds: BTreeSet<String>,
}

impl PruneReport {
    pub fn is_clean(&self) -> bool {
        self.pruned_owners.is_empty()
    }
}
