//! Core data types: owners, type tags, dynamic values and meta records.
//!
//! [`MetaValue`] is what callers hand in and get back. [`StoredValue`] is what
//! a [`MetaRecord`] persists: a tagged union where the variant *is* the type
//! tag, so a record can never carry a tag that disagrees with its slot.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::MetaError;

/// Store-generated identifier of a meta record.
pub type MetaId = i64;

/// Polymorphic reference to the entity a record is attached to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    /// Owner kind discriminator (e.g. `"article"`).
    pub kind: String,
    /// Owner identifier within its kind.
    pub id: String,
}

impl OwnerRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// Which storage slot holds a record's logical value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Boolean,
    Number,
    String,
    Json,
    Date,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Boolean => "boolean",
            TypeTag::Number => "number",
            TypeTag::String => "string",
            TypeTag::Json => "json",
            TypeTag::Date => "date",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = MetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boolean" => Ok(TypeTag::Boolean),
            "number" => Ok(TypeTag::Number),
            "string" => Ok(TypeTag::String),
            "json" => Ok(TypeTag::Json),
            "date" => Ok(TypeTag::Date),
            other => Err(MetaError::UnknownType(other.to_string())),
        }
    }
}

/// A dynamic metadata value.
///
/// `List` and `Map` are the structured shapes; a `Map` whose keys are all
/// supported locale codes is a translation bundle.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MetaValue {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Date(DateTime<Utc>),
    List(Vec<Value>),
    Map(Map<String, Value>),
}

impl MetaValue {
    /// Build a translation bundle from `(locale, text)` pairs.
    pub fn translations<I, L, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<String>,
    {
        MetaValue::Map(
            pairs
                .into_iter()
                .map(|(lang, text)| (lang.into(), Value::String(text.into())))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetaValue::Null)
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, MetaValue::List(_) | MetaValue::Map(_))
    }

    /// Keys of a structured value, as strings. Lists are keyed by index.
    pub fn structured_keys(&self) -> Option<Vec<String>> {
        match self {
            MetaValue::Map(map) => Some(map.keys().cloned().collect()),
            MetaValue::List(items) => Some((0..items.len()).map(|i| i.to_string()).collect()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self {
            MetaValue::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            MetaValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Loose boolean cast: empty, zero and null values are false.
    pub fn truthy(&self) -> bool {
        match self {
            MetaValue::Null => false,
            MetaValue::Bool(b) => *b,
            MetaValue::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
            MetaValue::String(s) => !(s.is_empty() || s == "0"),
            MetaValue::Date(_) => true,
            MetaValue::List(items) => !items.is_empty(),
            MetaValue::Map(map) => !map.is_empty(),
        }
    }

    /// String cast used when a value lands in the text slot.
    pub fn to_text(&self) -> String {
        match self {
            MetaValue::Null => String::new(),
            MetaValue::Bool(b) => b.to_string(),
            MetaValue::Number(n) => n.to_string(),
            MetaValue::String(s) => s.clone(),
            MetaValue::Date(d) => d.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            MetaValue::List(_) | MetaValue::Map(_) => self.to_json().to_string(),
        }
    }

    /// JSON rendition. Dates become RFC 3339 strings.
    pub fn to_json(&self) -> Value {
        match self {
            MetaValue::Null => Value::Null,
            MetaValue::Bool(b) => Value::Bool(*b),
            MetaValue::Number(n) => Value::Number(n.clone()),
            MetaValue::String(s) => Value::String(s.clone()),
            MetaValue::Date(d) => Value::String(d.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            MetaValue::List(items) => Value::Array(items.clone()),
            MetaValue::Map(map) => Value::Object(map.clone()),
        }
    }
}

impl From<Value> for MetaValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => MetaValue::Null,
            Value::Bool(b) => MetaValue::Bool(b),
            Value::Number(n) => MetaValue::Number(n),
            Value::String(s) => MetaValue::String(s),
            Value::Array(items) => MetaValue::List(items),
            Value::Object(map) => MetaValue::Map(map),
        }
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

impl From<i32> for MetaValue {
    fn from(value: i32) -> Self {
        MetaValue::Number(Number::from(value))
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Number(Number::from(value))
    }
}

impl From<u64> for MetaValue {
    fn from(value: u64) -> Self {
        MetaValue::Number(Number::from(value))
    }
}

impl From<f64> for MetaValue {
    /// Non-finite floats have no JSON number form and become `Null`.
    fn from(value: f64) -> Self {
        Number::from_f64(value)
            .map(MetaValue::Number)
            .unwrap_or(MetaValue::Null)
    }
}

impl From<Number> for MetaValue {
    fn from(value: Number) -> Self {
        MetaValue::Number(value)
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::String(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::String(value)
    }
}

impl From<DateTime<Utc>> for MetaValue {
    fn from(value: DateTime<Utc>) -> Self {
        MetaValue::Date(value)
    }
}

impl<T: Into<MetaValue>> From<Option<T>> for MetaValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(MetaValue::Null)
    }
}

/// Text slot: an optional plain string plus per-locale translations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextValue {
    pub plain: Option<String>,
    pub translations: BTreeMap<String, String>,
}

/// The persisted value of a record. The variant selects the active slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum StoredValue {
    Boolean(Option<bool>),
    Number(Option<Number>),
    String(TextValue),
    Json(Value),
    Date(Option<DateTime<Utc>>),
}

impl StoredValue {
    /// An empty slot of the given type.
    pub fn empty(tag: TypeTag) -> Self {
        match tag {
            TypeTag::Boolean => StoredValue::Boolean(None),
            TypeTag::Number => StoredValue::Number(None),
            TypeTag::String => StoredValue::String(TextValue::default()),
            TypeTag::Json => StoredValue::Json(Value::Null),
            TypeTag::Date => StoredValue::Date(None),
        }
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            StoredValue::Boolean(_) => TypeTag::Boolean,
            StoredValue::Number(_) => TypeTag::Number,
            StoredValue::String(_) => TypeTag::String,
            StoredValue::Json(_) => TypeTag::Json,
            StoredValue::Date(_) => TypeTag::Date,
        }
    }

    pub fn as_text(&self) -> Option<&TextValue> {
        match self {
            StoredValue::String(text) => Some(text),
            _ => None,
        }
    }
}

/// One key/value metadata entry bound to an owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaRecord {
    /// `None` until the store has persisted the record.
    pub id: Option<MetaId>,
    pub owner: OwnerRef,
    pub key: String,
    pub value: StoredValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MetaRecord {
    /// A fresh, unsaved record with an empty slot of type `tag`.
    pub fn new(owner: OwnerRef, key: impl Into<String>, tag: TypeTag) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            owner,
            key: key.into(),
            value: StoredValue::empty(tag),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn type_tag(&self) -> TypeTag {
        self.value.type_tag()
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}
