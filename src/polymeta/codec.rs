//! # Value Codec
//!
//! Maps dynamic [`MetaValue`]s onto the typed storage slots of a
//! [`MetaRecord`] and back.
//!
//! ## Type Detection
//!
//! Rules are evaluated in order:
//!
//! 1. Structured value whose keys are *all* supported locales → `string`
//!    (a translation bundle; an empty value qualifies vacuously)
//! 2. Other structured value → `json`
//! 3. Boolean → `boolean`
//! 4. Number → `number`
//! 5. Date → `date`
//! 6. Anything else → `string`
//!
//! ## Text Slot
//!
//! Plain strings are written as the translation for the requested (or default)
//! locale. Reads look up that translation first, then fall back to the plain
//! string, then to null.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Number, Value};

use crate::config::LocaleSet;
use crate::error::{MetaError, Result};
use crate::model::{MetaRecord, MetaValue, StoredValue, TextValue, TypeTag};

const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

#[derive(Debug, Clone, Default)]
pub struct ValueCodec {
    locales: LocaleSet,
}

impl ValueCodec {
    pub fn new(locales: LocaleSet) -> Self {
        Self { locales }
    }

    pub fn locales(&self) -> &LocaleSet {
        &self.locales
    }

    /// True when `value` is structured and every key is a supported locale.
    pub fn is_translation_bundle(&self, value: &MetaValue) -> bool {
        match value.structured_keys() {
            Some(keys) => keys.iter().all(|k| self.locales.contains(k)),
            None => false,
        }
    }

    pub fn detect_type(&self, value: &MetaValue) -> TypeTag {
        if self.is_translation_bundle(value) {
            return TypeTag::String;
        }
        match value {
            MetaValue::List(_) | MetaValue::Map(_) => TypeTag::Json,
            MetaValue::Bool(_) => TypeTag::Boolean,
            MetaValue::Number(_) => TypeTag::Number,
            MetaValue::Date(_) => TypeTag::Date,
            MetaValue::Null | MetaValue::String(_) => TypeTag::String,
        }
    }

    /// Read the logical value of a record for a locale.
    pub fn decode(&self, record: &MetaRecord, locale: Option<&str>) -> MetaValue {
        match &record.value {
            StoredValue::Boolean(slot) => slot.map(MetaValue::Bool).unwrap_or_default(),
            StoredValue::Date(slot) => slot.map(MetaValue::Date).unwrap_or_default(),
            StoredValue::Number(slot) => slot.clone().map(MetaValue::Number).unwrap_or_default(),
            StoredValue::Json(json) => MetaValue::from(json.clone()),
            StoredValue::String(text) => {
                let locale = self.locales.resolve(locale);
                text.translations
                    .get(locale)
                    .or(text.plain.as_ref())
                    .cloned()
                    .map(MetaValue::String)
                    .unwrap_or_default()
            }
        }
    }

    /// Write `value` into `record`, choosing the slot by type detection.
    ///
    /// A translation bundle is merged into the text slot locale by locale;
    /// translations for locales the bundle does not mention are kept.
    pub fn encode(
        &self,
        record: &mut MetaRecord,
        value: &MetaValue,
        locale: Option<&str>,
    ) -> Result<()> {
        if self.is_translation_bundle(value) {
            let mut text = take_text(record);
            if let MetaValue::Map(bundle) = value {
                for (lang, translation) in bundle {
                    text.translations
                        .insert(lang.clone(), translation_text(translation));
                }
            }
            record.value = StoredValue::String(text);
            return Ok(());
        }

        let tag = self.detect_type(value);
        self.encode_as(record, tag, value, locale)
    }

    /// Write `value` into `record` as type `tag`, coercing where needed.
    ///
    /// Fails with [`MetaError::InvalidDate`] or [`MetaError::InvalidNumber`]
    /// when the value cannot be read as the requested type; the record is left
    /// untouched in that case.
    pub fn encode_as(
        &self,
        record: &mut MetaRecord,
        tag: TypeTag,
        value: &MetaValue,
        locale: Option<&str>,
    ) -> Result<()> {
        let stored = match tag {
            TypeTag::Boolean => StoredValue::Boolean(Some(value.truthy())),
            TypeTag::Date => StoredValue::Date(coerce_date(value)?),
            TypeTag::Number => StoredValue::Number(coerce_number(value)?),
            TypeTag::Json => StoredValue::Json(value.to_json()),
            TypeTag::String => {
                let mut text = take_text(record);
                text.translations
                    .insert(self.locales.resolve(locale).to_string(), value.to_text());
                StoredValue::String(text)
            }
        };
        record.value = stored;
        Ok(())
    }
}

/// Move the text slot out of `record`; any other slot yields an empty one.
fn take_text(record: &mut MetaRecord) -> TextValue {
    match std::mem::replace(&mut record.value, StoredValue::Json(Value::Null)) {
        StoredValue::String(text) => text,
        _ => TextValue::default(),
    }
}

fn translation_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce_date(value: &MetaValue) -> Result<Option<DateTime<Utc>>> {
    match value {
        MetaValue::Null => Ok(None),
        MetaValue::Date(date) => Ok(Some(*date)),
        MetaValue::String(raw) => parse_date(raw).map(Some),
        MetaValue::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(Some)
            .ok_or_else(|| MetaError::InvalidDate(n.to_string())),
        other => Err(MetaError::InvalidDate(other.to_text())),
    }
}

fn coerce_number(value: &MetaValue) -> Result<Option<Number>> {
    match value {
        MetaValue::Null => Ok(None),
        MetaValue::Number(n) => Ok(Some(n.clone())),
        MetaValue::Bool(b) => Ok(Some(Number::from(u8::from(*b)))),
        MetaValue::String(raw) => parse_number(raw).map(Some),
        other => Err(MetaError::InvalidNumber(other.to_text())),
    }
}

/// Parse a date from RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();

    if let Ok(date) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(date.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(day) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = day.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    Err(MetaError::InvalidDate(raw.to_string()))
}

/// Parse a number without losing digits.
///
/// Valid JSON numbers keep their exact text. Other spellings fall back to a
/// float parse when they contain a decimal point and an integer parse when
/// they do not.
pub fn parse_number(raw: &str) -> Result<Number> {
    let trimmed = raw.trim();

    if let Ok(number) = serde_json::from_str::<Number>(trimmed) {
        return Ok(number);
    }

    let parsed = if trimmed.contains('.') {
        trimmed.parse::<f64>().ok().and_then(Number::from_f64)
    } else {
        trimmed.parse::<i64>().ok().map(Number::from)
    };
    parsed.ok_or_else(|| MetaError::InvalidNumber(raw.to_string()))
}
