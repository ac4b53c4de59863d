//! Meta predicates.
//!
//! A [`MetaFilter`] expresses "the owner has a record with this key whose
//! value satisfies this condition". The comparison slot is chosen by running
//! type detection on the filter value, so `eq("views", 10)` compares numbers
//! and `eq("status", "draft")` compares text.
//!
//! Text comparisons look at the plain string *and* every translation: a
//! record matches when any of them satisfies the condition.

use std::cmp::Ordering;
use std::str::FromStr;

use serde_json::Number;

use crate::codec::ValueCodec;
use crate::error::MetaError;
use crate::model::{MetaRecord, MetaValue, StoredValue, TextValue, TypeTag};

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl FilterOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            FilterOp::Eq => ordering == Ordering::Equal,
            FilterOp::Ne => ordering != Ordering::Equal,
            FilterOp::Lt => ordering == Ordering::Less,
            FilterOp::Le => ordering != Ordering::Greater,
            FilterOp::Gt => ordering == Ordering::Greater,
            FilterOp::Ge => ordering != Ordering::Less,
        }
    }
}

impl FromStr for FilterOp {
    type Err = MetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(FilterOp::Eq),
            "!=" | "<>" => Ok(FilterOp::Ne),
            "<" => Ok(FilterOp::Lt),
            "<=" => Ok(FilterOp::Le),
            ">" => Ok(FilterOp::Gt),
            ">=" => Ok(FilterOp::Ge),
            other => Err(MetaError::InvalidOperator(other.to_string())),
        }
    }
}

/// The condition a record's value must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare { op: FilterOp, value: MetaValue },
    /// Equal to any of the values. An empty set matches nothing.
    In(Vec<MetaValue>),
    /// SQL `LIKE` pattern (`%`, `_`), ASCII case-insensitive, on text slots.
    Like(String),
}

/// A predicate on one meta key.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaFilter {
    pub key: String,
    pub condition: Condition,
}

impl MetaFilter {
    pub fn new(key: impl Into<String>, condition: Condition) -> Self {
        Self {
            key: key.into(),
            condition,
        }
    }

    pub fn compare(key: impl Into<String>, op: FilterOp, value: impl Into<MetaValue>) -> Self {
        Self::new(
            key,
            Condition::Compare {
                op,
                value: value.into(),
            },
        )
    }

    /// Two-argument form: equality.
    pub fn eq(key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        Self::compare(key, FilterOp::Eq, value)
    }

    pub fn one_of<I, V>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<MetaValue>,
    {
        Self::new(key, Condition::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn like(key: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(key, Condition::Like(pattern.into()))
    }

    /// Check whether `record` satisfies this filter.
    pub fn matches(&self, record: &MetaRecord, codec: &ValueCodec) -> bool {
        if record.key != self.key {
            return false;
        }

        match &self.condition {
            Condition::Compare { op, value } => compare(record, *op, value, codec),
            Condition::In(values) => values
                .iter()
                .any(|value| compare(record, FilterOp::Eq, value, codec)),
            Condition::Like(pattern) => match &record.value {
                StoredValue::String(text) => like_text(text, pattern),
                _ => false,
            },
        }
    }
}

fn compare(record: &MetaRecord, op: FilterOp, value: &MetaValue, codec: &ValueCodec) -> bool {
    match (codec.detect_type(value), &record.value) {
        (TypeTag::Boolean, StoredValue::Boolean(Some(stored))) => {
            op.accepts(stored.cmp(&value.truthy()))
        }
        (TypeTag::Number, StoredValue::Number(Some(stored))) => value
            .as_number()
            .and_then(|wanted| compare_numbers(stored, wanted))
            .is_some_and(|ordering| op.accepts(ordering)),
        (TypeTag::Date, StoredValue::Date(Some(stored))) => value
            .as_date()
            .is_some_and(|wanted| op.accepts(stored.cmp(&wanted))),
        (TypeTag::Json, StoredValue::Json(stored)) => match op {
            FilterOp::Eq => *stored == value.to_json(),
            FilterOp::Ne => !stored.is_null() && *stored != value.to_json(),
            _ => false,
        },
        (TypeTag::String, StoredValue::String(text)) => compare_text(text, op, value),
        _ => false,
    }
}

fn compare_text(text: &TextValue, op: FilterOp, value: &MetaValue) -> bool {
    if let MetaValue::Map(bundle) = value {
        let all_equal = bundle.iter().all(|(lang, wanted)| {
            text.translations.get(lang).map(String::as_str) == wanted.as_str()
        });
        return match op {
            FilterOp::Eq => all_equal,
            FilterOp::Ne => !all_equal,
            _ => false,
        };
    }

    let wanted = value.to_text();
    match op {
        FilterOp::Ne => {
            text_candidates(text).next().is_some()
                && text_candidates(text).all(|s| s != wanted)
        }
        _ => text_candidates(text).any(|s| op.accepts(s.cmp(wanted.as_str()))),
    }
}

fn text_candidates(text: &TextValue) -> impl Iterator<Item = &str> {
    text.plain
        .iter()
        .chain(text.translations.values())
        .map(String::as_str)
}

/// The plain string must match `pattern`; a translation only has to contain it.
fn like_text(text: &TextValue, pattern: &str) -> bool {
    if text.plain.as_deref().is_some_and(|plain| like_match(pattern, plain)) {
        return true;
    }
    let contained = format!("%{}%", pattern);
    text.translations
        .values()
        .any(|translation| like_match(&contained, translation))
}

/// Decimal numbers compare digit by digit; exponent forms fall back to `f64`.
fn compare_numbers(stored: &Number, wanted: &Number) -> Option<Ordering> {
    let (stored, wanted) = (stored.to_string(), wanted.to_string());
    match (Decimal::parse(&stored), Decimal::parse(&wanted)) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => stored.parse::<f64>().ok()?.partial_cmp(&wanted.parse::<f64>().ok()?),
    }
}

/// A plain decimal split into sign and normalised digit runs.
#[derive(Debug, PartialEq, Eq)]
struct Decimal<'a> {
    negative: bool,
    int: &'a str,
    frac: &'a str,
}

impl<'a> Decimal<'a> {
    fn parse(raw: &'a str) -> Option<Self> {
        let (negative, body) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.strip_prefix('+').unwrap_or(raw)),
        };
        let (int, frac) = body.split_once('.').unwrap_or((body, ""));
        let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (int.is_empty() && frac.is_empty()) || !digits(int) || !digits(frac) {
            return None;
        }

        let int = int.trim_start_matches('0');
        let frac = frac.trim_end_matches('0');
        Some(Self {
            negative: negative && !(int.is_empty() && frac.is_empty()),
            int,
            frac,
        })
    }

    fn cmp_magnitude(&self, other: &Self) -> Ordering {
        self.int
            .len()
            .cmp(&other.int.len())
            .then_with(|| self.int.cmp(other.int))
            .then_with(|| self.frac.cmp(other.frac))
    }
}

impl Ord for Decimal<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => self.cmp_magnitude(other),
            (true, true) => other.cmp_magnitude(self),
        }
    }
}

impl PartialOrd for Decimal<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// SQL `LIKE` matching: `%` matches any run, `_` one character.
/// Comparison is ASCII case-insensitive.
pub fn like_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();

    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if let Some((star, mark)) = backtrack {
            p = star + 1;
            t = mark + 1;
            backtrack = Some((star, mark + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '%')
}
