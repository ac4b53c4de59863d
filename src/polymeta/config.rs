//! # Configuration
//!
//! Polymeta configuration is loaded with [`confique`], layering environment
//! variables over an optional TOML file over compiled defaults.
//!
//! ## Available Settings
//!
//! | Key | Env | Default | Description |
//! |-----|-----|---------|-------------|
//! | `locales` | | `["en"]` | Supported locale codes (array, or table keyed by code) |
//! | `default_locale` | `POLYMETA_DEFAULT_LOCALE` | `en` | Locale used when a call passes none |
//! | `database` | `POLYMETA_DATABASE` | `polymeta.db` | SQLite file used by the CLI |
//! | `log_level` | `POLYMETA_LOG` | `warn` | Filter used when `RUST_LOG` is unset |
//!
//! ## Example
//!
//! ```toml
//! default_locale = "en"
//!
//! [locales]
//! en = "English"
//! ar = "العربية"
//! ```
//!
//! The supported locale set is immutable for the lifetime of a
//! [`MetaAttachment`](crate::attachment::MetaAttachment): it is resolved once
//! into a [`LocaleSet`] and handed to the codec and the cache explicitly.

use crate::error::{MetaError, Result};
use confique::Config;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const FALLBACK_LOCALE: &str = "en";

/// Configuration for polymeta, usually stored in `polymeta.toml`.
#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MetaConfig {
    /// Supported locale codes. Either a list (`["en", "ar"]`) or a table whose
    /// keys are the codes. When absent, only `"en"` is supported.
    pub locales: Option<LocaleList>,

    /// Locale used for reads and writes that do not name one.
    #[config(default = "en", env = "POLYMETA_DEFAULT_LOCALE")]
    pub default_locale: String,

    /// SQLite database used by the command line tool.
    #[config(default = "polymeta.db", env = "POLYMETA_DATABASE")]
    pub database: PathBuf,

    /// Log filter used when `RUST_LOG` is not set.
    #[config(default = "warn", env = "POLYMETA_LOG")]
    pub log_level: String,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            locales: None,
            default_locale: FALLBACK_LOCALE.to_string(),
            database: PathBuf::from("polymeta.db"),
            log_level: "warn".to_string(),
        }
    }
}

impl MetaConfig {
    /// Load configuration from the environment and, if given, a TOML file.
    ///
    /// A missing file is not an error; compiled defaults fill the gaps.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Self::builder().env();
        if let Some(path) = file {
            builder = builder.file(path);
        }
        builder.load().map_err(|e| MetaError::Config(e.to_string()))
    }

    /// Resolve the configured locales into a validated [`LocaleSet`].
    pub fn locale_set(&self) -> Result<LocaleSet> {
        let codes = match &self.locales {
            Some(list) => list.codes().to_vec(),
            None => vec![FALLBACK_LOCALE.to_string()],
        };
        LocaleSet::new(codes, self.default_locale.clone())
    }
}

/// Locale codes as written in configuration.
///
/// Accepts both shapes found in the wild: a plain array of codes, or a
/// mapping from code to display name (only the keys matter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawLocales", into = "Vec<String>")]
pub struct LocaleList(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLocales {
    Codes(Vec<String>),
    Named(BTreeMap<String, serde::de::IgnoredAny>),
}

impl From<RawLocales> for LocaleList {
    fn from(raw: RawLocales) -> Self {
        match raw {
            RawLocales::Codes(codes) => LocaleList(codes),
            RawLocales::Named(map) => LocaleList(map.into_keys().collect()),
        }
    }
}

impl From<LocaleList> for Vec<String> {
    fn from(list: LocaleList) -> Self {
        list.0
    }
}

impl LocaleList {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LocaleList(codes.into_iter().map(Into::into).collect())
    }

    pub fn codes(&self) -> &[String] {
        &self.0
    }
}

/// The validated, immutable set of supported locales plus the default one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleSet {
    codes: Vec<String>,
    default: String,
}

impl Default for LocaleSet {
    fn default() -> Self {
        Self {
            codes: vec![FALLBACK_LOCALE.to_string()],
            default: FALLBACK_LOCALE.to_string(),
        }
    }
}

impl LocaleSet {
    /// Build a locale set. Duplicates are dropped; the default locale must be
    /// one of the codes.
    pub fn new<I, S>(codes: I, default: impl Into<String>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for code in codes {
            let code = code.into();
            if code.trim().is_empty() {
                return Err(MetaError::Config("locale codes cannot be empty".into()));
            }
            if !unique.contains(&code) {
                unique.push(code);
            }
        }
        if unique.is_empty() {
            return Err(MetaError::Config(
                "at least one supported locale is required".into(),
            ));
        }

        let default = default.into();
        if !unique.contains(&default) {
            return Err(MetaError::Config(format!(
                "default locale '{}' is not among the supported locales ({})",
                default,
                unique.join(", ")
            )));
        }

        Ok(Self {
            codes: unique,
            default,
        })
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.iter().any(|c| c == code)
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn default_locale(&self) -> &str {
        &self.default
    }

    /// The locale a call should use: the requested one when supported,
    /// otherwise the default.
    pub fn resolve<'a>(&'a self, locale: Option<&'a str>) -> &'a str {
        match locale {
            Some(code) if self.contains(code) => code,
            _ => &self.default,
        }
    }
}
