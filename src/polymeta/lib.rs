//! # Polymeta Architecture
//!
//! Polymeta attaches typed key/value metadata to arbitrary records. A record
//! (the *owner*) is referenced only by `(kind, id)`, so any number of unrelated
//! record types can share one meta table.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI (main.rs, args.rs)                                     │
//! │  - The ONLY place that knows about stdout/stderr/exit codes │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Host integration (host.rs)                                 │
//! │  - Attribute routing: native field or meta                  │
//! │  - Staged writes flushed after the host is saved            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  MetaAttachment (attachment.rs)                             │
//! │  - set/get/forget/sync, predicates, pruning                 │
//! └─────────────────────────────────────────────────────────────┘
//!                  │                          │
//!                  ▼                          ▼
//! ┌──────────────────────────────┐ ┌────────────────────────────┐
//! │  MetaStore (store/)          │ │  MetaCache (cache/)        │
//! │  SqliteStore, InMemoryStore  │ │  per-locale resolved values│
//! └──────────────────────────────┘ └────────────────────────────┘
//! ```
//!
//! [`codec::ValueCodec`] sits between the attachment and the store: it picks
//! the type tag for a value and moves it in and out of the typed storage slot.
//!
//! ## Value Types
//!
//! | Tag | Holds |
//! |-----|-------|
//! | `boolean` | `bool` |
//! | `number` | arbitrary precision decimal |
//! | `string` | plain string plus per-locale translations |
//! | `json` | any structured value |
//! | `date` | UTC timestamp |
//!
//! A map whose keys are all supported locales is a translation bundle and is
//! stored as `string`, not `json`.
//!
//! ## No Global State
//!
//! Supported locales live in a [`config::LocaleSet`] passed explicitly to the
//! codec and the cache. Nothing in the library reads process-wide state.
//!
//! ## Module Overview
//!
//! - [`attachment`]: The entry point for all meta operations
//! - [`host`]: Attribute routing and staged writes for host records
//! - [`codec`]: Type detection, encoding and decoding
//! - [`model`]: Core data types (`MetaValue`, `MetaRecord`, `OwnerRef`)
//! - [`store`]: Storage abstraction and implementations
//! - [`cache`]: Cache abstraction and the locale-aware meta cache
//! - [`filter`]: Query predicates over meta records
//! - [`owner`]: Owner registry and orphan pruning
//! - [`config`]: Configuration management
//! - [`logging`]: Log output setup for binaries
//! - [`error`]: Error types

pub mod attachment;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod filter;
pub mod host;
pub mod logging;
pub mod model;
pub mod owner;
pub mod store;

pub use attachment::{MetaAttachment, OwnerMeta};
pub use error::{MetaError, Result};
pub use host::{HasMeta, StagedMeta};
pub use model::{MetaRecord, MetaValue, OwnerRef, TypeTag};
