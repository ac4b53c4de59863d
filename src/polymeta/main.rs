use clap::Parser;
use polymeta::attachment::MetaAttachment;
use polymeta::cache::MemoryCache;
use polymeta::config::MetaConfig;
use polymeta::error::{MetaError, Result};
use polymeta::filter::FilterOp;
use polymeta::logging::init_logging;
use polymeta::model::{MetaValue, OwnerRef, TypeTag};
use polymeta::store::SqliteStore;
use serde::Serialize;
use serde_json::{json, Value};

mod args;
use args::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

struct AppContext {
    meta: MetaAttachment<SqliteStore, MemoryCache>,
    locale: Option<String>,
}

impl AppContext {
    fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = MetaConfig::load(cli.config.as_deref())?;
    init_logging(cli.log_format, &config.log_level);

    let ctx = init_context(&cli, &config)?;

    match cli.command {
        Commands::Set {
            owner_type,
            owner_id,
            key,
            value,
            as_type,
        } => handle_set(&ctx, OwnerRef::new(owner_type, owner_id), &key, &value, as_type),
        Commands::Get {
            owner_type,
            owner_id,
            key,
            default,
        } => handle_get(&ctx, OwnerRef::new(owner_type, owner_id), &key, default),
        Commands::Forget {
            owner_type,
            owner_id,
            key,
        } => handle_forget(&ctx, OwnerRef::new(owner_type, owner_id), &key),
        Commands::List {
            owner_type,
            owner_id,
        } => handle_list(&ctx, OwnerRef::new(owner_type, owner_id)),
        Commands::Keys {
            owner_type,
            owner_id,
        } => handle_keys(&ctx, OwnerRef::new(owner_type, owner_id)),
        Commands::Find {
            owner_type,
            key,
            op,
            value,
        } => handle_find(&ctx, &owner_type, &key, op, &value),
        Commands::FindIn {
            owner_type,
            key,
            values,
        } => handle_find_in(&ctx, &owner_type, &key, &values),
        Commands::FindLike {
            owner_type,
            key,
            pattern,
        } => handle_find_like(&ctx, &owner_type, &key, &pattern),
        Commands::Purge {
            owner_type,
            owner_id,
        } => handle_purge(&ctx, OwnerRef::new(owner_type, owner_id)),
    }
}

fn init_context(cli: &Cli, config: &MetaConfig) -> Result<AppContext> {
    let locales = config.locale_set()?;
    if let Some(locale) = &cli.locale {
        if !locales.contains(locale) {
            return Err(MetaError::Config(format!(
                "locale '{}' is not one of the supported locales ({})",
                locale,
                locales.codes().join(", ")
            )));
        }
    }

    let database = cli.db.clone().unwrap_or_else(|| config.database.clone());
    let store = SqliteStore::open(&database)?;

    Ok(AppContext {
        meta: MetaAttachment::new(store, MemoryCache::new(), locales),
        locale: cli.locale.clone(),
    })
}

/// Read a command line value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> MetaValue {
    serde_json::from_str::<Value>(raw)
        .map(MetaValue::from)
        .unwrap_or_else(|_| MetaValue::String(raw.to_string()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn owner_ids(owners: Vec<OwnerRef>) -> Vec<String> {
    owners.into_iter().map(|owner| owner.id).collect()
}

fn handle_set(
    ctx: &AppContext,
    owner: OwnerRef,
    key: &str,
    raw: &str,
    as_type: Option<TypeTag>,
) -> Result<()> {
    let value = parse_value(raw);
    let record = match as_type {
        Some(tag) => ctx.meta.set_meta_as(&owner, key, tag, value, ctx.locale())?,
        None => ctx.meta.set_meta(&owner, key, value, ctx.locale())?,
    };

    let stored = ctx.meta.codec().decode(&record, ctx.locale());
    print_json(&json!({
        "owner": owner.to_string(),
        "key": record.key,
        "type": record.type_tag(),
        "value": stored.to_json(),
    }))
}

fn handle_get(ctx: &AppContext, owner: OwnerRef, key: &str, default: Option<String>) -> Result<()> {
    let default = default.as_deref().map(parse_value).unwrap_or_default();
    let value = ctx.meta.get_meta_or(&owner, key, default, ctx.locale())?;
    print_json(&value.to_json())
}

fn handle_forget(ctx: &AppContext, owner: OwnerRef, key: &str) -> Result<()> {
    let removed = ctx.meta.forget_meta(&owner, key)?;
    print_json(&json!({ "removed": removed }))
}

fn handle_list(ctx: &AppContext, owner: OwnerRef) -> Result<()> {
    let values: serde_json::Map<String, Value> = ctx
        .meta
        .all_meta(&owner, ctx.locale())?
        .into_iter()
        .map(|(key, value)| (key, value.to_json()))
        .collect();
    print_json(&values)
}

fn handle_keys(ctx: &AppContext, owner: OwnerRef) -> Result<()> {
    print_json(&ctx.meta.meta_keys(&owner)?)
}

fn handle_find(ctx: &AppContext, kind: &str, key: &str, op: FilterOp, raw: &str) -> Result<()> {
    let owners = ctx.meta.where_meta(kind, key, op, parse_value(raw))?;
    print_json(&owner_ids(owners))
}

fn handle_find_in(ctx: &AppContext, kind: &str, key: &str, values: &[String]) -> Result<()> {
    let values = values.iter().map(|raw| parse_value(raw));
    let owners = ctx.meta.where_meta_in(kind, key, values)?;
    print_json(&owner_ids(owners))
}

fn handle_find_like(ctx: &AppContext, kind: &str, key: &str, pattern: &str) -> Result<()> {
    let owners = ctx.meta.where_meta_like(kind, key, pattern)?;
    print_json(&owner_ids(owners))
}

fn handle_purge(ctx: &AppContext, owner: OwnerRef) -> Result<()> {
    let removed = ctx.meta.purge_owner(&owner)?;
    print_json(&json!({ "removed": removed }))
}
