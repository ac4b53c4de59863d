use chrono::{TimeZone, Utc};
use polymeta::attachment::MetaAttachment;
use polymeta::cache::MemoryCache;
use polymeta::config::LocaleSet;
use polymeta::filter::FilterOp;
use polymeta::model::{MetaValue, OwnerRef, TypeTag};
use polymeta::owner::OwnerRegistry;
use polymeta::store::{InMemoryStore, MetaStore, SqliteStore};
use serde_json::json;
use tempfile::TempDir;

fn locales() -> LocaleSet {
    LocaleSet::new(["en", "ar", "fr"], "en").unwrap()
}

fn memory_attachment() -> MetaAttachment<InMemoryStore, MemoryCache> {
    MetaAttachment::new(InMemoryStore::new(), MemoryCache::new(), locales())
}

fn sqlite_attachment(dir: &TempDir) -> MetaAttachment<SqliteStore, MemoryCache> {
    let store = SqliteStore::open(dir.path().join("meta.db")).unwrap();
    MetaAttachment::new(store, MemoryCache::new(), locales())
}

fn article(id: &str) -> OwnerRef {
    OwnerRef::new("article", id)
}

macro_rules! for_each_store {
    ($($name:ident),* $(,)?) => {
        mod in_memory {
            use super::*;
            $(
                #[test]
                fn $name() {
                    super::$name(&memory_attachment());
                }
            )*
        }

        mod sqlite {
            use super::*;
            $(
                #[test]
                fn $name() {
                    let dir = tempfile::tempdir().unwrap();
                    super::$name(&sqlite_attachment(&dir));
                }
            )*
        }
    };
}

for_each_store!(
    number_round_trip,
    high_precision_number_survives,
    translations_per_locale,
    bundle_merges_into_existing_translations,
    boolean_and_date_round_trip,
    json_round_trip,
    set_then_get_sees_new_value,
    forget_falls_back_to_default,
    sync_equals_sequential_sets,
    where_meta_in_scenario,
    where_meta_comparisons,
    where_meta_like_scenario,
    invalidation_spans_all_locales,
    has_meta_only_sees_cached_values,
    unsupported_locale_reads_see_later_writes,
    separator_in_owner_id_and_key_stays_isolated,
    high_precision_predicates_are_exact,
    like_finds_text_inside_translations,
    purge_and_prune,
);

fn number_round_trip<S: MetaStore>(meta: &MetaAttachment<S, MemoryCache>) {
    let record = meta.set_meta(&article("1"), "views", 123, None).unwrap();
    assert_eq!(record.type_tag(), TypeTag::Number);
    assert_eq!(meta.get_meta(&article("1"), "views", None).unwrap(), MetaValue::from(123));

    meta.set_meta(&article("1"), "ratio", 0.25, None).unwrap();
    meta.flush_cache(&article("1")).unwrap();
    let ratio = meta.get_meta(&article("1"), "ratio", None).unwrap();
    assert_eq!(ratio.as_number().and_then(|n| n.as_f64()), Some(0.25));
}

fn high_precision_number_survives<S: MetaStore>(meta: &MetaAttachment<S, MemoryCache>) {
    let digits = "1234567890123456789012345.67890123456789";
    meta.set_meta_as(&article("1"), "balance", TypeTag::Number, digits, None)
        .unwrap();

    let value = meta.get_meta(&article("1"), "balance", None).unwrap();
    assert_eq!(value.as_number().map(|n| n.to_string()).as_deref(), Some(digits));
}

fn translations_per_locale<S: MetaStore>(meta: &MetaAttachment<S, MemoryCache>) {
    let owner = article("1");
    meta.set_meta(
        &owner,
        "title",
        MetaValue::translations([("en", "Hello"), ("ar", "مرحبا")]),
        None,
    )
    .unwrap();

    assert_eq!(meta.get_meta(&owner, "title", Some("en")).unwrap(), MetaValue::from("Hello"));
    assert_eq!(meta.get_meta(&owner, "title", Some("ar")).unwrap(), MetaValue::from("مرحبا"));
    assert_eq!(meta.get_meta(&owner, "title", None).unwrap(), MetaValue::from("Hello"));
    assert_eq!(meta.get_meta(&owner, "title", Some("fr")).unwrap(), MetaValue::Null);
}

fn bundle_merges_into_existing_translations<S: MetaStore>(meta: &MetaAttachment<S, MemoryCache>) {
    let owner = article("1");
    meta.set_meta(&owner, "title", "Hello", None).unwrap();
    meta.set_meta(&owner, "title", MetaValue::translations([("fr", "Bonjour")]), None)
        .unwrap();

    assert_eq!(meta.get_meta(&owner, "title", Some("en")).unwrap(), MetaValue::from("Hello"));
    assert_eq!(meta.get_meta(&owner, "title", Some("fr")).unwrap(), MetaValue::from("Bonjour"));
}

fn boolean_and_date_round_trip<S: MetaStore>(meta: &MetaAttachment<S, MemoryCache>) {
    let owner = article("1");
    let published = Utc.with_ymd_and_hms(2024, 3, 9, 14, 30, 0).unwrap();
    meta.sync_meta(
        &owner,
        [
            ("featured", MetaValue::from(true)),
            ("published_at", MetaValue::from(published)),
        ],
        None,
    )
    .unwrap();
    meta.flush_cache(&owner).unwrap();

    assert_eq!(meta.get_meta(&owner, "featured", None).unwrap(), MetaValue::from(true));
    assert_eq!(
        meta.get_meta(&owner, "published_at", None).unwrap(),
        MetaValue::from(published)
    );

    let record = meta
        .set_meta_as(&owner, "due", TypeTag::Date, "2024-12-31", None)
        .unwrap();
    assert_eq!(record.type_tag(), TypeTag::Date);
    assert_eq!(
        meta.get_meta(&owner, "due", None).unwrap(),
        MetaValue::from(Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap())
    );
}

fn json_round_trip<S: MetaStore>(meta: &MetaAttachment<S, MemoryCache>) {
    let owner = article("1");
    let dims = json!({"width": 640, "height": 480, "tags": ["a", "b"]});
    let record = meta.set_meta(&owner, "dims", dims.clone(), None).unwrap();
    assert_eq!(record.type_tag(), TypeTag::Json);

    meta.flush_cache(&owner).unwrap();
    assert_eq!(meta.get_meta(&owner, "dims", None).unwrap().to_json(), dims);
}

fn set_then_get_sees_new_value<S: MetaStore>(meta: &MetaAttachment<S, MemoryCache>) {
    let owner = article("1");
    meta.set_meta(&owner, "status", "draft", None).unwrap();
    assert_eq!(meta.get_meta(&owner, "status", None).unwrap(), MetaValue::from("draft"));

    meta.set_meta(&owner, "status", "published", None).unwrap();
    assert_eq!(
        meta.get_meta(&owner, "status", None).unwrap(),
        MetaValue::from("published")
    );
}

fn forget_falls_back_to_default<S: MetaStore>(meta: &MetaAttachment<S, MemoryCache>) {
    let owner = article("1");
    meta.set_meta(&owner, "color", "red", None).unwrap();
    meta.get_meta(&owner, "color", None).unwrap();

    assert!(meta.forget_meta(&owner, "color").unwrap());
    assert_eq!(
        meta.get_meta_or(&owner, "color", "none", None).unwrap(),
        MetaValue::from("none")
    );
}

fn sync_equals_sequential_sets<S: MetaStore>(meta: &MetaAttachment<S, MemoryCache>) {
    meta.sync_meta(&article("1"), [("a", 1), ("b", 2)], None).unwrap();
    meta.set_meta(&article("2"), "a", 1, None).unwrap();
    meta.set_meta(&article("2"), "b", 2, None).unwrap();

    assert_eq!(
        meta.all_meta(&article("1"), None).unwrap(),
        meta.all_meta(&article("2"), None).unwrap()
    );
}

fn where_meta_in_scenario<S: MetaStore>(meta: &MetaAttachment<S, MemoryCache>) {
    meta.set_meta(&article("1"), "status", "draft", None).unwrap();
    meta.set_meta(&article("2"), "status", "published", None).unwrap();
    meta.set_meta(&article("3"), "status", "archived", None).unwrap();
    meta.set_meta(&article("4"), "state", "draft", None).unwrap();

    assert_eq!(
        meta.where_meta_in("article", "status", ["draft", "published"])
            .unwrap(),
        vec![article("1"), article("2")]
    );
    assert!(meta
        .where_meta_in("article", "status", Vec::<MetaValue>::new())
        .unwrap()
        .is_empty());
}

fn where_meta_comparisons<S: MetaStore>(meta: &MetaAttachment<S, MemoryCache>) {
    meta.set_meta(&article("1"), "views", 5, None).unwrap();
    meta.set_meta(&article("2"), "views", 50, None).unwrap();
    meta.set_meta(&article("3"), "views", 500, None).unwrap();
    meta.set_meta(&OwnerRef::new("page", "1"), "views", 500, None)
        .unwrap();

    assert_eq!(
        meta.where_meta("article", "views", FilterOp::Ge, 50).unwrap(),
        vec![article("2"), article("3")]
    );
    assert_eq!(meta.where_meta_eq("article", "views", 5).unwrap(), vec![article("1")]);
    assert!(meta.where_meta_eq("article", "views", "5").unwrap().is_empty());
}

fn where_meta_like_scenario<S: MetaStore>(meta: &MetaAttachment<S, MemoryCache>) {
    meta.set_meta(
        &article("1"),
        "title",
        MetaValue::translations([("en", "Weekly Rust digest"), ("fr", "Résumé Rust")]),
        None,
    )
    .unwrap();
    meta.set_meta(&article("2"), "title", "Gardening", None).unwrap();

    assert_eq!(
        meta.where_meta_like("article", "title", "%rust%").unwrap(),
        vec![article("1")]
    );
    assert_eq!(
        meta.where_meta_like("article", "title", "garden___").unwrap(),
        vec![article("2")]
    );
}

fn invalidation_spans_all_locales<S: MetaStore>(meta: &MetaAttachment<S, MemoryCache>) {
    let owner = article("1");
    meta.set_meta(&owner, "title", MetaValue::translations([("en", "A"), ("fr", "A")]), None)
        .unwrap();
    for locale in ["en", "ar", "fr"] {
        meta.get_meta(&owner, "title", Some(locale)).unwrap();
    }

    meta.set_meta(&owner, "title", "B", Some("ar")).unwrap();
    for locale in ["en", "ar", "fr"] {
        assert!(!meta.has_meta(&owner, "title", Some(locale)).unwrap());
    }
    assert!(meta.cache().store().is_empty());
    assert_eq!(meta.get_meta(&owner, "title", Some("ar")).unwrap(), MetaValue::from("B"));
}

fn has_meta_only_sees_cached_values<S: MetaStore>(meta: &MetaAttachment<S, MemoryCache>) {
    let owner = article("1");
    meta.set_meta(&owner, "views", 1, None).unwrap();

    assert!(!meta.has_meta(&owner, "views", None).unwrap());
    assert!(meta.exists_meta(&owner, "views").unwrap());

    meta.get_meta(&owner, "views", None).unwrap();
    assert!(meta.has_meta(&owner, "views", None).unwrap());
}

fn unsupported_locale_reads_see_later_writes<S: MetaStore>(meta: &MetaAttachment<S, MemoryCache>) {
    let owner = article("1");
    meta.set_meta(&owner, "status", 1, None).unwrap();
    assert_eq!(meta.get_meta(&owner, "status", Some("de")).unwrap(), MetaValue::from(1));

    meta.set_meta(&owner, "status", 2, None).unwrap();
    assert!(!meta.has_meta(&owner, "status", Some("de")).unwrap());
    assert_eq!(meta.get_meta(&owner, "status", Some("de")).unwrap(), MetaValue::from(2));

    meta.set_meta(&owner, "title", "Hallo", Some("de")).unwrap();
    assert_eq!(meta.get_meta(&owner, "title", Some("en")).unwrap(), MetaValue::from("Hallo"));
}

fn separator_in_owner_id_and_key_stays_isolated<S: MetaStore>(
    meta: &MetaAttachment<S, MemoryCache>,
) {
    meta.set_meta(&article("1"), "seo:title", "A's title", None)
        .unwrap();
    assert_eq!(
        meta.get_meta(&article("1"), "seo:title", None).unwrap(),
        MetaValue::from("A's title")
    );

    let nested = article("1:seo");
    assert!(!meta.exists_meta(&nested, "title").unwrap());
    assert_eq!(meta.get_meta(&nested, "title", None).unwrap(), MetaValue::Null);

    meta.set_meta(&nested, "title", "Nested", None).unwrap();
    assert_eq!(
        meta.get_meta(&article("1"), "seo:title", None).unwrap(),
        MetaValue::from("A's title")
    );
}

fn high_precision_predicates_are_exact<S: MetaStore>(meta: &MetaAttachment<S, MemoryCache>) {
    meta.set_meta_as(
        &article("1"),
        "balance",
        TypeTag::Number,
        "12345678901234567890.1234567890123456789",
        None,
    )
    .unwrap();
    let near = polymeta::codec::parse_number("12345678901234567890.1234567890123456788").unwrap();

    assert!(meta.where_meta_eq("article", "balance", near.clone()).unwrap().is_empty());
    assert_eq!(
        meta.where_meta("article", "balance", FilterOp::Gt, near.clone()).unwrap(),
        vec![article("1")]
    );
    assert!(meta
        .where_meta("article", "balance", FilterOp::Le, near)
        .unwrap()
        .is_empty());
}

fn like_finds_text_inside_translations<S: MetaStore>(meta: &MetaAttachment<S, MemoryCache>) {
    meta.set_meta(&article("1"), "title", MetaValue::translations([("en", "Rust news")]), None)
        .unwrap();

    assert_eq!(
        meta.where_meta_like("article", "title", "Rust").unwrap(),
        vec![article("1")]
    );
    assert!(meta.where_meta_like("article", "title", "Go").unwrap().is_empty());
}

fn purge_and_prune<S: MetaStore>(meta: &MetaAttachment<S, MemoryCache>) {
    meta.sync_meta(&article("1"), [("a", 1), ("b", 2)], None).unwrap();
    meta.set_meta(&article("2"), "a", 1, None).unwrap();
    meta.set_meta(&OwnerRef::new("user", "7"), "a", 1, None).unwrap();

    assert_eq!(meta.purge_owner(&article("1")).unwrap(), 2);
    assert!(meta.meta_keys(&article("1")).unwrap().is_empty());

    let mut registry = OwnerRegistry::new();
    registry.register("article", |_: &str| false);
    let report = meta.prune_orphans(&registry).unwrap();

    assert_eq!(report.pruned_owners, vec![article("2")]);
    assert_eq!(report.removed_records, 1);
    assert!(report.skipped_kinds.contains("user"));
    assert_eq!(meta.store().owners().unwrap(), vec![OwnerRef::new("user", "7")]);
}
