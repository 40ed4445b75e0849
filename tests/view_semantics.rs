//! View Semantics Tests
//!
//! Recompute on every save and delete, latest/history ordering, skipped
//! results, change kinds and persistence of history across reopen.

use std::sync::{Arc, Mutex};

use docsql::{ChangeKind, Database, DocumentMapper, FieldDef, Query, Schema, StoreConfig, ViewContext};
use serde_json::{json, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn product_schema() -> Schema {
    Schema::new("product")
        .field(FieldDef::required("name"))
        .field(FieldDef::optional("price").with_default(json!(0)))
        .index("name")
}

fn mean_price(ctx: &ViewContext<'_>) -> Option<Value> {
    let prices: Vec<f64> = ctx.values("price").filter_map(Value::as_f64).collect();
    if prices.is_empty() {
        return Some(json!(0.0));
    }
    Some(json!(prices.iter().sum::<f64>() / prices.len() as f64))
}

fn setup() -> (Database, DocumentMapper) {
    let db = Database::open_in_memory().unwrap();
    let products = db.register(product_schema()).unwrap();
    (db, products)
}

fn add(products: &DocumentMapper, name: &str, price: i64) -> docsql::Document {
    let mut doc = products
        .construct(json!({"name": name, "price": price}))
        .unwrap();
    products.save(&mut doc).unwrap();
    doc
}

fn history(db: &Database, owner: &str, view: &str) -> Vec<Value> {
    db.view(owner, view)
        .history()
        .unwrap()
        .map(Result::unwrap)
        .collect()
}

// =============================================================================
// Running Mean Scenario
// =============================================================================

/// Five prices 0..4: latest is 2.0, history newest first.
#[test]
fn test_running_mean_latest_and_history() {
    let (db, products) = setup();
    let mean = db.register_view("product", "mean_price", mean_price).unwrap();

    for price in 0..5 {
        add(&products, &format!("item-{}", price), price);
    }

    assert_eq!(mean.latest().unwrap(), Some(json!(2.0)));
    assert_eq!(
        history(&db, "product", "mean_price"),
        vec![json!(2.0), json!(1.5), json!(1.0), json!(0.5), json!(0.0)]
    );
}

/// No result persisted before the first write.
#[test]
fn test_latest_absent_before_writes() {
    let (db, _products) = setup();
    let mean = db.register_view("product", "mean_price", mean_price).unwrap();

    assert_eq!(mean.latest().unwrap(), None);
    assert_eq!(mean.history().unwrap().len(), 0);
}

// =============================================================================
// Skipped Results
// =============================================================================

/// Returning None leaves history untouched.
#[test]
fn test_none_result_is_not_persisted() {
    let (db, products) = setup();
    db.register_view("product", "expensive_count", |ctx| {
        let count = ctx
            .values("price")
            .filter(|p| p.as_i64().unwrap_or_default() >= 10)
            .count();
        (count > 0).then(|| json!(count))
    })
    .unwrap();

    add(&products, "cheap", 1);
    assert!(history(&db, "product", "expensive_count").is_empty());

    add(&products, "pricey", 20);
    add(&products, "cheap again", 2);
    assert_eq!(history(&db, "product", "expensive_count"), vec![json!(1), json!(1)]);

    let metrics = db.metrics();
    assert_eq!(metrics.views_recomputed, 3);
    assert_eq!(metrics.view_results_persisted, 2);
}

// =============================================================================
// Context Contents
// =============================================================================

/// Callbacks see the change kind and the trigger of every mutation.
#[test]
fn test_change_kinds_and_trigger() {
    let (db, products) = setup();
    let seen: Arc<Mutex<Vec<(ChangeKind, String, usize)>>> = Arc::default();
    let sink = Arc::clone(&seen);
    db.register_view("product", "audit", move |ctx| {
        let name = ctx.trigger.get("name").and_then(Value::as_str).unwrap_or_default();
        sink.lock()
            .unwrap()
            .push((ctx.change, name.to_string(), ctx.documents.len()));
        None
    })
    .unwrap();

    let mut doc = add(&products, "lamp", 10);
    doc.set("price", 12);
    products.save(&mut doc).unwrap();
    products.delete(&mut doc).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            (ChangeKind::Created, "lamp".to_string(), 1),
            (ChangeKind::Updated, "lamp".to_string(), 1),
            (ChangeKind::Deleted, "lamp".to_string(), 0),
        ]
    );
}

/// The previous stored result is handed to the next recompute.
#[test]
fn test_previous_result_is_passed() {
    let (db, products) = setup();
    let counter = db
        .register_view("product", "writes", |ctx| {
            let previous = ctx.previous.and_then(Value::as_i64).unwrap_or(0);
            Some(json!(previous + 1))
        })
        .unwrap();

    let mut doc = add(&products, "lamp", 10);
    add(&products, "desk", 50);
    products.delete(&mut doc).unwrap();

    assert_eq!(counter.latest().unwrap(), Some(json!(3)));
    assert_eq!(
        history(&db, "product", "writes"),
        vec![json!(3), json!(2), json!(1)]
    );
}

/// Snapshots are newest first and reflect the mutation being recorded.
#[test]
fn test_snapshot_order_and_delete_recompute() {
    let (db, products) = setup();
    let names = db
        .register_view("product", "names", |ctx| {
            let names: Vec<Value> = ctx.values("name").cloned().collect();
            Some(Value::Array(names))
        })
        .unwrap();

    add(&products, "a", 1);
    let mut b = add(&products, "b", 2);
    add(&products, "c", 3);
    assert_eq!(names.latest().unwrap(), Some(json!(["c", "b", "a"])));

    products.delete(&mut b).unwrap();
    assert_eq!(names.latest().unwrap(), Some(json!(["c", "a"])));
}

/// Removing by id recomputes views with the stored document as trigger.
#[test]
fn test_remove_by_id_recomputes_views() {
    let (db, products) = setup();
    let seen: Arc<Mutex<Vec<(ChangeKind, String)>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let count = db
        .register_view("product", "count", move |ctx| {
            let name = ctx.trigger.get("name").and_then(Value::as_str).unwrap_or_default();
            sink.lock().unwrap().push((ctx.change, name.to_string()));
            Some(json!(ctx.documents.len()))
        })
        .unwrap();

    let lamp = add(&products, "lamp", 10);
    add(&products, "desk", 50);
    products.remove(lamp.id().unwrap()).unwrap();

    assert_eq!(count.latest().unwrap(), Some(json!(1)));
    assert_eq!(
        seen.lock().unwrap().last(),
        Some(&(ChangeKind::Deleted, "lamp".to_string()))
    );
}

// =============================================================================
// Misbehaving Callbacks
// =============================================================================

/// A panicking callback rolls its write back and leaves the database usable.
#[test]
fn test_panicking_view_leaves_database_usable() {
    let (db, products) = setup();
    db.register_view("product", "fragile", |ctx| {
        if ctx.documents.len() == 2 {
            panic!("view cannot handle two products");
        }
        Some(json!(ctx.documents.len()))
    })
    .unwrap();

    let mut lamp = add(&products, "lamp", 10);
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut desk = products
            .construct(json!({"name": "desk", "price": 50}))
            .unwrap();
        products.save(&mut desk)
    }));
    assert!(outcome.is_err());

    assert_eq!(products.count().unwrap(), 1);
    assert_eq!(db.view("product", "fragile").latest().unwrap(), Some(json!(1)));

    let orders = db
        .register(Schema::new("order").field(FieldDef::required("total")))
        .unwrap();
    let mut order = orders.construct(json!({"total": 60})).unwrap();
    orders.save(&mut order).unwrap();

    products.delete(&mut lamp).unwrap();
    assert_eq!(
        history(&db, "product", "fragile"),
        vec![json!(0), json!(1)]
    );
}

/// A callback that calls back into the database gets an error instead of
/// blocking forever; the write itself still commits.
#[test]
fn test_view_calling_back_into_database_fails_fast() {
    let (db, products) = setup();
    let reader = products.clone();
    let seen: Arc<Mutex<Option<String>>> = Arc::default();
    let sink = Arc::clone(&seen);
    db.register_view("product", "nested", move |_ctx| {
        let outcome = reader.count().map_err(|e| e.code().to_string());
        *sink.lock().unwrap() = outcome.err();
        None
    })
    .unwrap();

    add(&products, "lamp", 10);

    assert_eq!(seen.lock().unwrap().as_deref(), Some("DOCSQL_REENTRANT_ACCESS"));
    assert_eq!(products.count().unwrap(), 1);
}

// =============================================================================
// Registration
// =============================================================================

/// Views on one type run in registration order and do not touch others.
#[test]
fn test_views_scoped_to_owner_type() {
    let (db, products) = setup();
    let orders = db
        .register(Schema::new("order").field(FieldDef::required("total")))
        .unwrap();
    db.register_view("product", "count", |ctx| Some(json!(ctx.documents.len())))
        .unwrap();
    db.register_view("order", "count", |ctx| Some(json!(ctx.documents.len())))
        .unwrap();

    add(&products, "lamp", 10);
    add(&products, "desk", 50);
    let mut order = orders.construct(json!({"total": 60})).unwrap();
    orders.save(&mut order).unwrap();

    assert_eq!(db.view("product", "count").latest().unwrap(), Some(json!(2)));
    assert_eq!(db.view("order", "count").latest().unwrap(), Some(json!(1)));
    assert_eq!(db.views().view_names("product").unwrap(), vec!["count"]);
}

/// The same view name cannot be registered twice on one type.
#[test]
fn test_duplicate_view_rejected() {
    let (db, _products) = setup();
    db.register_view("product", "mean_price", mean_price).unwrap();

    let err = db
        .register_view("product", "mean_price", mean_price)
        .unwrap_err();
    assert_eq!(err.code(), "DOCSQL_DUPLICATE_VIEW");
}

/// View results never show up as documents of the owner type.
#[test]
fn test_results_are_separate_documents() {
    let (db, products) = setup();
    db.register_view("product", "mean_price", mean_price).unwrap();
    add(&products, "lamp", 10);

    assert_eq!(products.count().unwrap(), 1);
    assert_eq!(products.find(Query::All).unwrap().len(), 1);
    assert_eq!(db.views().result_count("product").unwrap(), 1);
}

// =============================================================================
// Persistence
// =============================================================================

/// History survives reopen; a re-registered view appends to it.
#[test]
fn test_history_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shop.db");

    {
        let db = Database::open(StoreConfig::at(&path)).unwrap();
        let products = db.register(product_schema()).unwrap();
        db.register_view("product", "mean_price", mean_price).unwrap();
        add(&products, "a", 0);
        add(&products, "b", 1);
    }

    let db = Database::open(StoreConfig::at(&path)).unwrap();
    assert_eq!(
        history(&db, "product", "mean_price"),
        vec![json!(0.5), json!(0.0)]
    );

    let products = db.register(product_schema()).unwrap();
    db.register_view("product", "mean_price", mean_price).unwrap();
    add(&products, "c", 2);
    assert_eq!(
        db.view("product", "mean_price").latest().unwrap(),
        Some(json!(1.0))
    );
    assert_eq!(history(&db, "product", "mean_price").len(), 3);
}
