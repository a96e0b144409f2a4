//! Join execution tests.
//!
//! Joins are left-outer: every outer row comes back, with the matching inner
//! rows attached under the joined field name.

use serde_json::json;
use stratadb::{
    CondOp, Database, FieldDef, FieldType, IndexDef, IndexKind, NamespaceDef, Query, QueryBuilder,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn joined_db() -> Database {
    let db = Database::new();
    db.open_namespace(
        NamespaceDef::new("items")
            .field(FieldDef::new("id", FieldType::Int))
            .field(FieldDef::new("location", FieldType::String))
            .index(IndexDef::new("id", IndexKind::Hash).pk())
            .index(IndexDef::new("location", IndexKind::Hash))
            .index(IndexDef {
                name: "prices".into(),
                kind: IndexKind::Joined,
                fields: vec!["prices".into()],
                opts: Default::default(),
            }),
    )
    .unwrap();
    db.open_namespace(
        NamespaceDef::new("prices")
            .field(FieldDef::new("id", FieldType::Int))
            .field(FieldDef::new("location", FieldType::String))
            .field(FieldDef::new("amount", FieldType::Int))
            .index(IndexDef::new("id", IndexKind::Hash).pk())
            .index(IndexDef::new("location", IndexKind::Hash)),
    )
    .unwrap();

    for (i, location) in [(1, "mos"), (2, "spb"), (3, "nowhere")] {
        db.upsert("items", json!({"id": i, "location": location})).unwrap();
    }
    for (i, location, amount) in [
        (10, "mos", 100),
        (11, "mos", 200),
        (12, "spb", 300),
        (13, "other", 400),
    ] {
        db.upsert(
            "prices",
            json!({"id": i, "location": location, "amount": amount}),
        )
        .unwrap();
    }
    db
}

// =============================================================================
// Left-outer join
// =============================================================================

/// Each outer row carries the inner rows whose join field matches.
#[test]
fn test_join_attaches_matching_rows() {
    let db = joined_db();
    let q = QueryBuilder::new("items")
        .sort("id", false)
        .join(
            "prices",
            Query::new("prices"),
            vec![("location".to_string(), "location".to_string())],
        )
        .build();
    let results = db.select(&q).unwrap();
    assert_eq!(results.count(), 3);

    let mos = &results.items()[0].document;
    assert_eq!(mos["prices"].as_array().unwrap().len(), 2);

    let spb = &results.items()[1].document;
    let attached = spb["prices"].as_array().unwrap();
    assert_eq!(attached.len(), 1);
    assert_eq!(attached[0]["amount"], json!(300));

    // left-outer: a row with no partner still comes back, with an empty list
    let nowhere = &results.items()[2].document;
    assert_eq!(nowhere["prices"].as_array().unwrap().len(), 0);
}

/// The inner query's own predicates apply on top of the join binding.
#[test]
fn test_join_inner_predicates() {
    let db = joined_db();
    let inner = QueryBuilder::new("prices")
        .filter("amount", CondOp::Ge, 200)
        .build();
    let q = QueryBuilder::new("items")
        .sort("id", false)
        .join(
            "prices",
            inner,
            vec![("location".to_string(), "location".to_string())],
        )
        .build();
    let results = db.select(&q).unwrap();

    let mos = &results.items()[0].document;
    let attached = mos["prices"].as_array().unwrap();
    assert_eq!(attached.len(), 1);
    assert_eq!(attached[0]["amount"], json!(200));
}

/// Joining through an undeclared attach field is rejected.
#[test]
fn test_join_requires_declared_field() {
    let db = joined_db();
    let q = QueryBuilder::new("items")
        .join(
            "ghost",
            Query::new("prices"),
            vec![("location".to_string(), "location".to_string())],
        )
        .build();
    let err = db.select(&q).unwrap_err();
    assert_eq!(err.kind(), stratadb::ErrorKind::Params);
}
