/// Cascade tests over a small association graph:
///
///   users 1-1 profiles        (cascade on delete)
///   users 1-n posts           (set null on delete)
///   users n-m flights         (through tickets, junction cascades)
///   orders n-1 customers      (owner holds the key)
use serde_json::json;
use temporadb::{
    Association, CascadeAction, DataType, EntityDescriptor, TemporalDb, TemporalScope, Timestamp,
    Value,
};

fn db() -> TemporalDb {
    let db = TemporalDb::new();
    db.register(
        EntityDescriptor::new("users")
            .with_column("name", DataType::Text)
            .with_association(
                Association::owning_one("profile", "profiles", "user_id")
                    .cascade_on_delete(CascadeAction::Cascade),
            )
            .with_association(
                Association::owning_many("posts", "posts", "user_id")
                    .cascade_on_delete(CascadeAction::SetNull),
            )
            .with_association(Association::many_to_many(
                "flights",
                "flights",
                "user_id",
                Association::junction("tickets", "flight_id")
                    .cascade_on_delete(CascadeAction::Cascade),
            ))
            .with_association(Association::many_through(
                "scheduled_flights",
                "flights",
                "user_id",
                Association::junction("tickets", "flight_id"),
            )),
    )
    .unwrap();
    db.register(
        EntityDescriptor::new("profiles")
            .with_column("user_id", DataType::Integer)
            .with_column("bio", DataType::Text),
    )
    .unwrap();
    db.register(
        EntityDescriptor::new("posts")
            .with_column("user_id", DataType::Integer)
            .with_column("title", DataType::Text),
    )
    .unwrap();
    db.register(EntityDescriptor::new("flights").with_column("number", DataType::Text))
        .unwrap();
    db.register(
        EntityDescriptor::new("tickets")
            .with_column("user_id", DataType::Integer)
            .with_column("flight_id", DataType::Integer)
            .with_unique(vec!["user_id".into(), "flight_id".into()]),
    )
    .unwrap();
    db
}

fn ts(ms: i64) -> Timestamp {
    Timestamp::from_millis(ms)
}

fn seed(db: &TemporalDb) {
    db.save_at(
        "users",
        &json!({
            "name": "ada",
            "profile": { "bio": "pioneer" },
            "posts": [{ "title": "first" }, { "title": "second" }],
            "flights": [{ "number": "AA1" }, { "number": "AA2" }],
        }),
        ts(1_000),
    )
    .unwrap();
}

fn active_starts(db: &TemporalDb, entity: &str) -> Vec<Timestamp> {
    db.query(entity, &TemporalScope::Active, &[])
        .unwrap()
        .iter()
        .map(|r| r.valid_from().unwrap().unwrap())
        .collect()
}

#[test]
fn nested_create_shares_one_instant() {
    let db = db();
    seed(&db);

    for (entity, expected) in [
        ("users", 1),
        ("profiles", 1),
        ("posts", 2),
        ("flights", 2),
        ("tickets", 2),
    ] {
        assert_eq!(
            db.count(entity, &TemporalScope::Active).unwrap(),
            expected,
            "active rows of {entity}"
        );
        for start in active_starts(&db, entity) {
            assert_eq!(start, ts(1_000), "interval start of {entity}");
        }
    }

    // Foreign keys point back at the created owner.
    let post = db.find("posts", &Value::Integer(1)).unwrap().unwrap();
    assert_eq!(post.get("user_id"), Value::Integer(1));
    let ticket = db.find("tickets", &Value::Integer(1)).unwrap().unwrap();
    assert_eq!(ticket.get("user_id"), Value::Integer(1));
    assert_eq!(ticket.get("flight_id"), Value::Integer(1));
}

#[test]
fn update_restamps_the_reachable_graph() {
    let db = db();
    seed(&db);

    db.save_at("users", &json!({ "id": 1, "name": "grace" }), ts(2_000))
        .unwrap();

    // Every active row moved to the new instant...
    for entity in ["users", "profiles", "posts", "flights", "tickets"] {
        for start in active_starts(&db, entity) {
            assert_eq!(start, ts(2_000), "interval start of {entity}");
        }
    }
    // ...and every prior version survived as a snapshot.
    for (entity, expected) in [
        ("users", 1),
        ("profiles", 1),
        ("posts", 2),
        ("flights", 2),
        ("tickets", 2),
    ] {
        assert_eq!(
            db.count(entity, &TemporalScope::OnlyTrashed).unwrap(),
            expected,
            "snapshots of {entity}"
        );
    }
}

#[test]
fn repeated_save_with_keys_writes_nothing() {
    let db = db();
    seed(&db);

    db.save_at(
        "users",
        &json!({
            "id": 1,
            "name": "ada",
            "profile": { "id": 1, "bio": "pioneer" },
            "posts": [
                { "id": 1, "title": "first" },
                { "id": 2, "title": "second" },
            ],
            "flights": [
                { "id": 1, "number": "AA1" },
                { "id": 2, "number": "AA2" },
            ],
        }),
        ts(2_000),
    )
    .unwrap();

    for entity in ["users", "profiles", "posts", "flights", "tickets"] {
        assert_eq!(
            db.count(entity, &TemporalScope::OnlyTrashed).unwrap(),
            0,
            "snapshots of {entity}"
        );
        for start in active_starts(&db, entity) {
            assert_eq!(start, ts(1_000), "interval start of {entity}");
        }
    }
}

#[test]
fn owned_records_are_saved_before_their_owner() {
    let db = TemporalDb::new();
    db.register(EntityDescriptor::new("customers").with_column("name", DataType::Text))
        .unwrap();
    db.register(
        EntityDescriptor::new("orders")
            .with_column("customer_id", DataType::Integer)
            .with_column("total", DataType::Integer)
            .with_association(
                Association::owned_one("customer", "customers", "customer_id")
                    .cascade_on_delete(CascadeAction::Cascade),
            ),
    )
    .unwrap();

    let order = db
        .save_at(
            "orders",
            &json!({ "total": 5, "customer": { "name": "ada" } }),
            ts(1_000),
        )
        .unwrap();

    assert_eq!(order.get("customer_id"), Value::Integer(1));
    let customer = db.find("customers", &Value::Integer(1)).unwrap().unwrap();
    assert_eq!(customer.valid_from().unwrap(), Some(ts(1_000)));

    // Deleting the order takes the customer with it.
    db.delete_at("orders", &order.key(), ts(2_000)).unwrap();
    assert!(db.find("customers", &Value::Integer(1)).unwrap().is_none());
}

#[test]
fn delete_applies_each_policy() {
    let db = db();
    seed(&db);

    db.delete_at("users", &Value::Integer(1), ts(4_000)).unwrap();

    // Cascade: the profile and the junction rows are gone.
    assert!(db.find("users", &Value::Integer(1)).unwrap().is_none());
    assert_eq!(db.count("profiles", &TemporalScope::Active).unwrap(), 0);
    assert_eq!(db.count("tickets", &TemporalScope::Active).unwrap(), 0);

    // Set null: the posts survive, unlinked and restamped.
    let posts = db.query("posts", &TemporalScope::Active, &[]).unwrap();
    assert_eq!(posts.len(), 2);
    for post in &posts {
        assert_eq!(post.get("user_id"), Value::Null);
        assert_eq!(post.valid_from().unwrap(), Some(ts(4_000)));
    }

    // The far side of the junction is untouched.
    assert_eq!(db.count("flights", &TemporalScope::Active).unwrap(), 2);
    for start in active_starts(&db, "flights") {
        assert_eq!(start, ts(1_000));
    }
}

#[test]
fn restore_revives_records_deleted_in_the_same_instant() {
    let db = db();
    seed(&db);
    db.delete_at("users", &Value::Integer(1), ts(4_000)).unwrap();

    let revived = db
        .restore_at("users", &Value::Integer(1), ts(5_000))
        .unwrap()
        .expect("user should be restorable");
    assert_eq!(revived.get("name"), Value::Text("ada".into()));

    // Cascade edges come back, set null edges stay unlinked.
    assert_eq!(db.count("profiles", &TemporalScope::Active).unwrap(), 1);
    assert_eq!(db.count("tickets", &TemporalScope::Active).unwrap(), 2);
    let posts = db.query("posts", &TemporalScope::Active, &[]).unwrap();
    for post in &posts {
        assert_eq!(post.get("user_id"), Value::Null);
    }
}

#[test]
fn empty_payload_unlinks_junction_rows() {
    let db = db();
    seed(&db);

    let user = db
        .save_at("users", &json!({ "id": 1, "flights": [] }), ts(4_000))
        .unwrap();

    assert_eq!(user.valid_from().unwrap(), Some(ts(4_000)));
    assert_eq!(db.count("tickets", &TemporalScope::Active).unwrap(), 0);
    // The flights themselves stay active where they were.
    assert_eq!(db.count("flights", &TemporalScope::Active).unwrap(), 2);
    for start in active_starts(&db, "flights") {
        assert_eq!(start, ts(1_000));
    }
}

#[test]
fn empty_payload_applies_set_null() {
    let db = db();
    seed(&db);

    db.save_at("users", &json!({ "id": 1, "posts": [] }), ts(4_000))
        .unwrap();

    let posts = db.query("posts", &TemporalScope::Active, &[]).unwrap();
    assert_eq!(posts.len(), 2);
    for post in &posts {
        assert_eq!(post.get("user_id"), Value::Null);
    }
}

#[test]
fn nested_keys_match_only_related_records() {
    let db = db();
    seed(&db);

    // A key among the currently linked rows updates that row in place.
    db.save_at(
        "users",
        &json!({ "id": 1, "flights": [{ "id": 1, "number": "AA1-upgraded" }, { "id": 2 }] }),
        ts(2_000),
    )
    .unwrap();
    assert_eq!(db.count("flights", &TemporalScope::Active).unwrap(), 2);
    let flight = db.find("flights", &Value::Integer(1)).unwrap().unwrap();
    assert_eq!(flight.get("number"), Value::Text("AA1-upgraded".into()));

    // A key outside the relation is never relinked from the whole table; the
    // second active row it would open is rejected instead.
    db.save_at("users", &json!({ "name": "bea" }), ts(3_000))
        .unwrap();
    let err = db
        .save_at(
            "users",
            &json!({ "id": 2, "flights": [{ "id": 1 }] }),
            ts(4_000),
        )
        .expect_err("keying an unrelated record must fail");
    assert!(err.is_conflict());
    assert_eq!(db.count("flights", &TemporalScope::Active).unwrap(), 2);
}

#[test]
fn restore_reuses_an_already_active_row() {
    let db = db();
    seed(&db);
    db.delete_at("users", &Value::Integer(1), ts(4_000)).unwrap();

    // The profile comes back on its own before its owner does.
    db.restore_at("profiles", &Value::Integer(1), ts(5_000))
        .unwrap()
        .unwrap();
    db.restore_at("users", &Value::Integer(1), ts(6_000))
        .unwrap()
        .unwrap();

    // One open interval per identity; the owner's restore moved it in place.
    assert_eq!(db.count("profiles", &TemporalScope::Active).unwrap(), 1);
    let profile = db.find("profiles", &Value::Integer(1)).unwrap().unwrap();
    assert_eq!(profile.valid_from().unwrap(), Some(ts(6_000)));
    assert_eq!(profile.get("bio"), Value::Text("pioneer".into()));
    assert_eq!(db.count("tickets", &TemporalScope::Active).unwrap(), 2);
}

#[test]
fn through_associations_read_across_the_junction() {
    let db = db();
    seed(&db);

    let user = db.find("users", &Value::Integer(1)).unwrap().unwrap();
    let flights = db
        .related(&user, "scheduled_flights", &TemporalScope::Active)
        .unwrap();
    assert_eq!(flights.len(), 2);
    assert_eq!(flights[0].get("number"), Value::Text("AA1".into()));

    // Through associations are read only.
    assert!(db
        .save_at(
            "users",
            &json!({ "id": 1, "scheduled_flights": [{ "number": "AA3" }] }),
            ts(2_000),
        )
        .is_err());
}

#[test]
fn restore_or_create_prefers_history() {
    let db = db();
    db.save_at("flights", &json!({ "number": "AA1" }), ts(1_000))
        .unwrap();
    db.delete_at("flights", &Value::Integer(1), ts(2_000)).unwrap();

    let revived = db
        .restore_or_create_at("flights", &json!({ "number": "AA1" }), ts(3_000))
        .unwrap();
    assert_eq!(revived.key(), Value::Integer(1));
    assert_eq!(revived.valid_from().unwrap(), Some(ts(3_000)));

    // An active match is returned as is, nothing new is written.
    let again = db
        .restore_or_create_at("flights", &json!({ "number": "AA1" }), ts(4_000))
        .unwrap();
    assert_eq!(again.key(), Value::Integer(1));
    assert_eq!(again.valid_from().unwrap(), Some(ts(3_000)));

    // No match at all creates a fresh record.
    let fresh = db
        .restore_or_create_at("flights", &json!({ "number": "AA2" }), ts(5_000))
        .unwrap();
    assert_eq!(fresh.key(), Value::Integer(2));
}
