mod common;
use common::*;

use bson::{Bson, doc};
use shale_db::query::{Update, UpdateOp};
use shale_db::{DbError, FindOneAndUpdateOptions, ReturnDocument, UpdateOptions, UpdateResult};

// ── Update tests ────────────────────────────────────────────────

#[test]
fn update_one_merge() {
    let store = temp_store();
    let model = accounts(&store);
    let result = model
        .update_one(doc! { "id": "acct-1" }, doc! { "status": "rejected" }, UpdateOptions::default())
        .unwrap();
    assert_eq!(result.matched_count, 1);
    assert_eq!(result.modified_count, 1);

    let doc = model.find_by_id("acct-1").unwrap().unwrap();
    assert_eq!(doc.get_str("status").unwrap(), "rejected");
    assert_eq!(doc.get_str("name").unwrap(), "Acme Corp"); // unchanged
}

#[test]
fn update_one_no_match() {
    let store = temp_store();
    let result = accounts(&store)
        .update_one(doc! { "id": "missing" }, doc! { "$set": { "a": 1 } }, UpdateOptions::default())
        .unwrap();
    assert_eq!(
        result,
        UpdateResult {
            acknowledged: true,
            ..UpdateResult::default()
        }
    );
}

#[test]
fn update_refreshes_updated_at_only() {
    let store = temp_store();
    let model = accounts(&store);
    let before = model.find_by_id("acct-2").unwrap().unwrap();
    model
        .update_one(doc! { "id": "acct-2" }, Update::set("status", "active"), UpdateOptions::default())
        .unwrap();
    let after = model.find_by_id("acct-2").unwrap().unwrap();
    assert_eq!(after.get("createdAt"), before.get("createdAt"));
    assert!(after.get_datetime("updatedAt").unwrap() >= before.get_datetime("updatedAt").unwrap());
}

#[test]
fn update_many_counts_every_match() {
    let store = temp_store();
    let model = accounts(&store);
    let result = model
        .update_many(
            doc! { "status": "active" },
            doc! { "$inc": { "visits": 1 }, "$push": { "tags": "reviewed" } },
            UpdateOptions::default(),
        )
        .unwrap();
    assert_eq!(result.matched_count, 3);
    assert_eq!(result.modified_count, 3);
    assert_eq!(model.count_documents(doc! { "visits": 1 }).unwrap(), 3);
    assert_eq!(model.count_documents(doc! { "tags": "reviewed" }).unwrap(), 3);
}

#[test]
fn update_many_is_all_or_nothing() {
    let store = temp_store();
    let model = accounts(&store);
    model
        .update_one(doc! { "id": "acct-4" }, doc! { "$set": { "score": "high" } }, UpdateOptions::default())
        .unwrap();
    model
        .update_one(doc! { "id": "acct-1" }, doc! { "$set": { "score": 1 } }, UpdateOptions::default())
        .unwrap();

    let err = model
        .update_many(doc! { "status": "active" }, doc! { "$inc": { "score": 1 } }, UpdateOptions::default())
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidUpdate(_)));
    let acct1 = model.find_by_id("acct-1").unwrap().unwrap();
    assert_eq!(acct1.get_i32("score").unwrap(), 1);
}

#[test]
fn upsert_seeds_from_equality_fields() {
    let store = temp_store();
    let model = payments(&store);
    let filter = doc! { "userId": "u1", "kind": "fee", "amount": { "$gte": 0 } };
    let update = doc! { "$inc": { "amount": 5 }, "$setOnInsert": { "origin": "upsert" } };

    let first = model.update_one(filter.clone(), update.clone(), UpdateOptions::upsert()).unwrap();
    assert_eq!(first.upserted_count, 1);
    assert_eq!(first.matched_count, 0);
    let id = first.upserted_id.clone().unwrap();

    let doc = model.find_by_id(&id).unwrap().unwrap();
    assert_eq!(doc.get_str("userId").unwrap(), "u1");
    assert_eq!(doc.get_str("kind").unwrap(), "fee");
    assert_eq!(doc.get_i32("amount").unwrap(), 5);
    assert_eq!(doc.get_str("origin").unwrap(), "upsert");
    assert!(doc.get_datetime("createdAt").is_ok());

    let second = model.update_one(filter, update, UpdateOptions::upsert()).unwrap();
    assert_eq!(second.matched_count, 1);
    assert_eq!(second.upserted_count, 0);
    assert_eq!(model.count_documents(doc! {}).unwrap(), 1);
    let doc = model.find_by_id(&id).unwrap().unwrap();
    assert_eq!(doc.get_i32("amount").unwrap(), 10);
    assert_eq!(doc.get_str("origin").unwrap(), "upsert");
}

#[test]
fn upsert_adopts_idempotent_duplicate() {
    let store = temp_store();
    let model = payments(&store);
    let existing = model
        .create(doc! { "type": "credit", "sourceTxId": "tx-1", "receiverUserId": "u1", "amount": 10 })
        .unwrap();

    // The filter does not match (amount differs), but the seeded document
    // carries the same idempotency key.
    let result = model
        .update_one(
            doc! { "type": "credit", "sourceTxId": "tx-1", "receiverUserId": "u1", "amount": 99 },
            doc! { "$set": { "note": "retry" } },
            UpdateOptions::upsert(),
        )
        .unwrap();
    assert_eq!(result.upserted_count, 0);
    assert_eq!(result.upserted_id, existing.id());
    assert_eq!(model.count_documents(doc! {}).unwrap(), 1);
}

#[test]
fn find_one_and_update_returns_after_by_default() {
    let store = temp_store();
    let model = accounts(&store);
    let doc = model
        .find_one_and_update(
            doc! { "id": "acct-1" },
            doc! { "$inc": { "revenue": 1000 } },
            FindOneAndUpdateOptions::default(),
        )
        .unwrap()
        .unwrap();
    assert_eq!(doc.get_f64("revenue").unwrap(), 51000.0);
}

#[test]
fn find_one_and_update_before() {
    let store = temp_store();
    let model = accounts(&store);
    let doc = model
        .find_one_and_update(
            doc! { "id": "acct-1" },
            doc! { "$set": { "status": "snoozed" } },
            FindOneAndUpdateOptions {
                return_document: ReturnDocument::Before,
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();
    assert_eq!(doc.get_str("status").unwrap(), "active");
    let stored = model.find_by_id("acct-1").unwrap().unwrap();
    assert_eq!(stored.get_str("status").unwrap(), "snoozed");
}

#[test]
fn find_one_and_update_no_match_without_upsert() {
    let store = temp_store();
    let found = accounts(&store)
        .find_one_and_update(doc! { "id": "nope" }, doc! { "a": 1 }, FindOneAndUpdateOptions::default())
        .unwrap();
    assert!(found.is_none());
}

#[test]
fn find_one_and_update_upsert() {
    let store = temp_store();
    let model = accounts(&store);
    let doc = model
        .find_one_and_update(
            doc! { "id": "acct-9", "name": "Hooli" },
            doc! { "$set": { "status": "active" } },
            FindOneAndUpdateOptions {
                upsert: true,
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();
    assert_eq!(doc.id().as_deref(), Some("acct-9"));
    assert_eq!(doc.get_str("name").unwrap(), "Hooli");
    assert_eq!(model.count_documents(doc! {}).unwrap(), 6);
}

#[test]
fn find_by_id_and_update() {
    let store = temp_store();
    let model = accounts(&store);
    let doc = model
        .find_by_id_and_update("acct-3", Update::inc("revenue", 7).and(UpdateOp::AddToSet("tags".into(), Bson::from("churning"))))
        .unwrap()
        .unwrap();
    assert_eq!(doc.get_i32("revenue").unwrap(), 7);
    assert_eq!(doc.get_array("tags").unwrap().len(), 1);
    assert!(model.find_by_id_and_update("nope", doc! { "a": 1 }).unwrap().is_none());
}

#[test]
fn identity_cannot_be_overwritten() {
    let store = temp_store();
    let model = accounts(&store);
    model
        .update_one(doc! { "id": "acct-1" }, doc! { "id": "acct-x", "$set": { "id": "acct-y" } }, UpdateOptions::default())
        .unwrap();
    assert!(model.find_by_id("acct-1").unwrap().is_some());
    assert!(model.find_by_id("acct-y").unwrap().is_none());
}

#[test]
fn inc_on_string_fails_without_partial_write() {
    let store = temp_store();
    let model = accounts(&store);
    let err = model
        .update_one(
            doc! { "id": "acct-1" },
            doc! { "$set": { "status": "touched" }, "$inc": { "name": 1 } },
            UpdateOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidUpdate(_)));
    let doc = model.find_by_id("acct-1").unwrap().unwrap();
    assert_eq!(doc.get_str("status").unwrap(), "active");
}

#[test]
fn ignored_operators_do_not_count_as_modified() {
    let store = temp_store();
    let model = accounts(&store);
    let before = model.find_by_id("acct-1").unwrap().unwrap();

    let result = model
        .update_one(doc! { "id": "acct-1" }, doc! { "$unset": { "tags": "" } }, UpdateOptions::default())
        .unwrap();
    assert_eq!(result.matched_count, 1);
    assert_eq!(result.modified_count, 0);

    let after = model.find_by_id("acct-1").unwrap().unwrap();
    assert_eq!(after.get("tags"), before.get("tags"));
    assert!(after.get_datetime("updatedAt").unwrap() >= before.get_datetime("updatedAt").unwrap());
}

#[test]
fn update_many_counts_only_changed_documents() {
    let store = temp_store();
    let model = accounts(&store);
    let result = model
        .update_many(doc! { "status": "active" }, Update::set("status", "active"), UpdateOptions::default())
        .unwrap();
    assert_eq!(result.matched_count, 3);
    assert_eq!(result.modified_count, 0);

    let result = model
        .update_many(
            doc! {},
            Update::Operators(vec![UpdateOp::Set("status".into(), Bson::from("active"))]),
            UpdateOptions::default(),
        )
        .unwrap();
    assert_eq!(result.matched_count, 5);
    assert_eq!(result.modified_count, 2);
}

#[test]
fn delete_one_and_many() {
    let store = temp_store();
    let model = accounts(&store);
    let one = model.delete_one(doc! { "status": "active" }).unwrap();
    assert_eq!(one.deleted_count, 1);
    assert!(model.find_by_id("acct-1").unwrap().is_none());

    let many = model.delete_many(doc! { "status": "active" }).unwrap();
    assert_eq!(many.deleted_count, 2);
    assert_eq!(model.count_documents(doc! {}).unwrap(), 2);

    let none = model.delete_many(doc! { "status": "active" }).unwrap();
    assert_eq!(none.deleted_count, 0);
    assert!(none.acknowledged);
}
