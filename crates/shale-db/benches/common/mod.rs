#![allow(dead_code)]

use bson::{Document, doc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shale_db::{CollectionConfig, Store, StoreConfig};

// ── Constants ───────────────────────────────────────────────

pub const COLLECTION: &str = "bench";
pub const STATUSES: &[&str] = &["active", "rejected", "snoozed"];
pub const KINDS: &[&str] = &["deposit", "withdrawal", "bonus"];
pub const TAGS: &[&str] = &[
    "renewal_due",
    "high_value",
    "churning",
    "new_customer",
    "enterprise",
];

// ── Helpers ─────────────────────────────────────────────────

/// `n` documents with a fixed seed so runs are comparable.
pub fn generate_docs(n: usize) -> Vec<Document> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..n)
        .map(|i| {
            let day = rng.gen_range(0..30_i64);
            let user = format!("u{}", rng.gen_range(0..200));
            let status = STATUSES[rng.gen_range(0..STATUSES.len())];
            let kind = KINDS[rng.gen_range(0..KINDS.len())];
            let tag = TAGS[rng.gen_range(0..TAGS.len())];
            let amount: i32 = rng.gen_range(1..10_000);
            doc! {
                "id": format!("rec-{i}"),
                "userId": user,
                "status": status,
                "kind": kind,
                "amount": amount,
                "tags": [tag],
                "createdAt": bson::DateTime::from_millis(1_717_200_000_000 + day * 86_400_000),
            }
        })
        .collect()
}

/// A store whose bench collection is seeded with `n` documents.
pub fn seeded_store(n: usize) -> Store {
    let store = Store::new(
        StoreConfig::new().collection(CollectionConfig::new(COLLECTION).seed(generate_docs(n))),
    )
    .unwrap();
    // Force seeding outside the measured loop.
    store.model(COLLECTION).unwrap().count_documents(doc! {}).unwrap();
    store
}
