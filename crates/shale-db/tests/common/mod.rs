#![allow(dead_code)]

use bson::{Document, doc};
use shale_db::{CollectionConfig, Model, Store, StoreConfig};

pub const COLLECTION: &str = "accounts";
pub const USERS: &str = "users";
pub const PAYMENTS: &str = "payments";

/// Five seed accounts. `acct-3` has no `revenue` and `acct-5` a null one.
pub fn seed_accounts() -> Vec<Document> {
    vec![
        doc! { "id": "acct-1", "name": "Acme Corp", "revenue": 50000.0, "status": "active", "tags": ["enterprise"] },
        doc! { "id": "acct-2", "name": "Globex", "revenue": 80000.0, "status": "snoozed", "tags": [] },
        doc! { "id": "acct-3", "name": "Initech", "status": "rejected", "tags": ["churning"] },
        doc! { "id": "acct-4", "name": "Umbrella", "revenue": 95000.0, "status": "active", "tags": ["enterprise", "high_value"] },
        doc! { "id": "acct-5", "name": "Stark Industries", "revenue": null, "status": "active" },
    ]
}

pub fn seed_users() -> Vec<Document> {
    vec![
        doc! { "id": "u1", "name": "Ada", "email": "ada@example.com", "tier": "gold" },
        doc! { "id": "u2", "name": "Grace", "email": "grace@example.com", "tier": "silver" },
    ]
}

pub fn config() -> StoreConfig {
    StoreConfig::new()
        .collection(CollectionConfig::new(COLLECTION).seed(seed_accounts()))
        .collection(CollectionConfig::new(USERS).seed(seed_users()))
        .collection(CollectionConfig::new(PAYMENTS).relation("userId", USERS))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn temp_store() -> Store {
    init_tracing();
    Store::new(config()).unwrap()
}

pub fn accounts(store: &Store) -> Model {
    store.model(COLLECTION).unwrap()
}

pub fn payments(store: &Store) -> Model {
    store.model(PAYMENTS).unwrap()
}

pub fn ids(docs: &[Document]) -> Vec<String> {
    docs.iter()
        .map(|d| d.get_str("id").unwrap().to_string())
        .collect()
}
