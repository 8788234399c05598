use std::collections::{BTreeMap, HashSet};

use bson::Document;
use serde::{Deserialize, Serialize};

use crate::error::DbError;
use crate::idempotency::IdempotencyKey;

/// Declares the collections a store exposes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
    /// Applies to every collection without its own override.
    #[serde(default)]
    pub idempotency_key: IdempotencyKey,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionConfig {
    pub name: String,
    /// Reference field path to the collection it points at, used by populate.
    #[serde(default)]
    pub relations: BTreeMap<String, String>,
    /// Documents inserted when the store is first touched (and after a reset).
    #[serde(default)]
    pub seed: Vec<Document>,
    #[serde(default)]
    pub idempotency_key: Option<IdempotencyKey>,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(mut self, collection: CollectionConfig) -> Self {
        self.collections.push(collection);
        self
    }

    pub fn idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = key;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, DbError> {
        Ok(serde_json::from_str(json)?)
    }

    pub(crate) fn find(&self, name: &str) -> Option<&CollectionConfig> {
        self.collections.iter().find(|c| c.name == name)
    }

    pub(crate) fn key_for(&self, name: &str) -> &IdempotencyKey {
        self.find(name)
            .and_then(|c| c.idempotency_key.as_ref())
            .unwrap_or(&self.idempotency_key)
    }

    /// Names must be unique and non-empty, and every relation must point at
    /// a declared collection.
    pub(crate) fn validate(&self) -> Result<(), DbError> {
        let mut seen = HashSet::new();
        for collection in &self.collections {
            if collection.name.is_empty() {
                return Err(DbError::InvalidConfig("collection name is empty".into()));
            }
            if !seen.insert(collection.name.as_str()) {
                return Err(DbError::InvalidConfig(format!(
                    "collection '{}' declared twice",
                    collection.name
                )));
            }
        }
        for collection in &self.collections {
            for (field, target) in &collection.relations {
                if !seen.contains(target.as_str()) {
                    return Err(DbError::InvalidConfig(format!(
                        "relation {}.{field} targets unknown collection '{target}'",
                        collection.name
                    )));
                }
            }
        }
        Ok(())
    }
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn relation(mut self, field: impl Into<String>, target: impl Into<String>) -> Self {
        self.relations.insert(field.into(), target.into());
        self
    }

    pub fn seed(mut self, docs: Vec<Document>) -> Self {
        self.seed = docs;
        self
    }

    pub fn idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_with_defaults() {
        let config = StoreConfig::from_json(
            r#"{
                "collections": [
                    { "name": "users", "seed": [{ "id": "u1", "name": "Ada" }] },
                    { "name": "payments", "relations": { "userId": "users" },
                      "idempotencyKey": ["sourceTxId"] }
                ]
            }"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.collections.len(), 2);
        assert_eq!(config.collections[0].seed.len(), 1);
        assert_eq!(config.key_for("users"), &IdempotencyKey::default());
        assert_eq!(config.key_for("payments").fields(), ["sourceTxId"]);
    }

    #[test]
    fn rejects_dangling_relation() {
        let config = StoreConfig::new()
            .collection(CollectionConfig::new("payments").relation("userId", "users"));
        assert!(matches!(config.validate(), Err(DbError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_duplicate_names() {
        let config = StoreConfig::new()
            .collection(CollectionConfig::new("users"))
            .collection(CollectionConfig::new("users"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        assert!(matches!(
            StoreConfig::from_json("{ nope"),
            Err(DbError::Serialization(_))
        ));
    }
}
