use bson::oid::ObjectId;
use bson::{Bson, Document};
use imbl::Vector;
use shale_query::Filter;
use tracing::info;

use crate::error::DbError;
use crate::idempotency::IdempotencyKey;
use crate::matcher::matches;
use crate::{CREATED_AT, ID_FIELD, UPDATED_AT, compare};

/// An ordered sequence of stored documents.
///
/// Backed by a persistent vector, so cloning a collection for a snapshot
/// shares structure with the live copy.
#[derive(Debug, Clone, Default)]
pub(crate) struct Collection {
    docs: Vector<Document>,
}

/// What an insert through the guard produced.
#[derive(Debug)]
pub(crate) enum Inserted {
    New(Document),
    /// The idempotency guard found an equivalent stored document.
    Existing(Document),
}

impl Inserted {
    pub(crate) fn into_document(self) -> Document {
        match self {
            Inserted::New(doc) | Inserted::Existing(doc) => doc,
        }
    }
}

impl Collection {
    pub(crate) fn len(&self) -> usize {
        self.docs.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Document> {
        self.docs.iter()
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Document> {
        self.docs.get_mut(index)
    }

    pub(crate) fn remove(&mut self, index: usize) -> Document {
        self.docs.remove(index)
    }

    /// Indices of matching documents, in storage order.
    pub(crate) fn positions(&self, filter: &Filter) -> Vec<usize> {
        self.docs
            .iter()
            .enumerate()
            .filter(|(_, d)| matches(d, filter))
            .map(|(i, _)| i)
            .collect()
    }

    pub(crate) fn first_position(&self, filter: &Filter) -> Option<usize> {
        self.docs.iter().position(|d| matches(d, filter))
    }

    pub(crate) fn position_by_id(&self, id: &str) -> Option<usize> {
        self.docs.iter().position(|d| {
            d.get(ID_FIELD)
                .and_then(compare::id_string)
                .is_some_and(|stored| stored == id)
        })
    }

    /// Store a new document.
    ///
    /// Assigns an identity and timestamps when absent, then consults the
    /// idempotency guard. An explicit identity already in use is rejected.
    pub(crate) fn insert(
        &mut self,
        name: &str,
        mut doc: Document,
        key: &IdempotencyKey,
    ) -> Result<Inserted, DbError> {
        stamp(&mut doc);

        if let Some(index) = key.find_duplicate(&doc, self.docs.iter()) {
            let existing = self.docs[index].clone();
            let id = existing
                .get(ID_FIELD)
                .and_then(compare::id_string)
                .unwrap_or_default();
            info!(collection = name, id = %id, "idempotent write matched existing document");
            return Ok(Inserted::Existing(existing));
        }

        if let Some(id) = doc.get(ID_FIELD).and_then(compare::id_string) {
            if self.position_by_id(&id).is_some() {
                return Err(DbError::DuplicateKey {
                    collection: name.to_string(),
                    id,
                });
            }
        }

        self.docs.push_back(doc.clone());
        Ok(Inserted::New(doc))
    }
}

/// Fill in `id`, `createdAt` and `updatedAt` when missing or null.
pub(crate) fn stamp(doc: &mut Document) {
    if doc.get(ID_FIELD).is_none_or(compare::is_nullish) {
        doc.insert(ID_FIELD, ObjectId::new().to_hex());
    }
    let now = Bson::DateTime(bson::DateTime::now());
    if doc.get(CREATED_AT).is_none_or(compare::is_nullish) {
        doc.insert(CREATED_AT, now.clone());
    }
    if doc.get(UPDATED_AT).is_none_or(compare::is_nullish) {
        doc.insert(UPDATED_AT, now);
    }
}
