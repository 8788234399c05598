use std::ops::{Deref, DerefMut};

use bson::{Bson, Document};
use serde::{Serialize, Serializer};

use crate::error::DbError;
use crate::model::Model;
use crate::{ID_FIELD, UPDATED_AT, compare};

/// How a query result differs from the document it was read from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    pub(crate) partial: bool,
    pub(crate) populated: Vec<(String, Bson)>,
}

impl Shape {
    pub(crate) fn new(partial: bool) -> Self {
        Self {
            partial,
            populated: Vec::new(),
        }
    }

    /// A projection dropped some stored fields.
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// Relation paths holding an embedded copy of the referenced document.
    pub fn populated(&self) -> impl Iterator<Item = &str> {
        self.populated.iter().map(|(path, _)| path.as_str())
    }

    fn is_whole(&self) -> bool {
        !self.partial && self.populated.is_empty()
    }
}

/// A document bound to its collection.
///
/// Dereferences to the underlying [`Document`] for reads and edits; edits
/// are local until [`save`](Instance::save).
#[derive(Clone)]
pub struct Instance {
    model: Model,
    doc: Document,
    shape: Shape,
}

impl Instance {
    pub(crate) fn new(model: Model, doc: Document) -> Self {
        Self::with_shape(model, doc, Shape::default())
    }

    pub(crate) fn with_shape(model: Model, doc: Document, shape: Shape) -> Self {
        Self { model, doc, shape }
    }

    /// Canonical identity, once assigned.
    pub fn id(&self) -> Option<String> {
        self.doc.get(ID_FIELD).and_then(compare::id_string)
    }

    pub fn collection(&self) -> &str {
        self.model.name()
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Insert or replace the stored document with this one.
    ///
    /// A new document goes through the idempotency guard; if it finds an
    /// equivalent stored document, this instance takes on that document's
    /// contents.
    ///
    /// Populated relations are written back as the referenced `id`. A
    /// projected instance is merged into the stored document, so fields it
    /// does not hold are kept; it then only picks up the new `updatedAt`.
    pub fn save(&mut self) -> Result<(), DbError> {
        let saved = self.model.save_document(&self.doc, &self.shape)?;
        if self.shape.is_whole() {
            self.doc = saved;
        } else if let Some(updated) = saved.get(UPDATED_AT) {
            if self.doc.contains_key(UPDATED_AT) {
                self.doc.insert(UPDATED_AT, updated.clone());
            }
        }
        Ok(())
    }

    /// A plain copy of the document.
    pub fn to_object(&self) -> Document {
        self.doc.clone()
    }

    pub fn to_json(&self) -> Result<serde_json::Value, DbError> {
        Ok(serde_json::to_value(&self.doc)?)
    }

    pub fn into_document(self) -> Document {
        self.doc
    }
}

impl Deref for Instance {
    type Target = Document;

    fn deref(&self) -> &Document {
        &self.doc
    }
}

impl DerefMut for Instance {
    fn deref_mut(&mut self) -> &mut Document {
        &mut self.doc
    }
}

impl Serialize for Instance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.doc.serialize(serializer)
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("collection", &self.model.name())
            .field("doc", &self.doc)
            .finish()
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.model.name() == other.model.name() && self.doc == other.doc
    }
}
