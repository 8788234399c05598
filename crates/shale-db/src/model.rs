use bson::{Bson, Document};
use shale_query::{Filter, Update};
use tracing::debug;

use crate::aggregate::run_pipeline;
use crate::collection::{Collection, Inserted, stamp};
use crate::convert::{IntoFilter, IntoPipeline, IntoUpdate};
use crate::cursor::Cursor;
use crate::error::DbError;
use crate::idempotency::IdempotencyKey;
use crate::instance::{Instance, Shape};
use crate::matcher::matches;
use crate::mutation::{ApplyMode, apply_update, touch};
use crate::relation::unpopulate;
use crate::result::{DeleteResult, UpdateResult};
use crate::store::Store;
use crate::{CREATED_AT, ID_FIELD, UPDATED_AT, compare, path};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert a document built from the filter's equality fields when
    /// nothing matches.
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self { upsert: true }
    }
}

/// Which version of the document `find_one_and_update` returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    Before,
    #[default]
    After,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOneAndUpdateOptions {
    pub upsert: bool,
    pub return_document: ReturnDocument,
}

/// Query and mutation surface of one collection.
///
/// Every call takes the store lock once, so each operation is atomic with
/// respect to other operations on the same store.
#[derive(Clone)]
pub struct Model {
    store: Store,
    name: String,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model").field("name", &self.name).finish()
    }
}

impl Model {
    pub(crate) fn new(store: Store, name: &str) -> Self {
        Self {
            store,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    fn key(&self) -> &IdempotencyKey {
        self.store.idempotency_key(&self.name)
    }

    // ── Reads ───────────────────────────────────────────────────

    /// Start a query. Nothing runs until the cursor is executed.
    pub fn find(&self, filter: impl IntoFilter) -> Result<Cursor, DbError> {
        Ok(Cursor::new(self.clone(), filter.into_filter()?))
    }

    pub fn find_one(&self, filter: impl IntoFilter) -> Result<Option<Instance>, DbError> {
        let filter = filter.into_filter()?;
        let state = self.store.read()?;
        let found = state.docs(&self.name).find(|d| matches(d, &filter)).cloned();
        Ok(found.map(|doc| Instance::new(self.clone(), doc)))
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<Instance>, DbError> {
        self.find_one(Filter::eq(ID_FIELD, id))
    }

    pub fn count_documents(&self, filter: impl IntoFilter) -> Result<u64, DbError> {
        let filter = filter.into_filter()?;
        let state = self.store.read()?;
        Ok(state.docs(&self.name).filter(|d| matches(d, &filter)).count() as u64)
    }

    /// Run an aggregation pipeline over a copy of the collection.
    pub fn aggregate(&self, pipeline: impl IntoPipeline) -> Result<Vec<Document>, DbError> {
        let stages = pipeline.into_pipeline()?;
        let docs: Vec<Document> = {
            let state = self.store.read()?;
            state.docs(&self.name).cloned().collect()
        };
        Ok(run_pipeline(docs, &stages))
    }

    // ── Inserts ─────────────────────────────────────────────────

    /// Insert a document, assigning `id`, `createdAt` and `updatedAt` when
    /// absent.
    ///
    /// If the idempotency guard finds an equivalent stored document, that
    /// document is returned and nothing is inserted.
    pub fn create(&self, doc: Document) -> Result<Instance, DbError> {
        let mut state = self.store.write()?;
        let stored = state
            .collection_mut(&self.name)
            .insert(&self.name, doc, self.key())?;
        Ok(Instance::new(self.clone(), stored.into_document()))
    }

    /// Insert several documents under one lock. Stops at the first error;
    /// documents inserted before it stay.
    pub fn create_many(&self, docs: Vec<Document>) -> Result<Vec<Instance>, DbError> {
        let mut state = self.store.write()?;
        let collection = state.collection_mut(&self.name);
        let mut out = Vec::with_capacity(docs.len());
        for doc in docs {
            let stored = collection.insert(&self.name, doc, self.key())?;
            out.push(Instance::new(self.clone(), stored.into_document()));
        }
        Ok(out)
    }

    /// An unsaved document bound to this collection. Nothing is stored until
    /// [`Instance::save`].
    pub fn new_instance(&self, doc: Document) -> Instance {
        Instance::new(self.clone(), doc)
    }

    /// Insert or replace by identity. Used by [`Instance::save`].
    ///
    /// Populated paths go back to plain references. A partial document is
    /// merged into the stored one instead of replacing it, and is never
    /// inserted.
    pub(crate) fn save_document(
        &self,
        doc: &Document,
        shape: &Shape,
    ) -> Result<Document, DbError> {
        let mut doc = doc.clone();
        for (field, reference) in &shape.populated {
            unpopulate(&mut doc, field, reference);
        }

        let mut state = self.store.write()?;
        let collection = state.collection_mut(&self.name);

        let existing = doc
            .get(ID_FIELD)
            .and_then(compare::id_string)
            .and_then(|id| collection.position_by_id(&id));
        if let Some(stored) = existing.and_then(|index| collection.get_mut(index)) {
            let mut next = if shape.partial {
                let mut merged = stored.clone();
                merge_into(&mut merged, doc);
                merged
            } else {
                if let Some(created) = stored.get(CREATED_AT) {
                    if doc.get(CREATED_AT).is_none() {
                        doc.insert(CREATED_AT, created.clone());
                    }
                }
                doc
            };
            touch(&mut next);
            *stored = next.clone();
            return Ok(next);
        }

        if shape.partial {
            return Err(DbError::InvalidUpdate(format!(
                "projected {} document has no stored counterpart",
                self.name
            )));
        }
        Ok(collection
            .insert(&self.name, doc, self.key())?
            .into_document())
    }

    // ── Updates ─────────────────────────────────────────────────

    /// Update the first matching document.
    pub fn update_one(
        &self,
        filter: impl IntoFilter,
        update: impl IntoUpdate,
        options: UpdateOptions,
    ) -> Result<UpdateResult, DbError> {
        let filter = filter.into_filter()?;
        let update = update.into_update()?;
        let mut state = self.store.write()?;
        let collection = state.collection_mut(&self.name);

        if let Some(index) = collection.first_position(&filter) {
            let (_, _, changed) = update_at(collection, index, &update)?;
            return Ok(UpdateResult {
                acknowledged: true,
                matched_count: 1,
                modified_count: u64::from(changed),
                ..UpdateResult::default()
            });
        }
        if !options.upsert {
            return Ok(acknowledged());
        }

        let inserted = upsert(collection, &self.name, &filter, &update, self.key())?;
        Ok(upsert_result(&inserted))
    }

    /// Update every matching document. Either all matches are updated or,
    /// on error, none are. Every match gets a fresh `updatedAt`, but only
    /// matches with other changes count as modified.
    pub fn update_many(
        &self,
        filter: impl IntoFilter,
        update: impl IntoUpdate,
        options: UpdateOptions,
    ) -> Result<UpdateResult, DbError> {
        let filter = filter.into_filter()?;
        let update = update.into_update()?;
        let mut state = self.store.write()?;
        let collection = state.collection_mut(&self.name);

        let positions = collection.positions(&filter);
        if positions.is_empty() {
            if !options.upsert {
                return Ok(acknowledged());
            }
            let inserted = upsert(collection, &self.name, &filter, &update, self.key())?;
            return Ok(upsert_result(&inserted));
        }

        let mut updated = Vec::with_capacity(positions.len());
        let mut modified_count = 0;
        for &index in &positions {
            if let Some(doc) = collection.get_mut(index) {
                let mut next = doc.clone();
                apply_update(&mut next, &update, ApplyMode::Existing)?;
                if modified(doc, &next) {
                    modified_count += 1;
                }
                updated.push((index, next));
            }
        }
        for (index, next) in updated {
            if let Some(doc) = collection.get_mut(index) {
                *doc = next;
            }
        }
        Ok(UpdateResult {
            acknowledged: true,
            matched_count: positions.len() as u64,
            modified_count,
            ..UpdateResult::default()
        })
    }

    /// Update the document with `id` and return it after the update.
    pub fn find_by_id_and_update(
        &self,
        id: &str,
        update: impl IntoUpdate,
    ) -> Result<Option<Instance>, DbError> {
        self.find_one_and_update(
            Filter::eq(ID_FIELD, id),
            update,
            FindOneAndUpdateOptions::default(),
        )
    }

    /// Update the first matching document and return it.
    ///
    /// With `upsert`, a missing match inserts a new document; it is returned
    /// for [`ReturnDocument::After`] and `None` is returned for
    /// [`ReturnDocument::Before`] since nothing existed beforehand.
    pub fn find_one_and_update(
        &self,
        filter: impl IntoFilter,
        update: impl IntoUpdate,
        options: FindOneAndUpdateOptions,
    ) -> Result<Option<Instance>, DbError> {
        let filter = filter.into_filter()?;
        let update = update.into_update()?;
        let mut state = self.store.write()?;
        let collection = state.collection_mut(&self.name);

        if let Some(index) = collection.first_position(&filter) {
            let (before, after, _) = update_at(collection, index, &update)?;
            let doc = match options.return_document {
                ReturnDocument::Before => before,
                ReturnDocument::After => after,
            };
            return Ok(Some(Instance::new(self.clone(), doc)));
        }
        if !options.upsert {
            return Ok(None);
        }

        let doc = match upsert(collection, &self.name, &filter, &update, self.key())? {
            Inserted::New(doc) if options.return_document == ReturnDocument::After => doc,
            Inserted::New(_) => return Ok(None),
            Inserted::Existing(doc) => doc,
        };
        Ok(Some(Instance::new(self.clone(), doc)))
    }

    // ── Deletes ─────────────────────────────────────────────────

    pub fn delete_one(&self, filter: impl IntoFilter) -> Result<DeleteResult, DbError> {
        let filter = filter.into_filter()?;
        let mut state = self.store.write()?;
        let collection = state.collection_mut(&self.name);
        let deleted = match collection.first_position(&filter) {
            Some(index) => {
                collection.remove(index);
                1
            }
            None => 0,
        };
        Ok(DeleteResult {
            acknowledged: true,
            deleted_count: deleted,
        })
    }

    pub fn delete_many(&self, filter: impl IntoFilter) -> Result<DeleteResult, DbError> {
        let filter = filter.into_filter()?;
        let mut state = self.store.write()?;
        let collection = state.collection_mut(&self.name);
        let positions = collection.positions(&filter);
        for &index in positions.iter().rev() {
            collection.remove(index);
        }
        Ok(DeleteResult {
            acknowledged: true,
            deleted_count: positions.len() as u64,
        })
    }
}

/// Overlay `partial` onto `target`. Nested documents merge key by key;
/// every other value replaces what is stored.
fn merge_into(target: &mut Document, partial: Document) {
    for (key, value) in partial {
        match value {
            Bson::Document(nested) => match target.get_mut(&key) {
                Some(Bson::Document(stored)) => merge_into(stored, nested),
                _ => {
                    target.insert(key, nested);
                }
            },
            value => {
                target.insert(key, value);
            }
        }
    }
}

fn acknowledged() -> UpdateResult {
    UpdateResult {
        acknowledged: true,
        ..UpdateResult::default()
    }
}

/// Apply `update` to the document at `index`, committing only on success.
/// Returns copies of the document before and after, and whether anything
/// besides `updatedAt` changed.
fn update_at(
    collection: &mut Collection,
    index: usize,
    update: &Update,
) -> Result<(Document, Document, bool), DbError> {
    let Some(doc) = collection.get_mut(index) else {
        return Err(DbError::InvalidUpdate(format!(
            "document at position {index} disappeared"
        )));
    };
    let before = doc.clone();
    let mut next = before.clone();
    apply_update(&mut next, update, ApplyMode::Existing)?;
    let changed = modified(&before, &next);
    *doc = next.clone();
    Ok((before, next, changed))
}

fn modified(before: &Document, after: &Document) -> bool {
    fn fields(doc: &Document) -> impl Iterator<Item = (&String, &Bson)> {
        doc.iter().filter(|(key, _)| key.as_str() != UPDATED_AT)
    }
    !fields(before).eq(fields(after))
}

/// Build a document from the filter's equality fields, apply the update in
/// insert mode and store it through the idempotency guard.
fn upsert(
    collection: &mut Collection,
    name: &str,
    filter: &Filter,
    update: &Update,
    key: &IdempotencyKey,
) -> Result<Inserted, DbError> {
    let mut seed = Document::new();
    for (field, value) in filter.equality_fields() {
        path::set_path(&mut seed, field, value.clone());
    }
    stamp(&mut seed);
    apply_update(&mut seed, update, ApplyMode::Insert)?;
    let inserted = collection.insert(name, seed, key)?;
    if let Inserted::New(doc) = &inserted {
        debug!(collection = name, id = ?doc.get(ID_FIELD), "upserted document");
    }
    Ok(inserted)
}

fn upsert_result(inserted: &Inserted) -> UpdateResult {
    let (doc, upserted_count) = match inserted {
        Inserted::New(doc) => (doc, 1),
        Inserted::Existing(doc) => (doc, 0),
    };
    UpdateResult {
        acknowledged: true,
        upserted_id: doc.get(ID_FIELD).and_then(compare::id_string),
        upserted_count,
        ..UpdateResult::default()
    }
}
