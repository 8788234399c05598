use std::marker::PhantomData;

use bson::{Bson, Document};
use shale_query::{Filter, Projection, Sort, parse_sort};

use crate::compare;
use crate::error::DbError;
use crate::instance::{Instance, Shape};
use crate::matcher::matches;
use crate::model::Model;
use crate::projection::apply_projection;
use crate::relation::{Populate, populate};

/// How a cursor turns stored documents into results.
///
/// [`Instance`] keeps the collection binding for `save`; a plain
/// [`Document`] is the lean form. `shape` records how the result differs
/// from the stored document.
pub trait Materialize: Sized {
    fn materialize(model: &Model, doc: Document, shape: Shape) -> Self;
}

impl Materialize for Instance {
    fn materialize(model: &Model, doc: Document, shape: Shape) -> Self {
        Instance::with_shape(model.clone(), doc, shape)
    }
}

impl Materialize for Document {
    fn materialize(_: &Model, doc: Document, _: Shape) -> Self {
        doc
    }
}

/// A lazily-built query.
///
/// Modifiers can be chained in any order; the query runs once, on
/// [`exec`](Cursor::exec), in a fixed order: filter, sort, skip, limit,
/// copy, populate, project. Results are independent copies of the stored
/// documents.
#[derive(Debug, Clone)]
pub struct Cursor<T = Instance> {
    model: Model,
    filter: Filter,
    sort: Vec<Sort>,
    skip: usize,
    limit: Option<usize>,
    projection: Option<Projection>,
    populate: Vec<Populate>,
    _output: PhantomData<T>,
}

impl Cursor<Instance> {
    pub(crate) fn new(model: Model, filter: Filter) -> Self {
        Self {
            model,
            filter,
            sort: Vec::new(),
            skip: 0,
            limit: None,
            projection: None,
            populate: Vec::new(),
            _output: PhantomData,
        }
    }

    /// Return plain documents instead of instances.
    pub fn lean(self) -> Cursor<Document> {
        Cursor {
            model: self.model,
            filter: self.filter,
            sort: self.sort,
            skip: self.skip,
            limit: self.limit,
            projection: self.projection,
            populate: self.populate,
            _output: PhantomData,
        }
    }
}

impl<T: Materialize> Cursor<T> {
    /// Sort by a spec document (`{ "field": -1 }`) or a string
    /// (`"-createdAt name"`). Replaces any earlier sort.
    pub fn sort(mut self, spec: impl Into<Bson>) -> Self {
        self.sort = parse_sort(&spec.into());
        self
    }

    pub fn sort_by(mut self, sort: Vec<Sort>) -> Self {
        self.sort = sort;
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    /// Cap the number of results. Zero means no limit.
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = (n > 0).then_some(n);
        self
    }

    /// Project result fields, given as `"a b"`, `"-a"` or `{ "a": 1 }`.
    pub fn select(mut self, spec: impl Into<Bson>) -> Self {
        self.projection = Some(Projection::parse(&spec.into()));
        self
    }

    /// Replace the reference at `path` with the document it points at.
    pub fn populate(mut self, path: impl Into<String>) -> Self {
        self.populate.push(Populate {
            path: path.into(),
            select: None,
        });
        self
    }

    /// Like [`populate`](Cursor::populate), projecting the referenced
    /// document.
    pub fn populate_select(mut self, path: impl Into<String>, select: impl Into<Bson>) -> Self {
        self.populate.push(Populate {
            path: path.into(),
            select: Some(Projection::parse(&select.into())),
        });
        self
    }

    /// Run the query.
    pub fn exec(self) -> Result<Vec<T>, DbError> {
        let docs = self.run()?;
        Ok(docs
            .into_iter()
            .map(|(doc, shape)| T::materialize(&self.model, doc, shape))
            .collect())
    }

    /// The first result, if any.
    pub fn first(self) -> Result<Option<T>, DbError> {
        let mut cursor = self;
        cursor.limit = Some(1);
        Ok(cursor.exec()?.into_iter().next())
    }

    /// Number of results the query would return, honoring skip and limit.
    pub fn count(self) -> Result<u64, DbError> {
        let state = self.model.store().read()?;
        let n = state
            .docs(self.model.name())
            .filter(|d| matches(d, &self.filter))
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .count();
        Ok(n as u64)
    }

    fn run(&self) -> Result<Vec<(Document, Shape)>, DbError> {
        let store = self.model.store();
        let state = store.read()?;

        let mut hits: Vec<&Document> = state
            .docs(self.model.name())
            .filter(|d| matches(d, &self.filter))
            .collect();
        if !self.sort.is_empty() {
            hits.sort_by(|a, b| compare::compare_documents(a, b, &self.sort));
        }

        let partial = self.projection.is_some();
        let mut docs: Vec<(Document, Shape)> = hits
            .into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .map(|doc| (doc.clone(), Shape::new(partial)))
            .collect();

        if !self.populate.is_empty() {
            if let Some(config) = store.collection_config(self.model.name()) {
                for (doc, shape) in &mut docs {
                    for step in &self.populate {
                        if let Some(reference) = populate(&state, config, doc, step) {
                            shape.populated.push((step.path.clone(), reference));
                        }
                    }
                }
            }
        }
        drop(state);

        if let Some(projection) = &self.projection {
            docs = docs
                .into_iter()
                .map(|(doc, shape)| (apply_projection(doc, projection), shape))
                .collect();
        }
        Ok(docs)
    }
}
