use bson::{Bson, Document};
use shale_query::Projection;
use tracing::debug;

use crate::config::CollectionConfig;
use crate::projection::apply_projection;
use crate::store::State;
use crate::{ID_FIELD, compare, path};

/// A reference path to expand in query results.
#[derive(Debug, Clone)]
pub(crate) struct Populate {
    pub(crate) path: String,
    pub(crate) select: Option<Projection>,
}

/// Replace the identifier at `populate.path` with a copy of the referenced
/// document.
///
/// Paths that are not declared relations, missing or array values, and
/// identifiers with no matching document are left untouched. Returns the
/// reference that was replaced.
pub(crate) fn populate(
    state: &State,
    source: &CollectionConfig,
    doc: &mut Document,
    populate: &Populate,
) -> Option<Bson> {
    let Some(target) = source.relations.get(&populate.path) else {
        debug!(collection = %source.name, path = %populate.path, "populate path is not a relation");
        return None;
    };
    let Some(reference) = path::get_path(doc, &populate.path) else {
        return None;
    };
    if matches!(reference, Bson::Array(_)) {
        debug!(path = %populate.path, "array relations are not populated");
        return None;
    }
    let Some(id) = compare::id_string(reference) else {
        return None;
    };

    let found = state.docs(target).find(|candidate| {
        candidate
            .get(ID_FIELD)
            .and_then(compare::id_string)
            .is_some_and(|candidate_id| candidate_id == id)
    });
    let Some(found) = found else {
        debug!(collection = %target, id = %id, "populate reference is dangling");
        return None;
    };

    let reference = reference.clone();
    let mut related = found.clone();
    if let Some(select) = &populate.select {
        related = apply_projection(related, select);
    }
    path::set_path(doc, &populate.path, Bson::Document(related));
    Some(reference)
}

/// Undo [`populate`]: put `reference` back at `path` if it still holds an
/// embedded document. A value the caller replaced is kept.
pub(crate) fn unpopulate(doc: &mut Document, path: &str, reference: &Bson) {
    if let Some(Bson::Document(_)) = path::get_path(doc, path) {
        path::set_path(doc, path, reference.clone());
    }
}
