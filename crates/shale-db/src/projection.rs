use bson::Document;
use shale_query::{IDENTITY_FIELDS, Projection};

use crate::path;

/// Apply a field projection to a result document.
///
/// Inclusion builds a fresh document holding the identity fields (unless
/// hidden) and every listed path that exists. Exclusion removes the listed
/// paths.
pub(crate) fn apply_projection(doc: Document, projection: &Projection) -> Document {
    match projection {
        Projection::Exclude(fields) => {
            let mut doc = doc;
            for field in fields {
                path::remove_path(&mut doc, field);
            }
            doc
        }
        Projection::Include { fields, hide } => {
            let mut out = Document::new();
            for id in IDENTITY_FIELDS {
                if hide.iter().any(|h| h == id) {
                    continue;
                }
                if let Some(value) = doc.get(id) {
                    out.insert(id, value.clone());
                }
            }
            for field in fields {
                if let Some(value) = path::get_path(&doc, field) {
                    path::set_path(&mut out, field, value.clone());
                }
            }
            out
        }
    }
}
