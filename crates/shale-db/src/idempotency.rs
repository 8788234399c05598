use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::{compare, path};

const DEFAULT_KEY: [&str; 3] = ["type", "sourceTxId", "receiverUserId"];

/// The field combination that identifies a logical write for duplicate
/// suppression.
///
/// When every key field of an incoming document is present and non-null,
/// and a stored document carries equal values for all of them, the insert
/// is skipped and the stored document is returned instead. An empty key
/// disables the guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(Vec<String>);

impl Default for IdempotencyKey {
    fn default() -> Self {
        Self(DEFAULT_KEY.iter().map(|f| f.to_string()).collect())
    }
}

impl IdempotencyKey {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    /// A key that never matches.
    pub fn disabled() -> Self {
        Self(Vec::new())
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }

    /// The key values of `doc`, or `None` if the guard does not apply.
    fn extract<'a>(&self, doc: &'a Document) -> Option<Vec<&'a Bson>> {
        if self.0.is_empty() {
            return None;
        }
        self.0
            .iter()
            .map(|field| path::get_path(doc, field).filter(|v| !compare::is_nullish(v)))
            .collect()
    }

    /// Position of the first stored document that duplicates `candidate`.
    pub(crate) fn find_duplicate<'a, I>(&self, candidate: &Document, stored: I) -> Option<usize>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let wanted = self.extract(candidate)?;
        stored.into_iter().position(|doc| {
            self.extract(doc).is_some_and(|values| {
                values
                    .iter()
                    .zip(&wanted)
                    .all(|(have, want)| compare::same_value(have, want))
            })
        })
    }
}
