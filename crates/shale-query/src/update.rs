use bson::{Bson, Document};

/// Parse error for update documents.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("update parse error: {0}")]
pub struct UpdateParseError(pub String);

/// A parsed update specification.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// No key starts with `$`: shallow-merge every field into the target.
    Merge(Document),
    /// Operator-based update, applied in document order.
    Operators(Vec<UpdateOp>),
}

/// A single path-level update operator.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Overwrite the value at a path, creating intermediate documents.
    Set(String, Bson),
    /// Like `Set`, but only while creating a document through an upsert.
    SetOnInsert(String, Bson),
    /// Numeric add; a missing value counts as zero.
    Inc(String, Bson),
    /// Append to an array, initializing non-arrays to a one-element array.
    Push(String, Bson),
    /// Append unless an equal value is already present.
    AddToSet(String, Bson),
    /// An unrecognized operator (or a bare key beside operators). Has no
    /// effect; kept so the no-op stays visible to callers and logs.
    Ignored(String),
}

impl Update {
    pub fn set(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Update::Operators(vec![UpdateOp::Set(path.into(), value.into())])
    }

    pub fn inc(path: impl Into<String>, amount: impl Into<Bson>) -> Self {
        Update::Operators(vec![UpdateOp::Inc(path.into(), amount.into())])
    }

    /// Append another operator. A merge update is converted to `$set`s first.
    pub fn and(self, op: UpdateOp) -> Self {
        let mut ops = match self {
            Update::Operators(ops) => ops,
            Update::Merge(doc) => doc
                .into_iter()
                .map(|(k, v)| UpdateOp::Set(k, v))
                .collect(),
        };
        ops.push(op);
        Update::Operators(ops)
    }

    /// Names of operators that will be skipped.
    pub fn ignored(&self) -> Vec<&str> {
        match self {
            Update::Merge(_) => Vec::new(),
            Update::Operators(ops) => ops
                .iter()
                .filter_map(|op| match op {
                    UpdateOp::Ignored(name) => Some(name.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// Parse an update document into an [`Update`].
///
/// If no top-level key starts with `$` the whole document is a merge.
/// Otherwise `$set`, `$setOnInsert`, `$inc`, `$push` and `$addToSet` are
/// recognized; their operands must be documents mapping paths to values.
/// Anything else becomes [`UpdateOp::Ignored`].
///
/// # Errors
///
/// A recognized operator whose operand is not a document, or a non-numeric
/// `$inc` amount.
pub fn parse_update(doc: &Document) -> Result<Update, UpdateParseError> {
    if !doc.keys().any(|k| k.starts_with('$')) {
        return Ok(Update::Merge(doc.clone()));
    }

    let mut ops = Vec::new();
    for (key, value) in doc {
        match key.as_str() {
            "$set" => push_fields(key, value, UpdateOp::Set, &mut ops)?,
            "$setOnInsert" => push_fields(key, value, UpdateOp::SetOnInsert, &mut ops)?,
            "$push" => push_fields(key, value, UpdateOp::Push, &mut ops)?,
            "$addToSet" => push_fields(key, value, UpdateOp::AddToSet, &mut ops)?,
            "$inc" => {
                for (path, amount) in operand(key, value)? {
                    if !matches!(amount, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) {
                        return Err(UpdateParseError(format!(
                            "$inc value for '{path}' must be numeric"
                        )));
                    }
                    ops.push(UpdateOp::Inc(path.clone(), amount.clone()));
                }
            }
            _ => ops.push(UpdateOp::Ignored(key.clone())),
        }
    }

    Ok(Update::Operators(ops))
}

fn operand<'a>(op: &str, value: &'a Bson) -> Result<&'a Document, UpdateParseError> {
    value
        .as_document()
        .ok_or_else(|| UpdateParseError(format!("{op} value must be a document")))
}

fn push_fields(
    op: &str,
    value: &Bson,
    make: fn(String, Bson) -> UpdateOp,
    ops: &mut Vec<UpdateOp>,
) -> Result<(), UpdateParseError> {
    for (path, val) in operand(op, value)? {
        ops.push(make(path.clone(), val.clone()));
    }
    Ok(())
}
