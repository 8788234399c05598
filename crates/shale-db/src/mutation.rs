use bson::{Bson, Document};
use shale_query::{Update, UpdateOp};
use tracing::debug;

use crate::error::DbError;
use crate::{ID_FIELD, UPDATED_AT, compare, path};

/// Whether an update targets a stored document or one being created by an
/// upsert. `$setOnInsert` only applies to the latter, and the identity field
/// can only be written while inserting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApplyMode {
    Existing,
    Insert,
}

/// Apply an update to `doc` in place and refresh `updatedAt`.
///
/// On error `doc` may be partially modified; callers apply to a copy and
/// only commit on success.
pub(crate) fn apply_update(doc: &mut Document, update: &Update, mode: ApplyMode) -> Result<(), DbError> {
    match update {
        Update::Merge(fields) => {
            for (key, value) in fields {
                if key == ID_FIELD {
                    continue;
                }
                doc.insert(key.clone(), value.clone());
            }
        }
        Update::Operators(ops) => {
            for op in ops {
                apply_op(doc, op, mode)?;
            }
        }
    }
    touch(doc);
    Ok(())
}

fn apply_op(doc: &mut Document, op: &UpdateOp, mode: ApplyMode) -> Result<(), DbError> {
    match op {
        UpdateOp::Set(field, value) => {
            if writable(field, mode) {
                path::set_path(doc, field, value.clone());
            }
        }
        UpdateOp::SetOnInsert(field, value) => {
            if mode == ApplyMode::Insert {
                path::set_path(doc, field, value.clone());
            }
        }
        UpdateOp::Inc(field, amount) => op_inc(doc, field, amount)?,
        UpdateOp::Push(field, value) => op_push(doc, field, value, false),
        UpdateOp::AddToSet(field, value) => op_push(doc, field, value, true),
        UpdateOp::Ignored(name) => debug!(operator = %name, "ignoring unsupported update operator"),
    }
    Ok(())
}

fn writable(field: &str, mode: ApplyMode) -> bool {
    if field == ID_FIELD && mode == ApplyMode::Existing {
        debug!("ignoring update of identity field");
        return false;
    }
    true
}

/// Stamp `updatedAt` with the current time.
pub(crate) fn touch(doc: &mut Document) {
    doc.insert(UPDATED_AT, Bson::DateTime(bson::DateTime::now()));
}

/// `$inc`: missing or null counts as zero. i32 + i32 promotes to i64 on
/// overflow, i64 absorbs i32, and any f64 operand makes the result f64.
fn op_inc(doc: &mut Document, field: &str, amount: &Bson) -> Result<(), DbError> {
    let current = path::get_path(doc, field).filter(|v| !compare::is_nullish(v));
    let next = match current {
        None => amount.clone(),
        Some(value) => add_numbers(value, amount).ok_or_else(|| {
            DbError::InvalidUpdate(format!(
                "cannot apply $inc to non-numeric field '{field}'"
            ))
        })?,
    };
    path::set_path(doc, field, next);
    Ok(())
}

fn add_numbers(a: &Bson, b: &Bson) -> Option<Bson> {
    let sum = match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => match x.checked_add(*y) {
            Some(s) => Bson::Int32(s),
            None => Bson::Int64(i64::from(*x) + i64::from(*y)),
        },
        (Bson::Int32(x), Bson::Int64(y)) => Bson::Int64(i64::from(*x).checked_add(*y)?),
        (Bson::Int64(x), Bson::Int32(y)) => Bson::Int64(x.checked_add(i64::from(*y))?),
        (Bson::Int64(x), Bson::Int64(y)) => Bson::Int64(x.checked_add(*y)?),
        _ => Bson::Double(compare::as_number(a)? + compare::as_number(b)?),
    };
    Some(sum)
}

/// `$push` / `$addToSet`. A missing or non-array value becomes a
/// one-element array.
fn op_push(doc: &mut Document, field: &str, value: &Bson, unique: bool) {
    if let Some(Bson::Array(items)) = path::get_path_mut(doc, field) {
        if !(unique && items.iter().any(|item| compare::same_value(item, value))) {
            items.push(value.clone());
        }
        return;
    }
    path::set_path(doc, field, Bson::Array(vec![value.clone()]));
}
