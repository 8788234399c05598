//! Value comparison shared by the matcher, sorting, grouping and the
//! idempotency guard.
//!
//! Object identifiers compare as their hex string. Int32, Int64 and Double
//! compare numerically with each other. Dates order against other dates,
//! epoch-millisecond numbers and RFC 3339 strings.

use std::borrow::Cow;
use std::cmp::Ordering;

use bson::{Bson, Document};
use shale_query::{Sort, SortDirection};

use crate::path;

/// Rewrite wrapper identifier types to their canonical string form.
pub(crate) fn normalize(value: &Bson) -> Cow<'_, Bson> {
    match value {
        Bson::ObjectId(oid) => Cow::Owned(Bson::String(oid.to_hex())),
        other => Cow::Borrowed(other),
    }
}

/// The canonical string form of an identity value.
pub fn id_string(value: &Bson) -> Option<String> {
    match value {
        Bson::String(s) => Some(s.clone()),
        Bson::ObjectId(oid) => Some(oid.to_hex()),
        Bson::Int32(n) => Some(n.to_string()),
        Bson::Int64(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

pub(crate) fn is_nullish(value: &Bson) -> bool {
    matches!(value, Bson::Null | Bson::Undefined)
}

/// Query equality: `actual` is the stored value at a path (if any).
///
/// A null `expected` matches a missing or null value. An array `actual`
/// matches when any element equals a non-array `expected`.
pub fn values_equal(actual: Option<&Bson>, expected: &Bson) -> bool {
    if is_nullish(expected) {
        return match actual {
            None => true,
            Some(Bson::Array(items)) => items.iter().any(is_nullish),
            Some(v) => is_nullish(v),
        };
    }
    match actual {
        None => false,
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| same_value(item, expected))
        }
        Some(v) => same_value(v, expected),
    }
}

/// Structural equality after normalization. Documents compare key-set wise,
/// arrays element-wise.
pub(crate) fn same_value(a: &Bson, b: &Bson) -> bool {
    let (a, b) = (normalize(a), normalize(b));
    match (a.as_ref(), b.as_ref()) {
        (Bson::Document(x), Bson::Document(y)) => same_document(x, y),
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| same_value(l, r))
        }
        (Bson::DateTime(_), _) | (_, Bson::DateTime(_)) => {
            match (to_millis(a.as_ref()), to_millis(b.as_ref())) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        (x, y) => match (as_number(x), as_number(y)) {
            (Some(l), Some(r)) => l == r,
            _ => x == y,
        },
    }
}

fn same_document(x: &Document, y: &Document) -> bool {
    x.len() == y.len()
        && x
            .iter()
            .all(|(k, v)| y.get(k).is_some_and(|other| same_value(v, other)))
}

/// Ordering for `$gt`/`$gte`/`$lt`/`$lte`. `None` when the two values are
/// not comparable, in which case the operator does not match.
pub(crate) fn compare_values(a: &Bson, b: &Bson) -> Option<Ordering> {
    let (a, b) = (normalize(a), normalize(b));
    let (a, b) = (a.as_ref(), b.as_ref());

    if matches!(a, Bson::DateTime(_)) || matches!(b, Bson::DateTime(_)) {
        return Some(to_millis(a)?.cmp(&to_millis(b)?));
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        _ => as_number(a)?.partial_cmp(&as_number(b)?),
    }
}

/// Epoch milliseconds for a date-like value.
pub(crate) fn to_millis(value: &Bson) -> Option<i64> {
    match value {
        Bson::DateTime(dt) => Some(dt.timestamp_millis()),
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(n) if n.is_finite() => Some(n.trunc() as i64),
        Bson::String(s) => parse_date(s),
        _ => None,
    }
}

/// RFC 3339 timestamps, or a bare `YYYY-MM-DD` taken as UTC midnight.
fn parse_date(s: &str) -> Option<i64> {
    if let Ok(dt) = bson::DateTime::parse_rfc3339_str(s) {
        return Some(dt.timestamp_millis());
    }
    let date = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
}

// ── Sorting ─────────────────────────────────────────────────────

/// Compare two optional field values for a sort key.
///
/// Missing and null values sort last in both directions; the direction only
/// applies between present values. Values of unrelated types fall back to a
/// fixed type rank.
pub(crate) fn sort_values(a: Option<&Bson>, b: Option<&Bson>, direction: SortDirection) -> Ordering {
    let a = a.filter(|v| !is_nullish(v));
    let b = b.filter(|v| !is_nullish(v));
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => {
            let ord = compare_values(x, y)
                .or_else(|| match (x, y) {
                    (Bson::Boolean(l), Bson::Boolean(r)) => Some(l.cmp(r)),
                    _ => None,
                })
                .unwrap_or_else(|| type_rank(x).cmp(&type_rank(y)));
            match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        }
    }
}

fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 1,
        Bson::String(_) | Bson::Symbol(_) | Bson::ObjectId(_) => 2,
        Bson::Document(_) => 3,
        Bson::Array(_) => 4,
        Bson::Binary(_) => 5,
        Bson::Boolean(_) => 6,
        Bson::DateTime(_) | Bson::Timestamp(_) => 7,
        _ => 8,
    }
}

/// Multi-key document comparison; later keys break ties of earlier ones.
pub(crate) fn compare_documents(a: &Document, b: &Document, sorts: &[Sort]) -> Ordering {
    for sort in sorts {
        let ord = sort_values(
            path::get_path(a, &sort.field),
            path::get_path(b, &sort.field),
            sort.direction,
        );
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Stable in-place sort.
pub(crate) fn sort_documents(docs: &mut [Document], sorts: &[Sort]) {
    if !sorts.is_empty() {
        docs.sort_by(|a, b| compare_documents(a, b, sorts));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{DateTime, doc, oid::ObjectId};

    #[test]
    fn object_id_equals_its_hex() {
        let oid = ObjectId::new();
        assert!(same_value(&Bson::ObjectId(oid), &Bson::String(oid.to_hex())));
        assert!(values_equal(Some(&Bson::String(oid.to_hex())), &Bson::ObjectId(oid)));
    }

    #[test]
    fn numbers_compare_across_widths() {
        assert!(same_value(&Bson::Int32(5), &Bson::Double(5.0)));
        assert!(same_value(&Bson::Int64(5), &Bson::Int32(5)));
        assert_eq!(
            compare_values(&Bson::Int32(2), &Bson::Double(2.5)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn null_matches_missing_and_null() {
        assert!(values_equal(None, &Bson::Null));
        assert!(values_equal(Some(&Bson::Null), &Bson::Null));
        assert!(!values_equal(Some(&Bson::Int32(0)), &Bson::Null));
    }

    #[test]
    fn array_contains_for_equality() {
        let tags = Bson::Array(vec!["a".into(), "b".into()]);
        assert!(values_equal(Some(&tags), &Bson::String("b".into())));
        assert!(!values_equal(Some(&tags), &Bson::String("c".into())));
        assert!(values_equal(Some(&tags), &tags));
    }

    #[test]
    fn documents_compare_regardless_of_key_order() {
        let a = Bson::Document(doc! { "x": 1, "y": 2 });
        let b = Bson::Document(doc! { "y": 2, "x": 1 });
        assert!(same_value(&a, &b));
    }

    #[test]
    fn date_orders_against_string_and_number() {
        let date = Bson::DateTime(DateTime::from_millis(1_704_067_200_000)); // 2024-01-01
        assert_eq!(
            compare_values(&date, &Bson::String("2023-12-31T00:00:00Z".into())),
            Some(Ordering::Greater)
        );
        assert_eq!(
            compare_values(&date, &Bson::String("2024-01-02".into())),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_values(&date, &Bson::Int64(1_704_067_200_000)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn strings_are_not_coerced_without_a_date() {
        assert_eq!(
            compare_values(&Bson::String("10".into()), &Bson::Int32(9)),
            None
        );
    }

    #[test]
    fn incomparable_types_have_no_order() {
        assert_eq!(compare_values(&Bson::Boolean(true), &Bson::Int32(1)), None);
        assert_eq!(compare_values(&Bson::Null, &Bson::Int32(1)), None);
    }

    #[test]
    fn nulls_sort_last_both_directions() {
        let one = Bson::Int32(1);
        for dir in [SortDirection::Asc, SortDirection::Desc] {
            assert_eq!(sort_values(None, Some(&one), dir), Ordering::Greater);
            assert_eq!(sort_values(Some(&Bson::Null), Some(&one), dir), Ordering::Greater);
            assert_eq!(sort_values(Some(&one), None, dir), Ordering::Less);
        }
    }

    #[test]
    fn sort_documents_multi_key_stable() {
        let mut docs = vec![
            doc! { "k": "a", "n": 2, "tag": 1 },
            doc! { "k": "b", "n": 1, "tag": 2 },
            doc! { "k": "a", "n": 1, "tag": 3 },
            doc! { "k": "a", "n": 1, "tag": 4 },
        ];
        sort_documents(&mut docs, &[Sort::asc("k"), Sort::desc("n")]);
        let tags: Vec<i32> = docs.iter().map(|d| d.get_i32("tag").unwrap()).collect();
        assert_eq!(tags, vec![1, 3, 4, 2]);
    }
}
