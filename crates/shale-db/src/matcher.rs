use std::cmp::Ordering;

use bson::{Bson, Document};
use shale_query::{Condition, Filter, Operator};

use crate::compare;
use crate::path;

/// Evaluate a filter against a document.
///
/// Pure and total: every shape a filter can take yields a boolean.
pub fn matches(doc: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::And(children) => children.iter().all(|c| matches(doc, c)),
        Filter::Or(children) => children.iter().any(|c| matches(doc, c)),
        Filter::Field(field, condition) => {
            let value = path::get_path(doc, field);
            match condition {
                Condition::Equals(expected) => compare::values_equal(value, expected),
                Condition::Operators(ops) => ops.iter().all(|op| operator_holds(value, op)),
            }
        }
    }
}

fn operator_holds(value: Option<&Bson>, op: &Operator) -> bool {
    match op {
        Operator::Eq(expected) => compare::values_equal(value, expected),
        Operator::Ne(expected) => !compare::values_equal(value, expected),
        Operator::Gt(bound) => ordered(value, bound, |o| o == Ordering::Greater),
        Operator::Gte(bound) => ordered(value, bound, |o| o != Ordering::Less),
        Operator::Lt(bound) => ordered(value, bound, |o| o == Ordering::Less),
        Operator::Lte(bound) => ordered(value, bound, |o| o != Ordering::Greater),
        Operator::In(list) => list.iter().any(|v| compare::values_equal(value, v)),
        Operator::Nin(list) => !list.iter().any(|v| compare::values_equal(value, v)),
        Operator::Regex(re) => match value.map(compare::normalize) {
            Some(v) => v.as_str().is_some_and(|s| re.is_match(s)),
            None => false,
        },
        Operator::Exists(expected) => {
            value.is_some_and(|v| !matches!(v, Bson::Undefined)) == *expected
        }
        Operator::RawNestedFallback(inner) => match value {
            Some(Bson::Document(nested)) => matches(nested, inner),
            _ => matches(&Document::new(), inner),
        },
    }
}

fn ordered(value: Option<&Bson>, bound: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    value
        .and_then(|v| compare::compare_values(v, bound))
        .is_some_and(accept)
}
