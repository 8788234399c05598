use bson::{Bson, Document};
use regex::Regex;

/// Parse error for filter documents.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("filter parse error: {0}")]
pub struct FilterParseError(pub String);

/// A parsed filter expression tree.
///
/// Built once from a loosely-typed filter document (see [`parse_filter`]) or
/// directly through the builder constructors, then evaluated exhaustively by
/// the matcher. An empty `And` matches every document.
#[derive(Debug, Clone)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    /// A dotted field path and the condition its value must satisfy.
    Field(String, Condition),
}

/// What a single field must satisfy.
#[derive(Debug, Clone)]
pub enum Condition {
    /// `{ field: value }`: direct equality through the comparator.
    Equals(Bson),
    /// `{ field: { $op: value, ... } }`: every operator must hold.
    Operators(Vec<Operator>),
}

/// A single field-level query operator.
#[derive(Debug, Clone)]
pub enum Operator {
    Eq(Bson),
    Ne(Bson),
    Gt(Bson),
    Gte(Bson),
    Lt(Bson),
    Lte(Bson),
    In(Vec<Bson>),
    Nin(Vec<Bson>),
    /// Compiled pattern; `$options` flags are folded into the regex.
    Regex(Regex),
    Exists(bool),
    /// A key inside an operator map that is not a known operator.
    ///
    /// The field's value is treated as a nested document and matched against
    /// the wrapped filter, so `{ "profile": { "tier": "gold" } }` checks
    /// `profile.tier` instead of failing.
    RawNestedFallback(Box<Filter>),
}

impl Filter {
    /// A filter that matches every document.
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Filter::Field(field.into(), Condition::Equals(value.into()))
    }

    /// A field constrained by a single operator.
    pub fn op(field: impl Into<String>, operator: Operator) -> Self {
        Filter::Field(field.into(), Condition::Operators(vec![operator]))
    }

    /// A field constrained by several operators, all of which must hold.
    pub fn ops(field: impl Into<String>, operators: Vec<Operator>) -> Self {
        Filter::Field(field.into(), Condition::Operators(operators))
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    /// Conjoin another filter, flattening into an existing `And`.
    pub fn with(self, other: Filter) -> Self {
        match self {
            Filter::And(mut children) => {
                children.push(other);
                Filter::And(children)
            }
            node => Filter::And(vec![node, other]),
        }
    }

    /// The equality-only portion of the filter: `(path, value)` pairs whose
    /// expected value is a plain scalar rather than an operator map.
    ///
    /// Descends through conjunctions only; anything under `$or` is ambiguous
    /// and never contributes.
    pub fn equality_fields(&self) -> Vec<(&str, &Bson)> {
        let mut out = Vec::new();
        collect_equalities(self, &mut out);
        out
    }
}

fn collect_equalities<'a>(filter: &'a Filter, out: &mut Vec<(&'a str, &'a Bson)>) {
    match filter {
        Filter::And(children) => {
            for child in children {
                collect_equalities(child, out);
            }
        }
        Filter::Field(path, Condition::Equals(value)) => out.push((path.as_str(), value)),
        Filter::Field(..) | Filter::Or(_) => {}
    }
}

impl Operator {
    /// Compile a `$regex` pattern with optional `$options` flags.
    ///
    /// `i`, `m`, `s` and `x` become inline flags; other characters (such as the
    /// JavaScript-only `g` and `u`) carry no meaning here and are skipped.
    pub fn regex(pattern: &str, options: Option<&str>) -> Result<Self, FilterParseError> {
        let mut flags = String::new();
        for ch in options.unwrap_or_default().chars() {
            if matches!(ch, 'i' | 'm' | 's' | 'x') && !flags.contains(ch) {
                flags.push(ch);
            }
        }
        let full = if flags.is_empty() {
            pattern.to_string()
        } else {
            format!("(?{flags}){pattern}")
        };
        Regex::new(&full)
            .map(Operator::Regex)
            .map_err(|e| FilterParseError(format!("invalid regex pattern: {e}")))
    }
}

/// Parse a filter document into a [`Filter`] tree.
///
/// Follows document-query semantics:
/// - the top-level document is an implicit AND of all entries
/// - `$or` / `$and` take arrays of sub-filters
/// - `{ "field": value }` is direct equality
/// - `{ "field": { "$op": v, ... } }` is an operator map (implicit AND)
/// - unknown keys inside an operator map become [`Operator::RawNestedFallback`]
///
/// Only a malformed `$regex` is rejected; every other shape degrades to
/// something matchable.
pub fn parse_filter(doc: &Document) -> Result<Filter, FilterParseError> {
    let mut children = Vec::with_capacity(doc.len());

    for (key, value) in doc {
        match key.as_str() {
            "$or" => children.push(Filter::Or(parse_logical(value)?)),
            "$and" => children.push(Filter::And(parse_logical(value)?)),
            _ => children.push(Filter::Field(key.clone(), parse_condition(value)?)),
        }
    }

    if children.len() == 1 {
        return Ok(children.remove(0));
    }
    Ok(Filter::And(children))
}

/// `$and` / `$or` operands. Non-document elements are skipped and a
/// non-array operand yields no sub-filters.
fn parse_logical(value: &Bson) -> Result<Vec<Filter>, FilterParseError> {
    let Bson::Array(items) = value else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .filter_map(Bson::as_document)
        .map(parse_filter)
        .collect()
}

fn parse_condition(value: &Bson) -> Result<Condition, FilterParseError> {
    match value {
        Bson::Document(ops) => parse_operator_map(ops).map(Condition::Operators),
        other => Ok(Condition::Equals(other.clone())),
    }
}

fn parse_operator_map(doc: &Document) -> Result<Vec<Operator>, FilterParseError> {
    let mut operators = Vec::with_capacity(doc.len());

    for (key, value) in doc {
        let op = match key.as_str() {
            "$eq" => Operator::Eq(value.clone()),
            "$ne" => Operator::Ne(value.clone()),
            "$gt" => Operator::Gt(value.clone()),
            "$gte" => Operator::Gte(value.clone()),
            "$lt" => Operator::Lt(value.clone()),
            "$lte" => Operator::Lte(value.clone()),
            "$in" => Operator::In(as_list(value)),
            "$nin" => Operator::Nin(as_list(value)),
            "$exists" => Operator::Exists(truthy(value)),
            "$regex" => {
                let pattern = value
                    .as_str()
                    .ok_or_else(|| FilterParseError("$regex value must be a string".into()))?;
                let options = doc.get("$options").and_then(Bson::as_str);
                Operator::regex(pattern, options)?
            }
            // Consumed by $regex.
            "$options" => continue,
            _ => {
                let mut nested = Document::new();
                nested.insert(key.clone(), value.clone());
                Operator::RawNestedFallback(Box::new(parse_filter(&nested)?))
            }
        };
        operators.push(op);
    }

    Ok(operators)
}

fn as_list(value: &Bson) -> Vec<Bson> {
    match value {
        Bson::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// JavaScript-style truthiness, used for `$exists` operands.
fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0 && !n.is_nan(),
        Bson::String(s) => !s.is_empty(),
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}
