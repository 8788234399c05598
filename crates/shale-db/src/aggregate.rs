//! In-memory aggregation pipeline execution.
//!
//! Stages run in order over an owned batch of documents. Evaluation is
//! infallible: parse-time validation rejects every shape that could not be
//! executed.

use bson::{Bson, Document};
use chrono::{DateTime, Datelike, Timelike, Utc};
use shale_query::{Accumulator, Expr, Group, Stage};

use crate::matcher::matches;
use crate::projection::apply_projection;
use crate::{compare, path};

pub(crate) fn run_pipeline(mut docs: Vec<Document>, stages: &[Stage]) -> Vec<Document> {
    for stage in stages {
        docs = match stage {
            Stage::Match(filter) => docs.into_iter().filter(|d| matches(d, filter)).collect(),
            Stage::Group(group) => run_group(docs, group),
            Stage::Sort(sorts) => {
                compare::sort_documents(&mut docs, sorts);
                docs
            }
            Stage::Limit(n) => {
                docs.truncate(*n);
                docs
            }
            Stage::Project(projection) => docs
                .into_iter()
                .map(|d| apply_projection(d, projection))
                .collect(),
        };
    }
    docs
}

// ── $group ──────────────────────────────────────────────────────

/// Groups are emitted in first-seen order with the key under `_id`.
fn run_group(docs: Vec<Document>, group: &Group) -> Vec<Document> {
    let mut buckets: Vec<(Bson, Vec<Document>)> = Vec::new();
    for doc in docs {
        let key = eval(&group.key, &doc);
        match buckets.iter_mut().find(|(k, _)| compare::same_value(k, &key)) {
            Some((_, members)) => members.push(doc),
            None => buckets.push((key, vec![doc])),
        }
    }

    buckets
        .into_iter()
        .map(|(key, members)| {
            let mut out = Document::new();
            out.insert("_id", key);
            for (name, acc) in &group.fields {
                out.insert(name.clone(), accumulate(acc, &members));
            }
            out
        })
        .collect()
}

fn accumulate(acc: &Accumulator, members: &[Document]) -> Bson {
    match acc {
        Accumulator::Sum(expr) => {
            let mut total = Total::default();
            for doc in members {
                total.add(&eval(expr, doc));
            }
            total.into_bson()
        }
        Accumulator::Avg(expr) => {
            let values: Vec<f64> = members
                .iter()
                .filter_map(|d| compare::as_number(&eval(expr, d)))
                .collect();
            if values.is_empty() {
                Bson::Null
            } else {
                Bson::Double(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        Accumulator::Max(expr) => extreme(expr, members, |candidate, best| candidate > best),
        Accumulator::Min(expr) => extreme(expr, members, |candidate, best| candidate < best),
        Accumulator::Count => {
            let mut total = Total::default();
            for _ in members {
                total.add(&Bson::Int32(1));
            }
            total.into_bson()
        }
        Accumulator::First(expr) => members
            .first()
            .map(|d| eval(expr, d))
            .unwrap_or(Bson::Null),
    }
}

/// The numeric value that wins `better` against every other, in its stored
/// representation. Non-numeric values are ignored.
fn extreme(expr: &Expr, members: &[Document], better: fn(f64, f64) -> bool) -> Bson {
    let mut best: Option<(f64, Bson)> = None;
    for doc in members {
        let value = eval(expr, doc);
        let Some(n) = compare::as_number(&value) else {
            continue;
        };
        if best.as_ref().is_none_or(|(b, _)| better(n, *b)) {
            best = Some((n, value));
        }
    }
    best.map(|(_, v)| v).unwrap_or(Bson::Null)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Width {
    #[default]
    Int32,
    Int64,
    Double,
}

/// Running numeric sum that keeps the narrowest representation able to
/// hold the result.
#[derive(Debug, Default)]
struct Total {
    int: i64,
    float: f64,
    width: Width,
}

impl Total {
    fn add(&mut self, value: &Bson) {
        match value {
            Bson::Int32(n) => self.add_int(i64::from(*n)),
            Bson::Int64(n) => {
                self.width = self.width.max(Width::Int64);
                self.add_int(*n);
            }
            Bson::Double(n) => {
                self.width = Width::Double;
                self.float += n;
            }
            _ => {}
        }
    }

    fn add_int(&mut self, n: i64) {
        match self.int.checked_add(n) {
            Some(sum) => self.int = sum,
            None => {
                self.float += n as f64;
                self.width = Width::Double;
            }
        }
    }

    fn into_bson(self) -> Bson {
        match self.width {
            Width::Double => Bson::Double(self.int as f64 + self.float),
            Width::Int64 => Bson::Int64(self.int),
            Width::Int32 => i32::try_from(self.int)
                .map(Bson::Int32)
                .unwrap_or(Bson::Int64(self.int)),
        }
    }
}

// ── Expressions ─────────────────────────────────────────────────

/// Evaluate an expression against one document. Missing paths yield null.
fn eval(expr: &Expr, doc: &Document) -> Bson {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Field(field) => path::get_owned(doc, field).unwrap_or(Bson::Null),
        Expr::Object(parts) => {
            let mut out = Document::new();
            for (name, part) in parts {
                out.insert(name.clone(), eval(part, doc));
            }
            Bson::Document(out)
        }
        Expr::DateToString { format, date } => compare::to_millis(&eval(date, doc))
            .and_then(|ms| format_date(ms, format))
            .map(Bson::String)
            .unwrap_or(Bson::Null),
        Expr::Cond {
            left,
            right,
            then,
            otherwise,
        } => {
            if compare::same_value(&eval(left, doc), &eval(right, doc)) {
                eval(then, doc)
            } else {
                eval(otherwise, doc)
            }
        }
    }
}

/// Render epoch milliseconds (UTC) with `%Y %m %d %H %M %S %L` tokens.
/// Unknown tokens are copied through.
fn format_date(millis: i64, format: &str) -> Option<String> {
    let dt: DateTime<Utc> = DateTime::from_timestamp_millis(millis)?;
    let mut out = String::with_capacity(format.len() + 8);
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('Y') => out.push_str(&format!("{:04}", dt.year())),
            Some('m') => out.push_str(&format!("{:02}", dt.month())),
            Some('d') => out.push_str(&format!("{:02}", dt.day())),
            Some('H') => out.push_str(&format!("{:02}", dt.hour())),
            Some('M') => out.push_str(&format!("{:02}", dt.minute())),
            Some('S') => out.push_str(&format!("{:02}", dt.second())),
            Some('L') => out.push_str(&format!("{:03}", dt.timestamp_subsec_millis())),
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    Some(out)
}
