use bson::{Bson, Document};

use crate::filter::{Filter, FilterParseError, parse_filter};
use crate::projection::Projection;
use crate::sort::{Sort, parse_sort};

/// Parse error for aggregation pipelines.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("pipeline parse error: {0}")]
pub struct PipelineParseError(pub String);

impl From<FilterParseError> for PipelineParseError {
    fn from(e: FilterParseError) -> Self {
        PipelineParseError(e.to_string())
    }
}

/// One aggregation stage. The set is closed: anything else is rejected at
/// parse time.
#[derive(Debug, Clone)]
pub enum Stage {
    Match(Filter),
    Group(Group),
    Sort(Vec<Sort>),
    Limit(usize),
    Project(Projection),
}

/// `$group`: a key expression plus named accumulators.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: Expr,
    pub fields: Vec<(String, Accumulator)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// A literal number multiplies the group size; any other expression is
    /// summed per document, skipping non-numeric results.
    Sum(Expr),
    Avg(Expr),
    Max(Expr),
    Min(Expr),
    Count,
    /// Evaluated on the first document of the group.
    First(Expr),
}

/// The minimal aggregation expression language.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Bson),
    /// `"$path"`, the value at a dotted path.
    Field(String),
    /// A document of sub-expressions, each resolved independently.
    Object(Vec<(String, Expr)>),
    /// `$dateToString` with `%Y`, `%m`, `%d` (and `%H`, `%M`, `%S`) tokens.
    DateToString { format: String, date: Box<Expr> },
    /// `$cond` whose condition is an `$eq` comparison.
    Cond {
        left: Box<Expr>,
        right: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a list of stage documents into [`Stage`]s.
///
/// # Errors
///
/// A stage document without exactly one key, an unsupported stage name, or a
/// malformed stage body.
pub fn parse_pipeline(stages: &[Document]) -> Result<Vec<Stage>, PipelineParseError> {
    stages.iter().map(parse_stage).collect()
}

fn parse_stage(doc: &Document) -> Result<Stage, PipelineParseError> {
    let mut entries = doc.iter();
    let (name, spec) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        _ => {
            return Err(PipelineParseError(
                "each stage must have exactly one key".into(),
            ));
        }
    };

    match name.as_str() {
        "$match" => {
            let filter = spec
                .as_document()
                .ok_or_else(|| PipelineParseError("$match value must be a document".into()))?;
            Ok(Stage::Match(parse_filter(filter)?))
        }
        "$group" => {
            let group = spec
                .as_document()
                .ok_or_else(|| PipelineParseError("$group value must be a document".into()))?;
            Ok(Stage::Group(parse_group(group)?))
        }
        "$sort" => Ok(Stage::Sort(parse_sort(spec))),
        "$limit" => Ok(Stage::Limit(coerce_limit(spec))),
        "$project" => Ok(Stage::Project(Projection::parse(spec))),
        other => Err(PipelineParseError(format!(
            "unsupported pipeline stage: {other}"
        ))),
    }
}

fn parse_group(doc: &Document) -> Result<Group, PipelineParseError> {
    let key = doc
        .get("_id")
        .ok_or_else(|| PipelineParseError("$group requires an _id expression".into()))?;
    let key = parse_expr(key)?;

    let mut fields = Vec::new();
    for (name, spec) in doc {
        if name == "_id" {
            continue;
        }
        fields.push((name.clone(), parse_accumulator(name, spec)?));
    }
    Ok(Group { key, fields })
}

fn parse_accumulator(name: &str, spec: &Bson) -> Result<Accumulator, PipelineParseError> {
    let (op, operand) = spec
        .as_document()
        .and_then(|d| d.iter().next())
        .ok_or_else(|| {
            PipelineParseError(format!("accumulator for '{name}' must be a document"))
        })?;

    let acc = match op.as_str() {
        "$sum" => Accumulator::Sum(parse_expr(operand)?),
        "$avg" => Accumulator::Avg(parse_expr(operand)?),
        "$max" => Accumulator::Max(parse_expr(operand)?),
        "$min" => Accumulator::Min(parse_expr(operand)?),
        "$count" => Accumulator::Count,
        "$first" => Accumulator::First(parse_expr(operand)?),
        other => {
            return Err(PipelineParseError(format!(
                "unsupported accumulator {other} for '{name}'"
            )));
        }
    };
    Ok(acc)
}

/// Parse an aggregation expression.
pub fn parse_expr(value: &Bson) -> Result<Expr, PipelineParseError> {
    match value {
        Bson::String(s) => match s.strip_prefix('$') {
            Some(path) if !path.is_empty() => Ok(Expr::Field(path.to_string())),
            _ => Ok(Expr::Literal(value.clone())),
        },
        Bson::Document(doc) => {
            let Some((first, operand)) = doc.iter().next() else {
                return Ok(Expr::Object(Vec::new()));
            };
            if !first.starts_with('$') {
                return doc
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), parse_expr(v)?)))
                    .collect::<Result<Vec<_>, PipelineParseError>>()
                    .map(Expr::Object);
            }
            match first.as_str() {
                "$cond" => parse_cond(operand),
                "$dateToString" => parse_date_to_string(operand),
                other => Err(PipelineParseError(format!(
                    "unsupported expression operator: {other}"
                ))),
            }
        }
        other => Ok(Expr::Literal(other.clone())),
    }
}

/// `{ $cond: [if, then, else] }` or `{ $cond: { if, then, else } }`, where
/// `if` is `{ $eq: [a, b] }`.
fn parse_cond(operand: &Bson) -> Result<Expr, PipelineParseError> {
    let (cond, then, otherwise) = match operand {
        Bson::Array(parts) if parts.len() == 3 => (&parts[0], &parts[1], &parts[2]),
        Bson::Document(d) => match (d.get("if"), d.get("then"), d.get("else")) {
            (Some(c), Some(t), Some(e)) => (c, t, e),
            _ => return Err(PipelineParseError("$cond requires if, then and else".into())),
        },
        _ => return Err(PipelineParseError("malformed $cond".into())),
    };

    let operands = cond
        .as_document()
        .and_then(|d| d.get("$eq"))
        .and_then(Bson::as_array)
        .filter(|pair| pair.len() == 2)
        .ok_or_else(|| {
            PipelineParseError("$cond condition must be an $eq of two expressions".into())
        })?;

    Ok(Expr::Cond {
        left: Box::new(parse_expr(&operands[0])?),
        right: Box::new(parse_expr(&operands[1])?),
        then: Box::new(parse_expr(then)?),
        otherwise: Box::new(parse_expr(otherwise)?),
    })
}

fn parse_date_to_string(operand: &Bson) -> Result<Expr, PipelineParseError> {
    let spec = operand
        .as_document()
        .ok_or_else(|| PipelineParseError("$dateToString value must be a document".into()))?;
    let date = spec
        .get("date")
        .ok_or_else(|| PipelineParseError("$dateToString requires a date".into()))?;
    let format = spec
        .get("format")
        .and_then(Bson::as_str)
        .unwrap_or(DEFAULT_DATE_FORMAT)
        .to_string();
    Ok(Expr::DateToString {
        format,
        date: Box::new(parse_expr(date)?),
    })
}

/// `$limit` operand to a count. Non-numeric values coerce to zero.
pub fn coerce_limit(value: &Bson) -> usize {
    let n = match value {
        Bson::Int32(n) => *n as f64,
        Bson::Int64(n) => *n as f64,
        Bson::Double(n) => *n,
        Bson::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Bson::Boolean(true) => 1.0,
        _ => 0.0,
    };
    if n.is_finite() && n > 0.0 {
        n.trunc() as usize
    } else {
        0
    }
}
