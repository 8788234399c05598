use bson::Bson;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Parse a sort specification.
///
/// Accepts `{ "field": 1, "other": -1 }` (negative numbers and the strings
/// `"desc"`/`"descending"` mean descending, anything else ascending) or a
/// space-separated string where a `-` prefix marks a descending key.
/// Any other shape yields no sort keys.
pub fn parse_sort(spec: &Bson) -> Vec<Sort> {
    match spec {
        Bson::Document(doc) => doc
            .iter()
            .map(|(field, dir)| Sort {
                field: field.clone(),
                direction: direction_of(dir),
            })
            .collect(),
        Bson::String(s) => s
            .split_whitespace()
            .map(|token| match token.strip_prefix('-') {
                Some(field) => Sort::desc(field),
                None => Sort::asc(token.trim_start_matches('+')),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn direction_of(value: &Bson) -> SortDirection {
    let descending = match value {
        Bson::Int32(n) => *n < 0,
        Bson::Int64(n) => *n < 0,
        Bson::Double(n) => *n < 0.0,
        Bson::String(s) => matches!(s.to_ascii_lowercase().as_str(), "desc" | "descending" | "-1"),
        _ => false,
    };
    if descending {
        SortDirection::Desc
    } else {
        SortDirection::Asc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn document_form() {
        let sorts = parse_sort(&Bson::Document(doc! { "createdAt": -1, "name": 1 }));
        assert_eq!(sorts, vec![Sort::desc("createdAt"), Sort::asc("name")]);
    }

    #[test]
    fn string_form() {
        let sorts = parse_sort(&Bson::String("-amount name".into()));
        assert_eq!(sorts, vec![Sort::desc("amount"), Sort::asc("name")]);
    }

    #[test]
    fn string_directions() {
        let sorts = parse_sort(&Bson::Document(doc! { "a": "desc", "b": "asc" }));
        assert_eq!(sorts, vec![Sort::desc("a"), Sort::asc("b")]);
    }
}
