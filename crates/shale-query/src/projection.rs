use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// Fields that survive an inclusion projection unless explicitly hidden.
pub const IDENTITY_FIELDS: [&str; 2] = ["id", "_id"];

/// A field inclusion/exclusion reshaping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    /// Keep only `fields` plus the identity fields not listed in `hide`.
    Include { fields: Vec<String>, hide: Vec<String> },
    /// Remove `fields` from the full document.
    Exclude(Vec<String>),
}

impl Projection {
    /// Parse a projection given as a string or a document.
    pub fn parse(spec: &Bson) -> Self {
        match spec {
            Bson::String(s) => Self::from_str_spec(s),
            Bson::Document(doc) => Self::from_document(doc),
            _ => Projection::Exclude(Vec::new()),
        }
    }

    /// `"name balance"` includes, `"-password -pin"` excludes.
    ///
    /// When inclusion and exclusion tokens are mixed, inclusion wins: the
    /// exclusions are dropped except for identity fields, which are hidden.
    pub fn from_str_spec(spec: &str) -> Self {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for token in spec.split_whitespace() {
            match token.strip_prefix('-') {
                Some(field) => exclude.push(field.to_string()),
                None => include.push(token.trim_start_matches('+').to_string()),
            }
        }
        Self::resolve(include, exclude)
    }

    /// `{ "name": 1, "password": 0 }`. Truthy values include, falsy exclude;
    /// mixing follows the same inclusion-wins rule as the string form.
    pub fn from_document(doc: &Document) -> Self {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for (field, flag) in doc {
            if is_inclusion(flag) {
                include.push(field.clone());
            } else {
                exclude.push(field.clone());
            }
        }
        Self::resolve(include, exclude)
    }

    fn resolve(include: Vec<String>, exclude: Vec<String>) -> Self {
        if include.is_empty() {
            return Projection::Exclude(exclude);
        }
        let hide = exclude
            .into_iter()
            .filter(|f| IDENTITY_FIELDS.contains(&f.as_str()))
            .collect();
        Projection::Include {
            fields: include,
            hide,
        }
    }
}

fn is_inclusion(flag: &Bson) -> bool {
    match flag {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null | Bson::Undefined => false,
        // Strings ("$field" renames in full query languages) count as inclusion.
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn string_inclusion() {
        assert_eq!(
            Projection::from_str_spec("name balance"),
            Projection::Include {
                fields: vec!["name".into(), "balance".into()],
                hide: vec![],
            }
        );
    }

    #[test]
    fn string_exclusion() {
        assert_eq!(
            Projection::from_str_spec("-password -pin"),
            Projection::Exclude(vec!["password".into(), "pin".into()])
        );
    }

    #[test]
    fn mixed_map_inclusion_wins() {
        let projection = Projection::from_document(&doc! { "name": 1, "password": 0, "_id": 0 });
        assert_eq!(
            projection,
            Projection::Include {
                fields: vec!["name".into()],
                hide: vec!["_id".into()],
            }
        );
    }

    #[test]
    fn empty_is_identity() {
        assert_eq!(Projection::parse(&Bson::String(String::new())), Projection::Exclude(vec![]));
    }
}
