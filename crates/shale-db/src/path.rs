//! Dotted field path access (`"a.b.c"`).
//!
//! Reads never fail: a missing or non-container intermediate yields `None`.
//! Writes create intermediate documents as needed. Numeric segments index
//! into arrays.

use bson::{Bson, Document};

/// The value at `path`, or `None` if any segment is missing.
///
/// The empty path names the whole document, which is not a `Bson` borrow;
/// use [`get_owned`] when the path may be empty.
pub(crate) fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    if path.is_empty() {
        return None;
    }
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = step(current, segment)?;
    }
    Some(current)
}

/// Like [`get_path`], but the empty path yields a copy of the whole document.
pub(crate) fn get_owned(doc: &Document, path: &str) -> Option<Bson> {
    if path.is_empty() {
        return Some(Bson::Document(doc.clone()));
    }
    get_path(doc, path).cloned()
}

fn step<'a>(value: &'a Bson, segment: &str) -> Option<&'a Bson> {
    match value {
        Bson::Document(d) => d.get(segment),
        Bson::Array(items) => items.get(segment.parse::<usize>().ok()?),
        _ => None,
    }
}

pub(crate) fn get_path_mut<'a>(doc: &'a mut Document, path: &str) -> Option<&'a mut Bson> {
    match path.split_once('.') {
        None => doc.get_mut(path),
        Some((head, rest)) => step_mut(doc.get_mut(head)?, rest),
    }
}

fn step_mut<'a>(value: &'a mut Bson, path: &str) -> Option<&'a mut Bson> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let next = match value {
        Bson::Document(d) => d.get_mut(head)?,
        Bson::Array(items) => items.get_mut(head.parse::<usize>().ok()?)?,
        _ => return None,
    };
    match rest {
        Some(rest) => step_mut(next, rest),
        None => Some(next),
    }
}

/// Write `value` at `path`, replacing scalar intermediates with documents.
/// Setting the empty path to a document replaces the whole document.
pub(crate) fn set_path(doc: &mut Document, path: &str, value: Bson) {
    if path.is_empty() {
        if let Bson::Document(replacement) = value {
            *doc = replacement;
        }
        return;
    }

    let Some((head, rest)) = path.split_once('.') else {
        doc.insert(path, value);
        return;
    };

    if !matches!(doc.get(head), Some(Bson::Document(_) | Bson::Array(_))) {
        doc.insert(head, Document::new());
    }
    match doc.get_mut(head) {
        Some(Bson::Document(child)) => set_path(child, rest, value),
        Some(Bson::Array(items)) => set_in_array(items, rest, value),
        _ => {}
    }
}

fn set_in_array(items: &mut Vec<Bson>, path: &str, value: Bson) {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let Ok(index) = head.parse::<usize>() else {
        return;
    };
    match rest {
        None if index < items.len() => items[index] = value,
        None if index == items.len() => items.push(value),
        None => {}
        Some(rest) => match items.get_mut(index) {
            Some(Bson::Document(child)) => set_path(child, rest, value),
            Some(Bson::Array(nested)) => set_in_array(nested, rest, value),
            _ => {}
        },
    }
}

/// Remove the terminal key if its parent chain exists.
pub(crate) fn remove_path(doc: &mut Document, path: &str) -> Option<Bson> {
    match path.rsplit_once('.') {
        None => doc.remove(path),
        Some((parent, leaf)) => match get_path_mut(doc, parent)? {
            Bson::Document(d) => d.remove(leaf),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn get_nested_and_missing() {
        let doc = doc! { "a": { "b": { "c": 3 } }, "n": null };
        assert_eq!(get_path(&doc, "a.b.c"), Some(&Bson::Int32(3)));
        assert_eq!(get_path(&doc, "a.x.c"), None);
        assert_eq!(get_path(&doc, "n.deeper"), None);
        assert_eq!(get_path(&doc, ""), None);
    }

    #[test]
    fn get_through_array_index() {
        let doc = doc! { "items": [{ "sku": "x" }, { "sku": "y" }] };
        assert_eq!(get_path(&doc, "items.1.sku"), Some(&Bson::String("y".into())));
        assert_eq!(get_path(&doc, "items.sku"), None);
    }

    #[test]
    fn get_owned_empty_path_is_whole_document() {
        let doc = doc! { "a": 1 };
        assert_eq!(get_owned(&doc, ""), Some(Bson::Document(doc.clone())));
    }

    #[test]
    fn set_creates_intermediates() {
        let mut doc = doc! {};
        set_path(&mut doc, "a.b.c", Bson::Int32(1));
        assert_eq!(doc, doc! { "a": { "b": { "c": 1 } } });
    }

    #[test]
    fn set_replaces_scalar_intermediate() {
        let mut doc = doc! { "a": 5 };
        set_path(&mut doc, "a.b", Bson::Int32(1));
        assert_eq!(doc, doc! { "a": { "b": 1 } });
    }

    #[test]
    fn set_empty_path_replaces_document() {
        let mut doc = doc! { "a": 1 };
        set_path(&mut doc, "", Bson::Document(doc! { "b": 2 }));
        assert_eq!(doc, doc! { "b": 2 });
    }

    #[test]
    fn remove_terminal_key() {
        let mut doc = doc! { "a": { "b": 1, "c": 2 } };
        assert_eq!(remove_path(&mut doc, "a.b"), Some(Bson::Int32(1)));
        assert_eq!(doc, doc! { "a": { "c": 2 } });
    }

    #[test]
    fn remove_missing_parent_is_noop() {
        let mut doc = doc! { "a": 1 };
        assert_eq!(remove_path(&mut doc, "x.y"), None);
        assert_eq!(doc, doc! { "a": 1 });
    }

    #[test]
    fn get_mut_nested() {
        let mut doc = doc! { "a": { "b": 1 } };
        if let Some(v) = get_path_mut(&mut doc, "a.b") {
            *v = Bson::Int32(9);
        }
        assert_eq!(doc, doc! { "a": { "b": 9 } });
    }
}
