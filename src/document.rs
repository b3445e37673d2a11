use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Value found at a key path inside a document.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A string, number or boolean, in string form
    Leaf(String),
    /// The path crossed one or more arrays
    Sequence(Vec<FieldValue>),
    /// Nothing usable at the path
    Absent,
}

impl FieldValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }
}

/// Extractor hook: given a document and a key path, return its value(s).
#[derive(Clone)]
pub struct GetFn(Arc<dyn Fn(&Value, &[String]) -> FieldValue + Send + Sync>);

impl GetFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &[String]) -> FieldValue + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, doc: &Value, path: &[String]) -> FieldValue {
        (self.0)(doc, path)
    }
}

impl Default for GetFn {
    fn default() -> Self {
        Self::new(get_path)
    }
}

impl fmt::Debug for GetFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GetFn(..)")
    }
}

/// String form of a scalar JSON value
pub fn leaf_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Default dotted-path accessor.
///
/// Walks `path` through nested objects. Arrays met on the way are fanned
/// out into a `Sequence` that keeps one entry per element, so
/// `"authors.name"` over `{"authors": [{"name": ..}, ..]}` yields every
/// name at its array position. Nulls, missing fields and objects left at
/// the end of the path are `Absent`.
pub fn get_path(doc: &Value, path: &[String]) -> FieldValue {
    match (doc, path.split_first()) {
        (Value::Null, _) => FieldValue::Absent,
        (Value::Array(items), _) => {
            FieldValue::Sequence(items.iter().map(|item| get_path(item, path)).collect())
        }
        (Value::Object(map), Some((segment, rest))) => map
            .get(segment)
            .map_or(FieldValue::Absent, |child| get_path(child, rest)),
        (_, None) => leaf_text(doc).map_or(FieldValue::Absent, FieldValue::Leaf),
        // A scalar with path segments left over
        (_, Some(_)) => FieldValue::Absent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> Vec<String> {
        p.split('.').map(str::to_string).collect()
    }

    #[test]
    fn test_get_scalar_leaves() {
        let doc = json!({"title": "Old Man", "year": 1952, "ebook": false});

        assert_eq!(get_path(&doc, &path("title")), FieldValue::Leaf("Old Man".into()));
        assert_eq!(get_path(&doc, &path("year")), FieldValue::Leaf("1952".into()));
        assert_eq!(get_path(&doc, &path("ebook")), FieldValue::Leaf("false".into()));
        assert!(get_path(&doc, &path("missing")).is_absent());
    }

    #[test]
    fn test_get_nested_object() {
        let doc = json!({"author": {"name": {"first": "Ernest"}}});
        assert_eq!(
            get_path(&doc, &path("author.name.first")),
            FieldValue::Leaf("Ernest".into())
        );
        // Stopping at an object yields nothing
        assert!(get_path(&doc, &path("author.name")).is_absent());
    }

    #[test]
    fn test_get_through_arrays() {
        let doc = json!({
            "tags": ["sea", ["fish", "boat"]],
            "authors": [{"name": "A"}, {"name": "B"}, {"other": 1}]
        });

        assert_eq!(
            get_path(&doc, &path("tags")),
            FieldValue::Sequence(vec![
                FieldValue::Leaf("sea".into()),
                FieldValue::Sequence(vec![
                    FieldValue::Leaf("fish".into()),
                    FieldValue::Leaf("boat".into()),
                ]),
            ])
        );
        assert_eq!(
            get_path(&doc, &path("authors.name")),
            FieldValue::Sequence(vec![
                FieldValue::Leaf("A".into()),
                FieldValue::Leaf("B".into()),
                FieldValue::Absent,
            ])
        );
    }

    #[test]
    fn test_custom_get_fn() {
        let get_fn = GetFn::new(|doc, _| match doc.get("title") {
            Some(Value::String(s)) => FieldValue::Leaf(s.to_uppercase()),
            _ => FieldValue::Absent,
        });
        let doc = json!({"title": "loud"});
        assert_eq!(get_fn.call(&doc, &path("ignored")), FieldValue::Leaf("LOUD".into()));
    }
}
