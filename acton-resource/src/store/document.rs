//! Opaque JSON document owned by a store

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which documents carry their identifier
pub const ID_FIELD: &str = "id";

/// A store document: a JSON object with an `id` once persisted
///
/// # Example
///
/// ```rust
/// use acton_resource::store::Document;
/// use serde_json::json;
///
/// let mut doc = Document::from_value(json!({"id": "a1", "name": "lamp"})).unwrap();
/// doc.set(json!({"name": "desk", "id": "ignored"}).as_object().unwrap());
///
/// assert_eq!(doc.id().as_deref(), Some("a1"));
/// assert_eq!(doc.get("name"), Some(&json!("desk")));
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value; `None` unless it is an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// The document id, rendered as a string
    pub fn id(&self) -> Option<String> {
        match self.0.get(ID_FIELD)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Assign the id
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert(ID_FIELD.to_string(), Value::String(id.into()));
    }

    /// Copy every field of `fields` onto this document, except the id
    pub fn set(&mut self, fields: &Map<String, Value>) {
        for (key, value) in fields {
            if key != ID_FIELD {
                self.0.insert(key.clone(), value.clone());
            }
        }
    }

    /// Look up a dot-separated field path
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Insert a top-level field
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Remove a top-level field
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Borrow the underlying map
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Mutably borrow the underlying map
    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// Convert into a JSON value
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_requires_object() {
        assert!(Document::from_value(json!({"a": 1})).is_some());
        assert!(Document::from_value(json!([1, 2])).is_none());
        assert!(Document::from_value(json!("a")).is_none());
    }

    #[test]
    fn test_numeric_id_renders_as_string() {
        let doc = Document::from_value(json!({"id": 42})).unwrap();
        assert_eq!(doc.id().as_deref(), Some("42"));
    }

    #[test]
    fn test_nested_get() {
        let doc = Document::from_value(json!({"owner": {"address": {"city": "Oslo"}}})).unwrap();
        assert_eq!(doc.get("owner.address.city"), Some(&json!("Oslo")));
        assert_eq!(doc.get("owner.missing"), None);
        assert_eq!(doc.get("owner.address.city.x"), None);
    }

    #[test]
    fn test_set_never_overwrites_id() {
        let mut doc = Document::from_value(json!({"id": "keep", "n": 1})).unwrap();
        doc.set(json!({"id": "other", "n": 2, "m": true}).as_object().unwrap());
        assert_eq!(doc.into_value(), json!({"id": "keep", "n": 2, "m": true}));
    }
}
