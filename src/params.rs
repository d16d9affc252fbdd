//! Typed request parameters.
//!
//! A [`ParamBag`] is the nested key/value object a caller hands to the
//! client. Values form a closed set ([`ParamValue`]) so the serializer can
//! match on them exhaustively instead of probing untyped JSON.
//!
//! Omitting a key and sending an empty value are different things: a key
//! that is never inserted is not sent at all, while [`ParamValue::Null`]
//! is sent with an empty value to clear the field remotely.

use chrono::{DateTime, Utc};

use crate::error::TrellisError;

/// A single primitive value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Free-form text, including sentinel values such as `"all"` or `"none"`.
    Str(String),
    /// Integer number.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Boolean, sent as `true`/`false`.
    Bool(bool),
    /// Point in time, sent as an ISO-8601 UTC timestamp.
    Date(DateTime<Utc>),
}

/// Any value a parameter can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Explicitly empty; serialized as `key=`.
    Null,
    /// A primitive.
    Scalar(Scalar),
    /// Primitives joined into one comma-separated value.
    List(Vec<Scalar>),
    /// A nested object, flattened with the nesting separator.
    Nested(ParamBag),
}

/// Ordered mapping of parameter names to values.
///
/// Keys are case-sensitive and unique; inserting an existing key replaces
/// its value without moving it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamBag {
    entries: Vec<(String, ParamValue)>,
}

impl ParamBag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Inserts the value only when it is present.
    pub fn insert_opt<V: Into<ParamValue>>(&mut self, key: impl Into<String>, value: Option<V>) {
        if let Some(value) = value {
            self.insert(key, value);
        }
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Builder form of [`insert_opt`](Self::insert_opt).
    #[must_use]
    pub fn with_opt<V: Into<ParamValue>>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        self.insert_opt(key, value);
        self
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the bag has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Counts the leaves that will be emitted when flattened.
    pub fn leaf_count(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, v)| match v {
                ParamValue::Nested(bag) => bag.leaf_count(),
                _ => 1,
            })
            .sum()
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for ParamBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = ParamBag::new();
        for (k, v) in iter {
            bag.insert(k, v);
        }
        bag
    }
}

impl TryFrom<serde_json::Value> for ParamBag {
    type Error = TrellisError;

    /// Converts a JSON object. Arrays may only contain primitives.
    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Object(map) => {
                let mut bag = ParamBag::new();
                for (key, value) in map {
                    let value = ParamValue::try_from_json(&key, value)?;
                    bag.insert(key, value);
                }
                Ok(bag)
            }
            other => Err(TrellisError::validation(format!(
                "parameters must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

impl ParamValue {
    fn try_from_json(key: &str, value: serde_json::Value) -> Result<Self, TrellisError> {
        use serde_json::Value;

        Ok(match value {
            Value::Null => ParamValue::Null,
            Value::Array(items) => ParamValue::List(
                items
                    .into_iter()
                    .map(|item| {
                        Scalar::try_from_json(item).ok_or_else(|| {
                            TrellisError::validation(format!(
                                "array parameter {:?} may only contain primitives",
                                key
                            ))
                        })
                    })
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => ParamValue::Nested(ParamBag::try_from(Value::Object(map))?),
            other => match Scalar::try_from_json(other) {
                Some(scalar) => ParamValue::Scalar(scalar),
                None => ParamValue::Null,
            },
        })
    }
}

impl Scalar {
    fn try_from_json(value: serde_json::Value) -> Option<Self> {
        use serde_json::Value;

        match value {
            Value::String(s) => Some(Scalar::Str(s)),
            Value::Bool(b) => Some(Scalar::Bool(b)),
            // Integers beyond i64 keep their exact digits.
            Value::Number(n) if n.is_u64() && !n.is_i64() => Some(Scalar::Str(n.to_string())),
            Value::Number(n) => n
                .as_i64()
                .map(Scalar::Int)
                .or_else(|| n.as_f64().map(Scalar::Float)),
            _ => None,
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Str(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(value.into())
    }
}

impl From<u32> for Scalar {
    fn from(value: u32) -> Self {
        Scalar::Int(value.into())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(value: DateTime<Utc>) -> Self {
        Scalar::Date(value)
    }
}

macro_rules! scalar_param {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(value: $ty) -> Self {
                    ParamValue::Scalar(value.into())
                }
            }
        )*
    };
}

scalar_param!(&str, String, bool, i64, i32, u32, f64, DateTime<Utc>);

impl From<Scalar> for ParamValue {
    fn from(value: Scalar) -> Self {
        ParamValue::Scalar(value)
    }
}

impl<T: Into<Scalar>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        ParamValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<ParamBag> for ParamValue {
    fn from(bag: ParamBag) -> Self {
        ParamValue::Nested(bag)
    }
}

/// A file sent as one binary field of a multipart body.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryPart {
    /// Multipart field name (e.g., `file`).
    pub field: String,
    /// File name reported to the server.
    pub file_name: String,
    /// MIME type, if known.
    pub mime_type: Option<String>,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl BinaryPart {
    /// Creates a part for the given field.
    pub fn new(field: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            mime_type: None,
            bytes,
        }
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_insert_replaces_in_place() {
        let mut bag = ParamBag::new().with("name", "a").with("pos", "top");
        bag.insert("name", "b");

        let keys: Vec<_> = bag.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["name", "pos"]);
        assert_eq!(bag.get("name"), Some(&ParamValue::from("b")));
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let bag = ParamBag::new().with("idList", "1").with("idlist", "2");
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn test_insert_opt_skips_absent() {
        let bag = ParamBag::new()
            .with_opt("desc", None::<&str>)
            .with_opt("name", Some("Card"));
        assert_eq!(bag.len(), 1);
        assert!(bag.get("desc").is_none());
    }

    #[test]
    fn test_remove() {
        let mut bag = ParamBag::new().with("a", 1i64).with("b", 2i64);
        assert_eq!(bag.remove("a"), Some(ParamValue::from(1i64)));
        assert_eq!(bag.remove("a"), None);
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn test_leaf_count_descends_into_nested() {
        let bag = ParamBag::new()
            .with("name", "Board")
            .with("idMembers", vec!["a", "b"])
            .with(
                "prefs",
                ParamBag::new()
                    .with("permissionLevel", "private")
                    .with("voting", ParamBag::new().with("enabled", true)),
            );
        assert_eq!(bag.leaf_count(), 4);
    }

    #[test]
    fn test_from_iterator() {
        let bag: ParamBag = vec![("fields", "name"), ("filter", "open")].into_iter().collect();
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn test_try_from_json() {
        let bag = ParamBag::try_from(json!({
            "name": "Test Board",
            "closed": false,
            "pos": 3,
            "weight": 1.5,
            "desc": null,
            "idMembers": ["x", "y"],
            "prefs": { "permissionLevel": "private" }
        }))
        .unwrap();

        assert_eq!(bag.get("closed"), Some(&ParamValue::from(false)));
        assert_eq!(bag.get("pos"), Some(&ParamValue::from(3i64)));
        assert_eq!(bag.get("weight"), Some(&ParamValue::from(1.5)));
        assert_eq!(bag.get("desc"), Some(&ParamValue::Null));
        assert_eq!(bag.get("idMembers"), Some(&ParamValue::from(vec!["x", "y"])));
        assert!(matches!(bag.get("prefs"), Some(ParamValue::Nested(_))));
    }

    #[test]
    fn test_try_from_json_keeps_large_integers_exact() {
        let bag = ParamBag::try_from(json!({ "pos": u64::MAX, "small": 12, "ratio": 0.5 })).unwrap();

        assert_eq!(
            bag.get("pos"),
            Some(&ParamValue::Scalar(Scalar::Str("18446744073709551615".to_string())))
        );
        assert_eq!(bag.get("small"), Some(&ParamValue::Scalar(Scalar::Int(12))));
        assert_eq!(bag.get("ratio"), Some(&ParamValue::Scalar(Scalar::Float(0.5))));
    }

    #[test]
    fn test_try_from_json_rejects_nested_arrays() {
        let err = ParamBag::try_from(json!({ "ids": [["a"]] })).unwrap_err();
        assert!(err.to_string().contains("ids"));
    }

    #[test]
    fn test_try_from_json_rejects_non_object() {
        let err = ParamBag::try_from(json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_binary_part_builder() {
        let part = BinaryPart::new("file", "logo.png", vec![1, 2, 3]).with_mime_type("image/png");
        assert_eq!(part.field, "file");
        assert_eq!(part.mime_type.as_deref(), Some("image/png"));
    }
}
