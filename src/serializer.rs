//! Parameter flattening.
//!
//! The Trello API does not accept nested objects in the query string.
//! Nested keys are joined with a separator (`prefs_permissionLevel`, or
//! `prefs/permissionLevel` for endpoints that document that form), lists
//! become one comma-separated value, and every value is percent-encoded.
//!
//! # Encoding rules
//!
//! | Value            | Query output                               |
//! |------------------|--------------------------------------------|
//! | `Null`           | `key=`                                     |
//! | `Str`/`Int`/`Float` | percent-encoded text                    |
//! | `Bool`           | `true` / `false`                           |
//! | `Date`           | `2024-05-01T12:00:00.000Z` (encoded)       |
//! | `List`           | elements encoded one by one, joined by `,` |
//! | `Nested`         | one pair per leaf, keys joined by separator |
//!
//! Because list elements are encoded before joining, a comma inside an
//! element becomes `%2C` and only the join delimiter stays a bare comma.

use std::fmt;
use std::str::FromStr;

use chrono::SecondsFormat;

use crate::error::TrellisError;
use crate::params::{ParamBag, ParamValue, Scalar};

/// Token used to join parent and child keys when flattening.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NestingSeparator {
    /// `prefs_permissionLevel`
    #[default]
    Underscore,
    /// `prefs/permissionLevel`
    Slash,
}

impl NestingSeparator {
    /// The literal joining token.
    pub fn as_str(&self) -> &'static str {
        match self {
            NestingSeparator::Underscore => "_",
            NestingSeparator::Slash => "/",
        }
    }
}

impl FromStr for NestingSeparator {
    type Err = TrellisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "_" | "underscore" => Ok(NestingSeparator::Underscore),
            "/" | "slash" => Ok(NestingSeparator::Slash),
            other => Err(TrellisError::validation(format!(
                "unknown nesting separator {:?}, expected \"_\" or \"/\"",
                other
            ))),
        }
    }
}

/// Per-call encoding options, passed beside the parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodingOptions {
    /// Separator for nested keys.
    pub separator: NestingSeparator,
}

impl EncodingOptions {
    /// Default options (`_` separator).
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for endpoints that flatten with `/`.
    pub fn slash() -> Self {
        Self {
            separator: NestingSeparator::Slash,
        }
    }

    /// Sets the nesting separator.
    #[must_use]
    pub fn with_separator(mut self, separator: NestingSeparator) -> Self {
        self.separator = separator;
        self
    }
}

/// Flat, percent-encoded `key=value` pairs in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializedQuery {
    pairs: Vec<(String, String)>,
}

impl SerializedQuery {
    /// Returns the encoded value for an encoded key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if the key was emitted.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns true if nothing was emitted.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterates pairs in emission order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Appends the `key` and `token` credentials after every other pair.
    #[must_use]
    pub fn with_credentials(mut self, key: &str, token: &str) -> Self {
        self.pairs
            .push(("key".to_string(), urlencoding::encode(key).into_owned()));
        self.pairs
            .push(("token".to_string(), urlencoding::encode(token).into_owned()));
        self
    }

    /// Renders `k1=v1&k2=v2`.
    pub fn to_query_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SerializedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}

/// Flattens parameters into a percent-encoded query.
///
/// Pure and deterministic: the same bag and options always produce the
/// same pairs in the same order.
pub fn serialize(params: &ParamBag, options: &EncodingOptions) -> SerializedQuery {
    let separator = options.separator.as_str();
    let mut pairs = Vec::with_capacity(params.leaf_count());

    for_each_leaf(params, &mut Vec::new(), &mut |path, value| {
        let key = path
            .iter()
            .map(|segment| urlencoding::encode(segment))
            .collect::<Vec<_>>()
            .join(separator);
        pairs.push((key, encode_value(value)));
    });

    SerializedQuery { pairs }
}

/// Flattens parameters into multipart text fields.
///
/// Keys are joined the same way as [`serialize`] but nothing is
/// percent-encoded, and each list element becomes its own field.
pub fn multipart_fields(params: &ParamBag, options: &EncodingOptions) -> Vec<(String, String)> {
    let separator = options.separator.as_str();
    let mut fields = Vec::with_capacity(params.leaf_count());

    for_each_leaf(params, &mut Vec::new(), &mut |path, value| {
        let key = path.join(separator);
        match value {
            ParamValue::Null => fields.push((key, String::new())),
            ParamValue::Scalar(scalar) => fields.push((key, scalar_text(scalar))),
            ParamValue::List(items) => {
                fields.extend(items.iter().map(|item| (key.clone(), scalar_text(item))));
            }
            ParamValue::Nested(_) => unreachable!("for_each_leaf never yields nested bags"),
        }
    });

    fields
}

/// Depth-first walk calling `visit` with the key path of every leaf.
fn for_each_leaf<'a, F>(bag: &'a ParamBag, path: &mut Vec<&'a str>, visit: &mut F)
where
    F: FnMut(&[&'a str], &'a ParamValue),
{
    for (key, value) in bag.iter() {
        path.push(key);
        match value {
            ParamValue::Nested(child) => for_each_leaf(child, path, visit),
            leaf => visit(path, leaf),
        }
        path.pop();
    }
}

fn encode_value(value: &ParamValue) -> String {
    match value {
        ParamValue::Null => String::new(),
        ParamValue::Scalar(scalar) => urlencoding::encode(&scalar_text(scalar)).into_owned(),
        ParamValue::List(items) => items
            .iter()
            .map(|item| urlencoding::encode(&scalar_text(item)).into_owned())
            .collect::<Vec<_>>()
            .join(","),
        ParamValue::Nested(_) => unreachable!("for_each_leaf never yields nested bags"),
    }
}

/// Unencoded text form of a primitive.
pub(crate) fn scalar_text(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Str(s) => s.clone(),
        Scalar::Int(n) => n.to_string(),
        Scalar::Float(n) => n.to_string(),
        Scalar::Bool(b) => b.to_string(),
        Scalar::Date(d) => d.to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}
