//! Request parameters and their flattening into form fields.
//!
//! The API takes form-encoded POST bodies, so nested parameters (merge
//! variable maps, batches of subscriber records, segment conditions) have to
//! be flattened into bracketed field names:
//!
//! | value under key `k`      | emitted fields                     |
//! |--------------------------|------------------------------------|
//! | scalar                   | `k`                                |
//! | mapping `{a: .., b: ..}` | `k[a]`, `k[b]` (recursively)       |
//! | sequence `[x, y]`        | `k[0]`, `k[1]` (recursively)       |
//! | `null`, `{}`, `[]`       | nothing                            |
//!
//! Strings are emitted verbatim, booleans as `true`/`false` and numbers in
//! their JSON form. Mapping keys come out in sorted order and sequence items
//! in index order, so a given `Params` always flattens to the same fields.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ChimpError, Result};

/// Named parameters for a single API action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    fields: Map<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to a value that is already JSON-shaped.
    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Set `key` only when `value` is present.
    pub fn set_opt<V: Into<Value>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    /// Set `key` to any serializable value.
    pub fn set_serialized<V: Serialize + ?Sized>(self, key: &str, value: &V) -> Result<Self> {
        let value = serde_json::to_value(value).map_err(ChimpError::Encode)?;
        Ok(self.set(key, value))
    }

    /// Merge the fields of a serializable struct (typically an options type
    /// whose unset fields are skipped) into the top level.
    pub fn merge<V: Serialize>(mut self, options: &V) -> Result<Self> {
        match serde_json::to_value(options).map_err(ChimpError::Encode)? {
            Value::Object(map) => {
                self.fields.extend(map);
                Ok(self)
            }
            Value::Null => Ok(self),
            other => Err(ChimpError::Encode(serde::ser::Error::custom(format!(
                "options must serialize to a mapping, got {other}"
            )))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn flatten(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (key, value) in sorted(&self.fields) {
            flatten_into(key.clone(), value, &mut out);
        }
        out
    }
}

/// Flatten a single JSON value rooted at `key` into form fields.
pub fn flatten_value(key: &str, value: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    flatten_into(key.to_string(), value, &mut out);
    out
}

fn flatten_into(key: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push((key, b.to_string())),
        Value::Number(n) => out.push((key, n.to_string())),
        Value::String(s) => out.push((key, s.clone())),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_into(format!("{key}[{index}]"), item, out);
            }
        }
        Value::Object(map) => {
            for (child, item) in sorted(map) {
                flatten_into(format!("{key}[{child}]"), item, out);
            }
        }
    }
}

// serde_json's map is only sorted without `preserve_order`, which another
// crate in the build may switch on.
fn sorted(map: &Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

/// Form-encode already flattened fields.
pub fn encode_form<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}
