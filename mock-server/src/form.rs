//! Decoding of flattened form fields back into nested values.
//!
//! `merge_vars[FIRST]=unit` becomes `{"merge_vars": {"FIRST": "unit"}}` and
//! `emails[0]=a&emails[1]=b` becomes `{"emails": ["a", "b"]}`. Leaf values
//! stay strings; `Args` interprets them per action.

use serde_json::{Map, Value};

use crate::store::Fault;

/// Rebuild nested parameters from `(name, value)` form pairs.
pub fn unflatten(fields: &[(String, String)]) -> Map<String, Value> {
    let mut root = Map::new();
    for (name, value) in fields {
        let path = split_path(name);
        insert(&mut root, &path, value);
    }
    root.into_iter().map(|(k, v)| (k, fold_sequences(v))).collect()
}

fn split_path(name: &str) -> Vec<&str> {
    let (base, mut rest) = match name.find('[') {
        Some(i) => (&name[..i], &name[i..]),
        None => return vec![name],
    };
    let mut path = vec![base];
    while let Some(stripped) = rest.strip_prefix('[') {
        match stripped.find(']') {
            Some(end) => {
                path.push(&stripped[..end]);
                rest = &stripped[end + 1..];
            }
            None => break,
        }
    }
    path
}

fn insert(map: &mut Map<String, Value>, path: &[&str], value: &str) {
    match path {
        [] => {}
        [last] => {
            map.insert(last.to_string(), Value::String(value.to_string()));
        }
        [head, tail @ ..] => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                insert(child, tail, value);
            }
        }
    }
}

/// Turn mappings keyed `0..n` into sequences, recursively.
fn fold_sequences(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut indexed: Vec<(usize, Value)> = Vec::with_capacity(map.len());
            let mut all_indices = !map.is_empty();
            for key in map.keys() {
                if key.parse::<usize>().is_err() {
                    all_indices = false;
                    break;
                }
            }
            if all_indices {
                for (key, item) in map {
                    if let Ok(i) = key.parse::<usize>() {
                        indexed.push((i, fold_sequences(item)));
                    }
                }
                indexed.sort_by_key(|(i, _)| *i);
                if indexed.iter().enumerate().all(|(pos, (i, _))| pos == *i) {
                    return Value::Array(indexed.into_iter().map(|(_, v)| v).collect());
                }
                let map = indexed
                    .into_iter()
                    .map(|(i, v)| (i.to_string(), v))
                    .collect();
                return Value::Object(map);
            }
            Value::Object(map.into_iter().map(|(k, v)| (k, fold_sequences(v))).collect())
        }
        other => other,
    }
}

/// Typed access to one request's parameters.
pub struct Args<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Args<'a> {
    pub fn new(map: &'a Map<String, Value>) -> Self {
        Self { map }
    }

    pub fn opt_str(&self, key: &str) -> Option<&'a str> {
        self.map.get(key).and_then(Value::as_str)
    }

    pub fn str(&self, key: &str) -> Result<&'a str, Fault> {
        self.opt_str(key).ok_or_else(|| Fault::missing(key))
    }

    pub fn flag(&self, key: &str, default: bool) -> bool {
        match self.opt_str(key) {
            Some(v) => matches!(v, "true" | "1" | "True"),
            None => default,
        }
    }

    pub fn opt_u64(&self, key: &str) -> Result<Option<u64>, Fault> {
        match self.opt_str(key) {
            Some(v) => v.parse().map(Some).map_err(|_| Fault::invalid(key)),
            None => Ok(None),
        }
    }

    pub fn u64(&self, key: &str) -> Result<u64, Fault> {
        self.opt_u64(key)?.ok_or_else(|| Fault::missing(key))
    }

    /// A mapping parameter; absent means empty.
    pub fn map(&self, key: &str) -> Map<String, Value> {
        match self.map.get(key) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }

    /// A sequence parameter. A lone scalar counts as a one-item sequence.
    pub fn list(&self, key: &str) -> Vec<Value> {
        match self.map.get(key) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other.clone()],
        }
    }

    pub fn strings(&self, key: &str) -> Vec<String> {
        self.list(key)
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn plain_fields_stay_flat() {
        let map = unflatten(&pairs(&[("id", "abc"), ("double_optin", "false")]));
        assert_eq!(Value::Object(map), json!({"id": "abc", "double_optin": "false"}));
    }

    #[test]
    fn bracketed_fields_nest() {
        let map = unflatten(&pairs(&[
            ("merge_vars[FIRST]", "unit"),
            ("merge_vars[LAST]", "tests"),
        ]));
        assert_eq!(map["merge_vars"], json!({"FIRST": "unit", "LAST": "tests"}));
    }

    #[test]
    fn indexed_fields_become_sequences() {
        let map = unflatten(&pairs(&[
            ("batch[1][EMAIL]", "b@x.com"),
            ("batch[0][EMAIL]", "a@x.com"),
            ("emails[0]", "a@x.com"),
        ]));
        assert_eq!(
            map["batch"],
            json!([{"EMAIL": "a@x.com"}, {"EMAIL": "b@x.com"}])
        );
        assert_eq!(map["emails"], json!(["a@x.com"]));
    }

    #[test]
    fn sparse_indices_stay_a_mapping() {
        let map = unflatten(&pairs(&[("x[0]", "a"), ("x[2]", "c")]));
        assert_eq!(map["x"], json!({"0": "a", "2": "c"}));
    }

    #[test]
    fn args_interpret_flags_and_numbers() {
        let map = unflatten(&pairs(&[("a", "true"), ("b", "0"), ("n", "42")]));
        let args = Args::new(&map);
        assert!(args.flag("a", false));
        assert!(!args.flag("b", true));
        assert!(args.flag("missing", true));
        assert_eq!(args.u64("n").unwrap(), 42);
        assert!(args.u64("a").is_err());
    }

    #[test]
    fn scalar_counts_as_single_item_list() {
        let map = unflatten(&pairs(&[("email_address", "a@x.com")]));
        assert_eq!(Args::new(&map).strings("email_address"), vec!["a@x.com"]);
    }
}
