use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::Serialize;
use serde_json::{Map, Value};

use super::controller::FieldKey;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldValues(BTreeMap<FieldKey, Value>);

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: FieldKey, value: Value) -> Option<Value> {
        self.0.insert(key, value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &FieldKey> {
        self.0.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, FieldKey, Value> {
        self.0.iter()
    }

    pub fn into_inner(self) -> BTreeMap<FieldKey, Value> {
        self.0
    }

    pub fn to_nested(&self) -> Value {
        let mut root = Map::new();
        for (key, value) in &self.0 {
            insert_path(&mut root, key, value.clone());
        }
        Value::Object(root)
    }
}

impl FromIterator<(FieldKey, Value)> for FieldValues {
    fn from_iter<I: IntoIterator<Item = (FieldKey, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a FieldValues {
    type Item = (&'a FieldKey, &'a Value);
    type IntoIter = btree_map::Iter<'a, FieldKey, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for FieldValues {
    type Item = (FieldKey, Value);
    type IntoIter = btree_map::IntoIter<FieldKey, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn insert_path(root: &mut Map<String, Value>, key: &FieldKey, value: Value) {
    let segments = key.segments().collect::<Vec<_>>();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut cursor = root;
    for segment in parents {
        let slot = cursor
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        cursor = next;
    }
    cursor.insert((*last).to_string(), value);
}

pub(super) fn lookup_path<'a>(source: &'a Value, key: &FieldKey) -> Option<&'a Value> {
    let object = source.as_object()?;
    if let Some(value) = object.get(key.as_str()) {
        return Some(value);
    }
    let mut cursor = source;
    for segment in key.segments() {
        cursor = cursor.as_object()?.get(segment)?;
    }
    Some(cursor)
}

pub(super) fn leaf_paths(source: &Value) -> Vec<String> {
    fn walk(prefix: &str, value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Object(map) if !map.is_empty() => {
                for (segment, child) in map {
                    let path = if prefix.is_empty() {
                        segment.clone()
                    } else {
                        format!("{prefix}.{segment}")
                    };
                    walk(&path, child, out);
                }
            }
            _ => out.push(prefix.to_string()),
        }
    }

    let mut out = Vec::new();
    if source.is_object() {
        walk("", source, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_view_expands_dotted_keys() {
        let values = [
            (FieldKey::new("user.name"), json!("ada")),
            (FieldKey::new("user.age"), json!(36)),
            (FieldKey::new("agree"), json!(true)),
        ]
        .into_iter()
        .collect::<FieldValues>();

        assert_eq!(
            values.to_nested(),
            json!({"user": {"name": "ada", "age": 36}, "agree": true})
        );
    }

    #[test]
    fn lookup_prefers_flat_key_then_walks_path() {
        let source = json!({"user.name": "flat", "user": {"name": "nested", "tags": ["a"]}});
        assert_eq!(
            lookup_path(&source, &FieldKey::new("user.name")),
            Some(&json!("flat"))
        );
        assert_eq!(
            lookup_path(&source, &FieldKey::new("user.tags")),
            Some(&json!(["a"]))
        );
        assert_eq!(lookup_path(&source, &FieldKey::new("user.missing")), None);
    }

    #[test]
    fn leaf_paths_flatten_objects_only() {
        let mut paths = leaf_paths(&json!({"a": {"b": 1, "c": [1, 2]}, "d": null}));
        paths.sort();
        assert_eq!(paths, vec!["a.b", "a.c", "d"]);
        assert!(leaf_paths(&json!(3)).is_empty());
    }
}
