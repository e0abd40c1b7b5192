use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde_json::Value;

use super::binding::FieldOptions;
use super::controller::{FieldData, FieldKey, FormError, FormResult, ValidationError};

#[derive(Clone, Debug)]
pub(super) struct FieldEntry {
    pub(super) options: FieldOptions,
    pub(super) value: Value,
    pub(super) initial_value: Value,
    pub(super) errors: Option<Vec<ValidationError>>,
    pub(super) touched: bool,
    pub(super) validating: bool,
    pub(super) dirty: bool,
    /// False once unregistered with `preserve`, or while only the host has
    /// supplied state for a field nobody decorated yet.
    pub(super) active: bool,
    pub(super) declared: bool,
    sequence: u64,
}

impl FieldEntry {
    fn declared(options: FieldOptions, sequence: u64) -> Self {
        let value = options.initial_value.clone().unwrap_or(Value::Null);
        Self {
            sequence,
            options,
            initial_value: value.clone(),
            value,
            errors: None,
            touched: false,
            validating: false,
            dirty: false,
            active: true,
            declared: true,
        }
    }

    pub(super) fn data(&self) -> FieldData {
        FieldData {
            value: self.value.clone(),
            errors: self.errors.clone(),
            touched: self.touched,
            validating: self.validating,
            dirty: self.dirty,
        }
    }

    pub(super) fn set_value(&mut self, value: Value) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        self.dirty = self.value != self.initial_value;
        true
    }

    pub(super) fn set_errors(&mut self, errors: Vec<ValidationError>) {
        self.errors = (!errors.is_empty()).then_some(errors);
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum Unregistered {
    Removed,
    Preserved,
}

#[derive(Debug, Default)]
pub(super) struct FieldRegistry {
    entries: BTreeMap<FieldKey, FieldEntry>,
    order: Vec<FieldKey>,
    next_sequence: u64,
}

impl FieldRegistry {
    pub(super) fn register(
        &mut self,
        key: &FieldKey,
        options: FieldOptions,
    ) -> FormResult<&FieldEntry> {
        key.validate()?;
        options.check(key)?;
        if let Some(existing) = self
            .order
            .iter()
            .find(|other| other.is_ancestor_of(key) || key.is_ancestor_of(other))
        {
            return Err(FormError::FieldKeyConflict {
                key: key.clone(),
                existing: existing.clone(),
            });
        }

        let entry = match self.entries.entry(key.clone()) {
            Entry::Vacant(vacant) => {
                self.order.push(key.clone());
                self.next_sequence += 1;
                return Ok(vacant.insert(FieldEntry::declared(options, self.next_sequence)));
            }
            Entry::Occupied(occupied) => occupied.into_mut(),
        };

        if let Some(initial) = options.initial_value.clone() {
            if initial != entry.initial_value {
                entry.initial_value = initial.clone();
                match (entry.declared, entry.touched) {
                    (true, true) => tracing::warn!(
                        field = %key,
                        "initial_value ignored because the field was already touched"
                    ),
                    (true, false) => entry.value = initial,
                    // host-seeded value wins over the declared default
                    (false, _) => {}
                }
            }
        }
        entry.dirty = entry.value != entry.initial_value;
        entry.options = options;
        entry.active = true;
        entry.declared = true;
        Ok(entry)
    }

    pub(super) fn unregister(&mut self, key: &FieldKey) -> Option<Unregistered> {
        let entry = self.entries.get_mut(key)?;
        if entry.options.preserve {
            entry.active = false;
            return Some(Unregistered::Preserved);
        }
        self.entries.remove(key);
        self.order.retain(|other| other != key);
        Some(Unregistered::Removed)
    }

    pub(super) fn get(&self, key: &str) -> Option<&FieldEntry> {
        self.entries.get(key)
    }

    pub(super) fn get_mut(&mut self, key: &str) -> Option<&mut FieldEntry> {
        self.entries.get_mut(key)
    }

    pub(super) fn get_all(&self, keys: Option<&[FieldKey]>) -> Vec<(&FieldKey, &FieldEntry)> {
        match keys {
            None => self
                .order
                .iter()
                .filter_map(|key| self.entries.get_key_value(key))
                .filter(|(_, entry)| entry.active)
                .collect(),
            Some(keys) => {
                let mut found = keys
                    .iter()
                    .filter_map(|key| self.entries.get_key_value(key))
                    .collect::<Vec<_>>();
                found.sort_by_key(|(_, entry)| entry.sequence);
                found.dedup_by(|left, right| left.0 == right.0);
                found
            }
        }
    }

    pub(super) fn keys(&self) -> impl Iterator<Item = &FieldKey> {
        self.order.iter()
    }

    pub(super) fn active_keys(&self) -> impl Iterator<Item = &FieldKey> {
        self.order
            .iter()
            .filter(|key| self.entries.get(*key).is_some_and(|entry| entry.active))
    }

    pub(super) fn position(&self, key: &str) -> u64 {
        self.entries
            .get(key)
            .map_or(u64::MAX, |entry| entry.sequence)
    }

    pub(super) fn reset(&mut self, keys: Option<&[FieldKey]>) -> Vec<FieldKey> {
        let targets = self
            .get_all(keys)
            .into_iter()
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        for key in &targets {
            if let Some(entry) = self.entries.get_mut(key) {
                entry.value = entry.initial_value.clone();
                entry.errors = None;
                entry.touched = false;
                entry.dirty = false;
                entry.validating = false;
            }
        }
        targets
    }

    pub(super) fn seed(&mut self, key: &FieldKey, data: FieldData) -> FormResult<()> {
        key.validate()?;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.dirty = data.value != entry.initial_value;
                entry.value = data.value;
                entry.errors = data.errors.filter(|errors| !errors.is_empty());
                entry.touched = data.touched;
                entry.validating = data.validating;
            }
            None => {
                self.order.push(key.clone());
                self.next_sequence += 1;
                self.entries.insert(
                    key.clone(),
                    FieldEntry {
                        sequence: self.next_sequence,
                        options: FieldOptions::default(),
                        initial_value: Value::Null,
                        dirty: !data.value.is_null(),
                        value: data.value,
                        errors: data.errors.filter(|errors| !errors.is_empty()),
                        touched: data.touched,
                        validating: data.validating,
                        active: false,
                        declared: false,
                    },
                );
            }
        }
        Ok(())
    }

    pub(super) fn exclusive_siblings(&self, key: &FieldKey) -> Vec<FieldKey> {
        let Some(group) = self.get(key.as_str()).and_then(|entry| entry.options.group_of(key)) else {
            return Vec::new();
        };
        self.active_keys()
            .filter(|other| *other != key)
            .filter(|other| {
                self.get(other.as_str())
                    .and_then(|entry| entry.options.group_of(other))
                    .is_some_and(|other_group| other_group == group)
            })
            .cloned()
            .collect()
    }

    pub(super) fn dependents_of(&self, source: &FieldKey) -> Vec<FieldKey> {
        self.active_keys()
            .filter(|key| {
                self.get(key.as_str())
                    .is_some_and(|entry| entry.options.dependencies.contains(source))
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(value: &str) -> FieldKey {
        FieldKey::new(value)
    }

    #[test]
    fn register_is_idempotent_and_keeps_touched_value() {
        let mut registry = FieldRegistry::default();
        registry
            .register(&key("name"), FieldOptions::new().initial_value(json!("a")))
            .expect("register");
        {
            let entry = registry.get_mut("name").expect("entry");
            entry.set_value(json!("typed"));
            entry.touched = true;
        }
        let entry = registry
            .register(&key("name"), FieldOptions::new().initial_value(json!("b")))
            .expect("re-register");
        assert_eq!(entry.value, json!("typed"));
        assert_eq!(entry.initial_value, json!("b"));
        assert!(entry.touched);
        assert_eq!(registry.get_all(None).len(), 1);
    }

    #[test]
    fn untouched_field_takes_new_initial_value() {
        let mut registry = FieldRegistry::default();
        registry
            .register(&key("name"), FieldOptions::new().initial_value(json!("a")))
            .expect("register");
        let entry = registry
            .register(&key("name"), FieldOptions::new().initial_value(json!("b")))
            .expect("re-register");
        assert_eq!(entry.value, json!("b"));
        assert!(!entry.dirty);
    }

    #[test]
    fn ancestor_keys_conflict() {
        let mut registry = FieldRegistry::default();
        registry
            .register(&key("user.name"), FieldOptions::new())
            .expect("register");
        assert!(matches!(
            registry.register(&key("user"), FieldOptions::new()),
            Err(FormError::FieldKeyConflict { .. })
        ));
        assert!(registry.register(&key("username"), FieldOptions::new()).is_ok());
        assert!(matches!(
            registry.register(&key("a..b"), FieldOptions::new()),
            Err(FormError::InvalidFieldKey { .. })
        ));
    }

    #[test]
    fn preserved_fields_go_inactive_and_leave_default_scope() {
        let mut registry = FieldRegistry::default();
        registry
            .register(&key("kept"), FieldOptions::new().preserve(true))
            .expect("register kept");
        registry
            .register(&key("dropped"), FieldOptions::new())
            .expect("register dropped");

        assert_eq!(registry.unregister(&key("kept")), Some(Unregistered::Preserved));
        assert_eq!(registry.unregister(&key("dropped")), Some(Unregistered::Removed));
        assert_eq!(registry.unregister(&key("missing")), None);

        assert!(registry.get_all(None).is_empty());
        assert_eq!(registry.get_all(Some(&[key("kept")])).len(), 1);
        assert!(registry.get("dropped").is_none());
    }

    #[test]
    fn get_all_follows_declaration_order() {
        let mut registry = FieldRegistry::default();
        for name in ["b", "a", "c"] {
            registry
                .register(&key(name), FieldOptions::new())
                .expect("register");
        }
        let named = registry.get_all(Some(&[key("c"), key("b"), key("zzz"), key("c")]));
        let names = named.iter().map(|(key, _)| key.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn reregistered_field_moves_to_end_of_declaration_order() {
        let mut registry = FieldRegistry::default();
        for name in ["a", "b", "c"] {
            registry
                .register(&key(name), FieldOptions::new())
                .expect("register");
        }
        registry.unregister(&key("a"));
        registry
            .register(&key("a"), FieldOptions::new())
            .expect("register again");

        let named = registry.get_all(Some(&[key("a"), key("b")]));
        let names = named.iter().map(|(key, _)| key.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["b", "a"]);
        assert!(registry.position("b") < registry.position("a"));
        assert_eq!(registry.position("missing"), u64::MAX);
    }

    #[test]
    fn reset_restores_only_named_fields() {
        let mut registry = FieldRegistry::default();
        for name in ["x", "y"] {
            registry
                .register(&key(name), FieldOptions::new().initial_value(json!(0)))
                .expect("register");
            let entry = registry.get_mut(name).expect("entry");
            entry.set_value(json!(5));
            entry.touched = true;
            entry.set_errors(vec![ValidationError::new(name, "bad")]);
        }
        assert_eq!(registry.reset(Some(&[key("x")])), vec![key("x")]);

        let x = registry.get("x").expect("x");
        assert_eq!(x.value, json!(0));
        assert!(x.errors.is_none() && !x.touched && !x.dirty);
        let y = registry.get("y").expect("y");
        assert_eq!(y.value, json!(5));
        assert!(y.touched);
    }

    #[test]
    fn seeded_field_keeps_host_value_on_decoration() {
        let mut registry = FieldRegistry::default();
        registry
            .seed(&key("email"), FieldData::new("host@calm.ui"))
            .expect("seed");
        assert!(registry.get_all(None).is_empty());

        let entry = registry
            .register(&key("email"), FieldOptions::new().initial_value(json!("")))
            .expect("decorate");
        assert_eq!(entry.value, json!("host@calm.ui"));
        assert!(entry.active);
    }
}
