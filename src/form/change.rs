use std::collections::BTreeMap;

use serde_json::Value;

use super::controller::{
    FieldData, FieldKey, FieldPatch, FormController, FormResult, FormState, read_lock,
    write_lock,
};
use super::validation::ValidationTask;
use super::values::{FieldValues, leaf_paths, lookup_path};

#[derive(Default)]
struct ChangeSet {
    fields: BTreeMap<FieldKey, FieldData>,
    values: FieldValues,
}

impl ChangeSet {
    fn record(&mut self, key: &FieldKey, before: &FieldData, after: FieldData) {
        if before.value != after.value {
            self.values.insert(key.clone(), after.value.clone());
        }
        if *before != after {
            self.fields.insert(key.clone(), after);
        }
    }
}

impl FormController {
    pub fn write(
        &self,
        key: &FieldKey,
        value: Value,
        trigger: &str,
    ) -> FormResult<Option<ValidationTask>> {
        let normalize = {
            let state = read_lock(&self.state, "reading field before write")?;
            let Some(entry) = state.registry.get(key.as_str()).filter(|entry| entry.active) else {
                tracing::warn!(
                    form_id = %state.id,
                    field = %key,
                    "write ignored for unregistered field"
                );
                return Ok(None);
            };
            entry
                .options
                .normalize
                .clone()
                .map(|normalize| (normalize, entry.value.clone(), active_values(&state)))
        };
        // normalizers may read the form, so they run unlocked
        let value = match normalize {
            Some((normalize, previous, all)) => normalize(&value, &previous, &all),
            None => value,
        };

        let changes = {
            let mut state = write_lock(&self.state, "writing field value")?;
            if !state
                .registry
                .get(key.as_str())
                .is_some_and(|entry| entry.active)
            {
                tracing::debug!(
                    form_id = %state.id,
                    field = %key,
                    "field unregistered while normalizing"
                );
                return Ok(None);
            }

            let mut changes = ChangeSet::default();
            for sibling in state.registry.exclusive_siblings(key) {
                if let Some((before, after)) = store_value(&mut state, &sibling, Value::Null, true) {
                    changes.record(&sibling, &before, after);
                }
            }

            if let Some((before, _)) = store_value(&mut state, key, value, true) {
                if let Some(entry) = state.registry.get_mut(key.as_str()) {
                    entry.touched = true;
                    changes.record(key, &before, entry.data());
                }
            }
            changes
        };
        self.notify(changes.fields, changes.values);

        self.validate_on_trigger(std::slice::from_ref(key), trigger)
    }

    /// Programmatic value update from a nested or flat object. Registered
    /// keys are looked up by literal key first, then by dotted path. Touched
    /// flags and existing errors are left alone.
    pub fn set_fields_value(&self, values: &Value) -> FormResult<()> {
        self.set_fields_value_with(values, |_| {})
    }

    pub fn set_fields_value_with(
        &self,
        values: &Value,
        callback: impl FnOnce(&FieldValues),
    ) -> FormResult<()> {
        let changes = {
            let mut state = write_lock(&self.state, "setting field values")?;
            let form_id = state.id;
            let keys = state.registry.keys().cloned().collect::<Vec<_>>();

            for path in leaf_paths(values) {
                let known = keys
                    .iter()
                    .any(|key| key.as_str() == path || is_within(key, &path));
                if !known {
                    tracing::warn!(
                        form_id = %form_id,
                        field = %path,
                        "set_fields_value ignored value for unregistered field"
                    );
                }
            }

            let mut changes = ChangeSet::default();
            for key in keys {
                let Some(value) = lookup_path(values, &key) else {
                    continue;
                };
                if let Some((before, after)) = store_value(&mut state, &key, value.clone(), false) {
                    changes.record(&key, &before, after);
                }
            }
            changes
        };
        self.notify(changes.fields, changes.values.clone());
        callback(&changes.values);
        Ok(())
    }

    pub fn set_fields(&self, patches: BTreeMap<FieldKey, FieldPatch>) -> FormResult<()> {
        let changes = {
            let mut state = write_lock(&self.state, "setting fields")?;
            let form_id = state.id;
            let mut changes = ChangeSet::default();
            for (key, patch) in patches {
                let Some(before) = state.registry.get(key.as_str()).map(|entry| entry.data())
                else {
                    tracing::warn!(
                        form_id = %form_id,
                        field = %key,
                        "set_fields ignored patch for unregistered field"
                    );
                    continue;
                };
                if let Some(value) = patch.value {
                    store_value(&mut state, &key, value, false);
                }
                let Some(entry) = state.registry.get_mut(key.as_str()) else {
                    continue;
                };
                match patch.touched {
                    Some(true) => entry.touched = true,
                    Some(false) if entry.touched => tracing::warn!(
                        form_id = %form_id,
                        field = %key,
                        "touched cannot be cleared through set_fields; use reset_fields"
                    ),
                    _ => {}
                }
                let supersedes = patch.errors.is_some() || patch.validating.is_some();
                if let Some(errors) = patch.errors {
                    entry.set_errors(errors);
                    entry.validating = false;
                }
                if let Some(validating) = patch.validating {
                    entry.validating = validating;
                }
                let after = entry.data();
                if supersedes {
                    state.revoke_ticket(&key);
                }
                changes.record(&key, &before, after);
            }
            changes
        };
        self.notify(changes.fields, changes.values);
        Ok(())
    }

    /// Host data from `map_props_to_fields` replaces stored state and pending
    /// runs without firing hooks. Nothing is applied if any key is invalid.
    pub fn update_props(&self, props: &Value) -> FormResult<()> {
        let Some(map) = self.options.map_props_to_fields.clone() else {
            return Ok(());
        };
        let fields = map(props);
        for key in fields.keys() {
            key.validate()?;
        }
        let mut state = write_lock(&self.state, "applying host props")?;
        for (key, data) in fields {
            state.registry.seed(&key, data)?;
            state.revoke_ticket(&key);
        }
        Ok(())
    }

    pub fn reset_fields(&self, keys: Option<&[FieldKey]>) -> FormResult<()> {
        let changed = {
            let mut state = write_lock(&self.state, "resetting fields")?;
            let before = state
                .registry
                .get_all(keys)
                .into_iter()
                .map(|(key, entry)| (key.clone(), entry.data()))
                .collect::<BTreeMap<_, _>>();
            let reset = state.registry.reset(keys);
            let mut changed = BTreeMap::new();
            for key in reset {
                state.revoke_ticket(&key);
                let Some(entry) = state.registry.get(key.as_str()) else {
                    continue;
                };
                let after = entry.data();
                if before.get(&key) != Some(&after) {
                    changed.insert(key, after);
                }
            }
            changed
        };
        self.notify(changed, FieldValues::new());
        Ok(())
    }

    pub(super) fn notify(&self, fields: BTreeMap<FieldKey, FieldData>, values: FieldValues) {
        if !fields.is_empty() {
            if let Some(hook) = &self.options.on_fields_change {
                hook(&fields);
            }
        }
        if !values.is_empty() {
            if let Some(hook) = &self.options.on_values_change {
                hook(&values);
            }
        }
    }
}

fn store_value(
    state: &mut FormState,
    key: &FieldKey,
    value: Value,
    clear_errors: bool,
) -> Option<(FieldData, FieldData)> {
    let entry = state.registry.get_mut(key.as_str())?;
    let before = entry.data();
    let changed = entry.set_value(value);
    if changed {
        entry.validating = false;
        if clear_errors {
            entry.errors = None;
        }
    }
    let after = entry.data();
    if changed {
        state.revoke_ticket(key);
    }
    Some((before, after))
}

fn active_values(state: &FormState) -> FieldValues {
    state
        .registry
        .get_all(None)
        .into_iter()
        .map(|(key, entry)| (key.clone(), entry.value.clone()))
        .collect()
}

fn is_within(key: &FieldKey, path: &str) -> bool {
    path.len() > key.as_str().len()
        && path.starts_with(key.as_str())
        && path.as_bytes()[key.as_str().len()] == b'.'
}
