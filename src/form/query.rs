use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::controller::{
    FieldData, FieldKey, FormController, FormResult, FormSnapshot, ValidationError, read_lock,
};
use super::values::FieldValues;

impl FormController {
    pub fn get_fields_value(&self, keys: Option<&[FieldKey]>) -> FormResult<FieldValues> {
        let state = read_lock(&self.state, "reading field values")?;
        Ok(state
            .registry
            .get_all(keys)
            .into_iter()
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect())
    }

    pub fn get_field_value(&self, key: &str) -> FormResult<Option<Value>> {
        let state = read_lock(&self.state, "reading field value")?;
        Ok(state.registry.get(key).map(|entry| entry.value.clone()))
    }

    pub fn get_field_error(&self, key: &str) -> FormResult<Option<Vec<ValidationError>>> {
        let state = read_lock(&self.state, "reading field error")?;
        Ok(state.registry.get(key).and_then(|entry| entry.errors.clone()))
    }

    pub fn get_fields_error(
        &self,
        keys: Option<&[FieldKey]>,
    ) -> FormResult<BTreeMap<FieldKey, Vec<ValidationError>>> {
        let state = read_lock(&self.state, "reading field errors")?;
        Ok(state
            .registry
            .get_all(keys)
            .into_iter()
            .filter_map(|(key, entry)| Some((key.clone(), entry.errors.clone()?)))
            .collect())
    }

    pub fn is_field_validating(&self, key: &str) -> FormResult<bool> {
        let state = read_lock(&self.state, "reading validating flag")?;
        Ok(state.registry.get(key).is_some_and(|entry| entry.validating))
    }

    pub fn is_field_touched(&self, key: &str) -> FormResult<bool> {
        let state = read_lock(&self.state, "reading touched flag")?;
        Ok(state.registry.get(key).is_some_and(|entry| entry.touched))
    }

    /// Without keys: whether any active field is touched. With keys: whether
    /// every named field is touched; an unknown key counts as untouched.
    pub fn is_fields_touched(&self, keys: Option<&[FieldKey]>) -> FormResult<bool> {
        let state = read_lock(&self.state, "reading touched flags")?;
        Ok(match keys {
            None => state
                .registry
                .get_all(None)
                .into_iter()
                .any(|(_, entry)| entry.touched),
            Some(keys) => keys.iter().all(|key| {
                state
                    .registry
                    .get(key.as_str())
                    .is_some_and(|entry| entry.touched)
            }),
        })
    }

    pub fn is_fields_validating(&self, keys: Option<&[FieldKey]>) -> FormResult<bool> {
        let state = read_lock(&self.state, "reading validating flags")?;
        Ok(state
            .registry
            .get_all(keys)
            .into_iter()
            .any(|(_, entry)| entry.validating))
    }

    pub fn field(&self, key: &str) -> FormResult<Option<FieldData>> {
        let state = read_lock(&self.state, "reading field")?;
        Ok(state.registry.get(key).map(|entry| entry.data()))
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot> {
        let state = read_lock(&self.state, "building form snapshot")?;
        let mut snapshot = FormSnapshot {
            form_id: state.id,
            values: FieldValues::new(),
            fields_error: BTreeMap::new(),
            touched: BTreeSet::new(),
            validating: BTreeSet::new(),
            dirty: BTreeSet::new(),
            submit_state: state.submit_state,
            submit_count: state.submit_count,
        };
        for (key, entry) in state.registry.get_all(None) {
            snapshot.values.insert(key.clone(), entry.value.clone());
            if let Some(errors) = &entry.errors {
                snapshot.fields_error.insert(key.clone(), errors.clone());
            }
            if entry.touched {
                snapshot.touched.insert(key.clone());
            }
            if entry.validating {
                snapshot.validating.insert(key.clone());
            }
            if entry.dirty {
                snapshot.dirty.insert(key.clone());
            }
        }
        Ok(snapshot)
    }
}
