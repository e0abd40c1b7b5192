use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};

use super::controller::{
    FieldData, FieldKey, FormController, FormError, FormResult, read_lock, write_lock,
};
use super::rules::Rule;
use super::validation::ValidationTask;
use super::values::FieldValues;

pub const DEFAULT_TRIGGER: &str = "onChange";
pub const DEFAULT_VALUE_PROP: &str = "value";

pub type ValueFromEventFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
pub type ValuePropsFn = Arc<dyn Fn(&Value) -> BTreeMap<String, Value> + Send + Sync>;
pub type NormalizeFn = Arc<dyn Fn(&Value, &Value, &FieldValues) -> Value + Send + Sync>;

#[derive(Clone)]
pub struct FieldOptions {
    pub initial_value: Option<Value>,
    pub rules: Vec<Rule>,
    pub trigger: String,
    pub validate_triggers: Option<Vec<String>>,
    pub value_prop_name: String,
    pub get_value_from_event: Option<ValueFromEventFn>,
    pub get_value_props: Option<ValuePropsFn>,
    pub normalize: Option<NormalizeFn>,
    pub validate_first: bool,
    pub preserve: bool,
    pub exclusive: bool,
    pub exclusive_group: Option<String>,
    pub dependencies: Vec<FieldKey>,
    pub validate_debounce: Duration,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            initial_value: None,
            rules: Vec::new(),
            trigger: DEFAULT_TRIGGER.to_string(),
            validate_triggers: None,
            value_prop_name: DEFAULT_VALUE_PROP.to_string(),
            get_value_from_event: None,
            get_value_props: None,
            normalize: None,
            validate_first: false,
            preserve: false,
            exclusive: false,
            exclusive_group: None,
            dependencies: Vec::new(),
            validate_debounce: Duration::ZERO,
        }
    }
}

impl Debug for FieldOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldOptions")
            .field("initial_value", &self.initial_value)
            .field("rules", &self.rules)
            .field("trigger", &self.trigger)
            .field("validate_triggers", &self.validate_triggers)
            .field("value_prop_name", &self.value_prop_name)
            .field("validate_first", &self.validate_first)
            .field("preserve", &self.preserve)
            .field("exclusive", &self.exclusive)
            .field("exclusive_group", &self.exclusive_group)
            .field("dependencies", &self.dependencies)
            .field("validate_debounce", &self.validate_debounce)
            .finish_non_exhaustive()
    }
}

impl FieldOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial_value(mut self, value: impl Into<Value>) -> Self {
        self.initial_value = Some(value.into());
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules = rules.into_iter().collect();
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = trigger.into();
        self
    }

    pub fn validate_trigger(self, trigger: impl Into<String>) -> Self {
        self.validate_triggers([trigger])
    }

    pub fn validate_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.validate_triggers = Some(triggers.into_iter().map(Into::into).collect());
        self
    }

    pub fn value_prop_name(mut self, name: impl Into<String>) -> Self {
        self.value_prop_name = name.into();
        self
    }

    pub fn get_value_from_event(
        mut self,
        extract: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.get_value_from_event = Some(Arc::new(extract));
        self
    }

    pub fn get_value_props(
        mut self,
        map: impl Fn(&Value) -> BTreeMap<String, Value> + Send + Sync + 'static,
    ) -> Self {
        self.get_value_props = Some(Arc::new(map));
        self
    }

    /// `normalize(value, previous, all_values)` runs on every write before
    /// storage and before validation.
    pub fn normalize(
        mut self,
        normalize: impl Fn(&Value, &Value, &FieldValues) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.normalize = Some(Arc::new(normalize));
        self
    }

    pub fn validate_first(mut self, validate_first: bool) -> Self {
        self.validate_first = validate_first;
        self
    }

    pub fn preserve(mut self, preserve: bool) -> Self {
        self.preserve = preserve;
        self
    }

    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn exclusive_group(mut self, group: impl Into<String>) -> Self {
        self.exclusive = true;
        self.exclusive_group = Some(group.into());
        self
    }

    pub fn dependencies<I, K>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<FieldKey>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate_debounce(mut self, debounce: Duration) -> Self {
        self.validate_debounce = debounce;
        self
    }

    pub fn effective_validate_triggers(&self) -> Vec<String> {
        match &self.validate_triggers {
            Some(triggers) => triggers.clone(),
            None => vec![self.trigger.clone()],
        }
    }

    pub fn validates_on(&self, trigger: &str) -> bool {
        match &self.validate_triggers {
            Some(triggers) => triggers.iter().any(|candidate| candidate == trigger),
            None => self.trigger == trigger,
        }
    }

    pub(super) fn group_of(&self, key: &FieldKey) -> Option<String> {
        if !self.exclusive {
            return None;
        }
        Some(
            self.exclusive_group
                .clone()
                .unwrap_or_else(|| key.parent().unwrap_or_default().to_string()),
        )
    }

    pub fn check(&self, key: &FieldKey) -> FormResult<()> {
        if self.trigger.trim().is_empty() {
            return Err(FormError::InvalidOptions(format!(
                "field `{key}` has an empty trigger"
            )));
        }
        if self.value_prop_name.trim().is_empty() {
            return Err(FormError::InvalidOptions(format!(
                "field `{key}` has an empty value_prop_name"
            )));
        }
        if self
            .validate_triggers
            .as_ref()
            .is_some_and(|triggers| triggers.iter().any(|trigger| trigger.trim().is_empty()))
        {
            return Err(FormError::InvalidOptions(format!(
                "field `{key}` has an empty validate trigger"
            )));
        }
        if self.dependencies.contains(key) {
            return Err(FormError::InvalidOptions(format!(
                "field `{key}` cannot depend on itself"
            )));
        }
        for (index, rule) in self.rules.iter().enumerate() {
            rule.check(key, index)?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct FieldMetaView<'a> {
    name: &'a FieldKey,
    trigger: &'a str,
    validate_triggers: Vec<String>,
    value_prop_name: &'a str,
    required: bool,
    rules: usize,
    exclusive: bool,
    preserve: bool,
}

#[derive(Clone)]
pub struct Binding {
    key: FieldKey,
    props: BTreeMap<String, Value>,
    trigger: String,
    validate_triggers: Vec<String>,
    get_value_from_event: Option<ValueFromEventFn>,
    controller: FormController,
}

impl Debug for Binding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("key", &self.key)
            .field("props", &self.props)
            .field("trigger", &self.trigger)
            .field("validate_triggers", &self.validate_triggers)
            .finish_non_exhaustive()
    }
}

impl Binding {
    pub fn key(&self) -> &FieldKey {
        &self.key
    }

    pub fn props(&self) -> &BTreeMap<String, Value> {
        &self.props
    }

    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }

    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    pub fn events(&self) -> Vec<&str> {
        let mut events = vec![self.trigger.as_str()];
        for trigger in &self.validate_triggers {
            if !events.contains(&trigger.as_str()) {
                events.push(trigger);
            }
        }
        events
    }

    pub fn handles(&self, event_name: &str) -> bool {
        self.trigger == event_name || self.validate_triggers.iter().any(|t| t == event_name)
    }

    pub fn handle(&self, event_name: &str, event: &Value) -> FormResult<Option<ValidationTask>> {
        if event_name == self.trigger {
            let value = match &self.get_value_from_event {
                Some(extract) => extract(event),
                None => value_from_event(event),
            };
            return self.controller.write(&self.key, value, event_name);
        }
        if self.validate_triggers.iter().any(|t| t == event_name) {
            return self
                .controller
                .validate_on_trigger(std::slice::from_ref(&self.key), event_name);
        }
        tracing::warn!(
            field = %self.key,
            event = event_name,
            "binding received an event it is not wired for"
        );
        Ok(None)
    }
}

pub fn value_from_event(event: &Value) -> Value {
    let Some(target) = event.get("target").filter(|target| target.is_object()) else {
        return event.clone();
    };
    if target.get("type").and_then(Value::as_str) == Some("checkbox") {
        return target.get("checked").cloned().unwrap_or(Value::Bool(false));
    }
    target.get("value").cloned().unwrap_or(Value::Null)
}

impl FormController {
    pub fn decorate(&self, key: impl Into<FieldKey>, options: FieldOptions) -> FormResult<Binding> {
        let key = key.into();
        let trigger = options.trigger.clone();
        let validate_triggers = options.effective_validate_triggers();
        let get_value_from_event = options.get_value_from_event.clone();
        let get_value_props = options.get_value_props.clone();
        let value_prop_name = options.value_prop_name.clone();

        let (data, meta) = {
            let mut state = write_lock(&self.state, "decorating field")?;
            let entry = state.registry.register(&key, options)?;
            let meta = serde_json::to_value(FieldMetaView {
                name: &key,
                trigger: &entry.options.trigger,
                validate_triggers: entry.options.effective_validate_triggers(),
                value_prop_name: &entry.options.value_prop_name,
                required: entry.options.rules.iter().any(|rule| rule.required),
                rules: entry.options.rules.len(),
                exclusive: entry.options.exclusive,
                preserve: entry.options.preserve,
            })
            .map_err(|error| FormError::PropSerialization(error.to_string()))?;
            (entry.data(), meta)
        };

        let mut props = match &get_value_props {
            Some(map) => map(&data.value),
            None => BTreeMap::from([(value_prop_name, data.value.clone())]),
        };
        props.insert(
            self.options.field_name_prop.clone(),
            json!(self.options.binding_id(&key)),
        );
        props.insert(self.options.field_meta_prop.clone(), meta);
        let data_prop = serde_json::to_value(&data)
            .map_err(|error| FormError::PropSerialization(error.to_string()))?;
        props.insert(self.options.field_data_prop.clone(), data_prop);

        Ok(Binding {
            key,
            props,
            trigger,
            validate_triggers,
            get_value_from_event,
            controller: self.clone(),
        })
    }

    pub fn register_field(
        &self,
        key: impl Into<FieldKey>,
        options: FieldOptions,
    ) -> FormResult<FieldData> {
        let key = key.into();
        let mut state = write_lock(&self.state, "registering field")?;
        Ok(state.registry.register(&key, options)?.data())
    }

    pub fn unregister_field(&self, key: &FieldKey) -> FormResult<()> {
        let mut state = write_lock(&self.state, "unregistering field")?;
        match state.registry.unregister(key) {
            Some(super::registry::Unregistered::Removed) => state.revoke_ticket(key),
            Some(super::registry::Unregistered::Preserved) => {}
            None => {
                tracing::debug!(form_id = %state.id, field = %key, "unregister of unknown field");
            }
        }
        Ok(())
    }

    pub fn is_field_registered(&self, key: &str) -> FormResult<bool> {
        Ok(read_lock(&self.state, "checking field registration")?
            .registry
            .get(key)
            .is_some_and(|entry| entry.active))
    }
}
