use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Display, Formatter};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::messages::ValidateMessages;
use super::registry::FieldRegistry;
use super::rules::{BuiltinRuleEvaluator, RuleEvaluator};
use super::values::FieldValues;

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

pub const DEFAULT_FIELD_NAME_PROP: &str = "id";
pub const FIELD_META_PROP: &str = "data-__meta";
pub const FIELD_DATA_PROP: &str = "data-__field";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

impl Display for FormId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "form-{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldKey(String);

impl FieldKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    pub fn parent(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(parent, _)| parent)
    }

    pub fn is_ancestor_of(&self, other: &FieldKey) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(self.0.as_str())
            && other.0.as_bytes()[self.0.len()] == b'.'
    }

    pub fn validate(&self) -> FormResult<()> {
        if self.0.is_empty() {
            return Err(FormError::InvalidFieldKey {
                key: self.0.clone(),
                reason: "field key must not be empty",
            });
        }
        if self.segments().any(|segment| segment.trim().is_empty()) {
            return Err(FormError::InvalidFieldKey {
                key: self.0.clone(),
                reason: "field key must not contain empty path segments",
            });
        }
        Ok(())
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for FieldKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FieldKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&FieldKey> for FieldKey {
    fn from(value: &FieldKey) -> Self {
        value.clone()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: FieldKey,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<FieldKey>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum SubmitState {
    Idle,
    Validating,
    Submitting,
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FieldData {
    pub value: Value,
    pub errors: Option<Vec<ValidationError>>,
    pub touched: bool,
    pub validating: bool,
    pub dirty: bool,
}

impl FieldData {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn errors(mut self, errors: Vec<ValidationError>) -> Self {
        self.errors = (!errors.is_empty()).then_some(errors);
        self
    }

    pub fn touched(mut self, touched: bool) -> Self {
        self.touched = touched;
        self
    }

    pub fn validating(mut self, validating: bool) -> Self {
        self.validating = validating;
        self
    }
}

/// Partial field state for [`FormController::set_fields`]. `None` leaves the
/// stored attribute alone; `errors: Some(vec![])` clears errors.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldPatch {
    pub value: Option<Value>,
    pub errors: Option<Vec<ValidationError>>,
    pub touched: Option<bool>,
    pub validating: Option<bool>,
}

impl FieldPatch {
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn errors<I, S>(field: impl Into<FieldKey>, messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let field = field.into();
        Self {
            errors: Some(
                messages
                    .into_iter()
                    .map(|message| ValidationError::new(field.clone(), message))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    pub fn with_touched(mut self, touched: bool) -> Self {
        self.touched = Some(touched);
        self
    }

    pub fn with_validating(mut self, validating: bool) -> Self {
        self.validating = Some(validating);
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FormSnapshot {
    pub form_id: FormId,
    pub values: FieldValues,
    pub fields_error: BTreeMap<FieldKey, Vec<ValidationError>>,
    pub touched: BTreeSet<FieldKey>,
    pub validating: BTreeSet<FieldKey>,
    pub dirty: BTreeSet<FieldKey>,
    pub submit_state: SubmitState,
    pub submit_count: u32,
}

impl FormSnapshot {
    pub fn is_valid(&self) -> bool {
        self.fields_error.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FormError {
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("invalid field key `{key}`: {reason}")]
    InvalidFieldKey { key: String, reason: &'static str },
    #[error("field key `{key}` conflicts with registered field `{existing}`")]
    FieldKeyConflict { key: FieldKey, existing: FieldKey },
    #[error("invalid rule #{index} on field `{field}`: {reason}")]
    InvalidRule {
        field: FieldKey,
        index: usize,
        reason: String,
    },
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("invalid form options: {0}")]
    InvalidOptions(String),
    #[error("invalid submit state transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: SubmitState, to: SubmitState },
    #[error("form submit is already in progress")]
    AlreadySubmitting,
    #[error("submit handler failed: {0}")]
    SubmitFailed(String),
    #[error("failed to convert form model: {0}")]
    ModelConversion(String),
    #[error("failed to serialize binding props: {0}")]
    PropSerialization(String),
}

pub type FormResult<T> = Result<T, FormError>;

pub type FieldsChangeHook = Arc<dyn Fn(&BTreeMap<FieldKey, FieldData>) + Send + Sync>;
pub type ValuesChangeHook = Arc<dyn Fn(&FieldValues) + Send + Sync>;
pub type MapPropsToFields = Arc<dyn Fn(&Value) -> BTreeMap<FieldKey, FieldData> + Send + Sync>;

#[derive(Clone)]
pub struct FormOptions {
    pub name: Option<String>,
    pub field_name_prop: String,
    pub field_meta_prop: String,
    pub field_data_prop: String,
    pub with_ref: bool,
    pub validate_messages: ValidateMessages,
    pub on_fields_change: Option<FieldsChangeHook>,
    pub on_values_change: Option<ValuesChangeHook>,
    pub map_props_to_fields: Option<MapPropsToFields>,
    pub rule_evaluator: Arc<dyn RuleEvaluator>,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            name: None,
            field_name_prop: DEFAULT_FIELD_NAME_PROP.to_string(),
            field_meta_prop: FIELD_META_PROP.to_string(),
            field_data_prop: FIELD_DATA_PROP.to_string(),
            with_ref: false,
            validate_messages: ValidateMessages::default(),
            on_fields_change: None,
            on_values_change: None,
            map_props_to_fields: None,
            rule_evaluator: Arc::new(BuiltinRuleEvaluator),
        }
    }
}

impl Debug for FormOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormOptions")
            .field("name", &self.name)
            .field("field_name_prop", &self.field_name_prop)
            .field("field_meta_prop", &self.field_meta_prop)
            .field("field_data_prop", &self.field_data_prop)
            .field("with_ref", &self.with_ref)
            .field("on_fields_change", &self.on_fields_change.is_some())
            .field("on_values_change", &self.on_values_change.is_some())
            .field("map_props_to_fields", &self.map_props_to_fields.is_some())
            .finish_non_exhaustive()
    }
}

impl FormOptions {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn on_fields_change(
        mut self,
        hook: impl Fn(&BTreeMap<FieldKey, FieldData>) + Send + Sync + 'static,
    ) -> Self {
        self.on_fields_change = Some(Arc::new(hook));
        self
    }

    pub fn on_values_change(mut self, hook: impl Fn(&FieldValues) + Send + Sync + 'static) -> Self {
        self.on_values_change = Some(Arc::new(hook));
        self
    }

    pub fn map_props_to_fields(
        mut self,
        map: impl Fn(&Value) -> BTreeMap<FieldKey, FieldData> + Send + Sync + 'static,
    ) -> Self {
        self.map_props_to_fields = Some(Arc::new(map));
        self
    }

    pub fn rule_evaluator(mut self, evaluator: impl RuleEvaluator + 'static) -> Self {
        self.rule_evaluator = Arc::new(evaluator);
        self
    }

    pub fn validate(&self) -> FormResult<()> {
        let props = [
            ("field_name_prop", &self.field_name_prop),
            ("field_meta_prop", &self.field_meta_prop),
            ("field_data_prop", &self.field_data_prop),
        ];
        for (label, value) in props {
            if value.trim().is_empty() {
                return Err(FormError::InvalidOptions(format!("{label} must not be empty")));
            }
        }
        if self.field_name_prop == self.field_meta_prop
            || self.field_name_prop == self.field_data_prop
            || self.field_meta_prop == self.field_data_prop
        {
            return Err(FormError::InvalidOptions(
                "field name, meta and data props must be distinct".to_string(),
            ));
        }
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(FormError::InvalidOptions(
                    "form name must not be blank".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub(super) fn binding_id(&self, key: &FieldKey) -> String {
        match &self.name {
            Some(name) => format!("{name}_{key}"),
            None => key.to_string(),
        }
    }
}

pub(super) struct FormState {
    pub(super) id: FormId,
    pub(super) registry: FieldRegistry,
    pub(super) tickets: BTreeMap<FieldKey, ValidationTicket>,
    pub(super) next_ticket: u64,
    pub(super) submit_state: SubmitState,
    pub(super) submit_count: u32,
}

impl FormState {
    pub(super) fn issue_ticket(&mut self, key: &FieldKey) -> ValidationTicket {
        self.next_ticket += 1;
        let ticket = ValidationTicket(self.next_ticket);
        self.tickets.insert(key.clone(), ticket);
        ticket
    }

    pub(super) fn is_latest_ticket(&self, key: &FieldKey, ticket: ValidationTicket) -> bool {
        self.tickets.get(key).copied() == Some(ticket)
    }

    pub(super) fn revoke_ticket(&mut self, key: &FieldKey) {
        self.tickets.remove(key);
    }
}

#[derive(Clone)]
pub struct FormController {
    pub(super) options: Arc<FormOptions>,
    pub(super) state: Arc<RwLock<FormState>>,
}

impl FormController {
    pub fn new(options: FormOptions) -> FormResult<Self> {
        options.validate()?;
        let id = FormId::next();
        if options.with_ref {
            tracing::warn!(
                form_id = %id,
                "with_ref has no effect: bindings are plain data and expose no instance"
            );
        }
        Ok(Self {
            options: Arc::new(options),
            state: Arc::new(RwLock::new(FormState {
                id,
                registry: FieldRegistry::default(),
                tickets: BTreeMap::new(),
                next_ticket: 0,
                submit_state: SubmitState::Idle,
                submit_count: 0,
            })),
        })
    }

    pub fn form_id(&self) -> FormResult<FormId> {
        Ok(read_lock(&self.state, "reading form id")?.id)
    }

    pub fn options(&self) -> &FormOptions {
        &self.options
    }

    pub async fn submit<F, Fut>(&self, f: F) -> FormResult<bool>
    where
        F: FnOnce(FieldValues) -> Fut,
        Fut: Future<Output = FormResult<()>>,
    {
        {
            let mut state = write_lock(&self.state, "preparing submit")?;
            if state.submit_state == SubmitState::Submitting
                || state.submit_state == SubmitState::Validating
            {
                return Err(FormError::AlreadySubmitting);
            }
            transition_submit_state(&mut state, SubmitState::Validating)?;
            state.submit_count = state.submit_count.saturating_add(1);
        }

        let outcome = match self.validate_fields(None, Default::default()) {
            Ok(task) => task.await,
            Err(error) => Err(error),
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(error) => {
                let mut state = write_lock(&self.state, "recovering from submit error")?;
                transition_submit_state(&mut state, SubmitState::Failed)?;
                return Err(error);
            }
        };
        if outcome.errors.is_some() {
            let mut state = write_lock(&self.state, "handling submit validation failure")?;
            transition_submit_state(&mut state, SubmitState::Failed)?;
            return Ok(false);
        }

        {
            let mut state = write_lock(&self.state, "moving submit state to submitting")?;
            transition_submit_state(&mut state, SubmitState::Submitting)?;
        }
        let submit_result = f(outcome.values).await;

        let mut state = write_lock(&self.state, "completing submit")?;
        if submit_result.is_ok() {
            transition_submit_state(&mut state, SubmitState::Succeeded)?;
        } else {
            transition_submit_state(&mut state, SubmitState::Failed)?;
        }
        submit_result.map(|()| true)
    }

    pub fn is_submitting(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading submit state")?.submit_state == SubmitState::Submitting)
    }

    pub fn submit_state(&self) -> FormResult<SubmitState> {
        Ok(read_lock(&self.state, "reading submit state")?.submit_state)
    }
}

pub(super) fn transition_submit_state(state: &mut FormState, next: SubmitState) -> FormResult<()> {
    let current = state.submit_state;
    if current == next {
        return Ok(());
    }

    let allowed = matches!(
        (current, next),
        (SubmitState::Idle, SubmitState::Validating)
            | (SubmitState::Validating, SubmitState::Submitting)
            | (SubmitState::Validating, SubmitState::Failed)
            | (SubmitState::Submitting, SubmitState::Succeeded)
            | (SubmitState::Submitting, SubmitState::Failed)
            | (SubmitState::Succeeded, SubmitState::Validating)
            | (SubmitState::Failed, SubmitState::Validating)
            | (_, SubmitState::Idle)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: current,
            to: next,
        });
    }
    state.submit_state = next;
    Ok(())
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
