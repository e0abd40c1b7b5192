use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use futures_timer::Delay;
use serde_json::Value;

use super::controller::{
    FieldKey, FormController, FormOptions, FormResult, FormState, ValidationError,
    ValidationTicket, read_lock, write_lock,
};
use super::messages::ValidateMessages;
use super::rules::{Rule, RuleContext, RuleEvaluator, run_rule};
use super::scroll::ScrollConfig;
use super::values::FieldValues;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum FirstFields {
    #[default]
    None,
    All,
    Only(Vec<FieldKey>),
}

impl FirstFields {
    fn includes(&self, key: &FieldKey) -> bool {
        match self {
            FirstFields::None => false,
            FirstFields::All => true,
            FirstFields::Only(keys) => keys.contains(key),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ValidateOptions {
    /// Stop at the first failing rule of the first failing field; later
    /// fields are not evaluated.
    pub first: bool,
    /// Fields that stop at their first failing rule. A failure in one of
    /// them also stops evaluation of every later field.
    pub first_fields: FirstFields,
    pub force: bool,
    pub scroll: Option<ScrollConfig>,
}

impl ValidateOptions {
    pub fn first() -> Self {
        Self {
            first: true,
            ..Self::default()
        }
    }

    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    fn is_sequential(&self) -> bool {
        self.first || self.first_fields != FirstFields::None
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidateOutcome {
    pub errors: Option<BTreeMap<FieldKey, Vec<ValidationError>>>,
    pub values: FieldValues,
    pub superseded: Vec<FieldKey>,
    pub targets: Vec<FieldKey>,
}

impl ValidateOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_none()
    }

    pub fn field_errors(&self, key: &str) -> Option<&[ValidationError]> {
        self.errors.as_ref()?.get(key).map(Vec::as_slice)
    }

    pub fn first_error_key(&self) -> Option<&FieldKey> {
        let errors = self.errors.as_ref()?;
        self.targets.iter().find(|key| errors.contains_key(*key))
    }
}

/// A validation run that has been issued but not evaluated. Tickets and
/// `validating` flags are already in place; rules run when the host polls
/// this future on its executor. Dropping it unpolled leaves the targeted
/// fields validating until a newer run, reset or `set_fields` replaces them.
#[must_use = "validation only runs when the task is polled"]
pub struct ValidationTask {
    inner: BoxFuture<'static, FormResult<ValidateOutcome>>,
}

impl ValidationTask {
    fn ready(outcome: ValidateOutcome) -> Self {
        Self {
            inner: Box::pin(futures::future::ready(Ok(outcome))),
        }
    }
}

impl Future for ValidationTask {
    type Output = FormResult<ValidateOutcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

struct FieldPlan {
    key: FieldKey,
    ticket: ValidationTicket,
    value: Value,
    rules: Vec<Rule>,
    stop_at_first_rule: bool,
    stops_later_fields: bool,
    debounce: Duration,
}

enum FieldRun {
    Checked(Vec<ValidationError>),
    Skipped,
    Superseded,
}

impl FormController {
    pub fn validate_fields(
        &self,
        keys: Option<&[FieldKey]>,
        options: ValidateOptions,
    ) -> FormResult<ValidationTask> {
        self.issue_validation(options, |state| {
            if let Some(keys) = keys {
                for key in keys {
                    if state.registry.get(key.as_str()).is_none() {
                        tracing::debug!(
                            form_id = %state.id,
                            field = %key,
                            "validation requested for unknown field"
                        );
                    }
                }
            }
            state
                .registry
                .get_all(keys)
                .into_iter()
                .filter(|(_, entry)| entry.declared)
                .map(|(key, _)| key.clone())
                .collect()
        })
    }

    pub fn validate_field(&self, key: impl Into<FieldKey>) -> FormResult<ValidationTask> {
        self.validate_fields(Some(&[key.into()]), ValidateOptions::default())
    }

    pub fn validate_fields_on_trigger(
        &self,
        keys: &[FieldKey],
        trigger: &str,
        options: ValidateOptions,
    ) -> FormResult<Option<ValidationTask>> {
        let force = options.force;
        let mut selected_any = false;
        let task = self.issue_validation(options, |state| {
            let mut targets = state
                .registry
                .get_all(Some(keys))
                .into_iter()
                .filter(|(_, entry)| entry.active && entry.declared)
                .filter(|(_, entry)| force || entry.options.validates_on(trigger))
                .map(|(key, _)| key.clone())
                .collect::<Vec<_>>();
            selected_any = !targets.is_empty();

            let mut dependents = BTreeSet::new();
            for key in &targets {
                for dependent in state.registry.dependents_of(key) {
                    let touched = state
                        .registry
                        .get(dependent.as_str())
                        .is_some_and(|entry| entry.touched);
                    if touched && !targets.contains(&dependent) {
                        dependents.insert(dependent);
                    }
                }
            }
            targets.extend(dependents);
            targets.sort_by_key(|key| state.registry.position(key.as_str()));
            targets
        })?;
        Ok(selected_any.then_some(task))
    }

    pub(super) fn validate_on_trigger(
        &self,
        keys: &[FieldKey],
        trigger: &str,
    ) -> FormResult<Option<ValidationTask>> {
        self.validate_fields_on_trigger(keys, trigger, ValidateOptions::default())
    }

    fn issue_validation(
        &self,
        options: ValidateOptions,
        select: impl FnOnce(&FormState) -> Vec<FieldKey>,
    ) -> FormResult<ValidationTask> {
        let (plans, source, started) = {
            let mut state = write_lock(&self.state, "issuing validation")?;
            let targets = select(&*state);
            let source = state
                .registry
                .active_keys()
                .filter_map(|key| {
                    state
                        .registry
                        .get(key.as_str())
                        .map(|entry| (key.clone(), entry.value.clone()))
                })
                .collect::<FieldValues>();

            let mut plans = Vec::with_capacity(targets.len());
            let mut started = BTreeMap::new();
            for key in targets {
                let ticket = state.issue_ticket(&key);
                let Some(entry) = state.registry.get_mut(key.as_str()) else {
                    continue;
                };
                let stops_later_fields = options.first_fields.includes(&key);
                plans.push(FieldPlan {
                    ticket,
                    value: entry.value.clone(),
                    rules: entry.options.rules.clone(),
                    stop_at_first_rule: entry.options.validate_first
                        || options.first
                        || stops_later_fields,
                    stops_later_fields,
                    debounce: entry.options.validate_debounce,
                    key: key.clone(),
                });
                if !entry.validating {
                    entry.validating = true;
                    started.insert(key, entry.data());
                }
            }
            (plans, source, started)
        };
        self.notify(started, FieldValues::new());

        if plans.is_empty() {
            return Ok(ValidationTask::ready(ValidateOutcome::default()));
        }

        let controller = self.clone();
        let form_options = self.options.clone();
        Ok(ValidationTask {
            inner: Box::pin(async move {
                controller
                    .run_validation(plans, source, options, form_options)
                    .await
            }),
        })
    }

    async fn run_validation(
        &self,
        plans: Vec<FieldPlan>,
        source: FieldValues,
        options: ValidateOptions,
        form_options: Arc<FormOptions>,
    ) -> FormResult<ValidateOutcome> {
        let evaluator = form_options.rule_evaluator.as_ref();
        let messages = &form_options.validate_messages;

        let runs = if options.is_sequential() {
            let mut runs = Vec::with_capacity(plans.len());
            let mut stopped = false;
            for plan in &plans {
                if stopped {
                    runs.push(FieldRun::Skipped);
                    continue;
                }
                let run = self
                    .evaluate_field(plan, &source, evaluator, messages)
                    .boxed()
                    .await?;
                if let FieldRun::Checked(errors) = &run {
                    stopped = !errors.is_empty() && (options.first || plan.stops_later_fields);
                }
                runs.push(run);
            }
            runs
        } else {
            let pending = plans
                .iter()
                .map(|plan| {
                    self.evaluate_field(plan, &source, evaluator, messages)
                        .boxed()
                })
                .collect::<Vec<_>>();
            join_all(pending)
                .await
                .into_iter()
                .collect::<FormResult<Vec<_>>>()?
        };

        self.apply_validation(plans, runs)
    }

    async fn evaluate_field(
        &self,
        plan: &FieldPlan,
        source: &FieldValues,
        evaluator: &dyn RuleEvaluator,
        messages: &ValidateMessages,
    ) -> FormResult<FieldRun> {
        if !plan.debounce.is_zero() {
            Delay::new(plan.debounce).await;
            if !self.is_latest_ticket(&plan.key, plan.ticket)? {
                return Ok(FieldRun::Superseded);
            }
        }

        let mut errors = Vec::new();
        for rule in &plan.rules {
            let failures = run_rule(
                evaluator,
                RuleContext {
                    field: &plan.key,
                    rule,
                    value: &plan.value,
                    source,
                    messages,
                },
            )
            .await;
            let failed = !failures.is_empty();
            errors.extend(
                failures
                    .into_iter()
                    .map(|message| ValidationError::new(plan.key.clone(), message)),
            );
            if failed && plan.stop_at_first_rule {
                break;
            }
        }
        Ok(FieldRun::Checked(errors))
    }

    fn apply_validation(
        &self,
        plans: Vec<FieldPlan>,
        runs: Vec<FieldRun>,
    ) -> FormResult<ValidateOutcome> {
        let mut outcome = ValidateOutcome::default();
        let mut errors = BTreeMap::new();
        let mut changed = BTreeMap::new();
        {
            let mut state = write_lock(&self.state, "applying validation result")?;
            let form_id = state.id;
            for (plan, run) in plans.into_iter().zip(runs) {
                if state.registry.get(plan.key.as_str()).is_none() {
                    tracing::debug!(
                        form_id = %form_id,
                        field = %plan.key,
                        "discarding validation result for unregistered field"
                    );
                    outcome.superseded.push(plan.key);
                    continue;
                }
                outcome.targets.push(plan.key.clone());
                outcome.values.insert(plan.key.clone(), plan.value.clone());

                let latest = state.is_latest_ticket(&plan.key, plan.ticket);
                let field_errors = match run {
                    FieldRun::Checked(field_errors) => field_errors,
                    FieldRun::Skipped => Vec::new(),
                    FieldRun::Superseded => {
                        outcome.superseded.push(plan.key);
                        continue;
                    }
                };
                if !field_errors.is_empty() {
                    errors.insert(plan.key.clone(), field_errors.clone());
                }
                if !latest {
                    tracing::debug!(
                        form_id = %form_id,
                        field = %plan.key,
                        ticket = plan.ticket.0,
                        "discarding superseded validation result"
                    );
                    outcome.superseded.push(plan.key);
                    continue;
                }

                state.revoke_ticket(&plan.key);
                if let Some(entry) = state.registry.get_mut(plan.key.as_str()) {
                    entry.validating = false;
                    if entry.value == plan.value {
                        entry.set_errors(field_errors);
                    } else {
                        tracing::debug!(
                            form_id = %form_id,
                            field = %plan.key,
                            "discarding validation result for an expired value"
                        );
                        outcome.superseded.push(plan.key.clone());
                    }
                    changed.insert(plan.key, entry.data());
                }
            }
        }
        self.notify(changed, FieldValues::new());

        outcome.errors = (!errors.is_empty()).then_some(errors);
        Ok(outcome)
    }

    fn is_latest_ticket(&self, key: &FieldKey, ticket: ValidationTicket) -> FormResult<bool> {
        Ok(read_lock(&self.state, "checking latest validation ticket")?.is_latest_ticket(key, ticket))
    }
}
