use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde_json::{Number, Value};

use super::controller::{FieldKey, FormError, FormResult};
use super::messages::{RangeMessages, ValidateMessages, format_message};
use super::values::FieldValues;

pub type RuleFuture<'a> = Pin<Box<dyn Future<Output = Vec<String>> + Send + 'a>>;
pub type TransformFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
pub type CustomValidatorFn =
    Arc<dyn for<'a> Fn(RuleContext<'a>) -> RuleFuture<'static> + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RuleType {
    String,
    Number,
    Boolean,
    Integer,
    Float,
    Array,
    Object,
    Enum,
    Date,
    Url,
    Hex,
    Email,
    Regexp,
    Any,
}

impl RuleType {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleType::String => "string",
            RuleType::Number => "number",
            RuleType::Boolean => "boolean",
            RuleType::Integer => "integer",
            RuleType::Float => "float",
            RuleType::Array => "array",
            RuleType::Object => "object",
            RuleType::Enum => "enum",
            RuleType::Date => "date",
            RuleType::Url => "url",
            RuleType::Hex => "hex",
            RuleType::Email => "email",
            RuleType::Regexp => "regexp",
            RuleType::Any => "any",
        }
    }
}

#[derive(Clone, Default)]
pub struct Rule {
    pub kind: Option<RuleType>,
    pub required: bool,
    pub whitespace: bool,
    pub len: Option<Decimal>,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
    pub one_of: Vec<Value>,
    pub pattern: Option<Regex>,
    pub transform: Option<TransformFn>,
    pub validator: Option<CustomValidatorFn>,
    pub message: Option<String>,
}

impl Debug for Rule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("whitespace", &self.whitespace)
            .field("len", &self.len)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("one_of", &self.one_of)
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .field("transform", &self.transform.is_some())
            .field("validator", &self.validator.is_some())
            .field("message", &self.message)
            .finish()
    }
}

impl Rule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(mut self, kind: RuleType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn whitespace(mut self) -> Self {
        self.whitespace = true;
        self
    }

    pub fn len(mut self, len: impl Into<Decimal>) -> Self {
        self.len = Some(len.into());
        self
    }

    pub fn min(mut self, min: impl Into<Decimal>) -> Self {
        self.min = Some(min.into());
        self
    }

    pub fn max(mut self, max: impl Into<Decimal>) -> Self {
        self.max = Some(max.into());
        self
    }

    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.one_of = values.into_iter().map(Into::into).collect();
        if self.kind.is_none() {
            self.kind = Some(RuleType::Enum);
        }
        self
    }

    pub fn pattern(mut self, pattern: &str) -> FormResult<Self> {
        let regex = Regex::new(pattern).map_err(|error| FormError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: error.to_string(),
        })?;
        self.pattern = Some(regex);
        Ok(self)
    }

    pub fn pattern_regex(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn transform(mut self, transform: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Replaces the built-in checks of this rule with an async callback. The
    /// returned future resolves to the failure messages, empty on success.
    /// A future that never resolves leaves the field validating forever.
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: for<'a> Fn(RuleContext<'a>) -> RuleFuture<'static> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub(super) fn check(&self, field: &FieldKey, index: usize) -> FormResult<()> {
        let invalid = |reason: &str| FormError::InvalidRule {
            field: field.clone(),
            index,
            reason: reason.to_string(),
        };
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(invalid("min is greater than max"));
            }
        }
        if self.len.is_some_and(|len| len.is_sign_negative()) {
            return Err(invalid("len must not be negative"));
        }
        if self.kind == Some(RuleType::Enum) && self.one_of.is_empty() {
            return Err(invalid("enum rules need at least one allowed value"));
        }
        if self.message.as_deref().is_some_and(str::is_empty) {
            return Err(invalid("message must not be empty"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
pub struct RuleContext<'a> {
    pub field: &'a FieldKey,
    pub rule: &'a Rule,
    pub value: &'a Value,
    pub source: &'a FieldValues,
    pub messages: &'a ValidateMessages,
}

pub trait RuleEvaluator: Send + Sync {
    fn evaluate<'a>(&'a self, context: RuleContext<'a>) -> RuleFuture<'a>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinRuleEvaluator;

impl RuleEvaluator for BuiltinRuleEvaluator {
    fn evaluate<'a>(&'a self, context: RuleContext<'a>) -> RuleFuture<'a> {
        Box::pin(futures::future::ready(builtin_messages(context)))
    }
}

pub(super) async fn run_rule(evaluator: &dyn RuleEvaluator, context: RuleContext<'_>) -> Vec<String> {
    let transformed;
    let value = match &context.rule.transform {
        Some(transform) => {
            transformed = transform(context.value);
            &transformed
        }
        None => context.value,
    };
    let context = RuleContext { value, ..context };
    let messages = match &context.rule.validator {
        Some(validator) => validator(context).await,
        None => evaluator.evaluate(context).await,
    };
    match (&context.rule.message, messages.is_empty()) {
        (Some(message), false) => vec![message.clone()],
        _ => messages,
    }
}

pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn builtin_messages(context: RuleContext<'_>) -> Vec<String> {
    let RuleContext {
        field,
        rule,
        value,
        messages,
        ..
    } = context;
    let name = field.as_str();

    if is_empty_value(value) {
        if rule.required {
            return vec![format_message(&messages.required, &[name])];
        }
        return Vec::new();
    }

    if let Some(kind) = rule.kind {
        if !matches_type(kind, value, rule) {
            if kind == RuleType::Enum {
                return vec![one_of_message(messages, name, &rule.one_of)];
            }
            return vec![format_message(messages.for_type(kind), &[name, kind.as_str()])];
        }
    }

    let mut errors = Vec::new();
    if rule.whitespace && value.as_str().is_some_and(|text| text.trim().is_empty()) {
        errors.push(format_message(&messages.whitespace, &[name]));
    }
    if let Some(error) = range_message(rule, value, messages, name) {
        errors.push(error);
    }
    if !rule.one_of.is_empty() && rule.kind != Some(RuleType::Enum) && !rule.one_of.contains(value)
    {
        errors.push(one_of_message(messages, name, &rule.one_of));
    }
    if let Some(pattern) = &rule.pattern {
        if let Some(text) = value.as_str() {
            if !pattern.is_match(text) {
                errors.push(format_message(
                    &messages.pattern_mismatch,
                    &[name, text, pattern.as_str()],
                ));
            }
        }
    }
    errors
}

fn one_of_message(messages: &ValidateMessages, name: &str, allowed: &[Value]) -> String {
    let allowed = allowed
        .iter()
        .map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format_message(&messages.one_of, &[name, &allowed])
}

fn range_message(
    rule: &Rule,
    value: &Value,
    messages: &ValidateMessages,
    name: &str,
) -> Option<String> {
    if rule.len.is_none() && rule.min.is_none() && rule.max.is_none() {
        return None;
    }
    let (measure, templates): (Decimal, &RangeMessages) = match value {
        Value::String(text) => (Decimal::from(text.chars().count()), &messages.string),
        Value::Array(items) => (Decimal::from(items.len()), &messages.array),
        Value::Number(number) => (decimal_from_number(number)?, &messages.number),
        _ => return None,
    };

    if let Some(len) = rule.len {
        return (measure != len).then(|| format_message(&templates.len, &[name, &len.to_string()]));
    }
    match (rule.min, rule.max) {
        (Some(min), Some(max)) if measure < min || measure > max => Some(format_message(
            &templates.range,
            &[name, &min.to_string(), &max.to_string()],
        )),
        (Some(min), None) if measure < min => {
            Some(format_message(&templates.min, &[name, &min.to_string()]))
        }
        (None, Some(max)) if measure > max => {
            Some(format_message(&templates.max, &[name, &max.to_string()]))
        }
        _ => None,
    }
}

fn matches_type(kind: RuleType, value: &Value, rule: &Rule) -> bool {
    match kind {
        RuleType::String => value.is_string(),
        RuleType::Number => value.is_number(),
        RuleType::Boolean => value.is_boolean(),
        RuleType::Integer => value.as_number().is_some_and(is_integer),
        RuleType::Float => value.as_number().is_some_and(|number| !is_integer(number)),
        RuleType::Array => value.is_array(),
        RuleType::Object => value.is_object(),
        RuleType::Enum => rule.one_of.contains(value),
        RuleType::Date => text_matches(value, &DATE, DATE_PATTERN),
        RuleType::Url => text_matches(value, &URL, URL_PATTERN),
        RuleType::Hex => text_matches(value, &HEX, HEX_PATTERN),
        RuleType::Email => text_matches(value, &EMAIL, EMAIL_PATTERN),
        RuleType::Regexp => value.as_str().is_some_and(|text| Regex::new(text).is_ok()),
        RuleType::Any => true,
    }
}

fn is_integer(number: &Number) -> bool {
    number.is_i64() || number.is_u64() || number.as_f64().is_some_and(|value| value.fract() == 0.0)
}

const EMAIL_PATTERN: &str = r#"^[^\s@<>()\[\]\\.,;:"]+(\.[^\s@<>()\[\]\\.,;:"]+)*@([A-Za-z0-9-]+\.)+[A-Za-z]{2,}$"#;
const URL_PATTERN: &str = r"^(?i)(https?|ftp)://[^\s/$.?#][^\s]*$";
const HEX_PATTERN: &str = r"^(?i)#?([a-f0-9]{6}|[a-f0-9]{3})$";
const DATE_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}([T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?)?$";

static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
static URL: OnceLock<Option<Regex>> = OnceLock::new();
static HEX: OnceLock<Option<Regex>> = OnceLock::new();
static DATE: OnceLock<Option<Regex>> = OnceLock::new();

fn text_matches(value: &Value, cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> bool {
    let Some(text) = value.as_str() else {
        return false;
    };
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .is_some_and(|regex| regex.is_match(text))
}

pub(super) fn decimal_from_number(number: &Number) -> Option<Decimal> {
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
        .or_else(|| number.as_f64().and_then(Decimal::from_f64))
}
