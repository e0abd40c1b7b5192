mod binding;
mod change;
mod controller;
mod messages;
mod model;
mod query;
mod registry;
mod rules;
mod scroll;
mod validation;
mod values;


pub use binding::{
    Binding, DEFAULT_TRIGGER, DEFAULT_VALUE_PROP, FieldOptions, NormalizeFn, ValueFromEventFn,
    ValuePropsFn, value_from_event,
};
pub use calmform_derive::FormModel;
pub use controller::{
    DEFAULT_FIELD_NAME_PROP, FIELD_DATA_PROP, FIELD_META_PROP, FieldData, FieldKey, FieldPatch,
    FieldsChangeHook, FormController, FormError, FormId, FormOptions, FormResult, FormSnapshot,
    MapPropsToFields, SubmitState, ValidationError, ValidationTicket, ValuesChangeHook,
};
pub use messages::{RangeMessages, ValidateMessages, format_message};
pub use model::FormModel;
pub use rules::{
    BuiltinRuleEvaluator, CustomValidatorFn, Rule, RuleContext, RuleEvaluator, RuleFuture,
    RuleType, TransformFn, is_empty_value,
};
pub use scroll::{ScrollConfig, ScrollIntoView};
pub use validation::{FirstFields, ValidateOptions, ValidateOutcome, ValidationTask};
pub use values::FieldValues;
