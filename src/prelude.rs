pub use crate::form::{
    Binding, FieldData, FieldKey, FieldOptions, FieldPatch, FieldValues, FirstFields,
    FormController, FormError, FormModel, FormOptions, FormResult, FormSnapshot, Rule, RuleType,
    ScrollConfig, ScrollIntoView, SubmitState, ValidateMessages, ValidateOptions, ValidateOutcome,
    ValidationError, ValidationTask,
};
