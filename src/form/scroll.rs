use serde::{Deserialize, Serialize};

use super::controller::{FieldKey, FormController, FormResult};
use super::validation::{ValidateOptions, ValidateOutcome};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    pub align_with_left: bool,
    pub align_with_top: bool,
    pub offset_top: Option<f32>,
    pub offset_left: Option<f32>,
    pub offset_bottom: Option<f32>,
    pub offset_right: Option<f32>,
    pub allow_horizontal_scroll: bool,
    pub only_scroll_if_needed: bool,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            align_with_left: false,
            align_with_top: false,
            offset_top: None,
            offset_left: None,
            offset_bottom: None,
            offset_right: None,
            allow_horizontal_scroll: false,
            only_scroll_if_needed: true,
        }
    }
}

pub trait ScrollIntoView {
    fn scroll_into_view(&self, field: &FieldKey, binding_id: &str, config: &ScrollConfig);
}

impl<F> ScrollIntoView for F
where
    F: Fn(&FieldKey, &str, &ScrollConfig),
{
    fn scroll_into_view(&self, field: &FieldKey, binding_id: &str, config: &ScrollConfig) {
        self(field, binding_id, config)
    }
}

impl FormController {
    pub async fn validate_fields_and_scroll(
        &self,
        keys: Option<&[FieldKey]>,
        options: ValidateOptions,
        scroller: &dyn ScrollIntoView,
    ) -> FormResult<ValidateOutcome> {
        let config = options.scroll.clone().unwrap_or_default();
        let outcome = self.validate_fields(keys, options)?.await?;
        if let Some(key) = outcome.first_error_key() {
            let binding_id = self.options.binding_id(key);
            scroller.scroll_into_view(key, &binding_id, &config);
        }
        Ok(outcome)
    }
}
