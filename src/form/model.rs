use serde::Serialize;
use serde::de::DeserializeOwned;

use super::controller::{FieldKey, FormController, FormError, FormResult};

pub trait FormModel: Sized {
    type Fields;

    fn fields() -> Self::Fields;

    fn field_keys() -> Vec<FieldKey>;
}

impl FormController {
    pub fn get_model<T: DeserializeOwned>(&self) -> FormResult<T> {
        let values = self.get_fields_value(None)?;
        serde_json::from_value(values.to_nested())
            .map_err(|error| FormError::ModelConversion(error.to_string()))
    }

    pub fn set_model<T: Serialize>(&self, model: &T) -> FormResult<()> {
        let values = serde_json::to_value(model)
            .map_err(|error| FormError::ModelConversion(error.to_string()))?;
        if !values.is_object() {
            return Err(FormError::ModelConversion(
                "model must serialize to an object".to_string(),
            ));
        }
        self.set_fields_value(&values)
    }
}
