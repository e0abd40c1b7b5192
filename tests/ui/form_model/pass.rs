use calmform::form::{FieldKey, FormModel};

#[derive(calmform::form::FormModel)]
struct SignupForm {
    username: String,
    r#type: String,
}

fn main() {
    let fields = SignupForm::fields();
    assert_eq!(fields.username(), FieldKey::new("username"));
    assert_eq!(fields.r#type().as_str(), "type");
    assert_eq!(
        SignupForm::field_keys(),
        vec![FieldKey::new("username"), FieldKey::new("type")]
    );
}
