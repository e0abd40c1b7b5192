use super::rules::RuleType;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidateMessages {
    pub default: String,
    pub required: String,
    pub whitespace: String,
    pub one_of: String,
    pub type_mismatch: String,
    pub type_invalid: String,
    pub string: RangeMessages,
    pub number: RangeMessages,
    pub array: RangeMessages,
    pub pattern_mismatch: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RangeMessages {
    pub len: String,
    pub min: String,
    pub max: String,
    pub range: String,
}

impl Default for ValidateMessages {
    fn default() -> Self {
        Self {
            default: "Validation error on field %s".to_string(),
            required: "%s is required".to_string(),
            whitespace: "%s cannot be empty".to_string(),
            one_of: "%s must be one of %s".to_string(),
            type_mismatch: "%s is not a %s".to_string(),
            type_invalid: "%s is not a valid %s".to_string(),
            string: RangeMessages {
                len: "%s must be exactly %s characters".to_string(),
                min: "%s must be at least %s characters".to_string(),
                max: "%s cannot be longer than %s characters".to_string(),
                range: "%s must be between %s and %s characters".to_string(),
            },
            number: RangeMessages {
                len: "%s must equal %s".to_string(),
                min: "%s cannot be less than %s".to_string(),
                max: "%s cannot be greater than %s".to_string(),
                range: "%s must be between %s and %s".to_string(),
            },
            array: RangeMessages {
                len: "%s must be exactly %s in length".to_string(),
                min: "%s cannot be less than %s in length".to_string(),
                max: "%s cannot be greater than %s in length".to_string(),
                range: "%s must be between %s and %s in length".to_string(),
            },
            pattern_mismatch: "%s value %s does not match pattern %s".to_string(),
        }
    }
}

impl ValidateMessages {
    pub fn for_type(&self, kind: RuleType) -> &str {
        match kind {
            RuleType::Email | RuleType::Url | RuleType::Hex | RuleType::Date => {
                &self.type_invalid
            }
            _ => &self.type_mismatch,
        }
    }
}

/// Fills `%s` placeholders left to right. Surplus placeholders stay as-is.
pub fn format_message(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut rest = template;
    while let Some(index) = rest.find("%s") {
        out.push_str(&rest[..index]);
        match args.next() {
            Some(arg) => out.push_str(arg),
            None => out.push_str("%s"),
        }
        rest = &rest[index + 2..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_fill_in_order() {
        assert_eq!(
            format_message("%s must be between %s and %s", &["age", "1", "9"]),
            "age must be between 1 and 9"
        );
    }

    #[test]
    fn missing_arguments_leave_placeholder() {
        assert_eq!(format_message("%s is %s", &["name"]), "name is %s");
        assert_eq!(format_message("no placeholders", &["x"]), "no placeholders");
    }

    #[test]
    fn url_like_types_use_invalid_template() {
        let messages = ValidateMessages::default();
        assert_eq!(messages.for_type(RuleType::Email), "%s is not a valid %s");
        assert_eq!(messages.for_type(RuleType::Number), "%s is not a %s");
    }
}
