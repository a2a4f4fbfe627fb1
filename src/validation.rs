//! Field-level validation shared by every write payload.

use std::borrow::Cow;
use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;
use validator::{ValidateUrl, ValidationError, ValidationErrors};

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";
pub const NON_FIELD: &str = "non_field_errors";
pub const INVALID_INTEGER: &str = "A valid integer is required.";
pub const INVALID_NUMBER: &str = "A valid number is required.";

/// Largest price accepted: five digits with two decimal places.
const MAX_PRICE: Decimal = Decimal::from_parts(99_999, 0, 0, false, 2);

/// Validation messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Records a required text field. `None` is only an error when the write
    /// is not partial; whitespace-only text is always blank.
    pub fn require_text(&mut self, field: &str, value: Option<&str>, partial: bool) {
        match value {
            None if !partial => self.add(field, REQUIRED),
            Some(text) if text.trim().is_empty() => self.add(field, BLANK),
            _ => {}
        }
    }

    pub fn require<T>(&mut self, field: &str, value: Option<&T>, partial: bool) {
        if value.is_none() && !partial {
            self.add(field, REQUIRED);
        }
    }

    /// Merges derive-based validation results. Fields that already carry a
    /// message (required/blank) keep only that message.
    pub fn absorb(&mut self, result: Result<(), ValidationErrors>) {
        let Err(errors) = result else {
            return;
        };

        for (field, failures) in errors.field_errors() {
            if self.contains(&field) {
                continue;
            }
            for failure in failures {
                let message = failure
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value ({}).", failure.code));
                self.add(field.to_string(), message);
            }
        }
    }

    /// Adds `other`'s messages for fields that have none yet.
    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_insert(messages);
        }
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Reads an integer sent either as a JSON number or as a numeric string.
/// Anything else is recorded against `field` and read as absent.
pub fn integer_field(field: &str, raw: Option<Value>, errors: &mut FieldErrors) -> Option<i64> {
    let raw = raw?;
    let parsed = match &raw {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    if parsed.is_none() {
        errors.add(field, INVALID_INTEGER);
    }
    parsed
}

/// Reads a decimal sent either as a JSON number or as a numeric string.
pub fn decimal_field(field: &str, raw: Option<Value>, errors: &mut FieldErrors) -> Option<Decimal> {
    let raw = raw?;
    let parsed = match &raw {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s.trim()),
        _ => None,
    };
    if parsed.is_none() {
        errors.add(field, INVALID_NUMBER);
    }
    parsed
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

pub fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(invalid(
            "min_value",
            "Ensure this value is greater than or equal to 0.",
        ));
    }
    if price.normalize().scale() > 2 {
        return Err(invalid(
            "max_decimal_places",
            "Ensure that there are no more than 2 decimal places.",
        ));
    }
    if *price > MAX_PRICE {
        return Err(invalid(
            "max_digits",
            "Ensure that there are no more than 5 digits in total.",
        ));
    }
    Ok(())
}

/// Links may be left blank; anything else must parse as a URL.
pub fn validate_link(link: &str) -> Result<(), ValidationError> {
    if link.is_empty() || link.validate_url() {
        Ok(())
    } else {
        Err(invalid("invalid_url", "Enter a valid URL."))
    }
}
