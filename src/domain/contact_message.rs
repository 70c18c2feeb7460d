use serde_aux::field_attributes::deserialize_number_from_string;
use serde_json::{Map, Value};

use crate::domain::{ContactBody, ContactEmail, ContactName, ContactSubject, ValidationError};

const REQUIRED_FIELD: &str = "This field is required.";
const NOT_A_STRING: &str = "Not a valid string.";

/// Upper bounds, in grapheme clusters, for each contact form field.
#[derive(serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_name_length: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_email_length: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_subject_length: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_message_length: usize,
}

impl ValidationSettings {
    /// RFC 5321 limit on a forward path.
    pub const MAX_EMAIL_LENGTH: usize = 254;
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_name_length: 100,
            max_email_length: Self::MAX_EMAIL_LENGTH,
            max_subject_length: 150,
            max_message_length: 5000,
        }
    }
}

/// A contact form submission that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactMessage {
    sender_name: ContactName,
    sender_email: ContactEmail,
    subject: ContactSubject,
    body: ContactBody,
}

impl ContactMessage {
    /// Validates an untyped request body.
    ///
    /// Expects a JSON object with `name`, `email`, `subject` and `message`.
    /// Every failing field is reported, not only the first one.
    pub fn parse(payload: &Value, limits: &ValidationSettings) -> Result<Self, ValidationError> {
        let payload = match payload {
            Value::Object(map) => map,
            other => {
                return Err(ValidationError::single(
                    "non_field_errors",
                    format!(
                        "Invalid data. Expected a dictionary, but got {}.",
                        json_kind(other)
                    ),
                ))
            }
        };

        let mut errors = ValidationError::new();
        let sender_name = field(payload, "name", &mut errors, |s| {
            ContactName::parse(s, limits.max_name_length)
        });
        let sender_email = field(payload, "email", &mut errors, |s| {
            ContactEmail::parse(s, limits.max_email_length)
        });
        let subject = field(payload, "subject", &mut errors, |s| {
            ContactSubject::parse(s, limits.max_subject_length)
        });
        let body = field(payload, "message", &mut errors, |s| {
            ContactBody::parse(s, limits.max_message_length)
        });

        match (sender_name, sender_email, subject, body) {
            (Some(sender_name), Some(sender_email), Some(subject), Some(body)) => Ok(Self {
                sender_name,
                sender_email,
                subject,
                body,
            }),
            _ => Err(errors),
        }
    }

    pub fn sender_name(&self) -> &ContactName {
        &self.sender_name
    }

    pub fn sender_email(&self) -> &ContactEmail {
        &self.sender_email
    }

    pub fn subject(&self) -> &ContactSubject {
        &self.subject
    }

    pub fn body(&self) -> &ContactBody {
        &self.body
    }
}

fn field<T>(
    payload: &Map<String, Value>,
    name: &str,
    errors: &mut ValidationError,
    parse: impl FnOnce(String) -> Result<T, String>,
) -> Option<T> {
    let raw = match payload.get(name) {
        None | Some(Value::Null) => {
            errors.add(name, REQUIRED_FIELD);
            return None;
        }
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => {
            errors.add(name, NOT_A_STRING);
            return None;
        }
    };
    match parse(raw) {
        Ok(value) => Some(value),
        Err(message) => {
            errors.add(name, message);
            None
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}
