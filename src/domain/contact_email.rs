use unicode_segmentation::UnicodeSegmentation;
use validator::validate_email;

use crate::domain::{too_long, BLANK_FIELD};

const INVALID_EMAIL: &str = "Enter a valid email address.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactEmail(String);

impl ContactEmail {
    pub fn parse(s: String, max_length: usize) -> Result<ContactEmail, String> {
        let email = s.trim();
        if email.is_empty() {
            return Err(BLANK_FIELD.to_string());
        }
        if email.graphemes(true).count() > max_length {
            return Err(too_long(max_length));
        }
        if validate_email(email) {
            Ok(Self(email.to_string()))
        } else {
            Err(INVALID_EMAIL.to_string())
        }
    }
}

impl AsRef<str> for ContactEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContactEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
