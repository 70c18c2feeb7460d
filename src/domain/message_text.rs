use crate::domain::{bounded_text, CONTROL_CHARACTERS};

/// Subject line supplied by the sender. Single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactSubject(String);

impl ContactSubject {
    pub fn parse(s: String, max_length: usize) -> Result<ContactSubject, String> {
        let subject = bounded_text(s, max_length)?;
        if subject.chars().any(char::is_control) {
            return Err(CONTROL_CHARACTERS.to_string());
        }
        Ok(Self(subject))
    }
}

impl AsRef<str> for ContactSubject {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Free-form message text. Line breaks and tabs are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactBody(String);

impl ContactBody {
    pub fn parse(s: String, max_length: usize) -> Result<ContactBody, String> {
        let body = bounded_text(s, max_length)?;
        let contains_forbidden_characters = body
            .chars()
            .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'));
        if contains_forbidden_characters {
            return Err(CONTROL_CHARACTERS.to_string());
        }
        Ok(Self(body))
    }
}

impl AsRef<str> for ContactBody {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
