use crate::domain::{bounded_text, CONTROL_CHARACTERS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactName(String);

impl ContactName {
    pub fn parse(s: String, max_length: usize) -> Result<ContactName, String> {
        let name = bounded_text(s, max_length)?;

        let contains_control_characters = name.chars().any(char::is_control);
        if contains_control_characters {
            Err(CONTROL_CHARACTERS.to_string())
        } else {
            Ok(Self(name))
        }
    }
}

impl AsRef<str> for ContactName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContactName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
