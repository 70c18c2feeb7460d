mod contact_email;
mod contact_message;
mod contact_name;
mod message_text;
mod validation_error;

pub use contact_email::ContactEmail;
pub use contact_message::{ContactMessage, ValidationSettings};
pub use contact_name::ContactName;
pub use message_text::{ContactBody, ContactSubject};
pub use validation_error::ValidationError;

use unicode_segmentation::UnicodeSegmentation;

pub(crate) const BLANK_FIELD: &str = "This field may not be blank.";
pub(crate) const CONTROL_CHARACTERS: &str = "This field may not contain control characters.";

pub(crate) fn too_long(max_length: usize) -> String {
    format!("Ensure this field has no more than {} characters.", max_length)
}

/// Trims `s` and checks it is non-empty and at most `max_length` graphemes long.
pub(crate) fn bounded_text(s: String, max_length: usize) -> Result<String, String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(BLANK_FIELD.to_string());
    }
    if trimmed.graphemes(true).count() > max_length {
        return Err(too_long(max_length));
    }
    Ok(trimmed.to_string())
}
