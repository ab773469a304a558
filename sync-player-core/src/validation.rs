//! Input validation for client-supplied strings (spec §4.3, §5.2, §5.5).

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Invalid {field}: {message}")]
    Field { field: String, message: String },
}

pub type ValidationResult<T> = Result<T, ValidationError>;

fn field_error(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::Field {
        field: field.to_string(),
        message: message.into(),
    }
}

static FILENAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9 _.\-()\[\]]+$").expect("static pattern compiles"));

/// Media filenames: bounded length, a closed character set, and no path
/// traversal. Anchoring the pattern to the whole string rules out embedded
/// separators without a separate check, but `..` and `/`/`\` are rejected
/// explicitly since they matter even inside an otherwise-allowed charset.
pub struct FilenameValidator {
    max_length: usize,
}

impl Default for FilenameValidator {
    fn default() -> Self {
        Self { max_length: 255 }
    }
}

impl FilenameValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self, filename: &str) -> ValidationResult<()> {
        if filename.is_empty() {
            return Err(field_error("filename", "must not be empty"));
        }
        if filename.len() > self.max_length {
            return Err(field_error(
                "filename",
                format!("must be at most {} characters", self.max_length),
            ));
        }
        if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
            return Err(field_error("filename", "must not contain path separators"));
        }
        if !FILENAME_PATTERN.is_match(filename) {
            return Err(field_error(
                "filename",
                "may only contain letters, digits, spaces, and . _ - ( ) [ ]",
            ));
        }
        Ok(())
    }
}

/// Display name shown for a client in the member list and chat (spec §4.3):
/// 1-32 characters, no control characters.
pub struct DisplayNameValidator {
    min_length: usize,
    max_length: usize,
}

impl Default for DisplayNameValidator {
    fn default() -> Self {
        Self {
            min_length: 1,
            max_length: 32,
        }
    }
}

impl DisplayNameValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self, name: &str) -> ValidationResult<()> {
        let trimmed = name.trim();
        if trimmed.chars().count() < self.min_length {
            return Err(field_error("display_name", "must not be empty"));
        }
        if trimmed.chars().count() > self.max_length {
            return Err(field_error(
                "display_name",
                format!("must be at most {} characters", self.max_length),
            ));
        }
        if trimmed.chars().any(|c| c.is_control()) {
            return Err(field_error("display_name", "must not contain control characters"));
        }
        Ok(())
    }
}

/// Chat message body (spec §4.4): bounded length; HTML is sanitized
/// separately by [`crate::content_filter`], not rejected here.
pub struct ChatMessageValidator {
    max_length: usize,
}

impl Default for ChatMessageValidator {
    fn default() -> Self {
        Self { max_length: 500 }
    }
}

impl ChatMessageValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self, message: &str) -> ValidationResult<()> {
        if message.trim().is_empty() {
            return Err(field_error("message", "must not be empty"));
        }
        if message.chars().count() > self.max_length {
            return Err(field_error(
                "message",
                format!("must be at most {} characters", self.max_length),
            ));
        }
        Ok(())
    }
}

/// Room join code (spec §4.2): 6 characters, case-insensitive, drawn from
/// the unambiguous alphabet used when codes are generated.
static ROOM_CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)[ABCDEFGHJKLMNPQRSTUVWXYZ23456789]{6}$").expect("static pattern compiles"));

pub fn validate_room_code(code: &str) -> ValidationResult<()> {
    if !ROOM_CODE_PATTERN.is_match(code) {
        return Err(field_error("room_code", "must be a 6-character room code"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_filenames() {
        let v = FilenameValidator::new();
        assert!(v.validate("Movie Night (2024) [1080p].mkv").is_ok());
    }

    #[test]
    fn rejects_path_traversal() {
        let v = FilenameValidator::new();
        assert!(v.validate("../../etc/passwd").is_err());
        assert!(v.validate("sub/dir.mkv").is_err());
    }

    #[test]
    fn rejects_overlong_filename() {
        let v = FilenameValidator::new();
        let long = "a".repeat(300) + ".mkv";
        assert!(v.validate(&long).is_err());
    }

    #[test]
    fn display_name_bounds() {
        let v = DisplayNameValidator::new();
        assert!(v.validate("").is_err());
        assert!(v.validate(&"x".repeat(33)).is_err());
        assert!(v.validate("Alex").is_ok());
    }

    #[test]
    fn chat_message_rejects_empty_and_overlong() {
        let v = ChatMessageValidator::new();
        assert!(v.validate("   ").is_err());
        assert!(v.validate(&"x".repeat(501)).is_err());
        assert!(v.validate("hi there").is_ok());
    }

    #[test]
    fn room_code_is_case_insensitive() {
        assert!(validate_room_code("ab23cd").is_ok());
        assert!(validate_room_code("ABC1").is_err());
        assert!(validate_room_code("ABCIOL").is_err());
    }
}
