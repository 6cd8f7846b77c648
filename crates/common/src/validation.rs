//! Input validation for values that end up on disk or in tokens.
//!
//! Labels and usernames become directory and file names inside the
//! enrollment store, so they are checked for path traversal before use.

use anyhow::{anyhow, Result};
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// CONSTANTS: Input Size Limits
// ============================================================================

/// Maximum length for labels (one path component in the enrollment store)
pub const MAX_LABEL_LENGTH: usize = 256;

/// Maximum length for usernames
pub const MAX_USERNAME_LENGTH: usize = 150;

/// Maximum length for passwords (bounded to keep hashing cheap)
pub const MAX_PASSWORD_LENGTH: usize = 1024;

/// Image extensions the enrollment store accepts, lowercase.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp", "tif", "tiff"];

// ============================================================================
// Safe Time Operations
// ============================================================================

/// Get current Unix timestamp in seconds, safely handling clock errors
pub fn safe_unix_timestamp() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_secs(),
        Err(e) => {
            tracing::warn!(
                error = %e,
                "System clock is before UNIX epoch (1970-01-01), using timestamp 0"
            );
            0
        }
    }
}

// ============================================================================
// String Validation
// ============================================================================

/// Validate string length against a maximum
pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    if value.len() > max_length {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes (got {})",
            field_name,
            max_length,
            value.len()
        ));
    }
    Ok(())
}

/// Validate non-empty string
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} cannot be empty", field_name));
    }
    Ok(())
}

/// Validate a label used as a single path component.
///
/// Rejects separators, `..`, leading dots (hidden entries are never
/// enumerated), and control characters.
pub fn validate_label(label: &str, field_name: &str) -> Result<()> {
    validate_non_empty(label, field_name)?;
    validate_length(label, MAX_LABEL_LENGTH, field_name)?;

    if label.contains("..") || label.contains('/') || label.contains('\\') {
        return Err(anyhow!(
            "{} contains invalid characters (no path separators or '..' allowed)",
            field_name
        ));
    }

    if label.starts_with('.') {
        return Err(anyhow!("{} cannot start with '.'", field_name));
    }

    if label.chars().any(|c| c.is_control()) {
        return Err(anyhow!("{} contains control characters", field_name));
    }

    Ok(())
}

/// Validate an image file extension and return it lowercased.
pub fn validate_image_extension(extension: &str) -> Result<String> {
    let extension = extension.trim_start_matches('.').to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(anyhow!("unsupported image extension '{}'", extension))
    }
}

/// Usernames double as enrollment labels, so they follow the label rules.
pub fn validate_username(username: &str) -> Result<()> {
    validate_length(username, MAX_USERNAME_LENGTH, "username")?;
    validate_label(username, "username")
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(anyhow!("password cannot be empty"));
    }
    validate_length(password, MAX_PASSWORD_LENGTH, "password")
}

// ============================================================================
// Numeric Validation
// ============================================================================

/// Validate value is within range
pub fn validate_range<T: PartialOrd + std::fmt::Display>(
    value: T,
    min: T,
    max: T,
    field_name: &str,
) -> Result<()> {
    if !(value >= min && value <= max) {
        return Err(anyhow!(
            "{} must be between {} and {}, got {}",
            field_name,
            min,
            max,
            value
        ));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_unix_timestamp() {
        let ts = safe_unix_timestamp();
        assert!(ts > 1700000000); // After 2023
    }

    #[test]
    fn test_validate_label() {
        assert!(validate_label("alice", "label").is_ok());
        assert!(validate_label("Jean-Luc Picard", "label").is_ok());
        assert!(validate_label("bob.smith", "label").is_ok());

        assert!(validate_label("", "label").is_err());
        assert!(validate_label("   ", "label").is_err());
        assert!(validate_label("../escape", "label").is_err());
        assert!(validate_label("a/b", "label").is_err());
        assert!(validate_label("a\\b", "label").is_err());
        assert!(validate_label(".hidden", "label").is_err());
        assert!(validate_label("tab\there", "label").is_err());
        assert!(validate_label(&"a".repeat(300), "label").is_err());
    }

    #[test]
    fn test_validate_image_extension() {
        assert_eq!(validate_image_extension("png").unwrap(), "png");
        assert_eq!(validate_image_extension("JPG").unwrap(), "jpg");
        assert_eq!(validate_image_extension(".webp").unwrap(), "webp");

        assert!(validate_image_extension("exe").is_err());
        assert!(validate_image_extension("").is_err());
        assert!(validate_image_extension("png/../x").is_err());
    }

    #[test]
    fn test_validate_credentials() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("../root").is_err());
        assert!(validate_username(&"u".repeat(200)).is_err());

        assert!(validate_password("hunter2").is_ok());
        assert!(validate_password("").is_err());
        assert!(validate_password(&"p".repeat(2000)).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range(0.6, 0.0, 4.0, "tolerance").is_ok());
        assert!(validate_range(0.0, 0.0, 4.0, "tolerance").is_ok());

        assert!(validate_range(-0.1, 0.0, 4.0, "tolerance").is_err());
        assert!(validate_range(f32::NAN, 0.0, 4.0, "tolerance").is_err());
    }
}
