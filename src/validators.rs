/// Input validators for user-supplied fields
///
/// Every validator trims its input and returns the cleaned value so handlers
/// never persist surrounding whitespace.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 3;
const MIN_USER_NAME_LENGTH: usize = 3;
const MAX_NAME_LENGTH: usize = 255;
const MIN_PASSWORD_LENGTH: usize = 8;
/// bcrypt ignores everything past this many bytes
pub const MAX_PASSWORD_BYTES: usize = 72;
pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

lazy_static! {
    // RFC 5322 simplified email regex
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).expect("email regex is valid");
}

/// Validates an email address and normalises it to lowercase
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    // local part is limited to 64 octets
    if trimmed.split('@').next().map_or(0, str::len) > 64 {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    Ok(trimmed.to_lowercase())
}

/// Validates a user's display name
pub fn is_valid_user_name(name: &str) -> Result<String, ValidationError> {
    validate_name("name", name, MIN_USER_NAME_LENGTH)
}

/// Validates an item or category name
pub fn is_valid_label(field: &str, name: &str) -> Result<String, ValidationError> {
    validate_name(field, name, 1)
}

fn validate_name(field: &str, name: &str, min: usize) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field.to_string()));
    }

    let length = trimmed.chars().count();
    if length < min {
        return Err(ValidationError::TooShort(field.to_string(), min));
    }

    if length > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong(field.to_string(), MAX_NAME_LENGTH));
    }

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidFormat(field.to_string()));
    }

    Ok(trimmed.to_string())
}

/// Password strength requirements:
/// - 8 characters to 72 bytes
/// - at least one digit, one lowercase and one uppercase letter
pub fn is_valid_password(password: &str) -> Result<(), ValidationError> {
    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        ));
    }

    // counted in bytes: multi-byte characters reach the bcrypt limit sooner
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_BYTES,
        ));
    }

    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(ValidationError::WeakPassword(
            "must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        ));
    }

    Ok(())
}

/// Validates `skip`/`limit` query values, applying defaults
pub fn page_bounds(skip: Option<i64>, limit: Option<i64>) -> Result<(i64, i64), ValidationError> {
    let skip = skip.unwrap_or(0);
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);

    if skip < 0 {
        return Err(ValidationError::OutOfRange("skip must be >= 0".to_string()));
    }
    if limit < 1 {
        return Err(ValidationError::OutOfRange("limit must be >= 1".to_string()));
    }

    Ok((skip, limit.min(MAX_PAGE_LIMIT)))
}
