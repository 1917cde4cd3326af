use crate::error::{AppError, Result};

/// The longest secret name accepted, in bytes.
pub const MAX_NAME_BYTES: usize = 255;

/// Validates a secret name.
///
/// Names are non-empty, at most [`MAX_NAME_BYTES`] long and free of control
/// characters.
pub fn validate_secret_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AppError::InvalidArgument(
            "Secret name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_NAME_BYTES {
        return Err(AppError::InvalidArgument(format!(
            "Secret name must be at most {} bytes",
            MAX_NAME_BYTES
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(AppError::InvalidArgument(
            "Secret name cannot contain control characters".to_string(),
        ));
    }

    Ok(())
}
