use garde::Validate;

use crate::error::{AppError, Result};

fn login_charset(login: &str, _ctx: &()) -> garde::Result {
    if login
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        Ok(())
    } else {
        Err(garde::Error::new(
            "can only contain letters, numbers, dots, underscores, and hyphens",
        ))
    }
}

#[derive(Validate)]
struct Credentials<'a> {
    #[garde(length(chars, min = 3, max = 255), custom(login_charset))]
    login: &'a str,
    #[garde(length(chars, min = 1, max = 128))]
    password: &'a str,
}

/// Validates a login/password pair before it reaches the store.
///
/// # Arguments
///
/// * `login` - The login to validate.
/// * `password` - The plaintext password to validate.
///
/// # Returns
///
/// A `Result<()>`; violations are `AppError::InvalidArgument`.
pub fn validate_credentials(login: &str, password: &str) -> Result<()> {
    Credentials { login, password }
        .validate()
        .map_err(|report| AppError::InvalidArgument(report.to_string().trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reasonable_credentials() {
        assert!(validate_credentials("alice", "pw1").is_ok());
        assert!(validate_credentials("john.doe-99_x", "correct horse battery").is_ok());
    }

    #[test]
    fn rejects_bad_logins() {
        assert!(validate_credentials("al", "pw1").is_err());
        assert!(validate_credentials("alice smith", "pw1").is_err());
        assert!(validate_credentials("alice/..", "pw1").is_err());
        assert!(validate_credentials(&"a".repeat(256), "pw1").is_err());
    }

    #[test]
    fn rejects_bad_passwords() {
        assert!(matches!(
            validate_credentials("alice", ""),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(validate_credentials("alice", &"p".repeat(129)).is_err());
    }
}
