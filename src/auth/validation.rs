use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UsernameError {
    #[error("Username must be at least 3 characters long")]
    TooShort,
    #[error("Username must be at most 50 characters long")]
    TooLong,
    #[error("Username can only contain letters, numbers, and underscores")]
    InvalidCharacters,
}

pub fn validate_username(username: &str) -> Result<(), UsernameError> {
    let len = username.chars().count();
    if len < USERNAME_MIN_LEN {
        return Err(UsernameError::TooShort);
    }
    if len > USERNAME_MAX_LEN {
        return Err(UsernameError::TooLong);
    }
    if !USERNAME_RE.is_match(username) {
        return Err(UsernameError::InvalidCharacters);
    }
    Ok(())
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && EMAIL_RE.is_match(email)
}

/// Canonical form under which emails are stored and compared.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert_eq!(validate_username("ab"), Err(UsernameError::TooShort));
        assert_eq!(
            validate_username(&"a".repeat(51)),
            Err(UsernameError::TooLong)
        );
        assert_eq!(
            validate_username("test@user"),
            Err(UsernameError::InvalidCharacters)
        );
        assert_eq!(
            validate_username("with space"),
            Err(UsernameError::InvalidCharacters)
        );
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("bob_42").is_ok());
        assert!(validate_username(&"a".repeat(50)).is_ok());
    }

    #[test]
    fn username_error_messages() {
        assert!(UsernameError::TooShort
            .to_string()
            .contains("at least 3"));
        assert!(UsernameError::InvalidCharacters
            .to_string()
            .contains("letters, numbers, and underscores"));
    }

    #[test]
    fn email_format() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("first.last+tag@mail.example.org"));
        assert!(!is_valid_email("invalidemail"));
        assert!(!is_valid_email("no-domain@"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("alice@example"));
    }

    #[test]
    fn email_is_normalized() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }
}
