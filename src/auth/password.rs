use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::error;

/// Strength rules applied at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self { min_length: 8 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordError {
    #[error("Password must be at least {min} characters long")]
    TooShort { min: usize },
    #[error("Password must contain at least one number")]
    MissingDigit,
    #[error("Password must contain at least one letter")]
    MissingLetter,
}

/// Checks the policy rules in order; the first violated rule is reported.
pub fn validate_strength(password: &str, policy: &PasswordPolicy) -> Result<(), PasswordError> {
    if password.chars().count() < policy.min_length {
        return Err(PasswordError::TooShort {
            min: policy.min_length,
        });
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PasswordError::MissingDigit);
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err(PasswordError::MissingLetter);
    }
    Ok(())
}

/// Hashes with Argon2id and a fresh salt. The PHC output carries the
/// algorithm, version and cost, so older hashes keep verifying after the
/// parameters change.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Returns `Ok(false)` on mismatch; a stored hash that cannot be parsed is an error.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "abc12345";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = hash_password("correct-horse-9").expect("hashing should succeed");
        assert!(!verify_password("wrong-horse-9", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn hashes_are_salted_and_self_describing() {
        let a = hash_password("same-pass-1").unwrap();
        let b = hash_password("same-pass-1").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
        assert!(a.contains("m=") && a.contains("t=") && a.contains("p="));
    }

    #[test]
    fn rejects_short_password_first() {
        let policy = PasswordPolicy::default();
        assert_eq!(
            validate_strength("short1", &policy),
            Err(PasswordError::TooShort { min: 8 })
        );
        // length wins even when other rules also fail
        assert_eq!(
            validate_strength("abc", &policy),
            Err(PasswordError::TooShort { min: 8 })
        );
    }

    #[test]
    fn rejects_missing_digit() {
        assert_eq!(
            validate_strength("alllettersnodigit", &PasswordPolicy::default()),
            Err(PasswordError::MissingDigit)
        );
    }

    #[test]
    fn numeric_lookalikes_are_not_digits() {
        let policy = PasswordPolicy::default();
        assert_eq!(
            validate_strength("ⅧⅧⅧⅧⅧⅧⅧⅧ", &policy),
            Err(PasswordError::MissingDigit)
        );
        assert_eq!(
            validate_strength("½abcdefgh", &policy),
            Err(PasswordError::MissingDigit)
        );
    }

    #[test]
    fn rejects_missing_letter() {
        assert_eq!(
            validate_strength("12345678", &PasswordPolicy::default()),
            Err(PasswordError::MissingLetter)
        );
    }

    #[test]
    fn accepts_valid_password_and_honors_custom_minimum() {
        assert!(validate_strength("abc12345", &PasswordPolicy::default()).is_ok());
        let strict = PasswordPolicy { min_length: 12 };
        assert_eq!(
            validate_strength("abc12345", &strict),
            Err(PasswordError::TooShort { min: 12 })
        );
    }

    #[test]
    fn messages_name_the_violated_rule() {
        assert!(PasswordError::TooShort { min: 8 }
            .to_string()
            .contains("at least 8"));
        assert!(PasswordError::MissingDigit.to_string().contains("number"));
        assert!(PasswordError::MissingLetter.to_string().contains("letter"));
    }
}
