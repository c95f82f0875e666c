use anyhow::Context;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::claims::Claims;
use crate::config::JwtConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    BadSignature,
    #[error("token has expired")]
    Expired,
}

impl TokenError {
    pub fn reason(self) -> &'static str {
        match self {
            TokenError::Malformed => "malformed",
            TokenError::BadSignature => "bad_signature",
            TokenError::Expired => "expired",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::BadSignature,
            _ => TokenError::Malformed,
        }
    }
}

/// Signing and verification keys plus the token lifetime. Built once from
/// the validated configuration.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            algorithm: cfg.algorithm,
            ttl: Duration::seconds(cfg.ttl_minutes.saturating_mul(60)),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Signs a token for `subject` with the configured lifetime.
    pub fn issue_access(&self, subject: &str) -> anyhow::Result<String> {
        self.issue(subject, self.ttl)
    }

    pub fn issue(&self, subject: &str, ttl: Duration) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now
            .checked_add(ttl)
            .context("token expiry out of range")?;
        let claims = Claims {
            sub: subject.to_owned(),
            iat: now.unix_timestamp().max(0) as u64,
            exp: exp.unix_timestamp().max(0) as u64,
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)?;
        debug!(subject, exp = claims.exp, "jwt signed");
        Ok(token)
    }

    /// Checks the signature over the payload, then the expiry with no leeway.
    /// A token is live only while `exp` is strictly after now.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        // jsonwebtoken still accepts exp == now
        let now = OffsetDateTime::now_utc().unix_timestamp().max(0) as u64;
        if data.claims.exp <= now {
            return Err(TokenError::Expired);
        }
        debug!(subject = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str, algorithm: Algorithm) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: secret.into(),
            algorithm,
            ttl_minutes: 5,
        })
    }

    fn make_keys_with_ttl(ttl_minutes: i64) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: "unit-test-secret-with-at-least-32-bytes!".into(),
            algorithm: Algorithm::HS256,
            ttl_minutes,
        })
    }

    fn keys() -> JwtKeys {
        make_keys("unit-test-secret-with-at-least-32-bytes!", Algorithm::HS256)
    }

    #[test]
    fn issue_and_verify_roundtrip() {
        let keys = keys();
        let token = keys.issue_access("alice").expect("sign access");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.exp - claims.iat, 5 * 60);
    }

    #[test]
    fn expired_token_is_rejected_even_with_valid_signature() {
        let keys = keys();
        let token = keys.issue("alice", Duration::seconds(-5)).expect("sign");
        assert_eq!(keys.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn token_expiring_this_second_is_rejected() {
        let keys = keys();
        let token = keys.issue("alice", Duration::ZERO).expect("sign");
        assert_eq!(keys.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn out_of_range_expiry_is_an_error() {
        let keys = keys();
        assert!(keys.issue("alice", Duration::MAX).is_err());

        let huge = make_keys_with_ttl(i64::MAX);
        assert!(huge.issue_access("alice").is_err());
    }

    #[test]
    fn every_signature_byte_is_checked() {
        let keys = keys();
        let token = keys.issue_access("alice").expect("sign");
        let sig_start = token.rfind('.').expect("three segments") + 1;

        for i in sig_start..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert_eq!(
                keys.verify(&tampered),
                Err(TokenError::BadSignature),
                "byte {i} of the signature was not checked"
            );
        }
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let other = make_keys("another-secret-that-is-also-32-bytes-long", Algorithm::HS256);
        let token = other.issue_access("mallory").unwrap();
        assert_eq!(keys().verify(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn token_with_other_algorithm_is_rejected() {
        let secret = "unit-test-secret-with-at-least-32-bytes!";
        let hs512 = make_keys(secret, Algorithm::HS512);
        let token = hs512.issue_access("alice").unwrap();
        assert_eq!(
            make_keys(secret, Algorithm::HS256).verify(&token),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let keys = keys();
        assert_eq!(keys.verify("invalid_token"), Err(TokenError::Malformed));
        assert_eq!(keys.verify(""), Err(TokenError::Malformed));
        assert_eq!(keys.verify("a.b.c"), Err(TokenError::Malformed));
    }

    #[test]
    fn reasons_are_stable() {
        assert_eq!(TokenError::Malformed.reason(), "malformed");
        assert_eq!(TokenError::BadSignature.reason(), "bad_signature");
        assert_eq!(TokenError::Expired.reason(), "expired");
    }
}
