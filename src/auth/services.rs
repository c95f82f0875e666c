use std::sync::Arc;

use anyhow::Context;
use lazy_static::lazy_static;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        jwt::JwtKeys,
        password::{hash_password, validate_strength, verify_password, PasswordError, PasswordPolicy},
        repo::{CreateUserError, UserStore},
        repo_types::{NewUser, User},
        validation::{is_valid_email, normalize_email, validate_username, UsernameError},
    },
    config::AppConfig,
    security::events::SECURITY,
};

lazy_static! {
    /// Verified against when the username is unknown, so that path costs
    /// about as much as a wrong password.
    static ref DUMMY_HASH: Option<String> = hash_password("timing-equalizer-0").ok();
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    InvalidUsernameFormat(#[from] UsernameError),
    #[error("Invalid email format")]
    InvalidEmailFormat,
    #[error(transparent)]
    WeakPassword(#[from] PasswordError),
    #[error("Username already registered")]
    DuplicateUsername,
    #[error("Email already registered")]
    DuplicateEmail,
    #[error("Incorrect username or password")]
    InvalidCredentials,
    #[error("Not authenticated")]
    MissingToken,
    #[error("Could not validate credentials")]
    InvalidToken,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<CreateUserError> for AuthError {
    fn from(e: CreateUserError) -> Self {
        match e {
            CreateUserError::DuplicateUsername => AuthError::DuplicateUsername,
            CreateUserError::DuplicateEmail => AuthError::DuplicateEmail,
            CreateUserError::Other(e) => AuthError::Internal(e),
        }
    }
}

/// The caller a protected request runs as. Only [`AuthService::resolve`]
/// hands these out to request handlers.
#[derive(Debug, Clone)]
pub struct Identity {
    user: User,
}

impl Identity {
    pub(crate) fn new(user: User) -> Self {
        Self { user }
    }

    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn username(&self) -> &str {
        &self.user.username
    }

    pub fn user(&self) -> &User {
        &self.user
    }
}

/// A freshly signed access token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: i64,
}

/// Registration, credential checks, token issuance and identity resolution.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    keys: JwtKeys,
    policy: PasswordPolicy,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, config: &AppConfig) -> Self {
        Self {
            users,
            keys: JwtKeys::from_config(&config.jwt),
            policy: PasswordPolicy {
                min_length: config.min_password_length,
            },
        }
    }

    /// Builds the timing-equalizer hash on a blocking thread so the first
    /// unknown-username login does not pay for it.
    pub async fn warm_up(&self) -> anyhow::Result<()> {
        tokio::task::spawn_blocking(|| lazy_static::initialize(&DUMMY_HASH))
            .await
            .context("dummy hash task failed")
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    /// Validates in order: username format, email format, password strength,
    /// username then email uniqueness. The store's constraint still decides
    /// races between the pre-checks and the insert.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        validate_username(username)?;
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(AuthError::InvalidEmailFormat);
        }
        validate_strength(password, &self.policy)?;

        if self.users.find_by_username(username).await?.is_some() {
            return Err(AuthError::DuplicateUsername);
        }
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash = hash_blocking(password.to_owned()).await?;
        let user = self
            .users
            .create(NewUser {
                username: username.to_owned(),
                email,
                password_hash,
            })
            .await?;

        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// Unknown usernames and wrong passwords fail identically.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let Some(user) = self.users.find_by_username(username).await? else {
            verify_dummy_blocking(password.to_owned()).await;
            warn!(target: SECURITY, event = "LOGIN_FAILED", username, reason = "unknown_user");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_blocking(password.to_owned(), user.password_hash.clone()).await? {
            warn!(
                target: SECURITY,
                event = "LOGIN_FAILED",
                username,
                user_id = %user.id,
                reason = "wrong_password"
            );
            return Err(AuthError::InvalidCredentials);
        }

        info!(user_id = %user.id, username = %user.username, "user authenticated");
        Ok(user)
    }

    pub fn issue_token(&self, user: &User) -> Result<IssuedToken, AuthError> {
        let access_token = self.keys.issue_access(&user.username)?;
        Ok(IssuedToken {
            access_token,
            expires_in: self.keys.ttl().whole_seconds(),
        })
    }

    /// Turns a bearer token into the caller's identity. Every failure after
    /// "no token at all" surfaces as the same `InvalidToken`; the logs keep
    /// the actual reason.
    pub async fn resolve(&self, bearer: Option<&str>) -> Result<Identity, AuthError> {
        let token = bearer.ok_or(AuthError::MissingToken)?;

        let claims = self.keys.verify(token).map_err(|e| {
            warn!(target: SECURITY, event = "INVALID_TOKEN", reason = e.reason());
            AuthError::InvalidToken
        })?;

        let user = self
            .users
            .find_by_username(&claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(target: SECURITY, event = "SUBJECT_NOT_FOUND", subject = %claims.sub);
                AuthError::InvalidToken
            })?;

        debug!(user_id = %user.id, "identity resolved");
        Ok(Identity::new(user))
    }
}

async fn hash_blocking(plain: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .context("password hashing task failed")?
}

/// Dereferences the lazy dummy hash inside the blocking task, never on the
/// executor.
async fn verify_dummy_blocking(plain: String) {
    let _ = tokio::task::spawn_blocking(move || {
        if let Some(dummy) = DUMMY_HASH.as_ref() {
            let _ = verify_password(&plain, dummy);
        }
    })
    .await;
}

async fn verify_blocking(plain: String, hash: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
        .await
        .context("password verification task failed")?
}
