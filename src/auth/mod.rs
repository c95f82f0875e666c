use crate::state::AppState;
use axum::Router;

pub mod claims;
pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod validation;

pub use extractors::AuthUser;
pub use services::{AuthError, AuthService, Identity};

/// Public `/register` and `/login`. Kept separate from [`me_router`] so the
/// rate limiter can wrap only the credential endpoints.
pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}

pub fn me_router() -> Router<AppState> {
    handlers::me_routes()
}
