use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{LoginRequest, PublicUser, RegisterRequest, TokenResponse},
        extractors::AuthUser,
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload), fields(username = %payload.username))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>), AppError> {
    let user = state
        .auth
        .register(&payload.username, &payload.email, &payload.password)
        .await?;
    Ok((StatusCode::CREATED, Json(PublicUser::from(user))))
}

#[instrument(skip(state, payload), fields(username = %payload.username))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let user = state
        .auth
        .authenticate(&payload.username, &payload.password)
        .await?;
    let issued = state.auth.issue_token(&user)?;

    info!(user_id = %user.id, "access token issued");
    Ok(Json(TokenResponse {
        access_token: issued.access_token,
        token_type: "bearer",
        expires_in: issued.expires_in,
    }))
}

#[instrument(skip_all, fields(user_id = %identity.id()))]
pub async fn get_me(AuthUser(identity): AuthUser) -> Json<PublicUser> {
    Json(PublicUser::from(identity.user().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    #[test]
    fn public_user_serialization_has_no_hash() {
        let response = PublicUser {
            id: uuid::Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            created_at: OffsetDateTime::now_utc(),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["username"], "alice");
        assert_eq!(json["email"], "alice@example.com");
        assert!(json.get("id").is_some());
        assert!(json.get("created_at").is_some());
        assert!(json.get("password_hash").is_none());
        assert!(json.get("password").is_none());
    }
}
