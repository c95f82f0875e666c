use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::{
    auth::{
        repo::{MemoryUserStore, PgUserStore, UserStore},
        AuthService,
    },
    config::AppConfig,
    security::{RateLimiter, SlidingWindowLimiter},
    todos::{MemoryTodoStore, PgTodoStore, TodoStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
    pub todos: Arc<dyn TodoStore>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    /// Present when running against Postgres; used for migrations.
    pub db: Option<PgPool>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let users: Arc<dyn UserStore>;
        let todos: Arc<dyn TodoStore>;
        let db = match &config.database_url {
            Some(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to postgres")?;
                info!("connected to postgres");
                users = Arc::new(PgUserStore::new(pool.clone()));
                todos = Arc::new(PgTodoStore::new(pool.clone()));
                Some(pool)
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory stores, data is lost on exit");
                users = Arc::new(MemoryUserStore::new());
                todos = Arc::new(MemoryTodoStore::new());
                None
            }
        };

        let rate_limiter = Arc::new(SlidingWindowLimiter::per_minute(
            config.rate_limit_per_minute,
        ));
        rate_limiter.spawn_cleanup();

        let state = Self::from_parts(config, users, todos, rate_limiter, db);
        state.auth.warm_up().await?;
        Ok(state)
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        todos: Arc<dyn TodoStore>,
        rate_limiter: Arc<dyn RateLimiter>,
        db: Option<PgPool>,
    ) -> Self {
        let auth = Arc::new(AuthService::new(users, &config));
        Self {
            config,
            auth,
            todos,
            rate_limiter,
            db,
        }
    }

    /// In-memory state for router tests.
    #[cfg(test)]
    pub(crate) fn fake() -> Self {
        Self::fake_with_rate_limit(10_000)
    }

    #[cfg(test)]
    pub(crate) fn fake_with_rate_limit(per_minute: u32) -> Self {
        Self::from_parts(
            Arc::new(test_config()),
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryTodoStore::new()),
            Arc::new(SlidingWindowLimiter::per_minute(per_minute)),
            None,
        )
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    use crate::config::{Environment, JwtConfig};

    AppConfig {
        environment: Environment::Development,
        host: "127.0.0.1".into(),
        port: 0,
        database_url: None,
        jwt: JwtConfig {
            secret: "test-secret-0123456789abcdef0123456789abcdef".into(),
            algorithm: jsonwebtoken::Algorithm::HS256,
            ttl_minutes: 5,
        },
        min_password_length: 8,
        rate_limit_per_minute: 10_000,
        trust_proxy_headers: false,
        cors_origins: Vec::new(),
    }
}
