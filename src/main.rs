use anyhow::Context;
use todo_api::{app, config::AppConfig, state::AppState, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(environment = ?config.environment, jwt = ?config.jwt, "configuration loaded");
    let addr = config.bind_addr();

    let state = AppState::init(config).await?;

    if let Some(db) = &state.db {
        sqlx::migrate!("./migrations")
            .run(db)
            .await
            .context("database migration failed")?;
        tracing::info!("migrations applied");
    }

    app::serve(app::build_app(state), &addr).await
}
