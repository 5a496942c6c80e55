use ragchat::{app, config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "ragchat=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    // Fails fast on a missing or empty JWT_SECRET.
    let config = AppConfig::from_env()?;
    tracing::info!(
        store = ?config.store,
        ttl_minutes = config.jwt.ttl_minutes,
        verify_user_on_request = config.verify_user_on_request,
        "configuration loaded"
    );

    let state = AppState::init(config).await?;
    app::serve(app::build_app(state)).await
}
