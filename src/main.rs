use std::sync::Arc;

use headscale_admin::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    supabase::SupabaseClient,
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Entry point: configuration, logging, backend client, session store, HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast)
    dotenv::dotenv().ok();
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };

    // 2. Logging: pretty locally, JSON when deployed.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "headscale_admin=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "console stopped with an error");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> headscale_admin::Result<()> {
    // 3. Backend client, with the session of the previous run if one was persisted.
    let client = Arc::new(SupabaseClient::new(&config)?);
    match client.restore_session().await {
        Ok(true) => tracing::info!("previous session restored"),
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, "could not restore the persisted session"),
    }

    // 4. Session store: resolves the restored session (if any) and starts listening.
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState::new(client, config);
    let session = app_state.session.clone();
    session.initialize().await?;

    // 5. Router and server.
    let app = create_router(app_state);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Listening on {bind_addr}");
    tracing::info!("API Documentation (Swagger UI) available at: http://{bind_addr}/swagger-ui");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "could not listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown signal received");
        })
        .await;

    session.shutdown().await;
    served.map_err(Into::into)
}
