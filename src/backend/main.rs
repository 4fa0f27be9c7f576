/**
 * XFScene Server Entry Point
 *
 * Initializes tracing, loads configuration from the environment, runs
 * recovery boot, and serves the WebSocket + metrics endpoints until
 * ctrl-c. Shutdown drains every session actor and writes final snapshots
 * before the process exits.
 */

use xfscene::backend::server::config::ServerConfig;
use xfscene::backend::server::init::create_app;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(env_filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = ServerConfig::from_env();
    let port = config.port;
    tracing::info!(
        port,
        data_dir = %config.data_dir.display(),
        max_sessions = config.max_sessions,
        max_users_per_session = config.max_users_per_session,
        "starting xfscene server"
    );

    let (app, state) = create_app(config).await?;

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    // Drain every actor and write final snapshots before exiting.
    state.registry.shutdown_all().await;
    tracing::info!("all sessions shut down; exiting");

    Ok(())
}
