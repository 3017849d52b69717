// Ensemble server entry point.
//
// Startup sequence:
// 1. Initialize tracing
// 2. Load config (copying defaults on first run)
// 3. Load the scene/character catalog
// 4. Build the upstream relay client
// 5. Serve until Ctrl+C / SIGTERM

use std::net::SocketAddr;

use anyhow::Context;
use ensemble_llm::RelayClient;
use ensemble_server::config;
use ensemble_server::state::AppState;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Ensemble server starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        upstream = %config.upstream.url,
        model = %config.upstream.model,
        api_key_configured = config.credentials.api_key.as_deref().is_some_and(|k| !k.is_empty()),
        "Config loaded"
    );

    // 3. Load catalog
    let catalog = config.load_catalog().context("failed to load catalog")?;
    info!(
        scenes = catalog.all_scenes().count(),
        characters = catalog.all_characters().count(),
        "Catalog loaded"
    );

    // 4. Relay client
    let relay = RelayClient::new(config.upstream_config())
        .context("failed to build upstream HTTP client")?;

    let state = AppState::new(catalog, relay);
    let app = ensemble_server::build_app(state, &config.server.cors_origins);

    // 5. Serve
    let host = config
        .server
        .host
        .parse()
        .with_context(|| format!("invalid server.host {:?}", config.server.host))?;
    let addr = SocketAddr::new(host, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Ensemble server shut down cleanly");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("ensemble_server=info,ensemble_llm=info,tower_http=info,warn")
        }))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}

/// Resolve on SIGINT (Ctrl+C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
