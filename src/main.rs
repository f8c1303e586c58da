//! Ferry Server
//!
//! HTTP gateway for an interactive platform login and for relaying large
//! objects to and from platform containers.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ferry_server::auth::AuthPhase;
use ferry_server::config::Config;
use ferry_server::platform::{LocalPlatform, LocalPlatformOptions};
use ferry_server::routes;
use ferry_server::session;
use ferry_server::state::AppState;
use ferry_server::supervisor::ConnectionSupervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("invalid configuration")?;

    tracing::info!("Starting Ferry Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Platform root: {}", config.platform.root.display());
    tracing::info!("Staging dir: {}", config.transfer.staging_dir.display());

    if let Some(encoded) = &config.account.session_base64 {
        session::restore_from_base64(&config.account.session_path, encoded)
            .await
            .context("failed to restore session from SESSION_BASE64")?;
    }

    // Platform backend and its containers
    let platform = Arc::new(LocalPlatform::new(LocalPlatformOptions {
        root: config.platform.root.clone(),
        session_path: config.account.session_path.clone(),
        password: config.platform.password.clone(),
        login_code: config.platform.login_code.clone(),
    }));
    for id in config
        .platform
        .containers
        .iter()
        .chain(config.transfer.default_channel.iter())
    {
        platform
            .ensure_container(id)
            .await
            .with_context(|| format!("failed to create container {}", id))?;
    }

    let supervisor = ConnectionSupervisor::new(platform);
    supervisor
        .connect()
        .await
        .context("failed to connect to platform")?;

    let app_state = AppState::new(config.clone(), supervisor.clone());
    app_state
        .pipeline()
        .staging()
        .prepare()
        .await
        .context("failed to prepare staging directory")?;

    // Start the handshake unless a session is already authorized
    match app_state.auth().sync_with_session().await {
        AuthPhase::Authorized => tracing::info!("Platform client authorized and ready"),
        _ => {
            tracing::warn!("Platform client not authorized, sending verification code");
            match app_state.auth().begin_handshake().await {
                Ok(_) => tracing::info!(
                    "Visit http://{}:{}/auth to complete authorization",
                    config.server.host,
                    config.server.port
                ),
                Err(e) => tracing::error!("Failed to start authorization: {}", e),
            }
        }
    }

    let app = routes::router(app_state);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}", config.server.host))?;
    tracing::info!("Ferry Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    supervisor.disconnect().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
