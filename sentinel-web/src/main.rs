/**
 * SENTINEL WEB - Point d'entrée du serveur de contrôle local
 *
 * RÔLE : Charge la configuration et le token, câble le store fichier et le
 * dispatcher d'actions, puis sert l'API HTTP jusqu'à Ctrl-C / SIGTERM.
 *
 * UTILITÉ : Dashboard et remédiation à distance pour l'agent OPS Sentinel.
 */

use anyhow::Context;
use sentinel_web::{build_app, AppState, Credential, WebConfig};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sentinel_web=info")))
        .init();

    let config = WebConfig::load().context("failed to load configuration")?;
    let credential = Credential::load(&config.token_file);
    let addr = SocketAddr::new(config.bind, config.port);
    info!(auth = credential.is_enabled(), "credential loaded");

    let app_state = AppState::new(config, credential).context("failed to build application state")?;
    let app = build_app(app_state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("sentinel web server listening on http://{addr}");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    info!("shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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
}
