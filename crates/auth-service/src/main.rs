use anyhow::{Context, Result};
use auth_service::{AuthConfig, AuthService, AuthState, SqliteUserRepository};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _logging = telemetry::init_with_service("auth-service");
    telemetry::metrics::init_metrics();

    let config = AuthConfig::from_env()?;
    let bind_addr = config.bind_addr;

    let repository = SqliteUserRepository::connect(&config.database_url)
        .await
        .context("failed to open user store")?;
    let service = Arc::new(AuthService::new(Arc::new(repository), config));
    let state = AuthState::new(service);

    let app = auth_service::routes::router(state).layer(TraceLayer::new_for_http());
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    info!(addr = %bind_addr, "auth-service listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
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
                error!(error = %e, "failed to install SIGTERM handler");
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

    info!("signal received, starting graceful shutdown");
}
