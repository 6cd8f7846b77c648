use anyhow::{Context, Result};
use face_service::{api, build_state, FaceServiceConfig};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _logging = telemetry::init_with_service("face-service");
    telemetry::metrics::init_metrics();

    let config = FaceServiceConfig::from_env()?;
    info!(
        addr = %config.bind_addr,
        images_dir = %config.images_dir.display(),
        layout = %config.store_layout,
        access_mode = %config.access_mode,
        backend = %config.backend,
        tolerance = config.recognition.tolerance,
        policy = %config.recognition.match_policy,
        "face-service configuration loaded"
    );

    let state = build_state(&config).await?;
    let app = api::router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "face-service listening");

    axum::serve(listener, app)
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
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}
