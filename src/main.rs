use anyhow::Context;
use recipe_service::{config::Config, create_app, create_state, init_tracing};
use std::net::SocketAddr;
use tokio::{net::TcpListener, signal};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config.log_level);

    info!(data_dir = %config.data_dir.display(), media_root = %config.media_root.display(), "Opening stores");
    let state = create_state(config.clone())?;
    let app = create_app(state);

    let addr: SocketAddr = config.server_addr().parse()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!(addr = %addr, "Recipe service listening");
    info!("POST /api/user/create, /api/user/token; GET|PUT|PATCH /api/user/me");
    info!("GET|POST /api/recipe/tags, /api/recipe/ingredients, /api/recipe/recipes");
    info!("GET|PUT|PATCH|DELETE /api/recipe/recipes/:id; POST /api/recipe/recipes/:id/upload-image");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
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
