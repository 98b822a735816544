//! Server startup and lifecycle

use std::future::IntoFuture;
use std::sync::Arc;

use aether_core::ComputeGateway;
use anyhow::{Context, Result, anyhow};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::api::{ApiState, create_app};
use crate::config::AetherConfig;
use crate::find_available_port;

/// Start the server described by `config`, with optional command-line
/// overrides for the bind address.
///
/// # Errors
///
/// Returns error if no port can be bound, the server fails, or the
/// reconstruction backend fails to initialize.
pub async fn start_server(
    config: &AetherConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let preferred_port = port.unwrap_or(config.server.port);

    let backend = config.reconstruction.build_backend();
    let gateway = Arc::new(ComputeGateway::new(backend));
    let state = ApiState::new(gateway, config.session.to_session_config());

    let port = find_available_port(&host, preferred_port)
        .await
        .context("Failed to find available port")?;
    if port != preferred_port {
        warn!(
            "Port {} was occupied, using port {} instead",
            preferred_port, port
        );
    }

    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .context("Failed to bind to address")?;

    println!();
    println!("Aether reconstruction server");
    println!("Listening on:     http://{host}:{port}");
    println!("Health endpoint:  http://{host}:{port}/health");
    println!("Reconstruction:   ws://{host}:{port}/ws/reconstruct");
    println!();

    serve(listener, state).await
}

/// Serve the API on `listener` while the compute gateway initializes in the
/// background.
///
/// Requests are accepted immediately; `/ready` reports 503 and sessions get
/// a not-ready error until initialization finishes. An initialization
/// failure stops the server.
///
/// # Errors
///
/// Returns error if the server fails or the backend cannot be initialized.
pub async fn serve(listener: TcpListener, state: ApiState) -> Result<()> {
    let gateway = Arc::clone(&state.gateway);
    let addr = listener.local_addr()?;
    let app = create_app(state);

    let mut init = tokio::spawn(async move { gateway.initialize_offloaded().await });
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();
    tokio::pin!(server);

    info!(%addr, "Aether server started");

    let mut initializing = true;
    loop {
        tokio::select! {
            result = &mut server => {
                result.context("Server error")?;
                info!("Server shut down");
                return Ok(());
            }
            outcome = &mut init, if initializing => {
                initializing = false;
                match outcome {
                    Ok(Ok(())) => info!("Reconstruction service ready"),
                    Ok(Err(e)) => {
                        error!("Reconstruction service failed to initialize: {e}");
                        return Err(anyhow!(e).context("Startup aborted"));
                    }
                    Err(e) => {
                        return Err(anyhow!("Initialization task failed: {e}"));
                    }
                }
            }
        }
    }
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
