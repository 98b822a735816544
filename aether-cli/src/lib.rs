//! Aether server library: HTTP API, socket transport, configuration, and CLI.

pub mod api;
pub mod cli;
pub mod config;
pub mod handlers;

use anyhow::Result;
use tokio::net::TcpListener;

/// Check if a port is available on `host`
pub async fn is_port_available(host: &str, port: u16) -> bool {
    TcpListener::bind((host, port)).await.is_ok()
}

/// Find an available port starting from the preferred port
pub async fn find_available_port(host: &str, preferred_port: u16) -> Result<u16> {
    if is_port_available(host, preferred_port).await {
        return Ok(preferred_port);
    }

    // If preferred port is taken, try nearby ports
    for offset in 1..=100 {
        let Some(port) = preferred_port.checked_add(offset) else {
            break;
        };
        if is_port_available(host, port).await {
            return Ok(port);
        }
    }

    Err(anyhow::anyhow!(
        "No available ports found near {}",
        preferred_port
    ))
}
