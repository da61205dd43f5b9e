//! ratsd: attestation evidence composition daemon
//!
//! Loads sub-attester plugins, then answers `POST /ratsd/chares` with an EAT
//! envelope wrapping a CMW collection of every selected attester's evidence.

pub mod auth;
pub mod compositor;
pub mod config;
pub mod http;
pub mod mock;
pub mod problem;
pub mod tls;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use ratsd_plugin::PluginManager;
use tokio::net::TcpListener;

use crate::compositor::Compositor;
use crate::config::{Protocol, RatsdConfig};
use crate::http::AppState;

/// Assemble the router for a configured daemon.
pub fn app(config: &RatsdConfig, manager: Arc<dyn PluginManager>) -> Result<Router> {
    let compositor = Compositor::new(manager)
        .with_list_options(config.list_options)
        .with_fan_out(config.fan_out)
        .with_request_timeout(config.request_timeout());
    let authorizer = auth::build_authorizer(&config.auth).context("failed to set up auth")?;

    Ok(http::router(Arc::new(AppState {
        compositor,
        authorizer,
    })))
}

/// Serve until SIGINT/SIGTERM, then close the plugins.
pub async fn serve(config: RatsdConfig, manager: Arc<dyn PluginManager>) -> Result<()> {
    let router = app(&config, Arc::clone(&manager))?;

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    let local_addr = listener.local_addr()?;

    let served = match config.protocol {
        Protocol::Http => {
            tracing::info!(%local_addr, "ratsd listening (http)");
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await
        }
        Protocol::Https => {
            let (Some(cert), Some(key)) = (config.cert.as_deref(), config.cert_key.as_deref())
            else {
                anyhow::bail!("https requires cert and cert_key");
            };
            let listener = tls::TlsListener::new(listener, cert, key)
                .context("failed to configure TLS")?;
            tracing::info!(%local_addr, "ratsd listening (https)");
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await
        }
    };

    tracing::info!("shutting down, closing plugins");
    if let Err(e) = manager.close().await {
        tracing::warn!(error = %e, "failed to close plugins");
    }

    served.context("server error")
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
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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
