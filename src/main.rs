//! simple-http-server binary.
//!
//! Serves one or more local directories over HTTP and/or HTTPS, each mapped
//! under a URI prefix, with optional Basic auth, directory listings and
//! multipart uploads. The entry point merges flags with the YAML config,
//! builds the Axum router and runs the listeners until a shutdown signal.

mod access;
mod atomic;
mod auth;
mod config;
mod error;
mod etag;
mod files;
mod listing;
mod logging;
mod mime;
mod mounts;
mod routes;
mod static_files;
mod tls;
mod upload;

use anyhow::{Context, Result};
use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use crate::access::AccessLog;
use crate::config::{Args, ServerConfig, VERSION_BANNER, parse_listen_addr};
use crate::mounts::MountTable;

shadow!(build);

/// Starts the server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ServerConfig::load(&args)?;

    let (diagnostic_file, access_file) = match &config.log_file {
        Some(path) => {
            let file = logging::open_log_file(path)?;
            let access_file = file
                .try_clone()
                .with_context(|| format!("failed to share log file {}", path.display()))?;
            (Some(file), Some(access_file))
        }
        None => (None, None),
    };
    logging::init_logging(diagnostic_file);
    info!("{VERSION_BANNER}");

    let mounts = Arc::new(MountTable::from_config(&config.paths));
    let http_addr = config.addr.as_deref().map(parse_listen_addr).transpose()?;
    let https_addr = config
        .addr_tls
        .as_deref()
        .map(parse_listen_addr)
        .transpose()?;
    log_settings(&config);

    let tls_config = match https_addr {
        Some(addr) => Some(tls::build_rustls_config(&config, addr.ip()).await?),
        None => None,
    };

    let access = Arc::new(AccessLog::new(config.enable_color, access_file));
    let config = Arc::new(config);
    let app = routes::build_router(config, mounts, access);
    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone()));

    let http_server = async {
        let Some(addr) = http_addr else {
            return std::future::pending::<Result<()>>().await;
        };
        info!("Listening on http://{addr}");
        axum_server::bind(addr)
            .handle(handle.clone())
            .serve(routes::into_service(app.clone()))
            .await
            .with_context(|| format!("http listener on {addr} failed"))
    };
    let https_server = async {
        let (Some(addr), Some(tls_config)) = (https_addr, tls_config) else {
            return std::future::pending::<Result<()>>().await;
        };
        info!("Listening on https://{addr}");
        axum_server::bind_rustls(addr, tls_config)
            .handle(handle.clone())
            .serve(routes::into_service(app.clone()))
            .await
            .with_context(|| format!("https listener on {addr} failed"))
    };

    tokio::select! {
        result = http_server => result?,
        result = https_server => result?,
    }

    Ok(())
}

fn log_settings(config: &ServerConfig) {
    info!(
        addr = config.addr.as_deref().unwrap_or("-"),
        addrtls = config.addr_tls.as_deref().unwrap_or("-"),
        "listen addresses"
    );
    info!(
        basic_auth = config.basic_auth_enabled(),
        compress = config.compress,
        verbose = config.verbose,
        color = config.enable_color,
        upload = config.enable_upload,
        "settings"
    );
    info!(
        fallback = config.fallback.as_deref().unwrap_or("-"),
        index_names = ?config.index_names,
        max_request_body_size = ?config.body_limit(),
        "request handling"
    );
    if config.addr_tls.is_none() || !config.basic_auth_enabled() {
        warn!("running without TLS or basic auth is NOT SAFE on an untrusted network");
    }
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("failed to install SIGTERM handler: {err}");
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

    info!("Received termination signal, shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
