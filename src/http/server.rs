use std::fs;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};

use super::{AppState, create_router};
use crate::config::ToolgateConfig;

/// Bind, serve until Ctrl+C or SIGTERM, then drain in-flight requests.
pub async fn serve(cfg: &ToolgateConfig) -> anyhow::Result<()> {
    let addr = cfg.bind_addr()?;
    let output_root = cfg.output_dir();
    fs::create_dir_all(&output_root)
        .with_context(|| format!("create output directory {}", output_root.display()))?;

    let state = AppState::from_config(cfg);
    let report = state.tools.report();
    for (name, availability) in [
        ("jadx", &report.jadx),
        ("ghidra", &report.ghidra),
        ("interceptor", &report.interceptor),
        ("llm", &report.llm),
    ] {
        if !availability.available {
            warn!(
                tool = name,
                error = availability.error.as_deref().unwrap_or(""),
                "tool not available; its routes will answer 503"
            );
        }
    }

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(
        %addr,
        output_dir = %output_root.display(),
        workers = cfg.workers,
        queue_depth = cfg.queue_depth,
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::select! {
                _ = signal::ctrl_c() => info!("received Ctrl+C"),
                _ = wait_for_sigterm() => info!("received SIGTERM"),
            }
            info!("shutting down");
        })
        .await
        .context("http server")?;

    info!("server stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("SIGTERM handler unavailable: {e}");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
