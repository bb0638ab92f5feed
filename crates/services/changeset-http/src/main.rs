//! HTTP/SSE binary: wires `AppConfig` to a `WorkflowEngine` and hands the
//! resulting `AppState` to `changeset_server::router`. The binary itself
//! owns nothing but process plumbing — startup, shutdown, and the listener.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use changeset_common::config::AppConfig;
use changeset_core::git_collab::Git2CommitLookup;
use changeset_core::lifecycle::WorkflowEngine;
use changeset_core::pagination::Pagination;
use changeset_core::template::DefaultTemplateRenderer;
use changeset_core::test_collab::NoTestSummary;
use changeset_server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    changeset_common::tracing::setup_tracing(true);

    let config = AppConfig::from_env();
    std::fs::create_dir_all(&config.working_directory)
        .with_context(|| format!("creating working directory {}", config.working_directory.display()))?;

    if config.tls.is_some() {
        tracing::warn!("TLS config present but this binary terminates plaintext HTTP; put a TLS-terminating proxy in front of it");
    }

    let pagination = Pagination {
        token_ttl_secs: (config.pagination.token_ttl_hours as i64) * 3600,
        signing_key: config.pagination.signing_key.as_ref().map(|k| k.as_bytes().to_vec()),
    };

    let engine = Arc::new(WorkflowEngine {
        root: config.working_directory.clone(),
        api_version: "1.0".to_string(),
        template_renderer: Arc::new(DefaultTemplateRenderer::default()),
        commit_lookup: Arc::new(Git2CommitLookup),
        test_summary: Arc::new(NoTestSummary),
        pagination,
    });

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.host, config.port))?;

    let state = AppState::new(engine, config);
    state.memory.spawn_sampler();

    let app = changeset_server::router(state);

    tracing::info!(%addr, "changeset-http listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("http server exited")?;

    Ok(())
}
