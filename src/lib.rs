// src/lib.rs
// Library surface shared by the Shuttle binary and the integration tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod http;
pub mod llm;
pub mod metrics;
pub mod notify;
pub mod prompt;
pub mod quota;
pub mod sheet;
pub mod store;

pub use crate::api::{router, AppState};
pub use crate::config::AppConfig;
pub use crate::error::AppError;

use axum::Router;

/// Full application: config from file + env, production wiring, `/metrics` merged in.
pub async fn app() -> anyhow::Result<Router> {
    let config = AppConfig::load()?;
    let metrics = crate::metrics::Metrics::init(config.cache.generate_ttl_ms)?;
    let state = AppState::from_config(config).await?;
    tracing::info!(
        generator = state.generator.name(),
        webhooks = state.notifier.len(),
        "review generator ready"
    );
    Ok(router(state).merge(metrics.router()))
}
