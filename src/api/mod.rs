// src/api/mod.rs
//! HTTP surface: shared state, router and handlers.

pub mod confirm;
pub mod funnel;
pub mod generate;
pub mod lenient;
pub mod store;
pub mod track;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;

use crate::cache::TtlCache;
use crate::config::AppConfig;
use crate::db::{DynRepository, MemoryRepository, PgRepository};
use crate::dedup::{build_oracle, DynOracle};
use crate::http::{cors_layer, method_not_allowed, no_content};
use crate::llm::{build_generator, DynGenerator};
use crate::notify::NotifierMux;
use crate::quota::DailyQuota;
use crate::sheet::{CachedSheetSource, DynSheetSource, HttpSheetSource};
use crate::store::PlacesClient;

pub use generate::GenerateResponse;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repo: DynRepository,
    pub generator: DynGenerator,
    pub oracle: DynOracle,
    pub sheet: DynSheetSource,
    pub places: PlacesClient,
    pub quota: DailyQuota,
    pub generate_cache: Arc<TtlCache<String, GenerateResponse>>,
    pub notifier: NotifierMux,
}

impl AppState {
    /// Production wiring. Postgres when a database url is configured, in-memory otherwise.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let (repo, pool): (DynRepository, Option<PgPool>) = if config.database.url.is_some() {
            let pg = PgRepository::connect(&config.database).await?;
            let pool = pg.pool().clone();
            (Arc::new(pg), Some(pool))
        } else {
            tracing::warn!("no database url; reviews are kept in memory only");
            (Arc::new(MemoryRepository::new()), None)
        };

        let sheet: DynSheetSource = Arc::new(CachedSheetSource::new(
            HttpSheetSource::new(config.sheet.clone())?,
            config.cache.store_ttl_ms,
        ));

        Ok(Self {
            generator: build_generator(&config)?,
            oracle: build_oracle(&config.dedup, repo.clone(), pool.clone()),
            places: PlacesClient::new(&config.places)?,
            quota: DailyQuota::from_settings(&config.quota, pool),
            generate_cache: Arc::new(TtlCache::from_millis(config.cache.generate_ttl_ms)),
            notifier: NotifierMux::from_config(&config.webhooks)?,
            sheet,
            repo,
            config: Arc::new(config),
        })
    }

    /// Everything in-process: memory repository, levenshtein oracle, memory quota, no webhooks.
    pub fn in_memory(
        config: AppConfig,
        generator: DynGenerator,
        sheet: DynSheetSource,
    ) -> anyhow::Result<Self> {
        let repo: DynRepository = Arc::new(MemoryRepository::new());
        Ok(Self {
            oracle: build_oracle(&config.dedup, repo.clone(), None),
            places: PlacesClient::new(&config.places)?,
            quota: DailyQuota::from_settings(&config.quota, None),
            generate_cache: Arc::new(TtlCache::from_millis(config.cache.generate_ttl_ms)),
            notifier: NotifierMux::default(),
            generator,
            sheet,
            repo,
            config: Arc::new(config),
        })
    }

    /// Same state backed by the given repository (oracle rebuilt on top of it).
    pub fn with_repository(mut self, repo: DynRepository) -> Self {
        self.oracle = build_oracle(&self.config.dedup, repo.clone(), None);
        self.repo = repo;
        self
    }
}

/// All routes; unsupported methods get a JSON 405, bare OPTIONS a 204.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/api/generate",
            post(generate::generate)
                .options(no_content)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/confirm",
            post(confirm::confirm)
                .options(no_content)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/funnel",
            get(funnel::daily)
                .options(no_content)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/tag_funnel",
            get(funnel::by_tag)
                .options(no_content)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/store",
            get(store::store)
                .options(no_content)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/track",
            post(track::track)
                .options(no_content)
                .fallback(method_not_allowed),
        )
        .layer(cors_layer())
        .with_state(state)
}
