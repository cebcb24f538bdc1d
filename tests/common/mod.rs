// tests/common/mod.rs
//
// Shared builders for router-level tests: in-memory repository, scripted generator,
// static sheet, recording notifier. No sockets, no database, no network.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use async_trait::async_trait;
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`
use uuid::Uuid;

use review_generator::db::{
    ConfirmUpdate, DynRepository, FunnelDay, MemoryRepository, NewReview, ReviewRepository,
    TagFunnelRow, TrackEvent,
};
use review_generator::llm::{DynGenerator, ScriptedGenerator};
use review_generator::notify::{Notifier, NotifierMux, ReviewEvent};
use review_generator::sheet::{DynSheetSource, StaticSheetSource};
use review_generator::{router, AppConfig, AppState};

pub const BODY_LIMIT: usize = 1024 * 1024;

pub const STORE_CSV: &str = "\
StoreID,StoreName,GooglePlaceID,Logo,Hero圖片,top3,top3En,AF
wang01,老王牛肉麵,ChIJ123,https://drive.google.com/file/d/LOGO1/view,/assets/hero.jpg,牛肉麵、小菜,beef noodles;side dishes,slow service
";

pub fn config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.openai.api_key = "sk-test".into();
    cfg
}

pub fn sheet() -> DynSheetSource {
    Arc::new(StaticSheetSource::new(STORE_CSV).with_meta("wang01", "老王牛肉麵", "ChIJ123"))
}

/// Notifier sink that keeps every event it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<ReviewEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<ReviewEvent> {
        self.events.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Handlers dispatch on a spawned task; poll until `n` events arrived or give up.
    pub async fn wait_for(&self, n: usize) -> Vec<ReviewEvent> {
        for _ in 0..100 {
            let seen = self.events();
            if seen.len() >= n {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.events()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, ev: &ReviewEvent) -> anyhow::Result<()> {
        self.events.lock().expect("recorder lock").push(ev.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Repository whose every call fails like an unreachable database.
pub struct FailingRepository;

#[async_trait]
impl ReviewRepository for FailingRepository {
    async fn recent_texts(&self, _: &str, _: u32, _: u32) -> Result<Vec<String>, sqlx::Error> {
        Err(sqlx::Error::PoolTimedOut)
    }

    async fn insert_review(&self, _: &NewReview) -> Result<Uuid, sqlx::Error> {
        Err(sqlx::Error::PoolTimedOut)
    }

    async fn confirm(&self, _: &ConfirmUpdate) -> Result<Option<Uuid>, sqlx::Error> {
        Err(sqlx::Error::PoolTimedOut)
    }

    async fn record_event(&self, _: &TrackEvent) -> Result<(), sqlx::Error> {
        Err(sqlx::Error::PoolTimedOut)
    }

    async fn daily_funnel(&self, _: u32) -> Result<Vec<FunnelDay>, sqlx::Error> {
        Err(sqlx::Error::PoolTimedOut)
    }

    async fn tag_funnel(&self, _: u32, _: Option<&str>) -> Result<Vec<TagFunnelRow>, sqlx::Error> {
        Err(sqlx::Error::PoolTimedOut)
    }
}

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<MemoryRepository>,
    pub generator: Arc<ScriptedGenerator>,
    pub notified: Arc<RecordingNotifier>,
}

pub fn app_with(cfg: AppConfig, generator: ScriptedGenerator) -> TestApp {
    app_with_sheet(cfg, generator, sheet())
}

pub fn app_with_sheet(
    cfg: AppConfig,
    generator: ScriptedGenerator,
    sheet: DynSheetSource,
) -> TestApp {
    let repo = Arc::new(MemoryRepository::new());
    let generator = Arc::new(generator);
    let notified = Arc::new(RecordingNotifier::default());
    let dyn_gen: DynGenerator = generator.clone();
    let mut state = AppState::in_memory(cfg, dyn_gen, sheet)
        .expect("build in-memory state")
        .with_repository(repo.clone());
    state.notifier = NotifierMux::new(vec![notified.clone() as Arc<dyn Notifier>]);
    TestApp {
        router: router(state),
        repo,
        generator,
        notified,
    }
}

/// Router over an arbitrary repository, e.g. [`FailingRepository`].
pub fn app_with_repository(repo: DynRepository) -> Router {
    let generator: DynGenerator = Arc::new(ScriptedGenerator::repeating("湯頭濃郁，麵條很有嚼勁。"));
    let state = AppState::in_memory(config(), generator, sheet())
        .expect("build in-memory state")
        .with_repository(repo);
    router(state)
}

pub fn app() -> TestApp {
    app_with(config(), ScriptedGenerator::repeating("湯頭濃郁，麵條很有嚼勁。"))
}

pub fn post_json(uri: &str, body: &Json) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build POST")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET")
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Json,
    pub text: String,
}

pub async fn send(router: &Router, req: Request<Body>) -> Reply {
    let resp = router.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let text = String::from_utf8(bytes).expect("utf8 body");
    let body = serde_json::from_str(&text).unwrap_or(Json::Null);
    Reply {
        status,
        headers,
        body,
        text,
    }
}
