// src/sheet/mod.rs
//! Store data lives in a Google Sheet. Two read paths:
//! * full CSV export of the profile worksheet (store endpoint),
//! * a one-row GViz query against the `stores` worksheet (generator: display name + place id).

pub mod gviz;
pub mod table;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::cache::TtlCache;
use crate::config::SheetSettings;

pub use table::{find_store_row, parse_rows, SheetRow};

/// Display name + Google place id for one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreMeta {
    pub name: String,
    pub place_id: String,
}

impl StoreMeta {
    pub fn fallback(store_id: &str) -> Self {
        Self {
            name: store_id.to_string(),
            place_id: String::new(),
        }
    }
}

#[async_trait]
pub trait SheetSource: Send + Sync {
    /// Raw CSV export of the store profile worksheet.
    async fn fetch_csv(&self) -> Result<Arc<String>>;
    /// Name/place id from the `stores` worksheet; falls back to the id when unknown.
    async fn lookup_store_meta(&self, store_id: &str) -> Result<StoreMeta>;
}

pub type DynSheetSource = Arc<dyn SheetSource>;

pub struct HttpSheetSource {
    http: reqwest::Client,
    settings: SheetSettings,
}

impl HttpSheetSource {
    pub fn new(settings: SheetSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("review-generator/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, settings })
    }

    fn csv_url(&self) -> Result<String> {
        if let Some(url) = self.settings.csv_url.as_deref() {
            return Ok(url.to_string());
        }
        let id = self
            .settings
            .sheet_id
            .as_deref()
            .ok_or_else(|| anyhow!("Missing SHEET_CSV_URL or SHEET_ID"))?;
        Ok(format!(
            "{}/spreadsheets/d/{}/gviz/tq?tqx=out:csv&sheet={}",
            self.settings.docs_base_url,
            id,
            urlencoding::encode(&self.settings.sheet_name)
        ))
    }
}

#[async_trait]
impl SheetSource for HttpSheetSource {
    async fn fetch_csv(&self) -> Result<Arc<String>> {
        let url = self.csv_url()?;
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            bail!("Fetch sheet CSV failed: {}", status.as_u16());
        }
        Ok(Arc::new(resp.text().await?))
    }

    async fn lookup_store_meta(&self, store_id: &str) -> Result<StoreMeta> {
        let Some(sheet_id) = self.settings.sheet_id.as_deref() else {
            return Ok(StoreMeta::fallback(store_id));
        };

        let needle = gviz::sanitize_literal(&store_id.to_lowercase());
        let tq = format!("select A,B,C where lower(A)='{needle}' limit 1");
        let url = format!(
            "{}/spreadsheets/d/{}/gviz/tq?sheet={}&tq={}",
            self.settings.docs_base_url,
            sheet_id,
            urlencoding::encode(&self.settings.meta_sheet_name),
            urlencoding::encode(&tq)
        );

        let raw = self.http.get(&url).send().await?.text().await?;
        let table = gviz::unwrap_response(&raw)?;
        Ok(meta_from_cells(store_id, gviz::first_row_cells(&table)))
    }
}

fn meta_from_cells(store_id: &str, cells: Option<Vec<String>>) -> StoreMeta {
    let Some(cells) = cells else {
        return StoreMeta::fallback(store_id);
    };
    let name = cells.get(1).map(|s| s.trim()).unwrap_or("");
    let place_id = cells.get(2).map(|s| s.trim()).unwrap_or("");
    StoreMeta {
        name: if name.is_empty() {
            store_id.to_string()
        } else {
            name.to_string()
        },
        place_id: place_id.to_string(),
    }
}

/// Wraps any source and keeps the CSV export for a short TTL. Meta lookups pass through.
pub struct CachedSheetSource<S: SheetSource> {
    inner: S,
    csv: TtlCache<(), Arc<String>>,
}

impl<S: SheetSource> CachedSheetSource<S> {
    pub fn new(inner: S, ttl_ms: u64) -> Self {
        Self {
            inner,
            csv: TtlCache::from_millis(ttl_ms),
        }
    }
}

#[async_trait]
impl<S: SheetSource> SheetSource for CachedSheetSource<S> {
    async fn fetch_csv(&self) -> Result<Arc<String>> {
        if let Some(hit) = self.csv.get(&()) {
            return Ok(hit);
        }
        let fresh = self.inner.fetch_csv().await?;
        self.csv.insert((), fresh.clone());
        Ok(fresh)
    }

    async fn lookup_store_meta(&self, store_id: &str) -> Result<StoreMeta> {
        self.inner.lookup_store_meta(store_id).await
    }
}

/// In-memory sheet for tests and local runs without Google access.
#[derive(Debug, Default)]
pub struct StaticSheetSource {
    csv: Option<String>,
    meta: HashMap<String, StoreMeta>,
}

impl StaticSheetSource {
    pub fn new(csv: impl Into<String>) -> Self {
        Self {
            csv: Some(csv.into()),
            meta: HashMap::new(),
        }
    }

    /// No CSV configured: `fetch_csv` fails like an unconfigured HTTP source.
    pub fn unconfigured() -> Self {
        Self::default()
    }

    pub fn with_meta(mut self, store_id: &str, name: &str, place_id: &str) -> Self {
        self.meta.insert(
            store_id.to_lowercase(),
            StoreMeta {
                name: name.to_string(),
                place_id: place_id.to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl SheetSource for StaticSheetSource {
    async fn fetch_csv(&self) -> Result<Arc<String>> {
        self.csv
            .clone()
            .map(Arc::new)
            .ok_or_else(|| anyhow!("Missing SHEET_CSV_URL or SHEET_ID"))
    }

    async fn lookup_store_meta(&self, store_id: &str) -> Result<StoreMeta> {
        Ok(self
            .meta
            .get(&store_id.to_lowercase())
            .cloned()
            .unwrap_or_else(|| StoreMeta::fallback(store_id)))
    }
}
