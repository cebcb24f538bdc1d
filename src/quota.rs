// src/quota.rs
//! Per-client daily generation quota.
//!
//! Keys are anonymized client IPs; days are UTC calendar days. Only real generations are
//! counted, cache hits never reach the quota.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;

use crate::config::{QuotaBackend, QuotaSettings};
use crate::error::AppError;
use crate::http::ClientIp;

#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Increment the counter for `(key, day)` and return the new value.
    async fn hit(&self, key: &str, day: NaiveDate) -> anyhow::Result<u32>;
}

// ------------------------------------------------------------
// In-process counter
// ------------------------------------------------------------

/// Counters for the current day only; a new day drops everything from the previous one.
#[derive(Debug, Default)]
pub struct MemoryQuota {
    state: Mutex<DayCounters>,
}

#[derive(Debug, Default)]
struct DayCounters {
    day: Option<NaiveDate>,
    counts: HashMap<String, u32>,
}

impl MemoryQuota {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuotaStore for MemoryQuota {
    async fn hit(&self, key: &str, day: NaiveDate) -> anyhow::Result<u32> {
        let mut g = match self.state.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        if g.day != Some(day) {
            g.day = Some(day);
            g.counts.clear();
        }
        let slot = g.counts.entry(key.to_string()).or_insert(0);
        *slot = slot.saturating_add(1);
        Ok(*slot)
    }
}

// ------------------------------------------------------------
// Postgres counter (shared across instances)
// ------------------------------------------------------------

pub struct PgQuota {
    pool: PgPool,
}

impl PgQuota {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuotaStore for PgQuota {
    async fn hit(&self, key: &str, day: NaiveDate) -> anyhow::Result<u32> {
        let count: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO generate_quota (ip_hash, day, count)
            VALUES ($1, $2, 1)
            ON CONFLICT (ip_hash, day) DO UPDATE SET count = generate_quota.count + 1
            RETURNING count
            "#,
        )
        .bind(key)
        .bind(day)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u32)
    }
}

// ------------------------------------------------------------
// Policy
// ------------------------------------------------------------

#[derive(Clone)]
pub struct DailyQuota {
    store: Arc<dyn QuotaStore>,
    limit: u32,
}

impl DailyQuota {
    pub fn new(store: Arc<dyn QuotaStore>, limit: u32) -> Self {
        Self { store, limit }
    }

    /// Postgres only when asked for and a pool exists.
    pub fn from_settings(settings: &QuotaSettings, pool: Option<PgPool>) -> Self {
        let store: Arc<dyn QuotaStore> = match (settings.backend, pool) {
            (QuotaBackend::Postgres, Some(pool)) => Arc::new(PgQuota::new(pool)),
            (QuotaBackend::Postgres, None) => {
                tracing::warn!("postgres quota needs a database; using in-memory counters");
                Arc::new(MemoryQuota::new())
            }
            (QuotaBackend::Memory, _) => Arc::new(MemoryQuota::new()),
        };
        Self::new(store, settings.daily_limit)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub async fn check(&self, ip: &ClientIp) -> Result<(), AppError> {
        self.check_on(ip, Utc::now().date_naive()).await
    }

    /// A failing store lets the request through; the quota is a courtesy limit.
    pub async fn check_on(&self, ip: &ClientIp, day: NaiveDate) -> Result<(), AppError> {
        if self.limit == 0 {
            return Ok(());
        }
        let key = ip.anon();
        match self.store.hit(&key, day).await {
            Ok(count) if count > self.limit => {
                metrics::counter!("quota_rejections_total").increment(1);
                tracing::info!(client = %key, count, limit = self.limit, "daily quota exceeded");
                Err(AppError::QuotaExceeded)
            }
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "quota store unavailable; allowing request");
                Ok(())
            }
        }
    }
}
