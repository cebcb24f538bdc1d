// src/db/mod.rs
//! Persistence: generated reviews, front-end events, funnel read models.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

pub const EVENT_GENERATE: &str = "generate";
pub const EVENT_CLICK_GOOGLE: &str = "click_google";

/// Widest look-back any read model accepts, in days.
pub const MAX_WINDOW_DAYS: u32 = 365;

#[derive(Debug, Clone, Default)]
pub struct NewReview {
    pub store_id: String,
    pub review_text: String,
    pub language: String,
    pub positive_tags: Vec<String>,
    pub negative_tags: Vec<String>,
    pub variant: i64,
    pub similarity: f32,
    pub attempts: u32,
    pub client_hash: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub latency_ms: u64,
}

/// A tag bucket as sent by the page: usually a list or an already-joined string, but any
/// other JSON value is accepted and stringified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    List(Vec<String>),
    Text(String),
    Other(serde_json::Value),
}

impl TagValue {
    fn joined(&self) -> String {
        match self {
            TagValue::List(v) => v.join(","),
            TagValue::Text(s) => s.clone(),
            TagValue::Other(serde_json::Value::Array(items)) => items
                .iter()
                .map(scalar_text)
                .collect::<Vec<_>>()
                .join(","),
            TagValue::Other(v) => scalar_text(v),
        }
    }
}

fn scalar_text(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Absent buckets count as an empty list; an explicit `null` keeps the stored column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TagField {
    #[default]
    Absent,
    Null,
    Value(TagValue),
}

impl TagField {
    fn column(&self) -> Option<String> {
        match self {
            TagField::Absent => Some(String::new()),
            TagField::Null => None,
            TagField::Value(v) => Some(v.joined()),
        }
    }
}

impl<'de> Deserialize<'de> for TagField {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(match Option::<TagValue>::deserialize(d)? {
            Some(v) => TagField::Value(v),
            None => TagField::Null,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TagBuckets {
    pub pos_top3: TagField,
    pub pos_features: TagField,
    pub pos_ambiance: TagField,
    pub pos_new_items: TagField,
    pub custom_food: Option<serde_json::Value>,
    pub cons: TagField,
    pub custom_cons: Option<serde_json::Value>,
}

/// Column values for the confirm update; `None` keeps the stored value (`COALESCE`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmUpdate {
    pub review_id: Uuid,
    pub likely_posted: Option<bool>,
    pub pos_top3_tags: Option<String>,
    pub pos_features_tags: Option<String>,
    pub pos_ambiance_tags: Option<String>,
    pub pos_newitems_tags: Option<String>,
    pub custom_food_tag: Option<String>,
    pub cons_tags: Option<String>,
    pub custom_cons_tag: Option<String>,
}

impl ConfirmUpdate {
    pub fn new(review_id: Uuid, likely_posted: Option<bool>, buckets: &TagBuckets) -> Self {
        Self {
            review_id,
            likely_posted,
            pos_top3_tags: buckets.pos_top3.column(),
            pos_features_tags: buckets.pos_features.column(),
            pos_ambiance_tags: buckets.pos_ambiance.column(),
            pos_newitems_tags: buckets.pos_new_items.column(),
            custom_food_tag: free_text(buckets.custom_food.as_ref()),
            cons_tags: buckets.cons.column(),
            custom_cons_tag: free_text(buckets.custom_cons.as_ref()),
        }
    }
}

/// Free-text tag: null/empty → keep existing; scalars are stringified.
fn free_text(v: Option<&serde_json::Value>) -> Option<String> {
    match v? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackEvent {
    pub store_id: String,
    pub event_type: String,
    pub tags_used: Option<Vec<String>>,
    pub review_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct FunnelDay {
    pub day: NaiveDate,
    pub generated_count: i64,
    pub clicked_count: i64,
    pub posted_count: i64,
    pub click_rate_pct: Option<f64>,
    pub posted_rate_pct: Option<f64>,
    pub avg_hours_to_click: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TagFunnelRow {
    pub tag: String,
    pub generated_count: i64,
    pub clicked_count: i64,
    pub click_rate_pct: Option<f64>,
}

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Newest first, same store (case-insensitive), created within `days`.
    async fn recent_texts(
        &self,
        store_id: &str,
        days: u32,
        limit: u32,
    ) -> Result<Vec<String>, sqlx::Error>;

    async fn insert_review(&self, review: &NewReview) -> Result<Uuid, sqlx::Error>;

    /// Updated id, or `None` when no review matched.
    async fn confirm(&self, update: &ConfirmUpdate) -> Result<Option<Uuid>, sqlx::Error>;

    async fn record_event(&self, event: &TrackEvent) -> Result<(), sqlx::Error>;

    async fn daily_funnel(&self, days: u32) -> Result<Vec<FunnelDay>, sqlx::Error>;

    async fn tag_funnel(
        &self,
        days: u32,
        store_id: Option<&str>,
    ) -> Result<Vec<TagFunnelRow>, sqlx::Error>;
}

pub type DynRepository = Arc<dyn ReviewRepository>;

pub(crate) fn round_to(v: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (v * f).round() / f
}

/// `None` when the denominator is zero, else `round(100 * num / den, 1)`.
pub(crate) fn rate_pct(num: i64, den: i64) -> Option<f64> {
    (den > 0).then(|| round_to(100.0 * num as f64 / den as f64, 1))
}
