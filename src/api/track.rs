use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{lenient, AppState};
use crate::db::TrackEvent;
use crate::error::AppError;
use crate::http::JsonBody;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TrackRequest {
    #[serde(alias = "storeid", alias = "storeId", deserialize_with = "lenient::string")]
    pub store_id: Option<String>,
    #[serde(alias = "eventType", deserialize_with = "lenient::string")]
    pub event_type: Option<String>,
    #[serde(alias = "tagsUsed", deserialize_with = "lenient::opt_tags")]
    pub tags_used: Option<Vec<String>>,
    #[serde(alias = "reviewId", deserialize_with = "lenient::string")]
    pub review_id: Option<String>,
}

pub async fn track(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<TrackRequest>,
) -> Result<Json<Value>, AppError> {
    let event_type = req
        .event_type
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("event_type required".into()))?;

    // Unknown ids are dropped rather than rejected; the event itself still counts.
    let review_id = req
        .review_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .and_then(|s| Uuid::parse_str(s).ok());

    let event = TrackEvent {
        store_id: req.store_id.unwrap_or_default(),
        event_type,
        tags_used: req.tags_used,
        review_id,
    };
    state.repo.record_event(&event).await?;
    tracing::debug!(store_id = %event.store_id, event_type = %event.event_type, "event tracked");

    Ok(Json(json!({ "ok": true })))
}
