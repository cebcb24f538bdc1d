use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{lenient, AppState};
use crate::db::{ConfirmUpdate, TagBuckets};
use crate::error::AppError;
use crate::http::JsonBody;
use crate::notify::ReviewEvent;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfirmRequest {
    #[serde(deserialize_with = "lenient::string")]
    pub review_id: Option<String>,
    /// Only a JSON boolean counts; anything else leaves the column untouched.
    pub likely_posted: serde_json::Value,
    #[serde(deserialize_with = "lenient::buckets")]
    pub tag_buckets: Option<TagBuckets>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub ok: bool,
    pub updated_id: Option<Uuid>,
}

pub async fn confirm(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>, AppError> {
    let raw_id = req
        .review_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("reviewId is required".into()))?;
    let review_id = Uuid::parse_str(&raw_id)
        .map_err(|_| AppError::BadRequest(format!("Invalid reviewId: {raw_id}")))?;

    let likely_posted = req.likely_posted.as_bool();
    let buckets = req.tag_buckets.unwrap_or_default();
    let update = ConfirmUpdate::new(review_id, likely_posted, &buckets);

    let updated_id = state.repo.confirm(&update).await?;
    match updated_id {
        Some(id) => tracing::info!(review_id = %id, likely_posted = ?likely_posted, "review confirmed"),
        None => tracing::info!(review_id = %review_id, "confirm matched no review"),
    }

    if let (Some(id), Some(true)) = (updated_id, likely_posted) {
        state.notifier.spawn(ReviewEvent::Confirmed {
            review_id: id,
            ts: Utc::now(),
        });
    }

    Ok(Json(ConfirmResponse {
        ok: true,
        updated_id,
    }))
}
