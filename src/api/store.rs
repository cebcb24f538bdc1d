use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use super::AppState;
use crate::error::AppError;
use crate::http::public_cache_control;
use crate::store::{load_profile, RequestOrigin};

const STORE_MAX_AGE_SECS: u64 = 60;

#[derive(Debug, Default, Deserialize)]
pub struct StoreQuery {
    pub store: Option<String>,
    pub storeid: Option<String>,
}

impl StoreQuery {
    fn store_id(&self) -> Option<&str> {
        [self.store.as_deref(), self.storeid.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}

pub async fn store(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<StoreQuery>,
) -> Result<Response, AppError> {
    let id = q
        .store_id()
        .ok_or_else(|| AppError::BadRequest("Missing storeid".into()))?;

    let origin = RequestOrigin::from_headers(&headers);
    let profile = load_profile(state.sheet.as_ref(), &state.places, id, &origin)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("StoreID not found: {id}")))?;

    Ok((
        [public_cache_control(STORE_MAX_AGE_SECS)],
        Json(profile),
    )
        .into_response())
}
