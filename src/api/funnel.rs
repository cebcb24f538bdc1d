use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use super::AppState;
use crate::db::{FunnelDay, TagFunnelRow};
use crate::error::AppError;

pub const DEFAULT_DAYS: u32 = 30;
pub const MAX_DAYS: u32 = crate::db::MAX_WINDOW_DAYS;

#[derive(Debug, Default, Deserialize)]
pub struct FunnelQuery {
    pub days: Option<String>,
    #[serde(alias = "store", alias = "store_id")]
    pub storeid: Option<String>,
}

/// Leading integer of the value (`"7d"` → 7); missing, invalid or outside `1..=365` → 30.
pub fn clamp_days(raw: Option<&str>) -> u32 {
    let digits: String = raw
        .map(str::trim)
        .unwrap_or("")
        .chars()
        .enumerate()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
        .map(|(_, c)| c)
        .collect();
    match digits.parse::<i64>() {
        Ok(d) if d > 0 && d <= MAX_DAYS as i64 => d as u32,
        _ => DEFAULT_DAYS,
    }
}

pub async fn daily(
    State(state): State<AppState>,
    Query(q): Query<FunnelQuery>,
) -> Result<Json<Vec<FunnelDay>>, AppError> {
    let days = clamp_days(q.days.as_deref());
    Ok(Json(state.repo.daily_funnel(days).await?))
}

pub async fn by_tag(
    State(state): State<AppState>,
    Query(q): Query<FunnelQuery>,
) -> Result<Json<Vec<TagFunnelRow>>, AppError> {
    let days = clamp_days(q.days.as_deref());
    let store = q.storeid.as_deref().map(str::trim).filter(|s| !s.is_empty());
    Ok(Json(state.repo.tag_funnel(days, store).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_are_clamped_like_parse_int() {
        assert_eq!(clamp_days(None), 30);
        assert_eq!(clamp_days(Some("")), 30);
        assert_eq!(clamp_days(Some("abc")), 30);
        assert_eq!(clamp_days(Some("0")), 30);
        assert_eq!(clamp_days(Some("-5")), 30);
        assert_eq!(clamp_days(Some("366")), 30);
        assert_eq!(clamp_days(Some("365")), 365);
        assert_eq!(clamp_days(Some("7")), 7);
        assert_eq!(clamp_days(Some("14days")), 14);
        assert_eq!(clamp_days(Some("3.9")), 3);
    }
}
