use axum::{
    extract::State,
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::{lenient, AppState};
use crate::db::{NewReview, TrackEvent, EVENT_GENERATE};
use crate::dedup::{generate_distinct, DedupPolicy, DistinctOutcome};
use crate::error::AppError;
use crate::http::{ClientIp, JsonBody};
use crate::llm::Usage;
use crate::notify::ReviewEvent;
use crate::prompt::{build_prompt, Language, LengthBounds, PromptInput};
use crate::sheet::StoreMeta;

const X_CACHE: &str = "x-cache";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateRequest {
    #[serde(deserialize_with = "lenient::string")]
    pub storeid: Option<String>,
    #[serde(deserialize_with = "lenient::tags")]
    pub selected_tags: Vec<String>,
    #[serde(deserialize_with = "lenient::tags")]
    pub cons_tags: Vec<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub language: Option<String>,
    #[serde(deserialize_with = "lenient::int")]
    pub variant: Option<i64>,
    #[serde(deserialize_with = "lenient::int")]
    pub min_chars: Option<i64>,
    #[serde(deserialize_with = "lenient::int")]
    pub max_chars: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSummary {
    pub name: String,
    pub place_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateMeta {
    pub variant: i64,
    pub min_chars: u32,
    pub max_chars: u32,
    pub tags: Vec<String>,
    pub cons_tags: Vec<String>,
    pub language: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub review_id: Option<Uuid>,
    pub review_text: String,
    pub store: StoreSummary,
    pub usage: Usage,
    pub latency_ms: u64,
    pub similarity: f32,
    pub attempts: u32,
    pub meta: GenerateMeta,
}

/// Normalized inputs after validation.
struct Inputs {
    store_id: String,
    language: Language,
    variant: i64,
    length: LengthBounds,
    tags: Vec<String>,
    cons_tags: Vec<String>,
}

impl Inputs {
    fn from_request(req: GenerateRequest) -> Result<Self, AppError> {
        let store_id = req.storeid.unwrap_or_default();
        if store_id.is_empty() {
            return Err(AppError::BadRequest("storeid required".into()));
        }
        Ok(Self {
            store_id,
            language: Language::parse(req.language.as_deref()),
            variant: req.variant.unwrap_or(0),
            length: LengthBounds::from_request(req.min_chars, req.max_chars),
            tags: req.selected_tags,
            cons_tags: req.cons_tags,
        })
    }

    /// Every input that changes the prompt; `serde_json` maps keep keys sorted.
    fn cache_key(&self) -> String {
        json!({
            "storeid": self.store_id.to_lowercase(),
            "language": self.language.code(),
            "variant": self.variant,
            "minChars": self.length.min,
            "maxChars": self.length.max,
            "tags": self.tags,
            "consTags": self.cons_tags,
        })
        .to_string()
    }
}

fn with_cache_header(body: GenerateResponse, state: &'static str) -> Response {
    let mut resp = Json(body).into_response();
    resp.headers_mut()
        .insert(HeaderName::from_static(X_CACHE), HeaderValue::from_static(state));
    resp
}

pub async fn generate(
    State(state): State<AppState>,
    ip: ClientIp,
    JsonBody(req): JsonBody<GenerateRequest>,
) -> Result<Response, AppError> {
    if !state.generator.is_configured() {
        return Err(AppError::Config("Missing OPENAI_API_KEY".into()));
    }
    let inputs = Inputs::from_request(req)?;

    let key = inputs.cache_key();
    if let Some(hit) = state.generate_cache.get(&key) {
        metrics::counter!("generate_cache_hits_total").increment(1);
        return Ok(with_cache_header(hit, "HIT"));
    }

    state.quota.check(&ip).await?;

    let meta = match state.sheet.lookup_store_meta(&inputs.store_id).await {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, store_id = %inputs.store_id, "store meta lookup failed; using id");
            StoreMeta::fallback(&inputs.store_id)
        }
    };

    let outcome = generate_distinct(
        state.generator.as_ref(),
        state.oracle.as_ref(),
        &inputs.store_id,
        inputs.language,
        inputs.variant,
        |variant| {
            build_prompt(&PromptInput {
                language: inputs.language,
                store_name: &meta.name,
                store_id: &inputs.store_id,
                positive_tags: &inputs.tags,
                negative_tags: &inputs.cons_tags,
                variant,
                length: inputs.length,
            })
        },
        DedupPolicy::from(&state.config.dedup),
    )
    .await
    .map_err(|e| {
        metrics::counter!("llm_errors_total").increment(1);
        warn!(error = %e, provider = state.generator.name(), "generation failed");
        AppError::from(e)
    })?;
    metrics::histogram!("llm_latency_ms").record(outcome.latency_ms as f64);

    let review_id = persist(&state, &inputs, &outcome, &ip).await;

    state.notifier.spawn(ReviewEvent::Generated {
        review_id,
        store_id: inputs.store_id.clone(),
        store_name: meta.name.clone(),
        language: inputs.language.code().to_string(),
        similarity: outcome.similarity,
        attempts: outcome.attempts,
        duplicate: outcome.duplicate,
        ts: Utc::now(),
    });

    info!(
        store_id = %inputs.store_id,
        client = %ip.anon(),
        attempts = outcome.attempts,
        similarity = outcome.similarity,
        latency_ms = outcome.latency_ms,
        "review generated"
    );
    metrics::counter!("reviews_generated_total").increment(1);

    let body = GenerateResponse {
        review_id,
        review_text: outcome.text,
        store: StoreSummary {
            name: meta.name,
            place_id: meta.place_id,
        },
        usage: outcome.usage,
        latency_ms: outcome.latency_ms,
        similarity: outcome.similarity,
        attempts: outcome.attempts,
        meta: GenerateMeta {
            variant: outcome.variant,
            min_chars: inputs.length.min,
            max_chars: inputs.length.max,
            tags: inputs.tags,
            cons_tags: inputs.cons_tags,
            language: inputs.language.code(),
        },
    };
    state.generate_cache.insert(key, body.clone());
    Ok(with_cache_header(body, "MISS"))
}

/// Store the review and its `generate` event. Failures only cost the id.
async fn persist(
    state: &AppState,
    inputs: &Inputs,
    outcome: &DistinctOutcome,
    ip: &ClientIp,
) -> Option<Uuid> {
    let review = NewReview {
        store_id: inputs.store_id.clone(),
        review_text: outcome.text.clone(),
        language: inputs.language.code().to_string(),
        positive_tags: inputs.tags.clone(),
        negative_tags: inputs.cons_tags.clone(),
        variant: outcome.variant,
        similarity: outcome.similarity,
        attempts: outcome.attempts,
        client_hash: ip.anon(),
        model: state.config.openai.model.clone(),
        prompt_tokens: outcome.usage.prompt_tokens,
        completion_tokens: outcome.usage.completion_tokens,
        latency_ms: outcome.latency_ms,
    };

    let review_id = match state.repo.insert_review(&review).await {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(error = %e, store_id = %inputs.store_id, "failed to persist review");
            None
        }
    };

    let event = TrackEvent {
        store_id: inputs.store_id.clone(),
        event_type: EVENT_GENERATE.to_string(),
        tags_used: Some(inputs.tags.clone()),
        review_id,
    };
    if let Err(e) = state.repo.record_event(&event).await {
        warn!(error = %e, "failed to record generate event");
    }
    review_id
}
