//! HTTP plumbing shared by every handler: CORS, client address, small response helpers.

pub mod client_ip;

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::error::AppError;

pub use client_ip::{anon_hash, ClientIp};

/// `Access-Control-Allow-Origin: *` for the browser front-end; preflights are answered by the layer.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Bare `OPTIONS` without preflight headers still answers 204.
pub async fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed" })),
    )
        .into_response()
}

/// Store metadata is safe to cache briefly at the edge.
pub fn public_cache_control(max_age_secs: u64) -> (header::HeaderName, HeaderValue) {
    let value = HeaderValue::from_str(&format!("public, max-age={max_age_secs}"))
        .unwrap_or_else(|_| HeaderValue::from_static("public, max-age=60"));
    (header::CACHE_CONTROL, value)
}

/// JSON body that tolerates a missing `Content-Type` and treats an empty body as `{}`.
/// Malformed JSON is a 400 with the parser message.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        let raw: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            &bytes
        };
        serde_json::from_slice(raw)
            .map(JsonBody)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Payload {
        name: Option<String>,
    }

    fn request(body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn empty_body_is_an_empty_object() {
        let JsonBody(p) = JsonBody::<Payload>::from_request(request(""), &())
            .await
            .unwrap();
        assert!(p.name.is_none());
    }

    #[tokio::test]
    async fn json_without_content_type_is_accepted() {
        let JsonBody(p) = JsonBody::<Payload>::from_request(request(r#"{"name":"x"}"#), &())
            .await
            .unwrap();
        assert_eq!(p.name.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let err = JsonBody::<Payload>::from_request(request("{nope"), &())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
