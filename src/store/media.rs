//! Image URL clean-up for sheet cells: Drive share links and site-relative assets.

use axum::http::HeaderMap;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_DRIVE_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"drive\.google\.com/file/d/([^/?#]+)").expect("drive file regex"));
static RE_ID_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]id=([^&#]+)").expect("drive id regex"));

const DRIVE_VIEW: &str = "https://drive.google.com/uc?export=view&id=";

/// Rewrite Drive share links to a direct-view URL; anything else passes through trimmed.
pub fn normalize_drive_url(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }
    if s.contains("drive.google.com/uc?") {
        return s.to_string();
    }
    if let Some(id) = RE_DRIVE_FILE.captures(s).and_then(|c| c.get(1)) {
        return format!("{DRIVE_VIEW}{}", id.as_str());
    }
    if let Some(id) = RE_ID_PARAM.captures(s).and_then(|c| c.get(1)) {
        return format!("{DRIVE_VIEW}{}", id.as_str());
    }
    s.to_string()
}

/// Scheme + host the browser used to reach us, as reported by the edge proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    pub proto: String,
    pub host: String,
}

impl RequestOrigin {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            proto: header("x-forwarded-proto").unwrap_or_else(|| "https".to_string()),
            host: header("x-forwarded-host")
                .or_else(|| header("host"))
                .unwrap_or_default(),
        }
    }
}

/// `/assets/logo.png` → `https://host/assets/logo.png`; absolute URLs are untouched.
pub fn absolutize_asset(url: &str, origin: &RequestOrigin) -> String {
    let s = url.trim();
    if s.starts_with('/') {
        return format!("{}://{}{}", origin.proto, origin.host, s);
    }
    s.to_string()
}
