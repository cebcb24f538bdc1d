use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;

/// Best-effort client address used as the quota key.
///
/// Priority:
/// 1. `X-Forwarded-For` (comma-separated list, first entry)
/// 2. `X-Real-IP`
/// 3. `X-NF-Client-Connection-IP` (Netlify edge)
/// 4. `ConnectInfo` socket address, when the server was started with it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientIp(pub String);

pub const UNKNOWN_CLIENT: &str = "unknown";

impl ClientIp {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return Some(Self(ip.to_string()));
        }

        ["x-real-ip", "x-nf-client-connection-ip"]
            .iter()
            .filter_map(|h| headers.get(*h))
            .filter_map(|v| v.to_str().ok())
            .find_map(|s| s.trim().parse::<IpAddr>().ok())
            .map(|ip| Self(ip.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short sha256 prefix; the only form of the address that is logged or stored.
    pub fn anon(&self) -> String {
        anon_hash(&self.0)
    }
}

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ip) = Self::from_headers(&parts.headers) {
            return Ok(ip);
        }
        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            return Ok(Self(addr.ip().to_string()));
        }
        Ok(Self(UNKNOWN_CLIENT.to_string()))
    }
}

pub fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
