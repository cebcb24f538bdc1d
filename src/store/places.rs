//! Google Places photo URLs.

use std::time::Duration;

use serde::Deserialize;

use crate::config::PlacesSettings;

#[derive(Clone)]
pub struct PlacesClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    max_width: u32,
}

#[derive(Deserialize)]
struct DetailsResp {
    #[serde(default)]
    result: Option<DetailsResult>,
}

#[derive(Deserialize)]
struct DetailsResult {
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Deserialize)]
struct Photo {
    #[serde(default)]
    photo_reference: String,
}

impl PlacesClient {
    pub fn new(settings: &PlacesSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(8))
            .build()?;
        Ok(Self {
            http,
            api_key: settings
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty()),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            max_width: settings.photo_max_width,
        })
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Empty when the reference or the API key is missing.
    pub fn photo_url(&self, photo_ref: &str) -> String {
        let (Some(key), false) = (self.api_key.as_deref(), photo_ref.trim().is_empty()) else {
            return String::new();
        };
        format!(
            "{}/maps/api/place/photo?maxwidth={}&photo_reference={}&key={}",
            self.base_url,
            self.max_width,
            urlencoding::encode(photo_ref.trim()),
            urlencoding::encode(key)
        )
    }

    /// First photo reference from Place Details. Any failure yields an empty string.
    pub async fn first_photo_ref(&self, place_id: &str) -> String {
        let Some(key) = self.api_key.as_deref() else {
            return String::new();
        };
        if place_id.trim().is_empty() {
            return String::new();
        }
        let url = format!(
            "{}/maps/api/place/details/json?place_id={}&fields=photos&key={}",
            self.base_url,
            urlencoding::encode(place_id.trim()),
            urlencoding::encode(key)
        );

        let resp = match self.http.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "place details request failed");
                return String::new();
            }
        };
        match resp.json::<DetailsResp>().await {
            Ok(body) => body
                .result
                .and_then(|r| r.photos.into_iter().next())
                .map(|p| p.photo_reference)
                .unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "place details response unreadable");
                String::new()
            }
        }
    }
}
