// src/config/mod.rs
//! Service configuration: optional TOML file overlaid with environment variables.
//!
//! Resolution order:
//! 1) built-in defaults,
//! 2) `$REVIEWS_CONFIG_PATH` or `config/reviews.toml` (missing file is fine, broken file is not),
//! 3) environment variables (`.env` is loaded by `main`).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "config/reviews.toml";
pub const ENV_CONFIG_PATH: &str = "REVIEWS_CONFIG_PATH";

pub const DEFAULT_SHEET_NAME: &str = "工作表1";
pub const DEFAULT_META_SHEET_NAME: &str = "stores";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub openai: OpenAiSettings,
    pub sheet: SheetSettings,
    pub places: PlacesSettings,
    pub database: DatabaseSettings,
    pub dedup: DedupSettings,
    pub quota: QuotaSettings,
    pub cache: CacheSettings,
    pub webhooks: WebhookSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    /// Empty means "not configured"; the generate endpoint then answers 500.
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout_secs: u64,
    /// Canned local generator instead of OpenAI (`AI_TEST_MODE=mock`). For demos and smoke runs.
    pub mock: bool,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.8,
            top_p: 0.9,
            timeout_secs: 20,
            mock: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SheetSettings {
    /// Published CSV export URL; wins over `sheet_id` when set.
    pub csv_url: Option<String>,
    pub sheet_id: Option<String>,
    pub sheet_name: String,
    /// Worksheet holding `storeid | name_zh | place_id` used by the generator.
    pub meta_sheet_name: String,
    /// Base of the Google Docs host, overridable for tests.
    pub docs_base_url: String,
}

impl Default for SheetSettings {
    fn default() -> Self {
        Self {
            csv_url: None,
            sheet_id: None,
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            meta_sheet_name: DEFAULT_META_SHEET_NAME.to_string(),
            docs_base_url: "https://docs.google.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlacesSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub photo_max_width: u32,
}

impl Default for PlacesSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://maps.googleapis.com".to_string(),
            photo_max_width: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Postgres URL. Absent → in-memory repository (local dev only).
    pub url: Option<String>,
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            run_migrations: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupBackend {
    /// In-process `strsim` comparison against recent rows.
    Levenshtein,
    /// Single `pg_trgm` query in Postgres.
    Trigram,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupSettings {
    pub backend: DedupBackend,
    pub threshold: f32,
    pub max_retries: u32,
    pub recent_limit: u32,
    pub recent_days: u32,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            backend: DedupBackend::Levenshtein,
            threshold: 0.55,
            max_retries: 2,
            recent_limit: 20,
            recent_days: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaSettings {
    pub backend: QuotaBackend,
    /// Generations per client IP per UTC day; 0 disables the quota.
    pub daily_limit: u32,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            backend: QuotaBackend::Memory,
            daily_limit: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub generate_ttl_ms: u64,
    pub store_ttl_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            generate_ttl_ms: 45_000,
            store_ttl_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    pub slack_url: Option<String>,
    pub discord_url: Option<String>,
    pub json_urls: Vec<String>,
}

impl AppConfig {
    /// Defaults → config file → process environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut cfg = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading config from {}", path.display()))?;
            Self::from_toml_str(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        } else {
            Self::default()
        };

        cfg.apply_env(|k| std::env::var(k).ok());
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Overlay values from an env-like lookup. Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("OPENAI_API_KEY") {
            self.openai.api_key = v;
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.openai.model = v;
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.openai.base_url = v;
        }
        if let Some(v) = get("AI_TEST_MODE") {
            self.openai.mock = v.eq_ignore_ascii_case("mock");
        }

        if let Some(v) = get("SHEET_CSV_URL") {
            self.sheet.csv_url = Some(v);
        }
        if let Some(v) = get("SHEET_ID") {
            self.sheet.sheet_id = Some(v);
        }
        if let Some(v) = get("SHEET_NAME") {
            self.sheet.sheet_name = v;
        }
        if let Some(v) = get("SHEET_META_NAME") {
            self.sheet.meta_sheet_name = v;
        }

        if let Some(v) = get("GOOGLE_MAPS_API_KEY").or_else(|| get("GOOGLE_API_KEY")) {
            self.places.api_key = Some(v);
        }

        if let Some(v) = get("SUPABASE_PG_URL").or_else(|| get("DATABASE_URL")) {
            self.database.url = Some(v);
        }
        if let Some(v) = get("RUN_MIGRATIONS") {
            self.database.run_migrations = parse_flag(&v);
        }

        if let Some(v) = get("DEDUP_BACKEND") {
            match v.to_ascii_lowercase().as_str() {
                "trigram" | "pg_trgm" => self.dedup.backend = DedupBackend::Trigram,
                "levenshtein" | "local" => self.dedup.backend = DedupBackend::Levenshtein,
                other => tracing::warn!(value = other, "unknown DEDUP_BACKEND, keeping default"),
            }
        }
        if let Some(v) = get("DEDUP_THRESHOLD").and_then(|s| s.parse::<f32>().ok()) {
            self.dedup.threshold = v;
        }
        if let Some(v) = get("DEDUP_MAX_RETRIES").and_then(|s| s.parse::<u32>().ok()) {
            self.dedup.max_retries = v;
        }

        if let Some(v) = get("QUOTA_DAILY_LIMIT").and_then(|s| s.parse::<u32>().ok()) {
            self.quota.daily_limit = v;
        }
        if let Some(v) = get("QUOTA_BACKEND") {
            match v.to_ascii_lowercase().as_str() {
                "postgres" | "pg" => self.quota.backend = QuotaBackend::Postgres,
                "memory" => self.quota.backend = QuotaBackend::Memory,
                other => tracing::warn!(value = other, "unknown QUOTA_BACKEND, keeping default"),
            }
        }

        if let Some(v) = get("GENERATE_CACHE_TTL_MS").and_then(|s| s.parse::<u64>().ok()) {
            self.cache.generate_ttl_ms = v;
        }
        if let Some(v) = get("STORE_CACHE_TTL_MS").and_then(|s| s.parse::<u64>().ok()) {
            self.cache.store_ttl_ms = v;
        }

        if let Some(v) = get("SLACK_WEBHOOK_URL") {
            self.webhooks.slack_url = Some(v);
        }
        if let Some(v) = get("DISCORD_WEBHOOK_URL") {
            self.webhooks.discord_url = Some(v);
        }
        if let Some(v) = get("WEBHOOK_URLS") {
            self.webhooks.json_urls = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    fn sanitize(&mut self) {
        if !self.dedup.threshold.is_finite() {
            self.dedup.threshold = DedupSettings::default().threshold;
        }
        self.dedup.threshold = self.dedup.threshold.clamp(0.0, 1.0);
        self.dedup.max_retries = self.dedup.max_retries.min(5);
        self.dedup.recent_limit = self.dedup.recent_limit.clamp(1, 200);
        self.dedup.recent_days = self.dedup.recent_days.clamp(1, 365);
        self.database.max_connections = self.database.max_connections.max(1);
        self.openai.timeout_secs = self.openai.timeout_secs.max(1);
        self.openai.base_url = self.openai.base_url.trim_end_matches('/').to_string();
    }

    pub fn openai_configured(&self) -> bool {
        !self.openai.api_key.trim().is_empty()
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_handler_constants() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.openai.model, "gpt-4o-mini");
        assert_eq!(cfg.sheet.sheet_name, DEFAULT_SHEET_NAME);
        assert_eq!(cfg.cache.generate_ttl_ms, 45_000);
        assert_eq!(cfg.quota.daily_limit, 20);
        assert!(!cfg.openai_configured());
    }

    #[test]
    fn toml_then_env_overlay() {
        let mut cfg = AppConfig::from_toml_str(
            r#"
            [dedup]
            backend = "trigram"
            threshold = 0.7

            [quota]
            daily_limit = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.dedup.backend, DedupBackend::Trigram);
        assert_eq!(cfg.quota.daily_limit, 5);

        cfg.apply_env(env_of(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("DATABASE_URL", "postgres://x"),
            ("DEDUP_THRESHOLD", "0.4"),
            ("WEBHOOK_URLS", " https://a.example/hook, ,https://b.example/hook "),
            ("GOOGLE_API_KEY", "maps-fallback"),
        ]));
        assert!(cfg.openai_configured());
        assert_eq!(cfg.database.url.as_deref(), Some("postgres://x"));
        assert!((cfg.dedup.threshold - 0.4).abs() < f32::EPSILON);
        assert_eq!(cfg.webhooks.json_urls.len(), 2);
        assert_eq!(cfg.places.api_key.as_deref(), Some("maps-fallback"));
    }

    #[test]
    fn ai_test_mode_selects_mock_generator() {
        let mut cfg = AppConfig::default();
        assert!(!cfg.openai.mock);
        cfg.apply_env(env_of(&[("AI_TEST_MODE", "MOCK")]));
        assert!(cfg.openai.mock);
        cfg.apply_env(env_of(&[("AI_TEST_MODE", "off")]));
        assert!(!cfg.openai.mock);
    }

    #[test]
    fn supabase_url_wins_over_database_url() {
        let mut cfg = AppConfig::default();
        cfg.apply_env(env_of(&[
            ("SUPABASE_PG_URL", "postgres://supabase"),
            ("DATABASE_URL", "postgres://other"),
        ]));
        assert_eq!(cfg.database.url.as_deref(), Some("postgres://supabase"));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [dedup]
            threshold = 3.5
            max_retries = 40
            "#,
        )
        .unwrap();
        assert_eq!(cfg.dedup.threshold, 1.0);
        assert_eq!(cfg.dedup.max_retries, 5);
    }

    #[serial_test::serial]
    #[test]
    fn load_reads_file_from_env_path() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("reviews.toml");
        fs::write(&p, "[cache]\ngenerate_ttl_ms = 1000\n").unwrap();
        std::env::set_var(ENV_CONFIG_PATH, p.display().to_string());

        let cfg = AppConfig::load().unwrap();
        assert_eq!(cfg.cache.generate_ttl_ms, 1000);

        std::env::remove_var(ENV_CONFIG_PATH);
    }

    #[serial_test::serial]
    #[test]
    fn load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("reviews.toml");
        fs::write(&p, "[cache\ngenerate_ttl_ms = ").unwrap();
        std::env::set_var(ENV_CONFIG_PATH, p.display().to_string());

        assert!(AppConfig::load().is_err());

        std::env::remove_var(ENV_CONFIG_PATH);
    }
}
