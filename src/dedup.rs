// src/dedup.rs
//! Duplicate suppression for generated reviews.
//!
//! Every candidate is scored against the store's recent reviews. A candidate at or over the
//! threshold is regenerated with a steering hint built from the text it resembles, up to
//! `max_retries` times; the least similar candidate wins.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::config::{DedupBackend, DedupSettings};
use crate::db::DynRepository;
use crate::llm::{ChatPrompt, LlmError, TextGenerator, Usage};
use crate::prompt::{steering_hint, with_steering, Language};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Similarity {
    /// 0 = unrelated, 1 = identical.
    pub score: f32,
    /// The stored text the candidate resembles most.
    pub closest: Option<String>,
}

#[async_trait]
pub trait SimilarityOracle: Send + Sync {
    async fn score(&self, store_id: &str, candidate: &str) -> anyhow::Result<Similarity>;
}

pub type DynOracle = Arc<dyn SimilarityOracle>;

/// Lowercase and keep letters/digits only, so punctuation and spacing never mask a copy.
pub fn normalize_for_compare(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Edit-distance similarity against the repository's recent texts.
pub struct LevenshteinOracle {
    repo: DynRepository,
    recent_limit: u32,
    recent_days: u32,
}

impl LevenshteinOracle {
    pub fn new(repo: DynRepository, settings: &DedupSettings) -> Self {
        Self {
            repo,
            recent_limit: settings.recent_limit,
            recent_days: settings.recent_days,
        }
    }
}

#[async_trait]
impl SimilarityOracle for LevenshteinOracle {
    async fn score(&self, store_id: &str, candidate: &str) -> anyhow::Result<Similarity> {
        let recent = self
            .repo
            .recent_texts(store_id, self.recent_days, self.recent_limit)
            .await?;
        let needle = normalize_for_compare(candidate);

        let mut best = Similarity::default();
        for text in recent {
            let s = strsim::normalized_levenshtein(&needle, &normalize_for_compare(&text)) as f32;
            if best.closest.is_none() || s > best.score {
                best = Similarity {
                    score: s,
                    closest: Some(text),
                };
            }
        }
        Ok(best)
    }
}

/// `pg_trgm` similarity computed by the database.
pub struct TrigramOracle {
    pool: PgPool,
    recent_limit: u32,
    recent_days: u32,
}

impl TrigramOracle {
    pub fn new(pool: PgPool, settings: &DedupSettings) -> Self {
        Self {
            pool,
            recent_limit: settings.recent_limit,
            recent_days: settings.recent_days,
        }
    }
}

#[async_trait]
impl SimilarityOracle for TrigramOracle {
    async fn score(&self, store_id: &str, candidate: &str) -> anyhow::Result<Similarity> {
        let row = sqlx::query_as::<_, (String, f32)>(
            r#"
            SELECT review_text, similarity(review_text, $2) AS score
            FROM (
                SELECT review_text FROM generated_reviews
                WHERE lower(store_id) = lower($1)
                  AND created_at >= now() - make_interval(days => $3)
                ORDER BY created_at DESC
                LIMIT $4
            ) recent
            ORDER BY score DESC
            LIMIT 1
            "#,
        )
        .bind(store_id)
        .bind(candidate)
        .bind(self.recent_days as i32)
        .bind(self.recent_limit as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|(text, score)| Similarity {
                score,
                closest: Some(text),
            })
            .unwrap_or_default())
    }
}

/// Pick the oracle for the configured backend. Trigram needs a pool; without one we fall back.
pub fn build_oracle(
    settings: &DedupSettings,
    repo: DynRepository,
    pool: Option<PgPool>,
) -> DynOracle {
    match (settings.backend, pool) {
        (DedupBackend::Trigram, Some(pool)) => Arc::new(TrigramOracle::new(pool, settings)),
        (DedupBackend::Trigram, None) => {
            warn!("trigram dedup needs a database; using levenshtein");
            Arc::new(LevenshteinOracle::new(repo, settings))
        }
        (DedupBackend::Levenshtein, _) => Arc::new(LevenshteinOracle::new(repo, settings)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupPolicy {
    pub threshold: f32,
    pub max_retries: u32,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.55,
            max_retries: 2,
        }
    }
}

impl From<&DedupSettings> for DedupPolicy {
    fn from(s: &DedupSettings) -> Self {
        Self {
            threshold: s.threshold,
            max_retries: s.max_retries,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistinctOutcome {
    pub text: String,
    pub similarity: f32,
    /// Generator calls made, including the first one.
    pub attempts: u32,
    /// The returned text is still at or over the threshold.
    pub duplicate: bool,
    /// Variant the returned text was generated with.
    pub variant: i64,
    /// Summed over all attempts.
    pub usage: Usage,
    pub latency_ms: u64,
}

/// Generate until the candidate is far enough from the store's recent reviews.
///
/// `prompt_for(variant)` builds the base prompt; retries move to the next variant and carry
/// a steering hint. Oracle errors count as "no similarity" so a scoring outage never blocks
/// generation; generator errors abort.
pub async fn generate_distinct<F>(
    generator: &dyn TextGenerator,
    oracle: &dyn SimilarityOracle,
    store_id: &str,
    language: Language,
    base_variant: i64,
    prompt_for: F,
    policy: DedupPolicy,
) -> Result<DistinctOutcome, LlmError>
where
    F: Fn(i64) -> ChatPrompt,
{
    let mut best: Option<(String, Similarity, i64)> = None;
    let mut usage = Usage::default();
    let mut latency_ms = 0u64;
    let mut steer_from: Option<String> = None;
    let mut attempts = 0u32;

    for attempt in 0..=policy.max_retries {
        let variant = base_variant.saturating_add(attempt as i64);
        let base = prompt_for(variant);
        let prompt: ChatPrompt = match steer_from.as_deref() {
            Some(prev) => with_steering(&base, &steering_hint(language, prev)),
            None => base,
        };

        if attempt > 0 {
            metrics::counter!("review_regenerations_total").increment(1);
        }
        let completion = generator.generate(&prompt).await?;
        attempts += 1;
        usage = usage.add(completion.usage);
        latency_ms = latency_ms.saturating_add(completion.latency_ms);

        let sim = match oracle.score(store_id, &completion.text).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, store_id, "similarity check failed; accepting candidate");
                Similarity::default()
            }
        };
        debug!(attempt, variant, score = sim.score, "candidate scored");

        let improves = best.as_ref().map_or(true, |(_, b, _)| sim.score < b.score);
        let over = sim.score >= policy.threshold;
        steer_from = Some(sim.closest.clone().unwrap_or_else(|| completion.text.clone()));
        if improves {
            best = Some((completion.text, sim, variant));
        }
        if !over {
            break;
        }
    }

    let (text, sim, variant) = best.ok_or(LlmError::EmptyCompletion)?;
    let duplicate = sim.score >= policy.threshold;
    if duplicate {
        metrics::counter!("review_duplicates_total").increment(1);
        warn!(store_id, score = sim.score, attempts, "returning near-duplicate review");
    }

    Ok(DistinctOutcome {
        text,
        similarity: sim.score,
        attempts,
        duplicate,
        variant,
        usage,
        latency_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryRepository, NewReview, ReviewRepository};
    use crate::llm::ScriptedGenerator;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Returns queued scores in order; errors once the queue is empty if `fail_when_empty`.
    struct QueuedOracle {
        scores: Mutex<VecDeque<f32>>,
        fail_when_empty: bool,
    }

    impl QueuedOracle {
        fn new(scores: &[f32]) -> Self {
            Self {
                scores: Mutex::new(scores.iter().copied().collect()),
                fail_when_empty: false,
            }
        }

        fn failing() -> Self {
            Self {
                scores: Mutex::new(VecDeque::new()),
                fail_when_empty: true,
            }
        }
    }

    #[async_trait]
    impl SimilarityOracle for QueuedOracle {
        async fn score(&self, _store_id: &str, _candidate: &str) -> anyhow::Result<Similarity> {
            match self.scores.lock().unwrap().pop_front() {
                Some(score) => Ok(Similarity {
                    score,
                    closest: Some("既有的評論內容".into()),
                }),
                None if self.fail_when_empty => anyhow::bail!("oracle down"),
                None => Ok(Similarity::default()),
            }
        }
    }

    fn prompt(variant: i64) -> ChatPrompt {
        ChatPrompt {
            system: "sys".into(),
            user: format!("variant {variant}"),
        }
    }

    #[tokio::test]
    async fn first_distinct_candidate_is_accepted() {
        let gen = ScriptedGenerator::new(["one"]);
        let oracle = QueuedOracle::new(&[0.1]);
        let out = generate_distinct(
            &gen,
            &oracle,
            "s",
            Language::ZhTw,
            3,
            prompt,
            DedupPolicy::default(),
        )
        .await
        .unwrap();
        assert_eq!(out.text, "one");
        assert_eq!(out.attempts, 1);
        assert_eq!(out.variant, 3);
        assert!(!out.duplicate);
        assert_eq!(gen.calls(), 1);
    }

    #[tokio::test]
    async fn retries_with_steering_and_next_variant() {
        let gen = ScriptedGenerator::new(["dup", "fresh"]);
        let oracle = QueuedOracle::new(&[0.9, 0.2]);
        let out = generate_distinct(
            &gen,
            &oracle,
            "s",
            Language::ZhTw,
            0,
            prompt,
            DedupPolicy::default(),
        )
        .await
        .unwrap();
        assert_eq!(out.text, "fresh");
        assert_eq!(out.attempts, 2);
        assert_eq!(out.variant, 1);
        assert!((out.similarity - 0.2).abs() < f32::EPSILON);

        let prompts = gen.prompts();
        assert_eq!(prompts[0].user, "variant 0");
        assert!(prompts[1].user.starts_with("variant 1\n"));
        assert!(prompts[1].user.contains("既有的評論內容"));
        let prompt_chars: u32 = prompts
            .iter()
            .map(|p| (p.system.chars().count() + p.user.chars().count()) as u32)
            .sum();
        assert_eq!(out.usage.total_tokens, prompt_chars + "dup".len() as u32 + "fresh".len() as u32);
        assert_eq!(out.latency_ms, 2);
    }

    #[tokio::test]
    async fn exhausted_retries_return_least_similar() {
        let gen = ScriptedGenerator::new(["a", "b", "c"]);
        let oracle = QueuedOracle::new(&[0.8, 0.6, 0.9]);
        let out = generate_distinct(
            &gen,
            &oracle,
            "s",
            Language::En,
            0,
            prompt,
            DedupPolicy::default(),
        )
        .await
        .unwrap();
        assert_eq!(out.text, "b");
        assert_eq!(out.attempts, 3);
        assert!(out.duplicate);
        assert_eq!(gen.calls(), 3);
    }

    #[tokio::test]
    async fn zero_retries_never_regenerates() {
        let gen = ScriptedGenerator::new(["a", "b"]);
        let oracle = QueuedOracle::new(&[0.99]);
        let policy = DedupPolicy {
            threshold: 0.55,
            max_retries: 0,
        };
        let out = generate_distinct(&gen, &oracle, "s", Language::En, 0, prompt, policy)
            .await
            .unwrap();
        assert_eq!(out.text, "a");
        assert!(out.duplicate);
        assert_eq!(gen.calls(), 1);
    }

    #[tokio::test]
    async fn oracle_failure_accepts_candidate() {
        let gen = ScriptedGenerator::new(["a"]);
        let out = generate_distinct(
            &gen,
            &QueuedOracle::failing(),
            "s",
            Language::En,
            0,
            prompt,
            DedupPolicy::default(),
        )
        .await
        .unwrap();
        assert_eq!(out.text, "a");
        assert_eq!(out.similarity, 0.0);
        assert!(!out.duplicate);
    }

    #[tokio::test]
    async fn generator_failure_aborts() {
        let gen = ScriptedGenerator::failing(503);
        let err = generate_distinct(
            &gen,
            &QueuedOracle::new(&[]),
            "s",
            Language::En,
            0,
            prompt,
            DedupPolicy::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 503, .. }));
    }

    #[test]
    fn normalization_ignores_case_spacing_and_punctuation() {
        assert_eq!(normalize_for_compare("Great  Noodles!"), "greatnoodles");
        assert_eq!(normalize_for_compare("湯頭 濃郁，麵條Q彈。"), "湯頭濃郁麵條q彈");
    }

    #[tokio::test]
    async fn levenshtein_oracle_scores_against_store_history() {
        let repo = Arc::new(MemoryRepository::new());
        for (store, text) in [
            ("wang01", "湯頭濃郁，麵條Q彈，下次還會再來。"),
            ("wang01", "店員親切，環境乾淨。"),
            ("other", "完全不同的店。"),
        ] {
            repo.insert_review(&NewReview {
                store_id: store.into(),
                review_text: text.into(),
                ..NewReview::default()
            })
            .await
            .unwrap();
        }
        let oracle = LevenshteinOracle::new(repo.clone(), &DedupSettings::default());

        let hit = oracle
            .score("WANG01", "湯頭濃郁 麵條Q彈 下次還會再來")
            .await
            .unwrap();
        assert_eq!(hit.score, 1.0);
        assert_eq!(hit.closest.as_deref(), Some("湯頭濃郁，麵條Q彈，下次還會再來。"));

        let empty = oracle.score("nobody", "anything").await.unwrap();
        assert_eq!(empty, Similarity::default());
    }
}
