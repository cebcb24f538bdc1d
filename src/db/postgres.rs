use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    ConfirmUpdate, FunnelDay, NewReview, ReviewRepository, TagFunnelRow, TrackEvent,
    EVENT_CLICK_GOOGLE,
};
use crate::config::DatabaseSettings;

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lazy pool: the first query opens the connection, so startup never blocks on the database.
    pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<Self> {
        let url = settings
            .url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("database url not configured"))?;
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect_lazy(url)?;
        if settings.run_migrations {
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("database migrations applied");
        }
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ReviewRepository for PgRepository {
    async fn recent_texts(
        &self,
        store_id: &str,
        days: u32,
        limit: u32,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT review_text FROM generated_reviews
            WHERE lower(store_id) = lower($1)
              AND created_at >= now() - make_interval(days => $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(store_id)
        .bind(days as i32)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
    }

    async fn insert_review(&self, r: &NewReview) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO generated_reviews
                (store_id, review_text, language, positive_tags, negative_tags, variant,
                 similarity, attempts, client_hash, model, prompt_tokens, completion_tokens,
                 latency_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
            "#,
        )
        .bind(&r.store_id)
        .bind(&r.review_text)
        .bind(&r.language)
        .bind(&r.positive_tags)
        .bind(&r.negative_tags)
        .bind(r.variant)
        .bind(r.similarity)
        .bind(r.attempts as i32)
        .bind(&r.client_hash)
        .bind(&r.model)
        .bind(r.prompt_tokens as i32)
        .bind(r.completion_tokens as i32)
        .bind(r.latency_ms as i64)
        .fetch_one(&self.pool)
        .await
    }

    async fn confirm(&self, u: &ConfirmUpdate) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE generated_reviews
            SET
                likely_posted     = COALESCE($2, likely_posted),
                pos_top3_tags     = COALESCE($3, pos_top3_tags),
                pos_features_tags = COALESCE($4, pos_features_tags),
                pos_ambiance_tags = COALESCE($5, pos_ambiance_tags),
                pos_newitems_tags = COALESCE($6, pos_newitems_tags),
                custom_food_tag   = COALESCE($7, custom_food_tag),
                cons_tags         = COALESCE($8, cons_tags),
                custom_cons_tag   = COALESCE($9, custom_cons_tag)
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(u.review_id)
        .bind(u.likely_posted)
        .bind(&u.pos_top3_tags)
        .bind(&u.pos_features_tags)
        .bind(&u.pos_ambiance_tags)
        .bind(&u.pos_newitems_tags)
        .bind(&u.custom_food_tag)
        .bind(&u.cons_tags)
        .bind(&u.custom_cons_tag)
        .fetch_optional(&self.pool)
        .await
    }

    async fn record_event(&self, e: &TrackEvent) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO generator_events (store_id, event_type, tags_used, review_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&e.store_id)
        .bind(&e.event_type)
        .bind(&e.tags_used)
        .bind(e.review_id)
        .execute(&mut *tx)
        .await?;

        if let (EVENT_CLICK_GOOGLE, Some(id)) = (e.event_type.as_str(), e.review_id) {
            sqlx::query(
                "UPDATE generated_reviews SET clicked_at = COALESCE(clicked_at, now()) WHERE id = $1",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }

    async fn daily_funnel(&self, days: u32) -> Result<Vec<FunnelDay>, sqlx::Error> {
        sqlx::query_as::<_, FunnelDay>(
            r#"
            SELECT
                day,
                generated_count,
                clicked_count,
                posted_count,
                click_rate_pct::float8     AS click_rate_pct,
                posted_rate_pct::float8    AS posted_rate_pct,
                avg_hours_to_click::float8 AS avg_hours_to_click
            FROM memorycorner_daily_funnel
            WHERE day >= current_date - $1::int
            ORDER BY day ASC
            "#,
        )
        .bind(days as i32)
        .fetch_all(&self.pool)
        .await
    }

    async fn tag_funnel(
        &self,
        days: u32,
        store_id: Option<&str>,
    ) -> Result<Vec<TagFunnelRow>, sqlx::Error> {
        sqlx::query_as::<_, TagFunnelRow>(
            r#"
            WITH tag_events AS (
                SELECT
                    unnest(tags_used) AS tag,
                    CASE WHEN event_type = 'generate' THEN 1 ELSE 0 END AS generated,
                    CASE WHEN event_type = 'click_google' THEN 1 ELSE 0 END AS clicked
                FROM generator_events
                WHERE created_at >= current_date - $1::int
                  AND event_type IN ('generate', 'click_google')
                  AND tags_used IS NOT NULL
                  AND ($2::text IS NULL OR lower(store_id) = lower($2))
            )
            SELECT
                tag,
                sum(generated)::bigint AS generated_count,
                sum(clicked)::bigint   AS clicked_count,
                CASE
                    WHEN sum(generated) > 0
                        THEN round(100.0 * sum(clicked) / sum(generated), 1)::float8
                    ELSE NULL
                END AS click_rate_pct
            FROM tag_events
            GROUP BY tag
            ORDER BY sum(generated) DESC, tag ASC
            "#,
        )
        .bind(days as i32)
        .bind(store_id)
        .fetch_all(&self.pool)
        .await
    }
}
