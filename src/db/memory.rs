//! Process-local repository with the same semantics as the Postgres one.
//! Used by tests and by local runs without a database url. Rows older than the widest
//! read window are dropped on every write.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use uuid::Uuid;

use super::{
    rate_pct, round_to, ConfirmUpdate, FunnelDay, NewReview, ReviewRepository, TagFunnelRow,
    TrackEvent, EVENT_CLICK_GOOGLE, EVENT_GENERATE, MAX_WINDOW_DAYS,
};

#[derive(Debug, Clone)]
pub struct StoredReview {
    pub id: Uuid,
    pub review: NewReview,
    pub likely_posted: Option<bool>,
    pub pos_top3_tags: Option<String>,
    pub pos_features_tags: Option<String>,
    pub pos_ambiance_tags: Option<String>,
    pub pos_newitems_tags: Option<String>,
    pub custom_food_tag: Option<String>,
    pub cons_tags: Option<String>,
    pub custom_cons_tag: Option<String>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub event: TrackEvent,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    reviews: Vec<StoredReview>,
    events: Vec<StoredEvent>,
}

impl Tables {
    // One spare day: windows are compared on calendar dates.
    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Days::new(MAX_WINDOW_DAYS as u64 + 1);
        self.reviews.retain(|r| r.created_at >= cutoff);
        self.events.retain(|e| e.created_at >= cutoff);
    }
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        match self.tables.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    pub fn review(&self, id: Uuid) -> Option<StoredReview> {
        self.lock().reviews.iter().find(|r| r.id == id).cloned()
    }

    pub fn events(&self) -> Vec<StoredEvent> {
        self.lock().events.clone()
    }

    /// Shift a review (and its click, if any) `days` into the past.
    pub fn backdate_review(&self, id: Uuid, days: u64) {
        let mut t = self.lock();
        if let Some(r) = t.reviews.iter_mut().find(|r| r.id == id) {
            r.created_at = r.created_at - Days::new(days);
            r.clicked_at = r.clicked_at.map(|c| c - Days::new(days));
        }
    }

    /// Shift every recorded event `days` into the past.
    pub fn backdate_events(&self, days: u64) {
        for e in self.lock().events.iter_mut() {
            e.created_at = e.created_at - Days::new(days);
        }
    }
}

fn window_start(days: u32) -> NaiveDate {
    let today = Utc::now().date_naive();
    today.checked_sub_days(Days::new(days as u64)).unwrap_or(NaiveDate::MIN)
}

#[async_trait]
impl ReviewRepository for MemoryRepository {
    async fn recent_texts(
        &self,
        store_id: &str,
        days: u32,
        limit: u32,
    ) -> Result<Vec<String>, sqlx::Error> {
        let since = Utc::now() - Days::new(days as u64);
        let t = self.lock();
        let mut matching: Vec<&StoredReview> = t
            .reviews
            .iter()
            .filter(|r| r.review.store_id.eq_ignore_ascii_case(store_id) && r.created_at >= since)
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .take(limit as usize)
            .map(|r| r.review.review_text.clone())
            .collect())
    }

    async fn insert_review(&self, review: &NewReview) -> Result<Uuid, sqlx::Error> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut t = self.lock();
        t.prune(now);
        t.reviews.push(StoredReview {
            id,
            review: review.clone(),
            likely_posted: None,
            pos_top3_tags: None,
            pos_features_tags: None,
            pos_ambiance_tags: None,
            pos_newitems_tags: None,
            custom_food_tag: None,
            cons_tags: None,
            custom_cons_tag: None,
            clicked_at: None,
            created_at: now,
        });
        Ok(id)
    }

    async fn confirm(&self, u: &ConfirmUpdate) -> Result<Option<Uuid>, sqlx::Error> {
        fn coalesce<T: Clone>(slot: &mut Option<T>, v: &Option<T>) {
            if let Some(v) = v {
                *slot = Some(v.clone());
            }
        }

        let mut t = self.lock();
        let Some(r) = t.reviews.iter_mut().find(|r| r.id == u.review_id) else {
            return Ok(None);
        };
        coalesce(&mut r.likely_posted, &u.likely_posted);
        coalesce(&mut r.pos_top3_tags, &u.pos_top3_tags);
        coalesce(&mut r.pos_features_tags, &u.pos_features_tags);
        coalesce(&mut r.pos_ambiance_tags, &u.pos_ambiance_tags);
        coalesce(&mut r.pos_newitems_tags, &u.pos_newitems_tags);
        coalesce(&mut r.custom_food_tag, &u.custom_food_tag);
        coalesce(&mut r.cons_tags, &u.cons_tags);
        coalesce(&mut r.custom_cons_tag, &u.custom_cons_tag);
        Ok(Some(r.id))
    }

    async fn record_event(&self, event: &TrackEvent) -> Result<(), sqlx::Error> {
        let now = Utc::now();
        let mut t = self.lock();
        t.prune(now);
        t.events.push(StoredEvent {
            event: event.clone(),
            created_at: now,
        });
        if let (EVENT_CLICK_GOOGLE, Some(id)) = (event.event_type.as_str(), event.review_id) {
            if let Some(r) = t.reviews.iter_mut().find(|r| r.id == id) {
                r.clicked_at.get_or_insert(now);
            }
        }
        Ok(())
    }

    async fn daily_funnel(&self, days: u32) -> Result<Vec<FunnelDay>, sqlx::Error> {
        #[derive(Default)]
        struct Acc {
            generated: i64,
            clicked: i64,
            posted: i64,
            click_hours: Vec<f64>,
        }

        let since = window_start(days);
        let mut by_day: BTreeMap<NaiveDate, Acc> = BTreeMap::new();
        for r in self.lock().reviews.iter() {
            let day = r.created_at.date_naive();
            if day < since {
                continue;
            }
            let acc = by_day.entry(day).or_default();
            acc.generated += 1;
            if let Some(c) = r.clicked_at {
                acc.clicked += 1;
                acc.click_hours
                    .push((c - r.created_at).num_milliseconds() as f64 / 3_600_000.0);
            }
            if r.likely_posted == Some(true) {
                acc.posted += 1;
            }
        }

        Ok(by_day
            .into_iter()
            .map(|(day, a)| FunnelDay {
                day,
                generated_count: a.generated,
                clicked_count: a.clicked,
                posted_count: a.posted,
                click_rate_pct: rate_pct(a.clicked, a.generated),
                posted_rate_pct: rate_pct(a.posted, a.generated),
                avg_hours_to_click: (!a.click_hours.is_empty()).then(|| {
                    round_to(
                        a.click_hours.iter().sum::<f64>() / a.click_hours.len() as f64,
                        2,
                    )
                }),
            })
            .collect())
    }

    async fn tag_funnel(
        &self,
        days: u32,
        store_id: Option<&str>,
    ) -> Result<Vec<TagFunnelRow>, sqlx::Error> {
        let since = window_start(days);
        let mut counts: HashMap<String, (i64, i64)> = HashMap::new();
        for e in self.lock().events.iter() {
            if e.created_at.date_naive() < since {
                continue;
            }
            if let Some(s) = store_id {
                if !e.event.store_id.eq_ignore_ascii_case(s) {
                    continue;
                }
            }
            let (g, c) = match e.event.event_type.as_str() {
                EVENT_GENERATE => (1, 0),
                EVENT_CLICK_GOOGLE => (0, 1),
                _ => continue,
            };
            for tag in e.event.tags_used.iter().flatten() {
                let slot = counts.entry(tag.clone()).or_default();
                slot.0 += g;
                slot.1 += c;
            }
        }

        let mut rows: Vec<TagFunnelRow> = counts
            .into_iter()
            .map(|(tag, (g, c))| TagFunnelRow {
                tag,
                generated_count: g,
                clicked_count: c,
                click_rate_pct: rate_pct(c, g),
            })
            .collect();
        rows.sort_by(|a, b| {
            b.generated_count
                .cmp(&a.generated_count)
                .then_with(|| a.tag.cmp(&b.tag))
        });
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(store: &str, text: &str) -> NewReview {
        NewReview {
            store_id: store.into(),
            review_text: text.into(),
            ..NewReview::default()
        }
    }

    fn event(store: &str, kind: &str, tags: &[&str]) -> TrackEvent {
        TrackEvent {
            store_id: store.into(),
            event_type: kind.into(),
            tags_used: Some(tags.iter().map(|t| t.to_string()).collect()),
            review_id: None,
        }
    }

    #[tokio::test]
    async fn recent_texts_are_scoped_windowed_and_limited() {
        let repo = MemoryRepository::new();
        let old = repo.insert_review(&review("wang01", "old")).await.unwrap();
        repo.insert_review(&review("WANG01", "first")).await.unwrap();
        repo.insert_review(&review("other", "elsewhere")).await.unwrap();
        repo.backdate_review(old, 40);

        let texts = repo.recent_texts("wang01", 30, 20).await.unwrap();
        assert_eq!(texts, vec!["first".to_string()]);
        assert_eq!(repo.recent_texts("wang01", 60, 20).await.unwrap().len(), 2);
        assert_eq!(repo.recent_texts("wang01", 60, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn confirm_coalesces_and_reports_missing_rows() {
        let repo = MemoryRepository::new();
        let id = repo.insert_review(&review("s", "t")).await.unwrap();

        let first = ConfirmUpdate {
            review_id: id,
            likely_posted: Some(true),
            cons_tags: Some("slow".into()),
            ..ConfirmUpdate::default()
        };
        assert_eq!(repo.confirm(&first).await.unwrap(), Some(id));

        let second = ConfirmUpdate {
            review_id: id,
            pos_top3_tags: Some("noodles".into()),
            ..ConfirmUpdate::default()
        };
        repo.confirm(&second).await.unwrap();

        let stored = repo.review(id).unwrap();
        assert_eq!(stored.likely_posted, Some(true));
        assert_eq!(stored.cons_tags.as_deref(), Some("slow"));
        assert_eq!(stored.pos_top3_tags.as_deref(), Some("noodles"));

        let missing = ConfirmUpdate {
            review_id: Uuid::new_v4(),
            ..ConfirmUpdate::default()
        };
        assert_eq!(repo.confirm(&missing).await.unwrap(), None);
    }

    #[tokio::test]
    async fn click_event_stamps_review_once() {
        let repo = MemoryRepository::new();
        let id = repo.insert_review(&review("s", "t")).await.unwrap();
        let click = TrackEvent {
            review_id: Some(id),
            ..event("s", EVENT_CLICK_GOOGLE, &[])
        };
        repo.record_event(&click).await.unwrap();
        let first = repo.review(id).unwrap().clicked_at.unwrap();
        repo.record_event(&click).await.unwrap();
        assert_eq!(repo.review(id).unwrap().clicked_at, Some(first));
        assert_eq!(repo.events().len(), 2);
    }

    #[tokio::test]
    async fn daily_funnel_counts_today() {
        let repo = MemoryRepository::new();
        let a = repo.insert_review(&review("s", "a")).await.unwrap();
        let b = repo.insert_review(&review("s", "b")).await.unwrap();
        let old = repo.insert_review(&review("s", "old")).await.unwrap();
        repo.backdate_review(old, 100);
        repo.record_event(&TrackEvent {
            review_id: Some(a),
            ..event("s", EVENT_CLICK_GOOGLE, &[])
        })
        .await
        .unwrap();
        repo.confirm(&ConfirmUpdate {
            review_id: b,
            likely_posted: Some(true),
            ..ConfirmUpdate::default()
        })
        .await
        .unwrap();

        let rows = repo.daily_funnel(30).await.unwrap();
        assert_eq!(rows.len(), 1);
        let today = &rows[0];
        assert_eq!(today.generated_count, 2);
        assert_eq!(today.clicked_count, 1);
        assert_eq!(today.posted_count, 1);
        assert_eq!(today.click_rate_pct, Some(50.0));
        assert_eq!(today.posted_rate_pct, Some(50.0));
        assert!(today.avg_hours_to_click.is_some());

        assert_eq!(repo.daily_funnel(365).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn tag_funnel_orders_by_generated_then_tag() {
        let repo = MemoryRepository::new();
        repo.record_event(&event("s1", EVENT_GENERATE, &["noodles", "soup"])).await.unwrap();
        repo.record_event(&event("s1", EVENT_GENERATE, &["noodles"])).await.unwrap();
        repo.record_event(&event("s1", EVENT_CLICK_GOOGLE, &["noodles"])).await.unwrap();
        repo.record_event(&event("s1", "view", &["noodles"])).await.unwrap();
        repo.record_event(&event("s2", EVENT_GENERATE, &["bread"])).await.unwrap();
        repo.record_event(&event("s2", EVENT_CLICK_GOOGLE, &["parking"])).await.unwrap();

        let rows = repo.tag_funnel(30, None).await.unwrap();
        let tags: Vec<&str> = rows.iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(tags, vec!["noodles", "bread", "soup", "parking"]);
        assert_eq!(rows[0].generated_count, 2);
        assert_eq!(rows[0].clicked_count, 1);
        assert_eq!(rows[0].click_rate_pct, Some(50.0));
        assert_eq!(rows[3].click_rate_pct, None);

        let scoped = repo.tag_funnel(30, Some("S2")).await.unwrap();
        assert_eq!(scoped.len(), 2);

        repo.backdate_events(60);
        assert!(repo.tag_funnel(30, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn writes_drop_rows_older_than_the_widest_window() {
        let repo = MemoryRepository::new();
        let stale = repo.insert_review(&review("s", "stale")).await.unwrap();
        let kept = repo.insert_review(&review("s", "kept")).await.unwrap();
        repo.record_event(&event("s", EVENT_GENERATE, &["old"])).await.unwrap();
        repo.backdate_review(stale, MAX_WINDOW_DAYS as u64 + 5);
        repo.backdate_review(kept, MAX_WINDOW_DAYS as u64 - 5);
        repo.backdate_events(MAX_WINDOW_DAYS as u64 + 5);

        repo.insert_review(&review("s", "fresh")).await.unwrap();
        assert!(repo.review(stale).is_none());
        assert!(repo.review(kept).is_some());

        repo.record_event(&event("s", EVENT_GENERATE, &["new"])).await.unwrap();
        let events = repo.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.tags_used, Some(vec!["new".to_string()]));
    }
}
