//! Sleep summary cache
//!
//! Keeps one persisted [`SleepSummary`] per user. A refresh always reloads
//! the current-month, previous-month and all-time windows and recomputes
//! everything; concurrent refreshes for the same user race harmlessly because
//! each writes a complete replacement document.

use crate::aggregator::{MetricsAggregator, SummaryWindows};
use crate::error::LeagueError;
use crate::store::{LogStoreFailure, RecordRepository, SummaryRepository};
use crate::types::{SleepSummary, UserId};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::sync::Arc;

/// Calendar bounds of the month windows, relative to `now`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthWindows {
    pub current_start: NaiveDate,
    pub current_end: NaiveDate,
    pub previous_start: NaiveDate,
    pub previous_end: NaiveDate,
}

impl MonthWindows {
    /// Current month runs from its first day through today; the previous
    /// month covers its full calendar range.
    pub fn at(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let current_start = today.with_day(1).unwrap_or(today);
        let previous_end = current_start - Duration::days(1);
        let previous_start = previous_end.with_day(1).unwrap_or(previous_end);

        Self {
            current_start,
            current_end: today,
            previous_start,
            previous_end,
        }
    }
}

/// Persisted, recomputable summary per user
pub struct SummaryCache {
    records: Arc<dyn RecordRepository>,
    summaries: Arc<dyn SummaryRepository>,
}

impl SummaryCache {
    pub fn new(records: Arc<dyn RecordRepository>, summaries: Arc<dyn SummaryRepository>) -> Self {
        Self { records, summaries }
    }

    /// Recompute the user's summary from stored records and persist it
    pub fn refresh(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<SleepSummary, LeagueError> {
        let months = MonthWindows::at(now);

        let current_month = self
            .records
            .range(user_id, months.current_start, months.current_end)
            .log_user("range records", user_id)?;
        let previous_month = self
            .records
            .range(user_id, months.previous_start, months.previous_end)
            .log_user("range records", user_id)?;
        let all = self.records.all(user_id).log_user("all records", user_id)?;

        let summary = MetricsAggregator::summarize(
            user_id,
            SummaryWindows {
                current_month: &current_month,
                previous_month: &previous_month,
                all: &all,
            },
            now,
        );

        self.summaries
            .put(&summary)
            .log_user("put summary", user_id)?;

        tracing::info!(
            user_id = %user_id,
            records = all.len(),
            "sleep summary refreshed"
        );
        Ok(summary)
    }

    /// Return the stored summary, computing it first if none exists yet
    pub fn get(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<SleepSummary, LeagueError> {
        if let Some(summary) = self.summaries.get(user_id).log_user("get summary", user_id)? {
            return Ok(summary);
        }

        tracing::debug!(user_id = %user_id, "no cached sleep summary, generating");
        self.refresh(user_id, now)?;

        self.summaries
            .get(user_id)
            .log_user("get summary", user_id)?
            .ok_or_else(|| {
                LeagueError::NotFound(
                    "Sleep summary not found and could not be generated".to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{NightlyRecord, SleepMetrics};
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn make_record(date: NaiveDate, score: u8) -> NightlyRecord {
        NightlyRecord {
            user_id: UserId::from("u1"),
            date,
            score,
            metrics: SleepMetrics::default(),
            tags: BTreeSet::new(),
            notes: String::new(),
        }
    }

    fn cache_with(records: &[NightlyRecord]) -> (Arc<MemoryStore>, SummaryCache) {
        let store = Arc::new(MemoryStore::new());
        for r in records {
            RecordRepository::put(store.as_ref(), r).unwrap();
        }
        let cache = SummaryCache::new(store.clone(), store.clone());
        (store, cache)
    }

    #[test]
    fn test_month_windows() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap();
        assert_eq!(
            MonthWindows::at(now),
            MonthWindows {
                current_start: day(2024, 3, 1),
                current_end: day(2024, 3, 10),
                previous_start: day(2024, 2, 1),
                previous_end: day(2024, 2, 29),
            }
        );

        let january = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let windows = MonthWindows::at(january);
        assert_eq!(windows.previous_start, day(2023, 12, 1));
        assert_eq!(windows.previous_end, day(2023, 12, 31));
    }

    #[test]
    fn test_refresh_splits_month_windows() {
        let (_, cache) = cache_with(&[
            make_record(day(2024, 1, 20), 50),
            make_record(day(2024, 2, 10), 60),
            make_record(day(2024, 2, 29), 70),
            make_record(day(2024, 3, 1), 80),
            make_record(day(2024, 3, 9), 90),
        ]);
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap();

        let summary = cache.refresh(&UserId::from("u1"), now).unwrap();
        assert_eq!(summary.daily_average.current_month, 85.0);
        assert_eq!(summary.daily_average.previous_month, 65.0);
        assert_eq!(summary.daily_average.overall, 70.0);
        assert_eq!(summary.improvement.monthly, 10.0);
        assert_eq!(summary.best_score, 90);
        assert_eq!(summary.worst_score, 50);
    }

    #[test]
    fn test_get_generates_missing_summary() {
        let (store, cache) = cache_with(&[make_record(day(2024, 3, 2), 75)]);
        let user = UserId::from("u1");
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap();

        assert!(SummaryRepository::get(store.as_ref(), &user).unwrap().is_none());
        let summary = cache.get(&user, now).unwrap();
        assert_eq!(summary.daily_average.overall, 75.0);
        assert!(SummaryRepository::get(store.as_ref(), &user).unwrap().is_some());
    }

    #[test]
    fn test_get_returns_cached_until_refresh() {
        let (store, cache) = cache_with(&[make_record(day(2024, 3, 2), 75)]);
        let user = UserId::from("u1");
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap();

        cache.get(&user, now).unwrap();
        RecordRepository::put(store.as_ref(), &make_record(day(2024, 3, 3), 95)).unwrap();

        assert_eq!(cache.get(&user, now).unwrap().best_score, 75);
        cache.refresh(&user, now).unwrap();
        assert_eq!(cache.get(&user, now).unwrap().best_score, 95);
    }

    #[test]
    fn test_summary_for_user_without_records() {
        let (_, cache) = cache_with(&[]);
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap();

        let summary = cache.get(&UserId::from("nobody"), now).unwrap();
        assert!(!summary.has_data());
        assert_eq!(summary.daily_average.overall, 0.0);
        assert!(summary.weekly_trend.is_empty());
    }
}
