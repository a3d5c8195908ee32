//! Nightly record service
//!
//! Reads, annotation and tracker sync for a user's nightly records. Sync
//! validates the whole batch before writing anything and recomputes the
//! cached summary once the batch is stored.

use crate::config::RecordsConfig;
use crate::error::LeagueError;
use crate::schema::{parse_day, RawNightlyRecord, RecordAdapter};
use crate::store::{LogStoreFailure, RecordRepository, SummaryRepository, UserRepository};
use crate::summary::SummaryCache;
use crate::types::{NightlyRecord, SleepSummary, UserId};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Per-user nightly record operations
pub struct SleepLog {
    records: Arc<dyn RecordRepository>,
    users: Arc<dyn UserRepository>,
    cache: SummaryCache,
    config: RecordsConfig,
}

impl SleepLog {
    pub fn new(
        records: Arc<dyn RecordRepository>,
        summaries: Arc<dyn SummaryRepository>,
        users: Arc<dyn UserRepository>,
        config: RecordsConfig,
    ) -> Self {
        Self {
            cache: SummaryCache::new(records.clone(), summaries),
            records,
            users,
            config,
        }
    }

    /// The user's cached summary, generated on first access
    pub fn summary(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<SleepSummary, LeagueError> {
        self.cache.get(user_id, now)
    }

    /// A single night
    pub fn record(&self, user_id: &UserId, date: &str) -> Result<NightlyRecord, LeagueError> {
        let date = parse_day(date)?;
        self.records
            .get(user_id, date)
            .log_user("get record", user_id)?
            .ok_or_else(|| LeagueError::NotFound("Sleep data not found for this date".to_string()))
    }

    /// Nights between `start` and `end` inclusive, oldest first
    pub fn range(
        &self,
        user_id: &UserId,
        start: &str,
        end: &str,
    ) -> Result<Vec<NightlyRecord>, LeagueError> {
        let start = parse_day(start)?;
        let end = parse_day(end)?;

        if end < start {
            return Err(LeagueError::Validation(
                "End date must not be before start date".to_string(),
            ));
        }
        let max = self.config.max_range_days;
        if (end - start).num_days() > i64::from(max) {
            return Err(LeagueError::Validation(format!(
                "Date range cannot exceed {} days",
                max
            )));
        }

        Ok(self
            .records
            .range(user_id, start, end)
            .log_user("range records", user_id)?)
    }

    /// Attach a note and/or tags to a stored night.
    ///
    /// An empty note leaves the stored note alone; tags, when given, replace
    /// the stored set.
    pub fn annotate(
        &self,
        user_id: &UserId,
        date: &str,
        note: Option<&str>,
        tags: Option<Vec<String>>,
    ) -> Result<NightlyRecord, LeagueError> {
        let mut record = self.record(user_id, date)?;

        if let Some(note) = note.filter(|n| !n.is_empty()) {
            record.notes = note.to_string();
        }
        if let Some(tags) = tags {
            record.tags = tags.into_iter().collect();
        }

        self.records.put(&record).log_user("put record", user_id)?;
        tracing::debug!(user_id = %user_id, date = %record.date, "sleep record annotated");
        Ok(record)
    }

    /// Upsert a batch from the user's tracker. Returns the number of records
    /// written.
    pub fn sync(
        &self,
        user_id: &UserId,
        incoming: &[RawNightlyRecord],
        now: DateTime<Utc>,
    ) -> Result<usize, LeagueError> {
        if let Some(failure) = RecordAdapter::validate_records(incoming).into_iter().next() {
            tracing::warn!(
                user_id = %user_id,
                index = failure.index,
                error = %failure.error,
                "rejected sleep sync batch"
            );
            return Err(LeagueError::Validation(format!(
                "Record {} ({}): {}",
                failure.index, failure.date, failure.error
            )));
        }

        let user = self
            .users
            .get(user_id)
            .log_user("get user", user_id)?
            .ok_or_else(|| LeagueError::NotFound("User not found".to_string()))?;
        if !user.device.connected {
            return Err(LeagueError::Validation(
                "Sleep tracker not connected".to_string(),
            ));
        }

        for raw in incoming {
            let (date, _) = raw.validate()?;
            let existing = self.records.get(user_id, date).log_user("get record", user_id)?;
            let record = RecordAdapter::merge_into(raw, user_id, existing)?;
            self.records.put(&record).log_user("put record", user_id)?;
        }

        self.users
            .set_last_sync(user_id, now)
            .log_user("set last sync", user_id)?;
        self.cache.refresh(user_id, now)?;

        tracing::info!(user_id = %user_id, records = incoming.len(), "sleep data synced");
        Ok(incoming.len())
    }
}
