//! Repository interfaces
//!
//! One trait per aggregate. The engine only talks to storage through these,
//! so the pure logic can run against [`MemoryStore`] in tests and against a
//! document database in production.
//!
//! Membership mutations use set semantics ("add if absent", "remove if
//! present") instead of whole-list overwrites. They return whether the set
//! actually changed, and fail with [`StoreError::Missing`] when the owning
//! document does not exist.

mod memory;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::types::{
    Competition, CompetitionId, CompetitionStatus, NightlyRecord, SleepSummary, User, UserId,
    Winner,
};
use chrono::{DateTime, NaiveDate, Utc};

/// Nightly records, one per user per calendar day
pub trait RecordRepository: Send + Sync {
    fn get(&self, user_id: &UserId, date: NaiveDate) -> Result<Option<NightlyRecord>, StoreError>;

    /// Records with `from <= date <= to`, ascending by date
    fn range(
        &self,
        user_id: &UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NightlyRecord>, StoreError>;

    /// Every record of the user, ascending by date
    fn all(&self, user_id: &UserId) -> Result<Vec<NightlyRecord>, StoreError>;

    fn count(&self, user_id: &UserId) -> Result<usize, StoreError>;

    /// Insert or replace the record at `(user_id, date)`
    fn put(&self, record: &NightlyRecord) -> Result<(), StoreError>;
}

/// Cached sleep summaries, one document per user
pub trait SummaryRepository: Send + Sync {
    fn get(&self, user_id: &UserId) -> Result<Option<SleepSummary>, StoreError>;

    /// Replace the user's summary wholesale
    fn put(&self, summary: &SleepSummary) -> Result<(), StoreError>;
}

/// User documents
pub trait UserRepository: Send + Sync {
    fn get(&self, user_id: &UserId) -> Result<Option<User>, StoreError>;

    fn insert(&self, user: &User) -> Result<(), StoreError>;

    fn add_participating(
        &self,
        user_id: &UserId,
        competition_id: &CompetitionId,
    ) -> Result<bool, StoreError>;

    fn remove_participating(
        &self,
        user_id: &UserId,
        competition_id: &CompetitionId,
    ) -> Result<bool, StoreError>;

    fn add_won(&self, user_id: &UserId, competition_id: &CompetitionId)
        -> Result<bool, StoreError>;

    fn set_last_sync(&self, user_id: &UserId, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Competition documents
pub trait CompetitionRepository: Send + Sync {
    fn get(&self, id: &CompetitionId) -> Result<Option<Competition>, StoreError>;

    /// Competitions ordered by start date, optionally filtered by stored status
    fn list(&self, status: Option<CompetitionStatus>) -> Result<Vec<Competition>, StoreError>;

    fn insert(&self, competition: &Competition) -> Result<(), StoreError>;

    /// Overwrite the descriptive fields, window, status, rules and prizes.
    /// Participants and winners are left untouched.
    fn update(&self, competition: &Competition) -> Result<(), StoreError>;

    fn add_participant(&self, id: &CompetitionId, user_id: &UserId) -> Result<bool, StoreError>;

    fn remove_participant(&self, id: &CompetitionId, user_id: &UserId)
        -> Result<bool, StoreError>;

    fn set_winners(&self, id: &CompetitionId, winners: &[Winner]) -> Result<(), StoreError>;

    /// Move the stored status from `expected` to `status`, touching no other
    /// field. Returns false without writing when the stored status is no
    /// longer `expected` or is already `Completed`.
    fn set_status(
        &self,
        id: &CompetitionId,
        expected: CompetitionStatus,
        status: CompetitionStatus,
    ) -> Result<bool, StoreError>;
}

/// Logs a failed store call, with the ids it touched, before passing the
/// error on
pub(crate) trait LogStoreFailure<T> {
    fn logged(self, op: &'static str) -> Result<T, StoreError>;

    fn log_user(self, op: &'static str, user_id: &UserId) -> Result<T, StoreError>;

    fn log_competition(self, op: &'static str, competition_id: &CompetitionId)
        -> Result<T, StoreError>;

    fn log_membership(
        self,
        op: &'static str,
        user_id: &UserId,
        competition_id: &CompetitionId,
    ) -> Result<T, StoreError>;
}

impl<T> LogStoreFailure<T> for Result<T, StoreError> {
    fn logged(self, op: &'static str) -> Result<T, StoreError> {
        self.map_err(|e| {
            tracing::error!(op, error = %e, "store call failed");
            e
        })
    }

    fn log_user(self, op: &'static str, user_id: &UserId) -> Result<T, StoreError> {
        self.map_err(|e| {
            tracing::error!(op, user_id = %user_id, error = %e, "store call failed");
            e
        })
    }

    fn log_competition(
        self,
        op: &'static str,
        competition_id: &CompetitionId,
    ) -> Result<T, StoreError> {
        self.map_err(|e| {
            tracing::error!(op, competition_id = %competition_id, error = %e, "store call failed");
            e
        })
    }

    fn log_membership(
        self,
        op: &'static str,
        user_id: &UserId,
        competition_id: &CompetitionId,
    ) -> Result<T, StoreError> {
        self.map_err(|e| {
            tracing::error!(
                op,
                user_id = %user_id,
                competition_id = %competition_id,
                error = %e,
                "store call failed"
            );
            e
        })
    }
}
