//! In-memory repository backend
//!
//! A single lock guards all collections, so each call is atomic on its own.
//! Calls are not grouped into transactions.

use super::{CompetitionRepository, RecordRepository, SummaryRepository, UserRepository};
use crate::error::StoreError;
use crate::types::{
    Competition, CompetitionId, CompetitionStatus, NightlyRecord, SleepSummary, User, UserId,
    Winner,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Collections {
    records: HashMap<UserId, BTreeMap<NaiveDate, NightlyRecord>>,
    summaries: HashMap<UserId, SleepSummary>,
    users: HashMap<UserId, User>,
    competitions: HashMap<CompetitionId, Competition>,
}

/// Repository backend holding every collection in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

fn missing_user(user_id: &UserId) -> StoreError {
    StoreError::Missing(format!("user {}", user_id))
}

fn missing_competition(id: &CompetitionId) -> StoreError {
    StoreError::Missing(format!("competition {}", id))
}

impl RecordRepository for MemoryStore {
    fn get(&self, user_id: &UserId, date: NaiveDate) -> Result<Option<NightlyRecord>, StoreError> {
        Ok(self
            .read()?
            .records
            .get(user_id)
            .and_then(|days| days.get(&date))
            .cloned())
    }

    fn range(
        &self,
        user_id: &UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NightlyRecord>, StoreError> {
        if from > to {
            return Ok(Vec::new());
        }
        Ok(self
            .read()?
            .records
            .get(user_id)
            .map(|days| days.range(from..=to).map(|(_, r)| r.clone()).collect())
            .unwrap_or_default())
    }

    fn all(&self, user_id: &UserId) -> Result<Vec<NightlyRecord>, StoreError> {
        Ok(self
            .read()?
            .records
            .get(user_id)
            .map(|days| days.values().cloned().collect())
            .unwrap_or_default())
    }

    fn count(&self, user_id: &UserId) -> Result<usize, StoreError> {
        Ok(self.read()?.records.get(user_id).map_or(0, |days| days.len()))
    }

    fn put(&self, record: &NightlyRecord) -> Result<(), StoreError> {
        self.write()?
            .records
            .entry(record.user_id.clone())
            .or_default()
            .insert(record.date, record.clone());
        Ok(())
    }
}

impl SummaryRepository for MemoryStore {
    fn get(&self, user_id: &UserId) -> Result<Option<SleepSummary>, StoreError> {
        Ok(self.read()?.summaries.get(user_id).cloned())
    }

    fn put(&self, summary: &SleepSummary) -> Result<(), StoreError> {
        self.write()?
            .summaries
            .insert(summary.user_id.clone(), summary.clone());
        Ok(())
    }
}

impl UserRepository for MemoryStore {
    fn get(&self, user_id: &UserId) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.get(user_id).cloned())
    }

    fn insert(&self, user: &User) -> Result<(), StoreError> {
        self.write()?.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    fn add_participating(
        &self,
        user_id: &UserId,
        competition_id: &CompetitionId,
    ) -> Result<bool, StoreError> {
        let mut guard = self.write()?;
        let user = guard.users.get_mut(user_id).ok_or_else(|| missing_user(user_id))?;
        Ok(user.competitions.participating.insert(competition_id.clone()))
    }

    fn remove_participating(
        &self,
        user_id: &UserId,
        competition_id: &CompetitionId,
    ) -> Result<bool, StoreError> {
        let mut guard = self.write()?;
        let user = guard.users.get_mut(user_id).ok_or_else(|| missing_user(user_id))?;
        Ok(user.competitions.participating.remove(competition_id))
    }

    fn add_won(
        &self,
        user_id: &UserId,
        competition_id: &CompetitionId,
    ) -> Result<bool, StoreError> {
        let mut guard = self.write()?;
        let user = guard.users.get_mut(user_id).ok_or_else(|| missing_user(user_id))?;
        Ok(user.competitions.won.insert(competition_id.clone()))
    }

    fn set_last_sync(&self, user_id: &UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut guard = self.write()?;
        let user = guard.users.get_mut(user_id).ok_or_else(|| missing_user(user_id))?;
        user.device.last_sync = Some(at);
        Ok(())
    }
}

impl CompetitionRepository for MemoryStore {
    fn get(&self, id: &CompetitionId) -> Result<Option<Competition>, StoreError> {
        Ok(self.read()?.competitions.get(id).cloned())
    }

    fn list(&self, status: Option<CompetitionStatus>) -> Result<Vec<Competition>, StoreError> {
        let guard = self.read()?;
        let mut competitions: Vec<Competition> = guard
            .competitions
            .values()
            .filter(|c| status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();
        competitions.sort_by(|a, b| {
            a.start_date
                .cmp(&b.start_date)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(competitions)
    }

    fn insert(&self, competition: &Competition) -> Result<(), StoreError> {
        self.write()?
            .competitions
            .insert(competition.id.clone(), competition.clone());
        Ok(())
    }

    fn update(&self, competition: &Competition) -> Result<(), StoreError> {
        let mut guard = self.write()?;
        let stored = guard
            .competitions
            .get_mut(&competition.id)
            .ok_or_else(|| missing_competition(&competition.id))?;

        stored.title = competition.title.clone();
        stored.description = competition.description.clone();
        stored.kind = competition.kind.clone();
        stored.start_date = competition.start_date;
        stored.end_date = competition.end_date;
        stored.status = competition.status;
        stored.rules = competition.rules.clone();
        stored.prizes = competition.prizes.clone();
        Ok(())
    }

    fn add_participant(&self, id: &CompetitionId, user_id: &UserId) -> Result<bool, StoreError> {
        let mut guard = self.write()?;
        let competition = guard
            .competitions
            .get_mut(id)
            .ok_or_else(|| missing_competition(id))?;
        Ok(competition.participants.insert(user_id.clone()))
    }

    fn remove_participant(
        &self,
        id: &CompetitionId,
        user_id: &UserId,
    ) -> Result<bool, StoreError> {
        let mut guard = self.write()?;
        let competition = guard
            .competitions
            .get_mut(id)
            .ok_or_else(|| missing_competition(id))?;
        Ok(competition.participants.remove(user_id))
    }

    fn set_winners(&self, id: &CompetitionId, winners: &[Winner]) -> Result<(), StoreError> {
        let mut guard = self.write()?;
        let competition = guard
            .competitions
            .get_mut(id)
            .ok_or_else(|| missing_competition(id))?;
        competition.winners = winners.to_vec();
        Ok(())
    }

    fn set_status(
        &self,
        id: &CompetitionId,
        expected: CompetitionStatus,
        status: CompetitionStatus,
    ) -> Result<bool, StoreError> {
        let mut guard = self.write()?;
        let competition = guard
            .competitions
            .get_mut(id)
            .ok_or_else(|| missing_competition(id))?;
        if competition.status != expected || competition.status == CompetitionStatus::Completed {
            return Ok(false);
        }
        competition.status = status;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Rules, SleepMetrics};
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    fn make_record(user: &str, date: NaiveDate, score: u8) -> NightlyRecord {
        NightlyRecord {
            user_id: UserId::from(user),
            date,
            score,
            metrics: SleepMetrics::default(),
            tags: BTreeSet::new(),
            notes: String::new(),
        }
    }

    fn make_competition(id: &str, start_day: u32) -> Competition {
        Competition {
            id: CompetitionId::from(id),
            title: id.to_string(),
            description: String::new(),
            kind: "average_score".to_string(),
            start_date: Utc.with_ymd_and_hms(2024, 4, start_day, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            status: CompetitionStatus::Upcoming,
            rules: Rules::default(),
            prizes: Vec::new(),
            participants: BTreeSet::new(),
            winners: Vec::new(),
        }
    }

    #[test]
    fn test_range_is_inclusive_and_ascending() {
        let store = MemoryStore::new();
        for d in [5, 1, 3, 2, 4] {
            RecordRepository::put(&store, &make_record("u1", day(d), 70 + d as u8)).unwrap();
        }
        RecordRepository::put(&store, &make_record("u2", day(3), 99)).unwrap();

        let records = store.range(&UserId::from("u1"), day(2), day(4)).unwrap();
        let dates: Vec<NaiveDate> = records.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day(2), day(3), day(4)]);
        assert_eq!(store.count(&UserId::from("u1")).unwrap(), 5);
        assert!(store.range(&UserId::from("u1"), day(4), day(2)).unwrap().is_empty());
    }

    #[test]
    fn test_put_replaces_same_day() {
        let store = MemoryStore::new();
        RecordRepository::put(&store, &make_record("u1", day(1), 60)).unwrap();
        RecordRepository::put(&store, &make_record("u1", day(1), 90)).unwrap();

        assert_eq!(store.count(&UserId::from("u1")).unwrap(), 1);
        let record = RecordRepository::get(&store, &UserId::from("u1"), day(1))
            .unwrap()
            .unwrap();
        assert_eq!(record.score, 90);
    }

    #[test]
    fn test_participant_set_semantics() {
        let store = MemoryStore::new();
        CompetitionRepository::insert(&store, &make_competition("c1", 1)).unwrap();
        let id = CompetitionId::from("c1");
        let user = UserId::from("u1");

        assert!(store.add_participant(&id, &user).unwrap());
        assert!(!store.add_participant(&id, &user).unwrap());
        assert!(store.remove_participant(&id, &user).unwrap());
        assert!(!store.remove_participant(&id, &user).unwrap());
    }

    #[test]
    fn test_mutating_missing_documents_fails() {
        let store = MemoryStore::new();
        let err = store
            .add_participant(&CompetitionId::from("nope"), &UserId::from("u1"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing(_)));

        let err = store
            .add_won(&UserId::from("ghost"), &CompetitionId::from("c1"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing(_)));
    }

    #[test]
    fn test_list_orders_by_start_and_filters() {
        let store = MemoryStore::new();
        let mut late = make_competition("late", 20);
        late.status = CompetitionStatus::Active;
        CompetitionRepository::insert(&store, &late).unwrap();
        CompetitionRepository::insert(&store, &make_competition("early", 2)).unwrap();

        let all: Vec<String> = store
            .list(None)
            .unwrap()
            .into_iter()
            .map(|c| c.id.to_string())
            .collect();
        assert_eq!(all, vec!["early", "late"]);

        let active = store.list(Some(CompetitionStatus::Active)).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, CompetitionId::from("late"));
    }

    #[test]
    fn test_update_keeps_membership() {
        let store = MemoryStore::new();
        CompetitionRepository::insert(&store, &make_competition("c1", 1)).unwrap();
        let id = CompetitionId::from("c1");
        store.add_participant(&id, &UserId::from("u1")).unwrap();

        let mut edited = make_competition("c1", 1);
        edited.title = "Renamed".to_string();
        CompetitionRepository::update(&store, &edited).unwrap();

        let stored = CompetitionRepository::get(&store, &id).unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");
        assert!(stored.has_participant(&UserId::from("u1")));
    }

    #[test]
    fn test_set_status_compares_before_writing() {
        let store = MemoryStore::new();
        CompetitionRepository::insert(&store, &make_competition("c1", 1)).unwrap();
        let id = CompetitionId::from("c1");

        // stale expectation
        assert!(!store
            .set_status(&id, CompetitionStatus::Active, CompetitionStatus::Completed)
            .unwrap());
        assert!(store
            .set_status(&id, CompetitionStatus::Upcoming, CompetitionStatus::Completed)
            .unwrap());
        // completed never moves
        assert!(!store
            .set_status(&id, CompetitionStatus::Completed, CompetitionStatus::Active)
            .unwrap());

        let stored = CompetitionRepository::get(&store, &id).unwrap().unwrap();
        assert_eq!(stored.status, CompetitionStatus::Completed);
        assert!(matches!(
            store.set_status(
                &CompetitionId::from("nope"),
                CompetitionStatus::Upcoming,
                CompetitionStatus::Active
            ),
            Err(StoreError::Missing(_))
        ));
    }
}
