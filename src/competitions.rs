//! Competition registry service
//!
//! Creates, edits and reads competitions. Status is derived from the window
//! on every write and, when configured, on every read (see [`crate::status`]).
//! Membership changes live in [`crate::membership`].

use crate::config::CompetitionsConfig;
use crate::error::LeagueError;
use crate::schema::parse_instant;
use crate::status::{derive_status, refresh_status};
use crate::store::{CompetitionRepository, LogStoreFailure, UserRepository};
use crate::types::{Competition, CompetitionId, CompetitionStatus, Prize, Rules, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Fields supplied when creating a competition
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitionDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    /// RFC 3339 instant or YYYY-MM-DD (midnight UTC)
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub rules: Option<Rules>,
    #[serde(default)]
    pub prizes: Option<Vec<Prize>>,
}

/// Fields that may change on an existing competition. Empty strings are
/// treated as absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitionPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub rules: Option<Rules>,
    pub prizes: Option<Vec<Prize>>,
}

/// A user's competitions, resolved to full documents
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserCompetitionsView {
    pub participating: Vec<Competition>,
    pub won: Vec<Competition>,
}

/// Read and write access to competition definitions
pub struct CompetitionService {
    competitions: Arc<dyn CompetitionRepository>,
    users: Arc<dyn UserRepository>,
    config: CompetitionsConfig,
}

impl CompetitionService {
    pub fn new(
        competitions: Arc<dyn CompetitionRepository>,
        users: Arc<dyn UserRepository>,
        config: CompetitionsConfig,
    ) -> Self {
        Self {
            competitions,
            users,
            config,
        }
    }

    pub fn create(
        &self,
        draft: CompetitionDraft,
        now: DateTime<Utc>,
    ) -> Result<Competition, LeagueError> {
        if [&draft.title, &draft.description, &draft.kind, &draft.start_date, &draft.end_date]
            .iter()
            .any(|field| field.trim().is_empty())
        {
            return Err(LeagueError::Validation("Missing required fields".to_string()));
        }

        let start_date = parse_instant(&draft.start_date)?;
        let end_date = parse_instant(&draft.end_date)?;
        check_window(start_date, end_date)?;

        let competition = Competition {
            id: CompetitionId::generate(),
            title: draft.title,
            description: draft.description,
            kind: draft.kind,
            start_date,
            end_date,
            status: derive_status(start_date, end_date, now),
            rules: draft.rules.unwrap_or_default(),
            prizes: draft.prizes.unwrap_or_default(),
            participants: BTreeSet::new(),
            winners: Vec::new(),
        };

        self.competitions
            .insert(&competition)
            .log_competition("insert competition", &competition.id)?;
        tracing::info!(
            competition_id = %competition.id,
            status = %competition.status,
            "competition created"
        );
        Ok(competition)
    }

    pub fn update(
        &self,
        id: &CompetitionId,
        patch: CompetitionPatch,
        now: DateTime<Utc>,
    ) -> Result<Competition, LeagueError> {
        let mut competition = self.get(id, now)?;

        if competition.status == CompetitionStatus::Completed {
            return Err(LeagueError::Conflict(
                "Cannot update a completed competition".to_string(),
            ));
        }

        if let Some(title) = non_empty(patch.title) {
            competition.title = title;
        }
        if let Some(description) = non_empty(patch.description) {
            competition.description = description;
        }
        if let Some(kind) = non_empty(patch.kind) {
            competition.kind = kind;
        }
        if let Some(start) = non_empty(patch.start_date) {
            competition.start_date = parse_instant(&start)?;
        }
        if let Some(end) = non_empty(patch.end_date) {
            competition.end_date = parse_instant(&end)?;
        }
        if let Some(rules) = patch.rules {
            competition.rules = rules;
        }
        if let Some(prizes) = patch.prizes {
            competition.prizes = prizes;
        }

        check_window(competition.start_date, competition.end_date)?;
        competition.status = derive_status(competition.start_date, competition.end_date, now);

        self.competitions
            .update(&competition)
            .log_competition("update competition", &competition.id)?;
        tracing::info!(
            competition_id = %competition.id,
            status = %competition.status,
            "competition updated"
        );
        Ok(competition)
    }

    pub fn get(&self, id: &CompetitionId, now: DateTime<Utc>) -> Result<Competition, LeagueError> {
        load_competition(
            self.competitions.as_ref(),
            id,
            now,
            self.config.refresh_status_on_read,
        )
    }

    /// Competitions ordered by start date, optionally with a given status
    pub fn list(
        &self,
        status: Option<CompetitionStatus>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Competition>, LeagueError> {
        if !self.config.refresh_status_on_read {
            return Ok(self.competitions.list(status).logged("list competitions")?);
        }

        let mut competitions = self.competitions.list(None).logged("list competitions")?;
        for competition in competitions.iter_mut() {
            persist_status(self.competitions.as_ref(), competition, now)?;
        }
        competitions.retain(|c| status.map_or(true, |s| c.status == s));
        Ok(competitions)
    }

    /// Competitions the user participates in and has won. Ids that no longer
    /// resolve are skipped.
    pub fn user_competitions(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<UserCompetitionsView, LeagueError> {
        let user = self
            .users
            .get(user_id)
            .log_user("get user", user_id)?
            .ok_or_else(|| LeagueError::NotFound("User not found".to_string()))?;

        Ok(UserCompetitionsView {
            participating: self.resolve(&user.competitions.participating, now)?,
            won: self.resolve(&user.competitions.won, now)?,
        })
    }

    fn resolve(
        &self,
        ids: &BTreeSet<CompetitionId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Competition>, LeagueError> {
        let mut resolved = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get(id, now) {
                Ok(competition) => resolved.push(competition),
                Err(LeagueError::NotFound(_)) => {
                    tracing::debug!(competition_id = %id, "skipping dangling competition reference");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(resolved)
    }
}

/// Fetch a competition, optionally bringing its status up to date with
/// `now` and persisting the change.
pub(crate) fn load_competition(
    repo: &dyn CompetitionRepository,
    id: &CompetitionId,
    now: DateTime<Utc>,
    refresh: bool,
) -> Result<Competition, LeagueError> {
    let mut competition = repo
        .get(id)
        .log_competition("get competition", id)?
        .ok_or_else(|| LeagueError::NotFound("Competition not found".to_string()))?;

    if refresh {
        persist_status(repo, &mut competition, now)?;
    }
    Ok(competition)
}

/// Refresh the status of a competition read from `repo` and store only the
/// status field. If the stored status moved since the read, the stored
/// document replaces `competition`.
fn persist_status(
    repo: &dyn CompetitionRepository,
    competition: &mut Competition,
    now: DateTime<Utc>,
) -> Result<(), LeagueError> {
    let stored = competition.status;
    if !refresh_status(competition, now) {
        return Ok(());
    }

    let id = competition.id.clone();
    if repo
        .set_status(&id, stored, competition.status)
        .log_competition("set competition status", &id)?
    {
        return Ok(());
    }

    tracing::debug!(competition_id = %id, "status changed concurrently, re-reading");
    if let Some(mut current) = repo.get(&id).log_competition("get competition", &id)? {
        refresh_status(&mut current, now);
        *competition = current;
    }
    Ok(())
}

fn check_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), LeagueError> {
    if end < start {
        return Err(LeagueError::Validation(
            "End date must be after start date".to_string(),
        ));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use crate::types::{User, Winner};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn service(store: &Arc<MemoryStore>, refresh: bool) -> CompetitionService {
        CompetitionService::new(
            store.clone(),
            store.clone(),
            CompetitionsConfig {
                refresh_status_on_read: refresh,
            },
        )
    }

    fn draft(start: DateTime<Utc>, end: DateTime<Utc>) -> CompetitionDraft {
        CompetitionDraft {
            title: "Summer Sleep-Off".to_string(),
            description: "Highest average score wins".to_string(),
            kind: "average_score".to_string(),
            start_date: start.to_rfc3339(),
            end_date: end.to_rfc3339(),
            rules: None,
            prizes: None,
        }
    }

    #[test]
    fn test_create_derives_status() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store, true);
        let day = Duration::days(1);

        let upcoming = service.create(draft(now() + day, now() + day * 8), now()).unwrap();
        let active = service.create(draft(now() - day, now() + day), now()).unwrap();
        let done = service.create(draft(now() - day * 9, now() - day), now()).unwrap();

        assert_eq!(upcoming.status, CompetitionStatus::Upcoming);
        assert_eq!(active.status, CompetitionStatus::Active);
        assert_eq!(done.status, CompetitionStatus::Completed);
        assert!(upcoming.participants.is_empty());
        assert_eq!(service.get(&active.id, now()).unwrap(), active);
    }

    #[test]
    fn test_create_validation() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store, true);

        let mut missing = draft(now(), now() + Duration::days(1));
        missing.title = String::new();
        assert!(matches!(
            service.create(missing, now()),
            Err(LeagueError::Validation(msg)) if msg == "Missing required fields"
        ));

        let mut garbled = draft(now(), now() + Duration::days(1));
        garbled.start_date = "next tuesday".to_string();
        assert!(matches!(
            service.create(garbled, now()),
            Err(LeagueError::Validation(_))
        ));

        let backwards = draft(now(), now() - Duration::days(1));
        assert!(matches!(
            service.create(backwards, now()),
            Err(LeagueError::Validation(msg)) if msg == "End date must be after start date"
        ));

        assert!(store.list(None).unwrap().is_empty());
    }

    #[test]
    fn test_create_accepts_bare_dates() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store, true);

        let mut plain = draft(now(), now());
        plain.start_date = "2024-07-01".to_string();
        plain.end_date = "2024-07-31".to_string();

        let competition = service.create(plain, now()).unwrap();
        assert_eq!(
            competition.start_date,
            Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(competition.status, CompetitionStatus::Upcoming);
    }

    #[test]
    fn test_update_recomputes_status() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store, true);
        let day = Duration::days(1);
        let competition = service.create(draft(now() + day, now() + day * 8), now()).unwrap();

        let updated = service
            .update(
                &competition.id,
                CompetitionPatch {
                    title: Some("Renamed".to_string()),
                    description: Some(String::new()),
                    start_date: Some((now() - day).to_rfc3339()),
                    ..Default::default()
                },
                now(),
            )
            .unwrap();

        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.description, competition.description);
        assert_eq!(updated.status, CompetitionStatus::Active);
        assert_eq!(service.get(&competition.id, now()).unwrap(), updated);
    }

    #[test]
    fn test_update_rejects_completed_and_bad_window() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store, true);
        let day = Duration::days(1);

        let done = service.create(draft(now() - day * 9, now() - day), now()).unwrap();
        assert!(matches!(
            service.update(&done.id, CompetitionPatch::default(), now()),
            Err(LeagueError::Conflict(msg)) if msg == "Cannot update a completed competition"
        ));

        let open = service.create(draft(now() + day, now() + day * 8), now()).unwrap();
        let patch = CompetitionPatch {
            end_date: Some(now().to_rfc3339()),
            ..Default::default()
        };
        assert!(matches!(
            service.update(&open.id, patch, now()),
            Err(LeagueError::Validation(_))
        ));

        assert!(matches!(
            service.update(&CompetitionId::from("missing"), CompetitionPatch::default(), now()),
            Err(LeagueError::NotFound(_))
        ));
    }

    #[test]
    fn test_read_refreshes_stale_status() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store, true);
        let day = Duration::days(1);
        let created = service.create(draft(now() - day, now() + day), now()).unwrap();

        let later = now() + day * 2;
        let read = service.get(&created.id, later).unwrap();
        assert_eq!(read.status, CompetitionStatus::Completed);

        // the refreshed status was persisted
        let stored = CompetitionRepository::get(store.as_ref(), &created.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, CompetitionStatus::Completed);
    }

    #[test]
    fn test_stale_status_kept_when_refresh_disabled() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store, false);
        let day = Duration::days(1);
        let created = service.create(draft(now() - day, now() + day), now()).unwrap();

        let later = now() + day * 2;
        assert_eq!(
            service.get(&created.id, later).unwrap().status,
            CompetitionStatus::Active
        );
        assert_eq!(
            service.list(Some(CompetitionStatus::Active), later).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_list_filters_after_refresh() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store, true);
        let day = Duration::days(1);
        let first = service.create(draft(now() - day * 3, now() + day), now()).unwrap();
        let second = service.create(draft(now() - day, now() + day * 10), now()).unwrap();

        let later = now() + day * 2;
        let active = service.list(Some(CompetitionStatus::Active), later).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);

        let all: Vec<CompetitionId> = service
            .list(None, later)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(all, vec![first.id, second.id]);
    }

    #[test]
    fn test_user_competitions_skips_dangling_ids() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store, true);
        let day = Duration::days(1);
        let competition = service.create(draft(now() - day, now() + day), now()).unwrap();

        let user = User::new("u1", now() - day * 100);
        UserRepository::insert(store.as_ref(), &user).unwrap();
        store.add_participating(&user.id, &competition.id).unwrap();
        store
            .add_participating(&user.id, &CompetitionId::from("deleted"))
            .unwrap();

        let view = service.user_competitions(&user.id, now()).unwrap();
        assert_eq!(view.participating, vec![competition]);
        assert!(view.won.is_empty());

        assert!(matches!(
            service.user_competitions(&UserId::from("ghost"), now()),
            Err(LeagueError::NotFound(_))
        ));
    }

    /// Applies an admin edit straight after the first read
    struct EditDuringRead {
        inner: Arc<MemoryStore>,
        armed: AtomicBool,
    }

    impl CompetitionRepository for EditDuringRead {
        fn get(&self, id: &CompetitionId) -> Result<Option<Competition>, StoreError> {
            let found = CompetitionRepository::get(self.inner.as_ref(), id)?;
            if self.armed.swap(false, Ordering::SeqCst) {
                if let Some(mut edited) = found.clone() {
                    edited.title = "Edited by admin".to_string();
                    CompetitionRepository::update(self.inner.as_ref(), &edited)?;
                }
            }
            Ok(found)
        }

        fn list(&self, status: Option<CompetitionStatus>) -> Result<Vec<Competition>, StoreError> {
            self.inner.list(status)
        }

        fn insert(&self, competition: &Competition) -> Result<(), StoreError> {
            CompetitionRepository::insert(self.inner.as_ref(), competition)
        }

        fn update(&self, competition: &Competition) -> Result<(), StoreError> {
            CompetitionRepository::update(self.inner.as_ref(), competition)
        }

        fn add_participant(&self, id: &CompetitionId, user_id: &UserId) -> Result<bool, StoreError> {
            self.inner.add_participant(id, user_id)
        }

        fn remove_participant(
            &self,
            id: &CompetitionId,
            user_id: &UserId,
        ) -> Result<bool, StoreError> {
            self.inner.remove_participant(id, user_id)
        }

        fn set_winners(&self, id: &CompetitionId, winners: &[Winner]) -> Result<(), StoreError> {
            self.inner.set_winners(id, winners)
        }

        fn set_status(
            &self,
            id: &CompetitionId,
            expected: CompetitionStatus,
            status: CompetitionStatus,
        ) -> Result<bool, StoreError> {
            self.inner.set_status(id, expected, status)
        }
    }

    #[test]
    fn test_status_refresh_keeps_concurrent_edit() {
        let store = Arc::new(MemoryStore::new());
        let day = Duration::days(1);
        let created = service(&store, true)
            .create(draft(now() + day, now() + day * 8), now())
            .unwrap();

        let racy = Arc::new(EditDuringRead {
            inner: store.clone(),
            armed: AtomicBool::new(true),
        });
        let reader = CompetitionService::new(racy, store.clone(), CompetitionsConfig::default());

        let read = reader.get(&created.id, now() + day * 2).unwrap();
        assert_eq!(read.status, CompetitionStatus::Active);

        let stored = CompetitionRepository::get(store.as_ref(), &created.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.title, "Edited by admin");
        assert_eq!(stored.status, CompetitionStatus::Active);
    }
}
