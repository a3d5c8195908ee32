//! Competition membership state machine
//!
//! Membership is recorded twice: in the competition's `participants` set and
//! in the user's `competitions.participating` set. The repositories offer no
//! cross-document transaction, so every transition writes the competition
//! side first and the user side second:
//!
//! - If the user-side write fails, the competition-side write is reverted
//!   before the error is returned.
//! - If the revert fails as well, the pair is left asymmetric and logged.
//!   [`MembershipStateMachine::reconcile_competition`] and
//!   [`MembershipStateMachine::reconcile_user`] heal it, treating the
//!   competition's `participants` set as authoritative.
//!
//! A `completed` competition accepts neither joins nor leaves.

use crate::competitions::load_competition;
use crate::config::CompetitionsConfig;
use crate::eligibility::{CandidateHistory, Eligibility, EligibilityEvaluator};
use crate::error::LeagueError;
use crate::store::{CompetitionRepository, LogStoreFailure, RecordRepository, UserRepository};
use crate::types::{Competition, CompetitionId, CompetitionStatus, User, UserId, Winner};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

/// One fix applied by a reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    /// Competition added to the user's `participating` set
    LinkedUser {
        user_id: UserId,
        competition_id: CompetitionId,
    },
    /// Competition removed from the user's `participating` set
    UnlinkedUser {
        user_id: UserId,
        competition_id: CompetitionId,
    },
    /// Participant whose user document no longer exists
    DroppedParticipant {
        user_id: UserId,
        competition_id: CompetitionId,
    },
}

/// Outcome of a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub repairs: Vec<Repair>,
}

impl RepairReport {
    /// True when nothing needed fixing
    pub fn is_clean(&self) -> bool {
        self.repairs.is_empty()
    }
}

/// Governs join, leave and winner recording
pub struct MembershipStateMachine {
    competitions: Arc<dyn CompetitionRepository>,
    users: Arc<dyn UserRepository>,
    records: Arc<dyn RecordRepository>,
    config: CompetitionsConfig,
}

impl MembershipStateMachine {
    pub fn new(
        competitions: Arc<dyn CompetitionRepository>,
        users: Arc<dyn UserRepository>,
        records: Arc<dyn RecordRepository>,
        config: CompetitionsConfig,
    ) -> Self {
        Self {
            competitions,
            users,
            records,
            config,
        }
    }

    /// Move `user_id` from not-joined to joined.
    ///
    /// A second join without an intervening leave is rejected, not ignored.
    pub fn join(
        &self,
        user_id: &UserId,
        competition_id: &CompetitionId,
        now: DateTime<Utc>,
    ) -> Result<(), LeagueError> {
        let competition = self.load(competition_id, now)?;

        if competition.status == CompetitionStatus::Completed {
            return Err(LeagueError::Conflict(
                "Cannot join a completed competition".to_string(),
            ));
        }
        if competition.has_participant(user_id) {
            return Err(already_joined());
        }

        let user = self.load_user(user_id)?;
        let history = StoredHistory {
            records: self.records.as_ref(),
            user: &user,
        };
        if let Eligibility::Ineligible(reason) =
            EligibilityEvaluator::evaluate(competition.eligibility(), &history, now)?
        {
            tracing::info!(
                user_id = %user_id,
                competition_id = %competition_id,
                reason = %reason,
                "join rejected by eligibility"
            );
            return Err(LeagueError::Ineligible(reason));
        }

        // A concurrent join may have landed since the read above
        if !self
            .competitions
            .add_participant(competition_id, user_id)
            .log_membership("add participant", user_id, competition_id)?
        {
            return Err(already_joined());
        }

        if let Err(e) = self.users.add_participating(user_id, competition_id) {
            tracing::warn!(
                user_id = %user_id,
                competition_id = %competition_id,
                error = %e,
                "user-side join write failed, reverting participant"
            );
            if let Err(revert) = self.competitions.remove_participant(competition_id, user_id) {
                tracing::error!(
                    user_id = %user_id,
                    competition_id = %competition_id,
                    error = %revert,
                    "membership left asymmetric, reconcile competition"
                );
            }
            return Err(e.into());
        }

        tracing::info!(user_id = %user_id, competition_id = %competition_id, "user joined competition");
        Ok(())
    }

    /// Move `user_id` from joined to not-joined
    pub fn leave(
        &self,
        user_id: &UserId,
        competition_id: &CompetitionId,
        now: DateTime<Utc>,
    ) -> Result<(), LeagueError> {
        let competition = self.load(competition_id, now)?;

        if competition.status == CompetitionStatus::Completed {
            return Err(LeagueError::Conflict(
                "Cannot leave a completed competition".to_string(),
            ));
        }
        if !competition.has_participant(user_id) {
            return Err(not_joined());
        }
        self.load_user(user_id)?;

        if !self
            .competitions
            .remove_participant(competition_id, user_id)
            .log_membership("remove participant", user_id, competition_id)?
        {
            return Err(not_joined());
        }

        if let Err(e) = self.users.remove_participating(user_id, competition_id) {
            tracing::warn!(
                user_id = %user_id,
                competition_id = %competition_id,
                error = %e,
                "user-side leave write failed, restoring participant"
            );
            if let Err(revert) = self.competitions.add_participant(competition_id, user_id) {
                tracing::error!(
                    user_id = %user_id,
                    competition_id = %competition_id,
                    error = %revert,
                    "membership left asymmetric, reconcile user"
                );
            }
            return Err(e.into());
        }

        tracing::info!(user_id = %user_id, competition_id = %competition_id, "user left competition");
        Ok(())
    }

    /// Overwrite the winner list of a completed competition and add the
    /// competition to each winner's `won` set.
    ///
    /// Each user may appear once. Every winner is attempted even if one
    /// update fails; the first failure is returned. Re-running with the same
    /// list is harmless.
    pub fn record_winners(
        &self,
        competition_id: &CompetitionId,
        winners: Vec<Winner>,
        now: DateTime<Utc>,
    ) -> Result<Competition, LeagueError> {
        check_winners(&winners)?;
        let mut competition = self.load(competition_id, now)?;

        if competition.status != CompetitionStatus::Completed {
            return Err(LeagueError::Conflict(
                "Can only set winners for completed competitions".to_string(),
            ));
        }

        self.competitions
            .set_winners(competition_id, &winners)
            .log_competition("set winners", competition_id)?;

        let mut first_error = None;
        for winner in &winners {
            if let Err(e) = self.users.add_won(&winner.user_id, competition_id) {
                tracing::error!(
                    user_id = %winner.user_id,
                    competition_id = %competition_id,
                    error = %e,
                    "failed to record win on user"
                );
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e.into());
        }

        tracing::info!(
            competition_id = %competition_id,
            winners = winners.len(),
            "competition winners recorded"
        );
        competition.winners = winners;
        Ok(competition)
    }

    /// Make every participant's user document list this competition.
    ///
    /// Meant for operator or background runs. Each participant is re-checked
    /// against the stored competition right before linking, so a leave that
    /// commits mid-pass is not undone.
    pub fn reconcile_competition(
        &self,
        competition_id: &CompetitionId,
    ) -> Result<RepairReport, LeagueError> {
        let competition = self
            .competitions
            .get(competition_id)
            .log_competition("get competition", competition_id)?
            .ok_or_else(|| LeagueError::NotFound("Competition not found".to_string()))?;

        let mut report = RepairReport::default();
        for user_id in &competition.participants {
            let Some(user) = self.users.get(user_id).log_user("get user", user_id)? else {
                self.competitions
                    .remove_participant(competition_id, user_id)
                    .log_membership("remove participant", user_id, competition_id)?;
                report.repairs.push(Repair::DroppedParticipant {
                    user_id: user_id.clone(),
                    competition_id: competition_id.clone(),
                });
                continue;
            };

            if user.competitions.participating.contains(competition_id)
                || !self.is_listed(competition_id, user_id)?
            {
                continue;
            }
            if self
                .users
                .add_participating(user_id, competition_id)
                .log_membership("add participating", user_id, competition_id)?
            {
                report.repairs.push(Repair::LinkedUser {
                    user_id: user_id.clone(),
                    competition_id: competition_id.clone(),
                });
            }
        }

        log_report(&report);
        Ok(report)
    }

    /// Drop competitions from the user's `participating` set that do not
    /// list the user as a participant
    pub fn reconcile_user(&self, user_id: &UserId) -> Result<RepairReport, LeagueError> {
        let user = self.load_user(user_id)?;

        let mut report = RepairReport::default();
        for competition_id in &user.competitions.participating {
            if self.is_listed(competition_id, user_id)? {
                continue;
            }
            if self
                .users
                .remove_participating(user_id, competition_id)
                .log_membership("remove participating", user_id, competition_id)?
            {
                report.repairs.push(Repair::UnlinkedUser {
                    user_id: user_id.clone(),
                    competition_id: competition_id.clone(),
                });
            }
        }

        log_report(&report);
        Ok(report)
    }

    fn load(&self, id: &CompetitionId, now: DateTime<Utc>) -> Result<Competition, LeagueError> {
        load_competition(
            self.competitions.as_ref(),
            id,
            now,
            self.config.refresh_status_on_read,
        )
    }

    fn load_user(&self, user_id: &UserId) -> Result<User, LeagueError> {
        self.users
            .get(user_id)
            .log_user("get user", user_id)?
            .ok_or_else(|| LeagueError::NotFound("User not found".to_string()))
    }

    /// Whether the stored competition currently lists `user_id`
    fn is_listed(&self, competition_id: &CompetitionId, user_id: &UserId) -> Result<bool, LeagueError> {
        Ok(self
            .competitions
            .get(competition_id)
            .log_competition("get competition", competition_id)?
            .is_some_and(|c| c.has_participant(user_id)))
    }
}

/// Winner entries need a distinct, non-empty `userId`
fn check_winners(winners: &[Winner]) -> Result<(), LeagueError> {
    let mut seen = BTreeSet::new();
    for winner in winners {
        if winner.user_id.as_str().trim().is_empty() {
            return Err(LeagueError::Validation(
                "Every winner needs a userId".to_string(),
            ));
        }
        if !seen.insert(&winner.user_id) {
            return Err(LeagueError::Validation(format!(
                "Duplicate winner {}",
                winner.user_id
            )));
        }
    }
    Ok(())
}

/// Candidate history backed by the record store
struct StoredHistory<'a> {
    records: &'a dyn RecordRepository,
    user: &'a User,
}

impl CandidateHistory for StoredHistory<'_> {
    fn tracked_nights(&self) -> Result<usize, LeagueError> {
        Ok(self
            .records
            .count(&self.user.id)
            .log_user("count records", &self.user.id)?)
    }

    fn member_since(&self) -> Result<DateTime<Utc>, LeagueError> {
        Ok(self.user.created_at)
    }
}

fn already_joined() -> LeagueError {
    LeagueError::Conflict("You are already a participant in this competition".to_string())
}

fn not_joined() -> LeagueError {
    LeagueError::Conflict("You are not a participant in this competition".to_string())
}

fn log_report(report: &RepairReport) {
    for repair in &report.repairs {
        tracing::warn!(?repair, "membership repaired");
    }
}
