//! Competition eligibility
//!
//! Evaluates a competition's criteria against a candidate's history. Checks
//! run in a fixed order and stop at the first failure; a criterion that is
//! not set is skipped. History is pulled lazily so a skipped check never
//! touches storage.

use crate::error::LeagueError;
use crate::types::EligibilityCriteria;
use chrono::{DateTime, Utc};

/// Outcome of an eligibility check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// Unmet criterion, worded for the end user
    Ineligible(String),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// Facts about a candidate that criteria are checked against
pub trait CandidateHistory {
    /// Number of nights the candidate has tracked
    fn tracked_nights(&self) -> Result<usize, LeagueError>;

    /// When the candidate's account was created
    fn member_since(&self) -> Result<DateTime<Utc>, LeagueError>;
}

/// Stateless evaluator over [`EligibilityCriteria`]
pub struct EligibilityEvaluator;

impl EligibilityEvaluator {
    pub fn evaluate(
        criteria: Option<&EligibilityCriteria>,
        history: &dyn CandidateHistory,
        now: DateTime<Utc>,
    ) -> Result<Eligibility, LeagueError> {
        let Some(criteria) = criteria else {
            return Ok(Eligibility::Eligible);
        };

        if let Some(required) = criteria.minimum_tracked_nights {
            let tracked = history.tracked_nights()?;
            if tracked < required as usize {
                return Ok(Eligibility::Ineligible(format!(
                    "You need at least {} tracked nights to join this competition",
                    required
                )));
            }
        }

        if let Some(required) = criteria.minimum_tenure_days {
            let tenure_days = (now - history.member_since()?).num_days();
            if tenure_days < i64::from(required) {
                return Ok(Eligibility::Ineligible(format!(
                    "You need to be a member for at least {} days to join this competition",
                    required
                )));
            }
        }

        Ok(Eligibility::Eligible)
    }
}
