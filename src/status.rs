//! Competition lifecycle status
//!
//! Status is a pure function of the competition window and the current time.
//! It is recomputed whenever a competition is written and, when
//! `competitions.refresh_status_on_read` is enabled, whenever it is read.
//! There is no background sweep: a competition nobody touches keeps its last
//! stored status until the next read or write.

use crate::types::{Competition, CompetitionStatus};
use chrono::{DateTime, Utc};

/// Derive status from the window `[start, end)` and `now`
pub fn derive_status(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> CompetitionStatus {
    if now < start {
        CompetitionStatus::Upcoming
    } else if now < end {
        CompetitionStatus::Active
    } else {
        CompetitionStatus::Completed
    }
}

/// Bring a competition's stored status in line with `now`.
///
/// `Completed` is terminal and never reverts. Returns whether the status
/// changed, so callers know to persist it.
pub fn refresh_status(competition: &mut Competition, now: DateTime<Utc>) -> bool {
    if competition.status == CompetitionStatus::Completed {
        return false;
    }

    let derived = derive_status(competition.start_date, competition.end_date, now);
    if derived == competition.status {
        return false;
    }

    tracing::debug!(
        competition_id = %competition.id,
        from = %competition.status,
        to = %derived,
        "competition status changed"
    );
    competition.status = derived;
    true
}
