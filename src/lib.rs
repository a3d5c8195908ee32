//! Sleep League - sleep metrics aggregation and competition membership engine
//!
//! Turns a user's nightly sleep records into a cached summary (averages,
//! weekly and monthly trends, extremes, improvement) and governs competition
//! lifecycle: status from the time window, eligibility, join/leave and
//! winner recording.
//!
//! ## Modules
//!
//! - **Metrics**: [`aggregator`] computes summaries, [`summary`] caches them,
//!   [`sleep`] serves and syncs nightly records
//! - **Competitions**: [`status`], [`eligibility`], [`competitions`] and the
//!   [`membership`] state machine
//! - **Storage**: repository traits and an in-memory backend in [`store`]

pub mod aggregator;
pub mod competitions;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod membership;
pub mod schema;
pub mod sleep;
pub mod status;
pub mod store;
pub mod summary;
pub mod types;

pub use aggregator::MetricsAggregator;
pub use competitions::CompetitionService;
pub use config::LeagueConfig;
pub use eligibility::{Eligibility, EligibilityEvaluator};
pub use error::{LeagueError, StoreError};
pub use membership::{MembershipStateMachine, RepairReport};
pub use sleep::SleepLog;
pub use status::derive_status;
pub use summary::SummaryCache;

// Schema exports
pub use schema::{RawNightlyRecord, RecordAdapter};

/// Engine version
pub const LEAGUE_VERSION: &str = env!("CARGO_PKG_VERSION");
