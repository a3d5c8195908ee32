//! Core types for Sleep League
//!
//! This module defines the documents the engine reads and writes: nightly
//! sleep records, the derived sleep summary, competitions, and the slice of
//! the user document that carries competition membership.
//!
//! Field names serialize in camelCase; clients render these documents
//! verbatim.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identifier of a registered user
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId(s.to_string())
    }
}

/// Identifier of a competition
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompetitionId(String);

impl CompetitionId {
    pub fn new(id: impl Into<String>) -> Self {
        CompetitionId(id.into())
    }

    /// Allocate a fresh random identifier
    pub fn generate() -> Self {
        CompetitionId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompetitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CompetitionId {
    fn from(s: &str) -> Self {
        CompetitionId(s.to_string())
    }
}

/// Heart rate during the sleep period (bpm)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRate {
    pub avg: f64,
    pub lowest: f64,
}

/// Biometric measurements attached to one night
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_sleep_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub efficiency_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rem_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<HeartRate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hrv_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respiratory_rate: Option<f64>,
}

/// One user's sleep measurement for one calendar day.
///
/// `(user_id, date)` is the unique key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NightlyRecord {
    pub user_id: UserId,
    pub date: NaiveDate,
    /// Sleep score, 0-100
    pub score: u8,
    #[serde(default)]
    pub metrics: SleepMetrics,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub notes: String,
}

/// A numeric field that can be averaged across records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepField {
    Score,
    TotalSleepMinutes,
    EfficiencyPct,
    DeepMinutes,
    RemMinutes,
    LightMinutes,
    LatencyMinutes,
    HeartRateAvg,
    HeartRateLowest,
    HrvMs,
    RespiratoryRate,
}

impl SleepField {
    /// Read this field from a record, `None` when the record lacks it
    pub fn value(&self, record: &NightlyRecord) -> Option<f64> {
        let m = &record.metrics;
        match self {
            SleepField::Score => Some(f64::from(record.score)),
            SleepField::TotalSleepMinutes => m.total_sleep_minutes,
            SleepField::EfficiencyPct => m.efficiency_pct,
            SleepField::DeepMinutes => m.deep_minutes,
            SleepField::RemMinutes => m.rem_minutes,
            SleepField::LightMinutes => m.light_minutes,
            SleepField::LatencyMinutes => m.latency_minutes,
            SleepField::HeartRateAvg => m.heart_rate.map(|hr| hr.avg),
            SleepField::HeartRateLowest => m.heart_rate.map(|hr| hr.lowest),
            SleepField::HrvMs => m.hrv_ms,
            SleepField::RespiratoryRate => m.respiratory_rate,
        }
    }
}

/// Mean score over the standard windows
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAverage {
    pub current_month: f64,
    pub previous_month: f64,
    pub overall: f64,
}

/// Mean score of one ISO week (Monday start)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyBucket {
    pub week_start: NaiveDate,
    pub average: f64,
}

/// Mean score of one calendar month, keyed `YYYY-MM`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBucket {
    pub month: String,
    pub average: f64,
}

/// Coarse trend deltas
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    pub monthly: f64,
    pub overall: f64,
}

/// Rolling statistics derived from all of one user's nightly records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepSummary {
    pub user_id: UserId,
    pub daily_average: DailyAverage,
    pub weekly_trend: Vec<WeeklyBucket>,
    pub monthly_trend: Vec<MonthlyBucket>,
    /// Highest score seen, 0 when there is no data
    pub best_score: u8,
    /// Lowest score seen, 100 when there is no data
    pub worst_score: u8,
    pub improvement: Improvement,
    pub last_updated: DateTime<Utc>,
}

impl SleepSummary {
    /// False when the extremes are the "no data" sentinel pair
    pub fn has_data(&self) -> bool {
        self.best_score >= self.worst_score
    }
}

/// Lifecycle state of a competition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompetitionStatus {
    Upcoming,
    Active,
    Completed,
}

impl CompetitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompetitionStatus::Upcoming => "upcoming",
            CompetitionStatus::Active => "active",
            CompetitionStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for CompetitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preconditions gating competition entry. Absent fields are not checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_tracked_nights: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_tenure_days: Option<u32>,
}

/// Competition rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligibility_criteria: Option<EligibilityCriteria>,
    /// Free-form rule fields the engine does not interpret
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A prize entry, stored as supplied
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prize {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A winner entry. Only `userId` is interpreted; other fields are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Winner {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A time-boxed ranked event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Competition {
    pub id: CompetitionId,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: CompetitionStatus,
    #[serde(default)]
    pub rules: Rules,
    #[serde(default)]
    pub prizes: Vec<Prize>,
    #[serde(default)]
    pub participants: BTreeSet<UserId>,
    #[serde(default)]
    pub winners: Vec<Winner>,
}

impl Competition {
    pub fn has_participant(&self, user_id: &UserId) -> bool {
        self.participants.contains(user_id)
    }

    pub fn eligibility(&self) -> Option<&EligibilityCriteria> {
        self.rules.eligibility_criteria.as_ref()
    }
}

/// Sleep tracker link on the user document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLink {
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
}

/// Competition membership carried on the user document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserCompetitions {
    #[serde(default)]
    pub participating: BTreeSet<CompetitionId>,
    #[serde(default)]
    pub won: BTreeSet<CompetitionId>,
}

/// The parts of a user document the engine reads or writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub device: DeviceLink,
    #[serde(default)]
    pub competitions: UserCompetitions,
}

impl User {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: UserId::new(id),
            display_name: String::new(),
            created_at,
            device: DeviceLink::default(),
            competitions: UserCompetitions::default(),
        }
    }

    pub fn with_device_connected(mut self) -> Self {
        self.device.connected = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_summary_serializes_camel_case() {
        let summary = SleepSummary {
            user_id: UserId::from("u1"),
            daily_average: DailyAverage::default(),
            weekly_trend: vec![WeeklyBucket {
                week_start: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
                average: 81.5,
            }],
            monthly_trend: vec![],
            best_score: 0,
            worst_score: 100,
            improvement: Improvement::default(),
            last_updated: Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap(),
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["dailyAverage"]["currentMonth"], 0.0);
        assert_eq!(json["weeklyTrend"][0]["weekStart"], "2024-03-04");
        assert_eq!(json["bestScore"], 0);
        assert_eq!(json["worstScore"], 100);
        assert!(!summary.has_data());
    }

    #[test]
    fn test_competition_round_trips_free_form_rules() {
        let json = r#"{
            "id": "c1",
            "title": "March Madness",
            "description": "Best average score wins",
            "type": "average_score",
            "startDate": "2024-03-01T00:00:00Z",
            "endDate": "2024-04-01T00:00:00Z",
            "status": "active",
            "rules": {
                "eligibilityCriteria": { "minimumTrackedNights": 5 },
                "scoring": "mean"
            }
        }"#;

        let competition: Competition = serde_json::from_str(json).unwrap();
        assert_eq!(competition.kind, "average_score");
        assert_eq!(
            competition.eligibility().and_then(|c| c.minimum_tracked_nights),
            Some(5)
        );
        assert_eq!(competition.rules.extra["scoring"], "mean");
        assert!(competition.participants.is_empty());
    }

    #[test]
    fn test_winner_and_prize_keep_unknown_fields() {
        let winner: Winner = serde_json::from_str(
            r#"{"userId":"u1","rank":1,"averageScore":91.5,"displayName":"Ann"}"#,
        )
        .unwrap();
        assert_eq!(winner.rank, Some(1));
        assert_eq!(
            serde_json::to_value(&winner).unwrap(),
            serde_json::json!({"userId":"u1","rank":1,"averageScore":91.5,"displayName":"Ann"})
        );

        let prize: Prize =
            serde_json::from_str(r#"{"rank":1,"name":"Gift card","value":50}"#).unwrap();
        assert_eq!(prize.title, None);
        assert_eq!(
            serde_json::to_value(&prize).unwrap(),
            serde_json::json!({"rank":1,"name":"Gift card","value":50})
        );
    }

    #[test]
    fn test_sleep_field_reads_nested_heart_rate() {
        let record = NightlyRecord {
            user_id: UserId::from("u1"),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            score: 82,
            metrics: SleepMetrics {
                heart_rate: Some(HeartRate { avg: 58.0, lowest: 51.0 }),
                ..Default::default()
            },
            tags: BTreeSet::new(),
            notes: String::new(),
        };

        assert_eq!(SleepField::Score.value(&record), Some(82.0));
        assert_eq!(SleepField::HeartRateLowest.value(&record), Some(51.0));
        assert_eq!(SleepField::HrvMs.value(&record), None);
    }
}
