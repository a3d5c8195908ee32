//! Raw nightly record definition
//!
//! One JSON object per night, keyed by calendar date:
//!
//! ```json
//! {
//!   "date": "2024-03-14",
//!   "score": 84,
//!   "metrics": { "totalSleepMinutes": 452, "efficiencyPct": 93, "hrvMs": 48 },
//!   "tags": ["late-caffeine"],
//!   "notes": "woke up once"
//! }
//! ```
//!
//! `tags` and `notes` are optional. When absent, an ingest keeps whatever the
//! stored record already has.

use crate::types::SleepMetrics;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Date format used by every external date parameter
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A nightly record as supplied by the record source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNightlyRecord {
    /// Calendar day (YYYY-MM-DD)
    pub date: String,
    /// Sleep score, integer 0-100
    pub score: f64,
    #[serde(default)]
    pub metrics: SleepMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl RawNightlyRecord {
    /// Validate every field, returning the parsed date and score
    pub fn validate(&self) -> Result<(NaiveDate, u8), ValidationError> {
        let date = parse_day(&self.date)?;

        if !self.score.is_finite()
            || self.score.fract() != 0.0
            || !(0.0..=100.0).contains(&self.score)
        {
            return Err(ValidationError::ScoreOutOfRange(self.score));
        }

        validate_metrics(&self.metrics)?;

        Ok((date, self.score as u8))
    }
}

fn validate_metrics(m: &SleepMetrics) -> Result<(), ValidationError> {
    let fields = [
        ("totalSleepMinutes", m.total_sleep_minutes),
        ("efficiencyPct", m.efficiency_pct),
        ("deepMinutes", m.deep_minutes),
        ("remMinutes", m.rem_minutes),
        ("lightMinutes", m.light_minutes),
        ("latencyMinutes", m.latency_minutes),
        ("heartRate.avg", m.heart_rate.map(|hr| hr.avg)),
        ("heartRate.lowest", m.heart_rate.map(|hr| hr.lowest)),
        ("hrvMs", m.hrv_ms),
        ("respiratoryRate", m.respiratory_rate),
    ];

    for (field, value) in fields {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(ValidationError::InvalidMetric { field, value: v });
            }
        }
    }

    if let Some(efficiency) = m.efficiency_pct {
        if efficiency > 100.0 {
            return Err(ValidationError::InvalidMetric {
                field: "efficiencyPct",
                value: efficiency,
            });
        }
    }

    Ok(())
}

/// Parse a strict `YYYY-MM-DD` calendar date
pub fn parse_day(s: &str) -> Result<NaiveDate, ValidationError> {
    let bytes = s.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });

    if !well_formed {
        return Err(ValidationError::InvalidDate(s.to_string()));
    }

    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| ValidationError::InvalidDate(s.to_string()))
}

/// Parse an RFC 3339 instant, or a bare `YYYY-MM-DD` date as midnight UTC
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, ValidationError> {
    let s = s.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(s) {
        return Ok(instant.with_timezone(&Utc));
    }

    parse_day(s)
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| ValidationError::InvalidInstant(s.to_string()))
}

/// Validation errors for incoming data
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid date format. Please use YYYY-MM-DD (got {0:?})")]
    InvalidDate(String),

    #[error("Invalid date format: {0:?}")]
    InvalidInstant(String),

    #[error("Score must be an integer between 0 and 100 (got {0})")]
    ScoreOutOfRange(f64),

    #[error("Invalid value for {field}: {value}")]
    InvalidMetric { field: &'static str, value: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HeartRate;

    fn make_raw(date: &str, score: f64) -> RawNightlyRecord {
        RawNightlyRecord {
            date: date.to_string(),
            score,
            metrics: SleepMetrics::default(),
            tags: None,
            notes: None,
        }
    }

    #[test]
    fn test_deserialize_record() {
        let json = r#"{
            "date": "2024-03-14",
            "score": 84,
            "metrics": {
                "totalSleepMinutes": 452,
                "heartRate": { "avg": 58, "lowest": 51 },
                "respiratoryRate": 14.6
            },
            "tags": ["travel"]
        }"#;

        let raw: RawNightlyRecord = serde_json::from_str(json).unwrap();
        assert_eq!(raw.metrics.total_sleep_minutes, Some(452.0));
        assert_eq!(
            raw.metrics.heart_rate,
            Some(HeartRate { avg: 58.0, lowest: 51.0 })
        );
        assert_eq!(raw.tags, Some(vec!["travel".to_string()]));
        assert_eq!(raw.notes, None);

        let (date, score) = raw.validate().unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
        assert_eq!(score, 84);
    }

    #[test]
    fn test_parse_day_is_strict() {
        assert!(parse_day("2024-03-14").is_ok());
        assert!(parse_day("2024-3-14").is_err());
        assert!(parse_day("2024/03/14").is_err());
        assert!(parse_day("2024-02-30").is_err());
        assert!(parse_day("").is_err());
        assert!(parse_day("2024-03-14T00:00:00Z").is_err());
    }

    #[test]
    fn test_parse_instant_accepts_rfc3339_and_bare_dates() {
        use chrono::TimeZone;

        assert_eq!(
            parse_instant("2024-07-01T09:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 7, 1, 7, 30, 0).unwrap()
        );
        assert_eq!(
            parse_instant(" 2024-07-01 ").unwrap(),
            Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_instant("next tuesday"),
            Err(ValidationError::InvalidInstant("next tuesday".to_string()))
        );
    }

    #[test]
    fn test_score_bounds() {
        assert!(make_raw("2024-03-14", 0.0).validate().is_ok());
        assert!(make_raw("2024-03-14", 100.0).validate().is_ok());
        assert_eq!(
            make_raw("2024-03-14", 101.0).validate(),
            Err(ValidationError::ScoreOutOfRange(101.0))
        );
        assert!(make_raw("2024-03-14", -1.0).validate().is_err());
        assert!(make_raw("2024-03-14", 80.5).validate().is_err());
    }

    #[test]
    fn test_metric_validation() {
        let mut raw = make_raw("2024-03-14", 80.0);
        raw.metrics.efficiency_pct = Some(104.0);
        assert!(matches!(
            raw.validate(),
            Err(ValidationError::InvalidMetric {
                field: "efficiencyPct",
                ..
            })
        ));

        let mut raw = make_raw("2024-03-14", 80.0);
        raw.metrics.deep_minutes = Some(-5.0);
        assert!(raw.validate().is_err());
    }
}
