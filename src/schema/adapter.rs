//! Adapter for turning raw nightly records into stored records
//!
//! Handles batch parsing (JSON array or NDJSON), per-record validation
//! reports, and the merge rule applied when a night is synced again.

use crate::error::LeagueError;
use crate::schema::record::{RawNightlyRecord, ValidationError};
use crate::types::{NightlyRecord, UserId};

/// Adapter for converting raw records to nightly records
pub struct RecordAdapter;

impl RecordAdapter {
    /// Parse a JSON string containing an array of raw records
    pub fn parse_array(json: &str) -> Result<Vec<RawNightlyRecord>, LeagueError> {
        let records: Vec<RawNightlyRecord> = serde_json::from_str(json)?;
        Ok(records)
    }

    /// Parse NDJSON (one raw record per line), skipping blank lines
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<RawNightlyRecord>, LeagueError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawNightlyRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(LeagueError::Validation(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Validate a batch, returning only the failures
    pub fn validate_records(records: &[RawNightlyRecord]) -> Vec<ValidationResult> {
        records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| {
                record.validate().err().map(|error| ValidationResult {
                    index,
                    date: record.date.clone(),
                    error,
                })
            })
            .collect()
    }

    /// Build the record to store for `raw`, merging with the stored night.
    ///
    /// Score and metrics always come from `raw`. Notes and tags are only
    /// replaced when `raw` carries them; otherwise the stored values survive.
    pub fn merge_into(
        raw: &RawNightlyRecord,
        user_id: &UserId,
        existing: Option<NightlyRecord>,
    ) -> Result<NightlyRecord, ValidationError> {
        let (date, score) = raw.validate()?;
        let (tags, notes) = match existing {
            Some(stored) => (stored.tags, stored.notes),
            None => Default::default(),
        };

        Ok(NightlyRecord {
            user_id: user_id.clone(),
            date,
            score,
            metrics: raw.metrics.clone(),
            tags: match &raw.tags {
                Some(incoming) => incoming.iter().cloned().collect(),
                None => tags,
            },
            notes: raw.notes.clone().unwrap_or(notes),
        })
    }
}

/// A record that failed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub index: usize,
    pub date: String,
    pub error: ValidationError,
}
