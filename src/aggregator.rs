//! Sleep metrics aggregation
//!
//! Reduces a user's nightly records to the statistics stored in a
//! [`SleepSummary`]:
//! - Field averages over a window
//! - Best/worst score extremes
//! - Weekly (ISO week) and monthly trend buckets
//! - Improvement deltas between the first and last records of a window
//!
//! Every number that leaves this module is rounded to one decimal place with
//! half-up rounding. Clients render these values verbatim, so the windowing
//! constants below are fixed rather than configurable.

use crate::types::{
    DailyAverage, Improvement, MonthlyBucket, NightlyRecord, SleepField, SleepSummary, UserId,
    WeeklyBucket,
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;

/// Calendar days of data covered by the weekly trend
pub const WEEKLY_WINDOW_DAYS: i64 = 28;

/// Maximum number of weekly trend buckets
pub const MAX_WEEKLY_BUCKETS: usize = 4;

/// Maximum number of monthly trend buckets
pub const MAX_MONTHLY_BUCKETS: usize = 6;

/// Upper bound on the size of each improvement segment
pub const IMPROVEMENT_SEGMENT: usize = 7;

/// Best/worst score pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extremes {
    pub best: u8,
    pub worst: u8,
}

impl Extremes {
    /// Starting values before any record is seen. Never a real range.
    pub const NO_DATA: Extremes = Extremes {
        best: 0,
        worst: 100,
    };

    pub fn is_no_data(&self) -> bool {
        self.best < self.worst
    }
}

/// Record sets for each window a summary is built from
#[derive(Debug, Clone, Copy)]
pub struct SummaryWindows<'a> {
    pub current_month: &'a [NightlyRecord],
    pub previous_month: &'a [NightlyRecord],
    pub all: &'a [NightlyRecord],
}

/// Stateless aggregation over nightly records
pub struct MetricsAggregator;

impl MetricsAggregator {
    /// Build a full summary. No incremental path: every field is recomputed.
    pub fn summarize(
        user_id: &UserId,
        windows: SummaryWindows<'_>,
        now: DateTime<Utc>,
    ) -> SleepSummary {
        let extremes = Self::extremes(windows.all);

        SleepSummary {
            user_id: user_id.clone(),
            daily_average: DailyAverage {
                current_month: Self::average(windows.current_month, SleepField::Score),
                previous_month: Self::average(windows.previous_month, SleepField::Score),
                overall: Self::average(windows.all, SleepField::Score),
            },
            weekly_trend: Self::weekly_trend(windows.all),
            monthly_trend: Self::monthly_trend(windows.all),
            best_score: extremes.best,
            worst_score: extremes.worst,
            improvement: Improvement {
                monthly: Self::improvement(windows.current_month),
                overall: Self::improvement(windows.all),
            },
            last_updated: now,
        }
    }

    /// Mean of `field` over the records that carry it; 0 when none do.
    pub fn average(records: &[NightlyRecord], field: SleepField) -> f64 {
        let (total, count) = records
            .iter()
            .filter_map(|r| field.value(r))
            .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));

        if count == 0 {
            return 0.0;
        }
        round_tenth(total / count as f64)
    }

    /// Running max and min of the score, starting from [`Extremes::NO_DATA`]
    pub fn extremes(records: &[NightlyRecord]) -> Extremes {
        records.iter().fold(Extremes::NO_DATA, |acc, r| Extremes {
            best: acc.best.max(r.score),
            worst: acc.worst.min(r.score),
        })
    }

    /// Score averages per ISO week over the last 28 calendar days of data.
    ///
    /// The window ends at the latest record date, so gaps in tracking do not
    /// pull older weeks in. At most the last four buckets are kept.
    pub fn weekly_trend(records: &[NightlyRecord]) -> Vec<WeeklyBucket> {
        let Some(latest) = records.iter().map(|r| r.date).max() else {
            return Vec::new();
        };
        let window_start = latest - Duration::days(WEEKLY_WINDOW_DAYS - 1);

        let mut weeks: BTreeMap<NaiveDate, Vec<u8>> = BTreeMap::new();
        for record in records.iter().filter(|r| r.date >= window_start) {
            weeks.entry(week_start(record.date)).or_default().push(record.score);
        }

        let trend: Vec<WeeklyBucket> = weeks
            .into_iter()
            .map(|(week_start, scores)| WeeklyBucket {
                week_start,
                average: mean_score(&scores),
            })
            .collect();

        keep_last(trend, MAX_WEEKLY_BUCKETS)
    }

    /// Score averages per calendar month, at most the last six months
    pub fn monthly_trend(records: &[NightlyRecord]) -> Vec<MonthlyBucket> {
        let mut months: BTreeMap<(i32, u32), Vec<u8>> = BTreeMap::new();
        for record in records {
            months
                .entry((record.date.year(), record.date.month()))
                .or_default()
                .push(record.score);
        }

        let trend: Vec<MonthlyBucket> = months
            .into_iter()
            .map(|((year, month), scores)| MonthlyBucket {
                month: format!("{:04}-{:02}", year, month),
                average: mean_score(&scores),
            })
            .collect();

        keep_last(trend, MAX_MONTHLY_BUCKETS)
    }

    /// Difference between the mean score of the last and first segments.
    ///
    /// Each segment holds `min(7, ceil(n / 2))` records of the date-sorted
    /// set, so segments overlap for small windows. Fewer than two records
    /// yield 0.
    pub fn improvement(records: &[NightlyRecord]) -> f64 {
        let n = records.len();
        if n < 2 {
            return 0.0;
        }

        let mut scores: Vec<(NaiveDate, u8)> = records.iter().map(|r| (r.date, r.score)).collect();
        scores.sort_by_key(|(date, _)| *date);
        let scores: Vec<u8> = scores.into_iter().map(|(_, score)| score).collect();

        let segment = IMPROVEMENT_SEGMENT.min(n.div_ceil(2));
        let first = raw_mean(&scores[..segment]);
        let last = raw_mean(&scores[n - segment..]);

        round_tenth(last - first)
    }
}

/// Round to one decimal place, ties toward positive infinity.
///
/// Negative halves round up (`-0.25` becomes `-0.2`), matching what clients
/// already display.
pub fn round_tenth(value: f64) -> f64 {
    let rounded = (value * 10.0 + 0.5).floor() / 10.0;
    // Avoid emitting -0.0
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Monday of the ISO week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn raw_mean(scores: &[u8]) -> f64 {
    let sum: f64 = scores.iter().map(|&s| f64::from(s)).sum();
    sum / scores.len() as f64
}

fn mean_score(scores: &[u8]) -> f64 {
    round_tenth(raw_mean(scores))
}

fn keep_last<T>(mut items: Vec<T>, max: usize) -> Vec<T> {
    if items.len() > max {
        items.drain(..items.len() - max);
    }
    items
}
