use chrono::{DateTime, Duration, TimeZone};

use crate::models::{PracticeRecord, RangeMode, TrendPoint};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

/// `all` is capped at a trailing half year of weekly buckets.
pub const ALL_WINDOW_DAYS: i64 = 180;

pub fn clamp_score(value: f64) -> f64 {
    value.max(MIN_SCORE).min(MAX_SCORE)
}

pub fn window_days(mode: RangeMode) -> i64 {
    match mode {
        RangeMode::Last7Days => 7,
        RangeMode::Last30Days => 30,
        RangeMode::All => ALL_WINDOW_DAYS,
    }
}

pub fn build_trend<Tz: TimeZone>(
    records: &[PracticeRecord],
    mode: RangeMode,
    now: &DateTime<Tz>,
) -> Vec<TrendPoint> {
    match mode {
        RangeMode::Last7Days => build_daily_trend(records, window_days(mode), now),
        RangeMode::Last30Days | RangeMode::All => {
            build_weekly_trend(records, window_days(mode), now)
        }
    }
}

/// One point per calendar day in `now`'s time zone, oldest first, ending today.
pub fn build_daily_trend<Tz: TimeZone>(
    records: &[PracticeRecord],
    days: i64,
    now: &DateTime<Tz>,
) -> Vec<TrendPoint> {
    if days <= 0 {
        return Vec::new();
    }

    let tz = now.timezone();
    let today = now.date_naive();
    let start = today - Duration::days(days - 1);
    let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); days as usize];

    for record in records {
        let Some(score) = record.score else {
            continue;
        };

        let day = record.timestamp.with_timezone(&tz).date_naive();
        if day < start || day > today {
            continue;
        }

        let index = (day - start).num_days() as usize;
        buckets[index].push(clamp_score(score));
    }

    buckets
        .iter()
        .enumerate()
        .map(|(offset, scores)| {
            let date = start + Duration::days(offset as i64);
            TrendPoint {
                label: date.format("%m/%d").to_string(),
                value: average(scores),
            }
        })
        .collect()
}

/// Rolling seven-day buckets over `[now - days, now]`; the trailing partial
/// week folds into the last bucket.
pub fn build_weekly_trend<Tz: TimeZone>(
    records: &[PracticeRecord],
    days: i64,
    now: &DateTime<Tz>,
) -> Vec<TrendPoint> {
    if days <= 0 {
        return Vec::new();
    }

    let tz = now.timezone();
    let start = now.clone() - Duration::days(days);
    let total_weeks = (days + 6) / 7;
    let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); total_weeks as usize];

    for record in records {
        let Some(score) = record.score else {
            continue;
        };

        let timestamp = record.timestamp.with_timezone(&tz);
        if timestamp < start || timestamp > *now {
            continue;
        }

        let days_since_start = (timestamp - start.clone()).num_days();
        let index = (days_since_start / 7).clamp(0, total_weeks - 1) as usize;
        buckets[index].push(clamp_score(score));
    }

    buckets
        .iter()
        .enumerate()
        .map(|(week, scores)| TrendPoint {
            label: format!("W{}", week + 1),
            value: average(scores),
        })
        .collect()
}

pub(crate) fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
