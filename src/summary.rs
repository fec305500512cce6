use chrono::TimeZone;

use crate::models::PracticeRecord;
use crate::trend::clamp_score;

pub const EMPTY_SUMMARY: &str = "No data yet. Complete your first practice to unlock your growth report.";

pub fn build_summary<Tz: TimeZone>(records: &[PracticeRecord], tz: &Tz) -> String {
    let latest = records
        .iter()
        .filter_map(|record| record.score.map(|score| (record, score)))
        .max_by_key(|(record, _)| record.timestamp);

    match latest {
        Some((record, score)) => {
            let points = clamp_score(score).round() as i64;
            let date = record.timestamp.with_timezone(tz).date_naive();
            format!("{points} points · {}", date.format("%b %-d, %Y"))
        }
        None => EMPTY_SUMMARY.to_string(),
    }
}
