use std::fmt::Write;

use chrono::{DateTime, TimeZone};

use crate::cache::GrowthSnapshot;
use crate::models::PracticeRecord;
use crate::trend::clamp_score;

#[derive(Debug, Clone, PartialEq)]
pub struct PracticeKindSummary {
    pub kind: &'static str,
    pub count: usize,
    pub scored: usize,
    pub avg_score: Option<f64>,
}

pub fn summarize_by_kind(records: &[PracticeRecord]) -> Vec<PracticeKindSummary> {
    let mut summaries: Vec<PracticeKindSummary> = [("audio", true), ("text", false)]
        .into_iter()
        .map(|(kind, is_audio)| {
            let matching: Vec<&PracticeRecord> = records
                .iter()
                .filter(|record| record.is_audio == is_audio)
                .collect();
            let scores: Vec<f64> = matching
                .iter()
                .filter_map(|record| record.score.map(clamp_score))
                .collect();

            PracticeKindSummary {
                kind,
                count: matching.len(),
                scored: scores.len(),
                avg_score: crate::trend::average(&scores),
            }
        })
        .filter(|summary| summary.count > 0)
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count));
    summaries
}

pub fn build_report<Tz: TimeZone>(
    snapshot: &GrowthSnapshot,
    records: &[PracticeRecord],
    now: &DateTime<Tz>,
) -> String {
    let tz = now.timezone();
    let mut output = String::new();

    let _ = writeln!(output, "# Speaking Practice Growth Report");
    let _ = writeln!(
        output,
        "Generated for {} on {}",
        snapshot.range.title(),
        now.date_naive()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "{}", snapshot.summary);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Trend");

    for point in &snapshot.trend {
        match point.value {
            Some(value) => {
                let _ = writeln!(output, "- {}: {:.1}", point.label, value);
            }
            None => {
                let _ = writeln!(output, "- {}: no practice", point.label);
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Skills");
    for dimension in &snapshot.radar {
        let _ = writeln!(output, "- {}: {:.1}", dimension.title, dimension.value);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Practice Mix");
    let summaries = summarize_by_kind(records);
    if summaries.is_empty() {
        let _ = writeln!(output, "No practice recorded yet.");
    } else {
        for summary in &summaries {
            let average = summary
                .avg_score
                .map(|value| format!("{value:.1}"))
                .unwrap_or_else(|| "n/a".to_string());
            let _ = writeln!(
                output,
                "- {}: {} sessions, {} scored (avg score {})",
                summary.kind, summary.count, summary.scored, average
            );
        }
    }

    let mut recent: Vec<&PracticeRecord> = records.iter().collect();
    recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Practice");

    if recent.is_empty() {
        let _ = writeln!(output, "No practice recorded yet.");
    } else {
        for record in recent.iter().take(5) {
            let score = record
                .score
                .map(|score| format!("{:.0}", clamp_score(score)))
                .unwrap_or_else(|| "unscored".to_string());
            let _ = writeln!(
                output,
                "- {} ({}): {}",
                record.timestamp.with_timezone(&tz).date_naive(),
                score,
                record.prompt
            );
        }
    }

    output
}
