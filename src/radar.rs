use serde_json::Value;
use tracing::warn;

use crate::models::{PracticeRecord, RadarDimension};
use crate::trend::{average, clamp_score};

pub const DEFAULT_RECENT_N: usize = 5;

pub const DIMENSIONS: [(&str, &str); 3] = [
    ("fluency", "Fluency"),
    ("completeness", "Completeness"),
    ("relevance", "Relevance"),
];

/// Per-dimension values found in a record's payload. Absent keys stay `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DimensionScores {
    pub fluency: Option<f64>,
    pub completeness: Option<f64>,
    pub relevance: Option<f64>,
}

impl DimensionScores {
    fn values(&self) -> [Option<f64>; 3] {
        [self.fluency, self.completeness, self.relevance]
    }
}

/// Tolerant parse of a stored evaluation body. Anything that is not a JSON
/// object yields `None`; non-numeric dimension fields are treated as absent.
pub fn parse_dimensions(payload: Option<&str>) -> Option<DimensionScores> {
    let raw = payload?;
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(error) => {
            warn!(%error, "skipping malformed dimension payload");
            return None;
        }
    };
    let object = value.as_object()?;
    let field = |key: &str| object.get(key).and_then(Value::as_f64);

    Some(DimensionScores {
        fluency: field("fluency"),
        completeness: field("completeness"),
        relevance: field("relevance"),
    })
}

pub fn build_radar(records: &[PracticeRecord], recent_n: usize) -> Vec<RadarDimension> {
    let mut scored: Vec<&PracticeRecord> = records
        .iter()
        .filter(|record| record.score.is_some())
        .collect();
    // Stable sort keeps input order for equal timestamps.
    scored.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut columns: [Vec<f64>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for record in scored.into_iter().take(recent_n) {
        let Some(scores) = parse_dimensions(record.dimension_payload.as_deref()) else {
            continue;
        };
        for (column, value) in columns.iter_mut().zip(scores.values()) {
            if let Some(value) = value {
                column.push(clamp_score(value));
            }
        }
    }

    DIMENSIONS
        .iter()
        .zip(columns.iter())
        .map(|((key, title), values)| RadarDimension {
            key: (*key).to_string(),
            title: (*title).to_string(),
            value: average(values).unwrap_or(0.0),
        })
        .collect()
}
