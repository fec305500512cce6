use std::fmt;
use std::ops::Range;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub score: Option<f64>,
    /// Raw evaluation body; the radar module re-parses dimension scores from it.
    pub dimension_payload: Option<String>,
    pub prompt: String,
    pub user_text: Option<String>,
    pub is_audio: bool,
    pub audio_ref: Option<String>,
}

impl PracticeRecord {
    pub fn new(timestamp: DateTime<Utc>, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            score: None,
            dimension_payload: None,
            prompt: prompt.into(),
            user_text: None,
            is_audio: false,
            audio_ref: None,
        }
    }

    /// Record for a finished evaluation. The server audio URL is preferred
    /// over the local recording path.
    pub fn from_evaluation(
        output: &EvalOutput,
        prompt: impl Into<String>,
        local_audio: Option<&Path>,
    ) -> Self {
        let response = &output.response;
        let mut record = Self::new(Utc::now(), prompt);
        record.score = Some(response.overall_score());
        record.dimension_payload = Some(output.raw_body.clone());
        record.user_text = response.user_text.clone();
        record.is_audio = local_audio.is_some();
        record.audio_ref = response
            .audio_url
            .clone()
            .or_else(|| local_audio.map(|path| path.to_string_lossy().to_string()));
        record
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub label: String,
    /// `None` marks an empty bucket and renders as a gap.
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarDimension {
    pub key: String,
    pub title: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum RangeMode {
    Last7Days,
    Last30Days,
    All,
}

impl RangeMode {
    pub fn id(self) -> &'static str {
        match self {
            RangeMode::Last7Days => "last7Days",
            RangeMode::Last30Days => "last30Days",
            RangeMode::All => "all",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            RangeMode::Last7Days => "Last 7 days",
            RangeMode::Last30Days => "Last 30 days",
            RangeMode::All => "All time (180 days)",
        }
    }
}

impl fmt::Display for RangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Persona {
    #[default]
    ExamPrep,
    CareerGrowth,
}

impl Persona {
    pub fn as_str(self) -> &'static str {
        match self {
            Persona::ExamPrep => "EXAM_PREP",
            Persona::CareerGrowth => "CAREER_GROWTH",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub offset: i64,
    pub length: i64,
    pub message: String,
    pub replacements: Option<Vec<String>>,
}

impl Issue {
    /// Maps the server's UTF-16 `offset`/`length` onto a byte range of `text`.
    pub fn char_range(&self, text: &str) -> Option<Range<usize>> {
        if self.offset < 0 || self.length <= 0 {
            return None;
        }
        let start_units = self.offset as usize;
        let end_units = start_units.checked_add(self.length as usize)?;

        let mut units = 0usize;
        let mut start = None;
        for (byte_index, ch) in text.char_indices() {
            if units == start_units {
                start = Some(byte_index);
            }
            if units == end_units {
                return start.map(|start| start..byte_index);
            }
            units += ch.len_utf16();
        }
        if units == end_units {
            return start.map(|start| start..text.len());
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalResponse {
    pub record_id: Option<i64>,
    pub fluency: f64,
    pub completeness: f64,
    pub relevance: f64,
    pub overall_score: Option<f64>,
    pub grammar_issue_count: Option<i64>,
    pub issues: Option<Vec<Issue>>,
    pub suggestions: Option<Vec<String>>,
    pub missing_keywords: Option<Vec<String>>,
    pub audio_url: Option<String>,
    pub created_at: Option<String>,
    pub user_text: Option<String>,
}

impl EvalResponse {
    /// Server-provided overall score, else the mean of the three dimensions.
    pub fn overall_score(&self) -> f64 {
        self.overall_score
            .unwrap_or((self.fluency + self.completeness + self.relevance) / 3.0)
    }
}

/// A decoded evaluation together with the body it was decoded from.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOutput {
    pub response: EvalResponse,
    pub raw_body: String,
}

/// Persona-specific prompt of the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyChallenge {
    pub title: String,
    pub prompt: String,
    pub date: Option<String>,
    pub image_url: Option<String>,
    pub persona: Option<String>,
    pub payload: Option<serde_json::Map<String, serde_json::Value>>,
}

impl DailyChallenge {
    pub fn difficulty(&self) -> &str {
        self.payload
            .as_ref()
            .and_then(|payload| payload.get("difficulty"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or("Medium")
    }
}

/// A practice scenario offered for exploration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: i64,
    pub code: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub target_persona: Option<String>,
    #[serde(rename = "initialPrompt")]
    pub prompt: String,
}
