use std::path::PathBuf;
use std::time::Duration;

use crate::device;
use crate::models::Persona;

pub const DEFAULT_API_HOST: &str = "localhost";
pub const DEFAULT_API_PORT: u16 = 8082;
pub const DEFAULT_PROMPT: &str = "Describe your day.";
pub const AUDIO_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);
pub const TEXT_EVAL_TIMEOUT: Duration = Duration::from_secs(30);

pub const EVAL_AUDIO_PATH: &str = "/api/eval/audio";
pub const EVAL_TEXT_PATH: &str = "/api/eval/text";
pub const DAILY_CHALLENGE_PATH: &str = "/api/home/daily-challenge";
pub const SCENES_PATH: &str = "/api/explore/scenes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub base_url: String,
    pub persona: Persona,
    pub audio_timeout: Duration,
    pub text_timeout: Duration,
    pub device_id_path: PathBuf,
    pub challenge_cache_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: format!("http://{DEFAULT_API_HOST}:{DEFAULT_API_PORT}"),
            persona: Persona::default(),
            audio_timeout: AUDIO_UPLOAD_TIMEOUT,
            text_timeout: TEXT_EVAL_TIMEOUT,
            device_id_path: device::default_device_id_path(),
            challenge_cache_path: device::config_file("daily_challenge.json"),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from `PRACTICE_*` variables supplied by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let base_url = non_empty("PRACTICE_API_BASE_URL")
            .or_else(|| {
                non_empty("PRACTICE_API_HOST")
                    .map(|host| format!("http://{host}:{DEFAULT_API_PORT}"))
            })
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);

        let persona = non_empty("PRACTICE_PERSONA")
            .and_then(|value| parse_persona(&value))
            .unwrap_or(defaults.persona);

        let device_id_path = non_empty("PRACTICE_DEVICE_ID_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.device_id_path);

        let challenge_cache_path = non_empty("PRACTICE_CHALLENGE_CACHE_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.challenge_cache_path);

        Self {
            base_url,
            persona,
            device_id_path,
            challenge_cache_path,
            ..defaults
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub fn parse_persona(value: &str) -> Option<Persona> {
    match value.trim().to_ascii_uppercase().replace('-', "_").as_str() {
        "EXAM_PREP" => Some(Persona::ExamPrep),
        "CAREER_GROWTH" => Some(Persona::CareerGrowth),
        _ => None,
    }
}
