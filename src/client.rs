use std::future::Future;
use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, DAILY_CHALLENGE_PATH, EVAL_AUDIO_PATH, EVAL_TEXT_PATH, SCENES_PATH};
use crate::error::PracticeError;
use crate::models::{DailyChallenge, EvalOutput, EvalResponse, Persona, Scene};

/// Advisory upload progress in `[0, 1]`.
pub type ProgressCallback = Box<dyn Fn(f64) + Send + Sync>;

/// Remote evaluation of a recorded answer.
pub trait EvalUploader: Send + Sync + 'static {
    fn upload_audio(
        &self,
        file: &Path,
        prompt: &str,
        progress: ProgressCallback,
    ) -> impl Future<Output = Result<EvalOutput, PracticeError>> + Send;
}

/// Server-side source of the persona's prompt of the day.
pub trait ChallengeSource {
    fn fetch_daily_challenge(
        &self,
        persona: Persona,
    ) -> impl Future<Output = Result<DailyChallenge, PracticeError>> + Send;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextEvalRequest<'a> {
    device_id: &'a str,
    prompt: &'a str,
    user_text: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpEvalClient {
    http: reqwest::Client,
    config: AppConfig,
    device_id: String,
}

impl HttpEvalClient {
    pub fn new(config: AppConfig, device_id: String) -> Result<Self, PracticeError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::with_client(http, config, device_id))
    }

    pub fn with_client(http: reqwest::Client, config: AppConfig, device_id: String) -> Self {
        Self {
            http,
            config,
            device_id,
        }
    }

    pub fn persona(&self) -> Persona {
        self.config.persona
    }

    /// Server audio paths are relative; absolute URLs pass through.
    pub fn full_audio_url(&self, audio_url: &str) -> String {
        if audio_url.starts_with("http") {
            audio_url.to_string()
        } else {
            self.config.endpoint(audio_url)
        }
    }

    pub async fn evaluate_text(&self, prompt: &str, text: &str) -> Result<EvalOutput, PracticeError> {
        let url = self.config.endpoint(EVAL_TEXT_PATH);
        let body = self.text_request(prompt, text);
        debug!(%url, chars = text.chars().count(), "submitting text evaluation");

        let response = self
            .http
            .post(&url)
            .query(&persona_query(self.config.persona))
            .timeout(self.config.text_timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let raw = response.text().await?;
        info!(status, bytes = raw.len(), "text evaluation finished");
        decode_response(status, raw)
    }

    pub async fn fetch_scenes(&self, persona: Persona) -> Result<Vec<Scene>, PracticeError> {
        let scenes: Vec<Scene> = self.get_json(SCENES_PATH, persona).await?;
        info!(count = scenes.len(), persona = persona.as_str(), "scenes fetched");
        Ok(scenes)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        persona: Persona,
    ) -> Result<T, PracticeError> {
        let url = self.config.endpoint(path);
        debug!(%url, persona = persona.as_str(), "fetching");

        let response = self
            .http
            .get(&url)
            .query(&persona_query(persona))
            .timeout(self.config.text_timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let raw = response.text().await?;
        decode_json(status, &raw)
    }

    fn text_request<'a>(&'a self, prompt: &'a str, text: &'a str) -> TextEvalRequest<'a> {
        TextEvalRequest {
            device_id: &self.device_id,
            prompt,
            user_text: text,
        }
    }

    /// Text fields sent alongside the recording. A blank prompt is omitted.
    fn audio_fields(&self, prompt: &str) -> Vec<(&'static str, String)> {
        let mut fields = Vec::with_capacity(3);
        if !prompt.trim().is_empty() {
            fields.push(("prompt", prompt.to_string()));
        }
        fields.push(("persona", self.config.persona.as_str().to_string()));
        fields.push(("deviceId", self.device_id.clone()));
        fields
    }
}

impl ChallengeSource for HttpEvalClient {
    async fn fetch_daily_challenge(&self, persona: Persona) -> Result<DailyChallenge, PracticeError> {
        self.get_json(DAILY_CHALLENGE_PATH, persona).await
    }
}

impl EvalUploader for HttpEvalClient {
    async fn upload_audio(
        &self,
        file: &Path,
        prompt: &str,
        progress: ProgressCallback,
    ) -> Result<EvalOutput, PracticeError> {
        let bytes = tokio::fs::read(file).await.map_err(|error| {
            warn!(%error, file = %file.display(), "failed to read recording");
            PracticeError::NoOutputFile
        })?;

        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.m4a".to_string());
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime_for(file))?;

        let form = self
            .audio_fields(prompt)
            .into_iter()
            .fold(Form::new().part("file", part), |form, (name, value)| {
                form.text(name, value)
            });

        let url = self.config.endpoint(EVAL_AUDIO_PATH);
        debug!(%url, file = %file.display(), "uploading recording");
        progress(0.0);

        let response = self
            .http
            .post(&url)
            .timeout(self.config.audio_timeout)
            .multipart(form)
            .send()
            .await?;
        progress(1.0);

        let status = response.status().as_u16();
        let raw = response.text().await?;
        info!(status, bytes = raw.len(), "audio evaluation finished");
        decode_response(status, raw)
    }
}

/// Non-2xx is a server error; a 2xx body that does not match the response
/// shape is a decode error. Both keep the raw body.
pub fn decode_response(status: u16, raw: String) -> Result<EvalOutput, PracticeError> {
    let response: EvalResponse = decode_json(status, &raw)?;
    Ok(EvalOutput {
        response,
        raw_body: raw,
    })
}

fn decode_json<T: DeserializeOwned>(status: u16, raw: &str) -> Result<T, PracticeError> {
    if !(200..300).contains(&status) {
        return Err(PracticeError::Server {
            status,
            body: raw.to_string(),
        });
    }

    serde_json::from_str(raw).map_err(|error| PracticeError::Decode {
        detail: error.to_string(),
        body: raw.to_string(),
    })
}

fn persona_query(persona: Persona) -> [(&'static str, &'static str); 1] {
    [("persona", persona.as_str())]
}

fn mime_for(file: &Path) -> &'static str {
    match file
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("m4a") => "audio/x-m4a",
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        _ => "application/octet-stream",
    }
}
