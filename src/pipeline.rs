//! Lifecycle of a single practice attempt: permission, capture, upload,
//! evaluation and persistence.
//!
//! The pipeline is owned by one task. Uploads run on spawned tasks and report
//! back through an event channel; every event carries the request id it was
//! issued under, and only events for the currently active request are applied.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::Capture;
use crate::client::{EvalUploader, ProgressCallback};
use crate::config::DEFAULT_PROMPT;
use crate::error::PracticeError;
use crate::models::{EvalOutput, EvalResponse, PracticeRecord};
use crate::store::RecordStore;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryContext {
    pub file: PathBuf,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Idle,
    RequestingPermission,
    Recording,
    Ready {
        file: PathBuf,
        duration: Duration,
    },
    Uploading {
        progress: Option<f64>,
    },
    Success {
        response: EvalResponse,
        file: PathBuf,
        raw_body: String,
    },
    Failure {
        message: String,
        retry: Option<RetryContext>,
    },
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::RequestingPermission => "requesting_permission",
            PipelineState::Recording => "recording",
            PipelineState::Ready { .. } => "ready",
            PipelineState::Uploading { .. } => "uploading",
            PipelineState::Success { .. } => "success",
            PipelineState::Failure { .. } => "failure",
        }
    }
}

#[derive(Debug)]
pub enum PipelineEvent {
    UploadProgress {
        request_id: Uuid,
        fraction: f64,
    },
    UploadFinished {
        request_id: Uuid,
        result: Result<EvalOutput, PracticeError>,
    },
}

impl PipelineEvent {
    pub fn request_id(&self) -> Uuid {
        match self {
            PipelineEvent::UploadProgress { request_id, .. }
            | PipelineEvent::UploadFinished { request_id, .. } => *request_id,
        }
    }
}

#[derive(Debug, Clone)]
struct ActiveUpload {
    request_id: Uuid,
    file: PathBuf,
    prompt: String,
}

pub struct RecordingPipeline<C, U, S> {
    state: PipelineState,
    prompt: String,
    capture: C,
    uploader: Arc<U>,
    store: S,
    active: Option<ActiveUpload>,
    busy: bool,
    last_saved: Option<PracticeRecord>,
    save_error: Option<PracticeError>,
    events_tx: mpsc::UnboundedSender<PipelineEvent>,
    events_rx: mpsc::UnboundedReceiver<PipelineEvent>,
}

impl<C, U, S> RecordingPipeline<C, U, S>
where
    C: Capture,
    U: EvalUploader,
    S: RecordStore,
{
    pub fn new(capture: C, uploader: Arc<U>, store: S) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state: PipelineState::Idle,
            prompt: DEFAULT_PROMPT.to_string(),
            capture,
            uploader,
            store,
            active: None,
            busy: false,
            last_saved: None,
            save_error: None,
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn capture(&self) -> &C {
        &self.capture
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Request id whose results are currently honored.
    pub fn active_request(&self) -> Option<Uuid> {
        self.active.as_ref().map(|active| active.request_id)
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Record persisted by the most recent successful attempt.
    pub fn last_saved(&self) -> Option<&PracticeRecord> {
        self.last_saved.as_ref()
    }

    /// Why the most recent successful evaluation could not be persisted.
    pub fn save_error(&self) -> Option<&PracticeError> {
        self.save_error.as_ref()
    }

    pub async fn toggle(&mut self) {
        match self.state {
            PipelineState::Idle
            | PipelineState::Ready { .. }
            | PipelineState::Failure { .. }
            | PipelineState::Success { .. } => self.start_recording().await,
            PipelineState::Recording => self.stop_recording(),
            PipelineState::RequestingPermission | PipelineState::Uploading { .. } => {
                debug!(state = self.state.name(), "toggle ignored");
            }
        }
    }

    /// Uploads the ready recording with the current prompt. Returns the new
    /// request id, or `None` when there is nothing to submit or an upload is
    /// already in flight.
    pub fn submit(&mut self) -> Option<Uuid> {
        let prompt = self.prompt.clone();
        self.submit_with_prompt(prompt)
    }

    /// Replays the failed attempt's file and prompt. No-op unless the
    /// pipeline is in `Failure` with a retry context.
    pub fn retry(&mut self) -> Option<Uuid> {
        let PipelineState::Failure {
            retry: Some(context),
            ..
        } = &self.state
        else {
            debug!(state = self.state.name(), "retry ignored");
            return None;
        };
        let context = context.clone();

        info!(file = %context.file.display(), "retrying upload");
        let duration = self.capture.duration();
        self.set_state(PipelineState::Ready {
            file: context.file,
            duration,
        });
        self.submit_with_prompt(context.prompt)
    }

    /// Waits for the next upload event and applies it.
    pub async fn pump(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.handle_event(event).await;
                true
            }
            None => false,
        }
    }

    /// Pumps events until the current upload settles.
    pub async fn run_until_settled(&mut self) {
        while matches!(self.state, PipelineState::Uploading { .. }) {
            if !self.pump().await {
                break;
            }
        }
    }

    pub async fn handle_event(&mut self, event: PipelineEvent) {
        let request_id = event.request_id();
        if self.active_request() != Some(request_id) {
            debug!(%request_id, "discarding stale upload event");
            return;
        }

        match event {
            PipelineEvent::UploadProgress { fraction, .. } => self.apply_progress(fraction),
            PipelineEvent::UploadFinished { result, .. } => {
                let Some(active) = self.active.take() else {
                    return;
                };
                self.busy = false;
                match result {
                    Ok(output) => self.finish_success(active, output).await,
                    Err(error) => {
                        warn!(%request_id, %error, "upload failed");
                        let retry = error.is_retryable().then(|| RetryContext {
                            file: active.file,
                            prompt: active.prompt,
                        });
                        self.set_state(PipelineState::Failure {
                            message: error.to_string(),
                            retry,
                        });
                    }
                }
            }
        }
    }

    async fn start_recording(&mut self) {
        // A new attempt fences off anything still outstanding from the last one.
        self.active = None;
        self.set_state(PipelineState::RequestingPermission);

        if !self.capture.request_permission().await {
            self.fail(PracticeError::PermissionDenied);
            return;
        }

        match self.capture.start() {
            Ok(()) => self.set_state(PipelineState::Recording),
            Err(error) => self.fail(PracticeError::CaptureStartFailed {
                reason: error.to_string(),
            }),
        }
    }

    fn stop_recording(&mut self) {
        self.capture.stop();

        match self.capture.last_file() {
            Some(file) => {
                let duration = self.capture.duration();
                self.set_state(PipelineState::Ready { file, duration });
            }
            None => self.fail(PracticeError::NoOutputFile),
        }
    }

    fn submit_with_prompt(&mut self, prompt: String) -> Option<Uuid> {
        if self.busy {
            debug!("submit ignored while an upload is in flight");
            return None;
        }
        let PipelineState::Ready { file, .. } = &self.state else {
            debug!(state = self.state.name(), "submit ignored");
            return None;
        };
        let file = file.clone();

        let request_id = Uuid::new_v4();
        self.busy = true;
        self.last_saved = None;
        self.save_error = None;
        self.active = Some(ActiveUpload {
            request_id,
            file: file.clone(),
            prompt: prompt.clone(),
        });
        self.set_state(PipelineState::Uploading { progress: None });

        let uploader = Arc::clone(&self.uploader);
        let finished_tx = self.events_tx.clone();
        let progress_tx = self.events_tx.clone();
        let progress: ProgressCallback = Box::new(move |fraction| {
            let _ = progress_tx.send(PipelineEvent::UploadProgress {
                request_id,
                fraction,
            });
        });

        tokio::spawn(async move {
            let upload =
                tokio::spawn(async move { uploader.upload_audio(&file, &prompt, progress).await });
            // A panicking uploader must still settle the request.
            let result = match upload.await {
                Ok(result) => result,
                Err(error) => {
                    warn!(%request_id, %error, "upload task aborted");
                    Err(PracticeError::Network {
                        reason: format!("upload task aborted: {error}"),
                    })
                }
            };
            let _ = finished_tx.send(PipelineEvent::UploadFinished { request_id, result });
        });

        info!(%request_id, "upload submitted");
        Some(request_id)
    }

    fn apply_progress(&mut self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        if let PipelineState::Uploading { progress } = &mut self.state {
            match progress {
                Some(current) if fraction < *current => {
                    debug!(fraction, current = *current, "dropping regressed progress");
                }
                _ => *progress = Some(fraction),
            }
        }
    }

    async fn finish_success(&mut self, active: ActiveUpload, output: EvalOutput) {
        let record =
            PracticeRecord::from_evaluation(&output, active.prompt.clone(), Some(&active.file));
        let EvalOutput { response, raw_body } = output;

        info!(
            request_id = %active.request_id,
            score = record.score.unwrap_or_default(),
            "evaluation succeeded"
        );
        self.set_state(PipelineState::Success {
            response,
            file: active.file,
            raw_body,
        });

        // The evaluation stays visible even when persisting it fails.
        match self.store.insert(&record).await {
            Ok(()) => self.last_saved = Some(record),
            Err(error) => {
                let error = PracticeError::StorageWriteFailed(error);
                warn!(%error, record_id = %record.id, "failed to persist practice record");
                self.save_error = Some(error);
            }
        }
    }

    fn fail(&mut self, error: PracticeError) {
        warn!(%error, "practice attempt failed");
        self.set_state(PipelineState::Failure {
            message: error.to_string(),
            retry: None,
        });
    }

    fn set_state(&mut self, state: PipelineState) {
        debug!(from = self.state.name(), to = state.name(), "pipeline transition");
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::store::MemoryRecordStore;
    use std::io;
    use std::path::Path;
    use tokio::sync::oneshot;

    struct ScriptedCapture {
        permission: bool,
        fail_start: bool,
        produce_file: bool,
        recording: bool,
        last_file: Option<PathBuf>,
    }

    impl ScriptedCapture {
        fn working() -> Self {
            Self {
                permission: true,
                fail_start: false,
                produce_file: true,
                recording: false,
                last_file: None,
            }
        }
    }

    impl Capture for ScriptedCapture {
        async fn request_permission(&self) -> bool {
            self.permission
        }

        fn start(&mut self) -> io::Result<()> {
            if self.fail_start {
                return Err(io::Error::other("device busy"));
            }
            self.recording = true;
            Ok(())
        }

        fn stop(&mut self) {
            self.recording = false;
            if self.produce_file {
                self.last_file = Some(PathBuf::from("/tmp/rec-1.m4a"));
            }
        }

        fn is_recording(&self) -> bool {
            self.recording
        }

        fn duration(&self) -> Duration {
            Duration::from_secs(3)
        }

        fn last_file(&self) -> Option<PathBuf> {
            self.last_file.clone()
        }
    }

    struct UploadCall {
        file: PathBuf,
        prompt: String,
        progress: ProgressCallback,
        reply: oneshot::Sender<Result<EvalOutput, PracticeError>>,
    }

    /// Hands every upload to the test, which decides when and how it finishes.
    struct ChannelUploader {
        calls: mpsc::UnboundedSender<UploadCall>,
    }

    impl EvalUploader for ChannelUploader {
        async fn upload_audio(
            &self,
            file: &Path,
            prompt: &str,
            progress: ProgressCallback,
        ) -> Result<EvalOutput, PracticeError> {
            let (reply, outcome) = oneshot::channel();
            let call = UploadCall {
                file: file.to_path_buf(),
                prompt: prompt.to_string(),
                progress,
                reply,
            };
            if self.calls.send(call).is_err() {
                return Err(PracticeError::Network {
                    reason: "test harness dropped".to_string(),
                });
            }
            outcome.await.unwrap_or_else(|_| {
                Err(PracticeError::Network {
                    reason: "reply dropped".to_string(),
                })
            })
        }
    }

    struct PanickingUploader;

    impl EvalUploader for PanickingUploader {
        async fn upload_audio(
            &self,
            _file: &Path,
            _prompt: &str,
            _progress: ProgressCallback,
        ) -> Result<EvalOutput, PracticeError> {
            panic!("uploader crashed");
        }
    }

    struct FailingStore;

    impl RecordStore for FailingStore {
        async fn insert(&self, _record: &PracticeRecord) -> Result<(), StorageError> {
            Err(StorageError::Unavailable {
                reason: "disk full".to_string(),
            })
        }

        async fn query_all(&self) -> Result<Vec<PracticeRecord>, StorageError> {
            Ok(Vec::new())
        }
    }

    fn evaluation(overall: Option<f64>) -> EvalOutput {
        let raw_body = match overall {
            Some(score) => format!(
                r#"{{"fluency":80,"completeness":70,"relevance":90,"overallScore":{score}}}"#
            ),
            None => r#"{"fluency":80,"completeness":70,"relevance":90}"#.to_string(),
        };
        let response = serde_json::from_str(&raw_body).expect("fixture should decode");
        EvalOutput { response, raw_body }
    }

    fn network_error() -> PracticeError {
        PracticeError::Network {
            reason: "connection reset".to_string(),
        }
    }

    fn pipeline_with<S: RecordStore>(
        capture: ScriptedCapture,
        store: S,
    ) -> (
        RecordingPipeline<ScriptedCapture, ChannelUploader, S>,
        mpsc::UnboundedReceiver<UploadCall>,
    ) {
        let (calls, calls_rx) = mpsc::unbounded_channel();
        let pipeline = RecordingPipeline::new(capture, Arc::new(ChannelUploader { calls }), store);
        (pipeline, calls_rx)
    }

    async fn ready_pipeline() -> (
        RecordingPipeline<ScriptedCapture, ChannelUploader, MemoryRecordStore>,
        mpsc::UnboundedReceiver<UploadCall>,
    ) {
        let (mut pipeline, calls) =
            pipeline_with(ScriptedCapture::working(), MemoryRecordStore::default());
        pipeline.toggle().await;
        assert_eq!(pipeline.state(), &PipelineState::Recording);
        pipeline.toggle().await;
        (pipeline, calls)
    }

    async fn saved_count(store: &MemoryRecordStore) -> usize {
        store.query_all().await.expect("query should succeed").len()
    }

    #[tokio::test]
    async fn records_then_becomes_ready() {
        let (pipeline, _calls) = ready_pipeline().await;
        assert_eq!(
            pipeline.state(),
            &PipelineState::Ready {
                file: PathBuf::from("/tmp/rec-1.m4a"),
                duration: Duration::from_secs(3),
            }
        );
        assert!(!pipeline.capture().is_recording());
    }

    #[tokio::test]
    async fn permission_denied_fails_without_retry() {
        let capture = ScriptedCapture {
            permission: false,
            ..ScriptedCapture::working()
        };
        let (mut pipeline, _calls) = pipeline_with(capture, MemoryRecordStore::default());

        pipeline.toggle().await;
        let PipelineState::Failure { message, retry } = pipeline.state().clone() else {
            panic!("expected failure, got {:?}", pipeline.state());
        };
        assert!(message.contains("permission denied"));
        assert!(retry.is_none());

        assert!(pipeline.retry().is_none());
        assert_eq!(pipeline.state().name(), "failure");
    }

    #[tokio::test]
    async fn capture_start_failure_is_reported() {
        let capture = ScriptedCapture {
            fail_start: true,
            ..ScriptedCapture::working()
        };
        let (mut pipeline, _calls) = pipeline_with(capture, MemoryRecordStore::default());

        pipeline.toggle().await;
        let PipelineState::Failure { message, retry } = pipeline.state() else {
            panic!("expected failure, got {:?}", pipeline.state());
        };
        assert!(message.starts_with("capture start failed"));
        assert!(message.contains("device busy"));
        assert!(retry.is_none());
    }

    #[tokio::test]
    async fn missing_output_file_fails() {
        let capture = ScriptedCapture {
            produce_file: false,
            ..ScriptedCapture::working()
        };
        let (mut pipeline, _calls) = pipeline_with(capture, MemoryRecordStore::default());

        pipeline.toggle().await;
        pipeline.toggle().await;
        let PipelineState::Failure { message, retry } = pipeline.state() else {
            panic!("expected failure, got {:?}", pipeline.state());
        };
        assert!(message.starts_with("no recording file"));
        assert!(retry.is_none());
    }

    #[tokio::test]
    async fn successful_upload_persists_once() {
        let (mut pipeline, mut calls) = ready_pipeline().await;
        pipeline.set_prompt("Talk about your weekend.");

        let request_id = pipeline.submit().expect("submit should dispatch");
        assert_eq!(pipeline.state(), &PipelineState::Uploading { progress: None });

        let call = calls.recv().await.expect("upload should be issued");
        assert_eq!(call.file, PathBuf::from("/tmp/rec-1.m4a"));
        assert_eq!(call.prompt, "Talk about your weekend.");
        call.reply.send(Ok(evaluation(None))).expect("pipeline should be waiting");
        pipeline.run_until_settled().await;

        let PipelineState::Success { response, file, raw_body } = pipeline.state() else {
            panic!("expected success, got {:?}", pipeline.state());
        };
        assert_eq!(response.fluency, 80.0);
        assert_eq!(file, &PathBuf::from("/tmp/rec-1.m4a"));
        assert!(raw_body.contains("completeness"));
        assert!(!pipeline.is_busy());

        let saved = pipeline.last_saved().expect("record should be saved");
        assert_eq!(saved.score, Some(80.0));
        assert_eq!(saved.prompt, "Talk about your weekend.");
        assert_eq!(saved.audio_ref.as_deref(), Some("/tmp/rec-1.m4a"));
        assert!(saved.is_audio);

        // A duplicated completion for the settled request changes nothing.
        pipeline
            .handle_event(PipelineEvent::UploadFinished {
                request_id,
                result: Ok(evaluation(Some(10.0))),
            })
            .await;
        assert_eq!(saved_count(pipeline.store()).await, 1);
        assert_eq!(pipeline.state().name(), "success");
    }

    #[tokio::test]
    async fn server_overall_score_wins() {
        let (mut pipeline, mut calls) = ready_pipeline().await;
        pipeline.submit().expect("submit should dispatch");

        let call = calls.recv().await.expect("upload should be issued");
        call.reply.send(Ok(evaluation(Some(91.0)))).expect("pipeline should be waiting");
        pipeline.run_until_settled().await;

        let saved = pipeline.last_saved().expect("record should be saved");
        assert_eq!(saved.score, Some(91.0));
    }

    #[tokio::test]
    async fn second_submit_while_uploading_is_rejected() {
        let (mut pipeline, mut calls) = ready_pipeline().await;

        assert!(pipeline.submit().is_some());
        assert!(pipeline.submit().is_none());
        pipeline.toggle().await;
        assert_eq!(pipeline.state(), &PipelineState::Uploading { progress: None });

        let first = calls.recv().await.expect("one upload should be issued");
        assert!(calls.try_recv().is_err());
        drop(first);
    }

    #[tokio::test]
    async fn failure_keeps_retry_context_and_retry_replays_payload() {
        let (mut pipeline, mut calls) = ready_pipeline().await;
        pipeline.set_prompt("Describe your hometown.");
        let first_id = pipeline.submit().expect("submit should dispatch");

        let first = calls.recv().await.expect("upload should be issued");
        first.reply.send(Err(network_error())).expect("pipeline should be waiting");
        pipeline.run_until_settled().await;

        let PipelineState::Failure { message, retry } = pipeline.state().clone() else {
            panic!("expected failure, got {:?}", pipeline.state());
        };
        assert!(message.contains("connection reset"));
        assert_eq!(
            retry,
            Some(RetryContext {
                file: PathBuf::from("/tmp/rec-1.m4a"),
                prompt: "Describe your hometown.".to_string(),
            })
        );
        assert!(!pipeline.is_busy());

        pipeline.set_prompt("Something else entirely.");
        let second_id = pipeline.retry().expect("retry should dispatch");
        assert_ne!(first_id, second_id);

        let second = calls.recv().await.expect("retry should upload again");
        assert_eq!(second.file, PathBuf::from("/tmp/rec-1.m4a"));
        assert_eq!(second.prompt, "Describe your hometown.");
        second.reply.send(Ok(evaluation(None))).expect("pipeline should be waiting");
        pipeline.run_until_settled().await;

        assert_eq!(pipeline.state().name(), "success");
        assert_eq!(saved_count(pipeline.store()).await, 1);
    }

    #[tokio::test]
    async fn superseded_request_results_are_ignored() {
        let (mut pipeline, mut calls) = ready_pipeline().await;
        let first_id = pipeline.submit().expect("submit should dispatch");
        let first = calls.recv().await.expect("upload should be issued");
        first.reply.send(Err(network_error())).expect("pipeline should be waiting");
        pipeline.run_until_settled().await;

        let second_id = pipeline.retry().expect("retry should dispatch");
        let second = calls.recv().await.expect("retry should upload again");

        // Late events from the first request arrive after it was superseded.
        pipeline
            .handle_event(PipelineEvent::UploadProgress {
                request_id: first_id,
                fraction: 0.9,
            })
            .await;
        pipeline
            .handle_event(PipelineEvent::UploadFinished {
                request_id: first_id,
                result: Ok(evaluation(Some(12.0))),
            })
            .await;
        assert_eq!(pipeline.state(), &PipelineState::Uploading { progress: None });
        assert_eq!(pipeline.active_request(), Some(second_id));
        assert_eq!(saved_count(pipeline.store()).await, 0);

        second.reply.send(Ok(evaluation(Some(88.0)))).expect("pipeline should be waiting");
        pipeline.run_until_settled().await;

        assert_eq!(pipeline.last_saved().and_then(|record| record.score), Some(88.0));
        assert_eq!(saved_count(pipeline.store()).await, 1);
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_never_terminal() {
        let (mut pipeline, mut calls) = ready_pipeline().await;
        pipeline.submit().expect("submit should dispatch");
        let call = calls.recv().await.expect("upload should be issued");

        (call.progress)(0.5);
        pipeline.pump().await;
        assert_eq!(pipeline.state(), &PipelineState::Uploading { progress: Some(0.5) });

        (call.progress)(0.25);
        pipeline.pump().await;
        assert_eq!(pipeline.state(), &PipelineState::Uploading { progress: Some(0.5) });

        (call.progress)(1.0);
        pipeline.pump().await;
        assert_eq!(pipeline.state(), &PipelineState::Uploading { progress: Some(1.0) });

        call.reply.send(Ok(evaluation(None))).expect("pipeline should be waiting");
        pipeline.run_until_settled().await;
        assert_eq!(pipeline.state().name(), "success");
    }

    #[tokio::test]
    async fn storage_failure_keeps_success_state() {
        let (mut pipeline, mut calls) = pipeline_with(ScriptedCapture::working(), FailingStore);
        pipeline.toggle().await;
        pipeline.toggle().await;
        pipeline.submit().expect("submit should dispatch");

        let call = calls.recv().await.expect("upload should be issued");
        call.reply.send(Ok(evaluation(None))).expect("pipeline should be waiting");
        pipeline.run_until_settled().await;

        assert_eq!(pipeline.state().name(), "success");
        assert!(pipeline.last_saved().is_none());
        assert!(matches!(
            pipeline.save_error(),
            Some(PracticeError::StorageWriteFailed(StorageError::Unavailable { .. }))
        ));
        assert!(!pipeline.is_busy());
    }

    #[tokio::test]
    async fn new_attempt_after_success_fences_old_request() {
        let (mut pipeline, mut calls) = ready_pipeline().await;
        let old_id = pipeline.submit().expect("submit should dispatch");
        let call = calls.recv().await.expect("upload should be issued");
        call.reply.send(Ok(evaluation(None))).expect("pipeline should be waiting");
        pipeline.run_until_settled().await;

        pipeline.toggle().await;
        assert_eq!(pipeline.state(), &PipelineState::Recording);
        assert!(pipeline.active_request().is_none());

        pipeline
            .handle_event(PipelineEvent::UploadFinished {
                request_id: old_id,
                result: Err(network_error()),
            })
            .await;
        assert_eq!(pipeline.state(), &PipelineState::Recording);

        pipeline.toggle().await;
        assert_eq!(pipeline.state().name(), "ready");
        assert!(pipeline.submit().is_some());
        assert_ne!(pipeline.active_request(), Some(old_id));
    }

    #[tokio::test]
    async fn submit_outside_ready_is_noop() {
        let (mut pipeline, mut calls) =
            pipeline_with(ScriptedCapture::working(), MemoryRecordStore::default());
        assert!(pipeline.submit().is_none());
        assert_eq!(pipeline.state(), &PipelineState::Idle);
        assert!(calls.try_recv().is_err());
    }

    #[tokio::test]
    async fn panicking_uploader_still_settles_with_failure() {
        let mut pipeline = RecordingPipeline::new(
            ScriptedCapture::working(),
            Arc::new(PanickingUploader),
            MemoryRecordStore::default(),
        );
        pipeline.toggle().await;
        pipeline.toggle().await;
        pipeline.submit().expect("submit should dispatch");

        tokio::time::timeout(Duration::from_secs(2), pipeline.run_until_settled())
            .await
            .expect("pipeline should settle after a panicked upload");

        let PipelineState::Failure { message, retry } = pipeline.state() else {
            panic!("expected failure, got {:?}", pipeline.state());
        };
        assert!(message.contains("upload task aborted"));
        assert!(retry.is_some());
        assert!(!pipeline.is_busy());
        assert!(pipeline.active_request().is_none());
    }

    #[tokio::test]
    async fn unreadable_recording_fails_without_retry_context() {
        let (mut pipeline, mut calls) = ready_pipeline().await;
        pipeline.submit().expect("submit should dispatch");

        let call = calls.recv().await.expect("upload should be issued");
        call.reply
            .send(Err(PracticeError::NoOutputFile))
            .expect("pipeline should be waiting");
        pipeline.run_until_settled().await;

        let PipelineState::Failure { message, retry } = pipeline.state() else {
            panic!("expected failure, got {:?}", pipeline.state());
        };
        assert!(message.starts_with("no recording file"));
        assert!(retry.is_none());
        assert!(pipeline.retry().is_none());
    }
}
