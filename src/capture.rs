use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Microphone capture as seen by the recording pipeline.
pub trait Capture {
    fn request_permission(&self) -> impl Future<Output = bool> + Send;

    fn start(&mut self) -> io::Result<()>;

    fn stop(&mut self);

    fn is_recording(&self) -> bool;

    fn duration(&self) -> Duration;

    /// File written by the most recent capture, if any.
    fn last_file(&self) -> Option<PathBuf>;
}

/// Capture backed by an existing audio file. Recording "starts" once the
/// file is confirmed readable and reports wall-clock time until stopped.
#[derive(Debug)]
pub struct PrerecordedCapture {
    source: PathBuf,
    started_at: Option<Instant>,
    duration: Duration,
    last_file: Option<PathBuf>,
}

impl PrerecordedCapture {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            started_at: None,
            duration: Duration::ZERO,
            last_file: None,
        }
    }
}

impl Capture for PrerecordedCapture {
    async fn request_permission(&self) -> bool {
        true
    }

    fn start(&mut self) -> io::Result<()> {
        let metadata = std::fs::metadata(&self.source)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a file", self.source.display()),
            ));
        }

        self.started_at = Some(Instant::now());
        self.duration = Duration::ZERO;
        self.last_file = None;
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(started_at) = self.started_at.take() {
            self.duration = started_at.elapsed();
            self.last_file = Some(self.source.clone());
        }
    }

    fn is_recording(&self) -> bool {
        self.started_at.is_some()
    }

    fn duration(&self) -> Duration {
        match self.started_at {
            Some(started_at) => started_at.elapsed(),
            None => self.duration,
        }
    }

    fn last_file(&self) -> Option<PathBuf> {
        self.last_file.clone()
    }
}
