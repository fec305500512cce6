use uuid::Uuid;

/// Longest server body excerpt surfaced in a user-facing message.
pub const BODY_EXCERPT_CHARS: usize = 300;

/// Record store failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("record {id} was not written: a record with the same id or timestamp and prompt exists")]
    Duplicate { id: Uuid },
}

/// Everything that can end a practice attempt in `Failure`.
#[derive(Debug, thiserror::Error)]
pub enum PracticeError {
    #[error("microphone permission denied: enable microphone access in system settings")]
    PermissionDenied,

    #[error("capture start failed: {reason}")]
    CaptureStartFailed { reason: String },

    #[error("no recording file: please record again")]
    NoOutputFile,

    #[error("network error: {reason}")]
    Network { reason: String },

    #[error("server error ({status}): {}", excerpt(.body))]
    Server { status: u16, body: String },

    #[error("decode failed: {detail}")]
    Decode { detail: String, body: String },

    #[error("storage write failed: {0}")]
    StorageWriteFailed(#[from] StorageError),
}

impl PracticeError {
    /// Raw response body for server and decode failures.
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            PracticeError::Server { body, .. } | PracticeError::Decode { body, .. } => {
                Some(body.as_str())
            }
            _ => None,
        }
    }

    /// Whether replaying the same file and prompt can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PracticeError::PermissionDenied
                | PracticeError::CaptureStartFailed { .. }
                | PracticeError::NoOutputFile
        )
    }
}

impl From<reqwest::Error> for PracticeError {
    fn from(error: reqwest::Error) -> Self {
        PracticeError::Network {
            reason: error.to_string(),
        }
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    trimmed.chars().take(BODY_EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_truncates_body_but_keeps_raw() {
        let body = "x".repeat(500);
        let error = PracticeError::Server {
            status: 502,
            body: body.clone(),
        };

        let message = error.to_string();
        assert!(message.starts_with("server error (502): "));
        assert_eq!(message.len(), "server error (502): ".len() + BODY_EXCERPT_CHARS);
        assert_eq!(error.raw_body(), Some(body.as_str()));
    }

    #[test]
    fn empty_server_body_is_labelled() {
        let error = PracticeError::Server {
            status: 500,
            body: "  ".to_string(),
        };
        assert_eq!(error.to_string(), "server error (500): <empty>");
    }

    #[test]
    fn only_transport_side_failures_are_retryable() {
        assert!(!PracticeError::PermissionDenied.is_retryable());
        assert!(!PracticeError::NoOutputFile.is_retryable());
        assert!(PracticeError::Network {
            reason: "timed out".to_string()
        }
        .is_retryable());
        assert!(PracticeError::Decode {
            detail: "missing field".to_string(),
            body: "{}".to_string()
        }
        .is_retryable());
    }
}
