//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// The detection stream broke its contract (empty, unordered, invalid values).
    #[error("Invalid detection stream: {0}")]
    InvalidStream(String),

    /// Segmenter output violated an event invariant.
    #[error("Event invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Detection failed: {0}")]
    DetectionFailed(String),

    #[error("Vision-language analysis failed: {0}")]
    VlmFailed(String),

    #[error("Vision-language call timed out after {0} seconds")]
    VlmTimeout(u64),

    #[error("Overflow classifier failed: {0}")]
    FastClassifierFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Report generation failed: {0}")]
    ReportFailed(String),

    #[error("Model error: {0}")]
    Model(#[from] binwatch_models::ModelError),

    #[error("Media error: {0}")]
    Media(#[from] binwatch_media::MediaError),

    #[error("Inference service error: {0}")]
    Ml(#[from] binwatch_ml_client::MlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn invalid_stream(msg: impl Into<String>) -> Self {
        Self::InvalidStream(msg.into())
    }

    pub fn invariant_violation(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn detection_failed(msg: impl Into<String>) -> Self {
        Self::DetectionFailed(msg.into())
    }

    pub fn vlm_failed(msg: impl Into<String>) -> Self {
        Self::VlmFailed(msg.into())
    }

    pub fn fast_classifier_failed(msg: impl Into<String>) -> Self {
        Self::FastClassifierFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn report_failed(msg: impl Into<String>) -> Self {
        Self::ReportFailed(msg.into())
    }

    /// Contract violations that must abort the run before any report is written.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            WorkerError::InvalidStream(_)
                | WorkerError::InvariantViolation(_)
                | WorkerError::ConfigError(_)
                | WorkerError::Model(_)
        )
    }

    /// Failures scoped to one event; the run degrades that event and continues.
    pub fn is_recoverable(&self) -> bool {
        match self {
            WorkerError::VlmFailed(_)
            | WorkerError::VlmTimeout(_)
            | WorkerError::FastClassifierFailed(_)
            | WorkerError::Ml(_) => true,
            WorkerError::Media(e) => matches!(
                e,
                binwatch_media::MediaError::ClipExtraction { .. }
                    | binwatch_media::MediaError::FfmpegFailed { .. }
                    | binwatch_media::MediaError::Timeout(_)
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binwatch_media::MediaError;
    use binwatch_models::ModelError;

    #[test]
    fn test_structural_errors() {
        assert!(WorkerError::invalid_stream("no frames").is_structural());
        assert!(WorkerError::from(ModelError::EmptyStream).is_structural());
        assert!(WorkerError::config_error("bad confidence").is_structural());
        assert!(!WorkerError::VlmTimeout(60).is_structural());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(WorkerError::VlmTimeout(60).is_recoverable());
        assert!(WorkerError::vlm_failed("502").is_recoverable());
        assert!(WorkerError::from(MediaError::clip_extraction(3, "corrupt")).is_recoverable());
        assert!(!WorkerError::from(MediaError::FfmpegNotFound).is_recoverable());
        assert!(!WorkerError::invalid_stream("x").is_recoverable());
    }
}
