//! Structured run logging utilities.
//!
//! Provides consistent, structured logging for pipeline runs with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};

/// Run logger for structured logging with consistent formatting.
///
/// Every line carries the run id, video id and current pipeline stage.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    video_id: String,
    stage: String,
}

impl RunLogger {
    pub fn new(run_id: impl Into<String>, video_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            video_id: video_id.into(),
            stage: "init".to_string(),
        }
    }

    /// Logger for the next stage of the same run.
    pub fn stage(&self, stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            ..self.clone()
        }
    }

    /// Re-key once the video id is known.
    pub fn with_video_id(&self, video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            ..self.clone()
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            video_id = %self.video_id,
            stage = %self.stage,
            "Stage started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            video_id = %self.video_id,
            stage = %self.stage,
            "{}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            run_id = %self.run_id,
            video_id = %self.video_id,
            stage = %self.stage,
            "{}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            run_id = %self.run_id,
            video_id = %self.video_id,
            stage = %self.stage,
            "{}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            video_id = %self.video_id,
            stage = %self.stage,
            "Stage completed: {}", message
        );
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn stage_name(&self) -> &str {
        &self.stage
    }

    /// Span covering the whole run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "run",
            run_id = %self.run_id,
            video_id = %self.video_id
        )
    }
}
