//! Bin detection over sampled frames.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use binwatch_media::SampledFrame;
use binwatch_ml_client::InferenceClient;
use binwatch_models::{BoundingBox, DetectionRecord};

use crate::error::{WorkerError, WorkerResult};

/// Object detector returning boxes for one still frame.
#[async_trait]
pub trait BinDetector: Send + Sync {
    async fn detect(&self, frame: &Path, confidence: f32) -> WorkerResult<Vec<BoundingBox>>;
}

#[async_trait]
impl BinDetector for InferenceClient {
    async fn detect(&self, frame: &Path, confidence: f32) -> WorkerResult<Vec<BoundingBox>> {
        InferenceClient::detect(self, frame, confidence)
            .await
            .map_err(|e| WorkerError::detection_failed(format!("{}: {}", frame.display(), e)))
    }
}

/// Run the detector on every frame, in order.
///
/// The stream must be gapless, so a failed frame fails the whole run.
pub async fn detect_frames(
    detector: &dyn BinDetector,
    frames: &[SampledFrame],
    confidence: f32,
) -> WorkerResult<Vec<DetectionRecord>> {
    let mut records = Vec::with_capacity(frames.len());

    for (i, frame) in frames.iter().enumerate() {
        let boxes = detector.detect(&frame.path, confidence).await?;
        let record =
            DetectionRecord::from_boxes(frame.index, frame.timestamp_seconds, boxes, confidence)
                .with_frame_path(&frame.path);

        debug!(
            frame_index = record.frame_index,
            boxes = record.boxes.len(),
            has_bin = record.has_bin,
            "Detected frame"
        );
        records.push(record);

        if (i + 1) % 100 == 0 {
            info!("Detection progress: {}/{} frames", i + 1, frames.len());
        }
    }

    let bin_frames = records.iter().filter(|r| r.has_bin).count();
    info!(
        frames = records.len(),
        bin_frames, "Detection complete"
    );
    Ok(records)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DetectionFile {
    Stream(Vec<DetectionRecord>),
    Wrapped { detections: Vec<DetectionRecord> },
}

/// Load a pre-computed detection stream from JSON.
///
/// Accepts a bare array of records or an object with a `detections` array.
/// Records missing required fields make the stream invalid.
pub async fn load_detection_stream(path: &Path) -> WorkerResult<Vec<DetectionRecord>> {
    let text = tokio::fs::read_to_string(path).await?;
    let file: DetectionFile = serde_json::from_str(&text).map_err(|e| {
        WorkerError::invalid_stream(format!("{}: {}", path.display(), e))
    })?;

    let records = match file {
        DetectionFile::Stream(records) => records,
        DetectionFile::Wrapped { detections } => detections,
    };
    info!(
        path = %path.display(),
        records = records.len(),
        "Loaded detection stream"
    );
    Ok(records)
}

/// Fill in frame images for records that do not carry one.
pub fn attach_frame_paths(records: &mut [DetectionRecord], frames: &[SampledFrame]) {
    for record in records.iter_mut().filter(|r| r.frame_path.is_none()) {
        if let Some(frame) = frames.iter().find(|f| f.index == record.frame_index) {
            record.frame_path = Some(frame.path.clone());
        }
    }
}
