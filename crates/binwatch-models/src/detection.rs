//! Per-frame detection records.
//!
//! The detection stream is produced upstream (frame extraction + detector) and
//! consumed as an ordered, immutable sequence by the event segmenter.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// A single detector bounding box.
///
/// Coordinates are whatever the detector reports (pixel or normalized);
/// the pipeline only relies on `confidence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Detection confidence [0, 1]
    pub confidence: f32,
    /// Detector class id, when the detector reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,
    /// Detector class name, when the detector reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

impl BoundingBox {
    /// Create a box without class information.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id: None,
            class_name: None,
        }
    }
}

/// Detection result for one sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionRecord {
    /// 0-based index of the sampled frame
    pub frame_index: u64,
    /// Position in the source video, derived from the index and sample rate
    pub timestamp_seconds: f64,
    /// Boxes in detector order
    #[serde(default)]
    pub boxes: Vec<BoundingBox>,
    /// At least one box passed the bin-confidence threshold
    pub has_bin: bool,
    /// Still image for this frame, used by the classifiers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_path: Option<PathBuf>,
}

impl DetectionRecord {
    /// Build a record from raw boxes, deriving `has_bin` from the threshold.
    pub fn from_boxes(
        frame_index: u64,
        timestamp_seconds: f64,
        boxes: Vec<BoundingBox>,
        bin_confidence_threshold: f32,
    ) -> Self {
        let has_bin = boxes
            .iter()
            .any(|b| b.confidence >= bin_confidence_threshold);

        Self {
            frame_index,
            timestamp_seconds,
            boxes,
            has_bin,
            frame_path: None,
        }
    }

    /// Attach the still-frame path.
    pub fn with_frame_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.frame_path = Some(path.into());
        self
    }

    /// Timestamp of a sampled frame for a fixed sample rate.
    pub fn timestamp_for(frame_index: u64, sample_rate_hz: f64) -> f64 {
        if sample_rate_hz <= 0.0 {
            return 0.0;
        }
        frame_index as f64 / sample_rate_hz
    }

    /// Highest box confidence in this frame, if any box exists.
    pub fn peak_confidence(&self) -> Option<f32> {
        self.boxes
            .iter()
            .map(|b| b.confidence)
            .fold(None, |acc, c| match acc {
                Some(best) if best >= c => Some(best),
                _ => Some(c),
            })
    }

    /// Check the ordering and value constraints of a detection stream.
    ///
    /// Frame indices must strictly increase and timestamps must be finite,
    /// non-negative and non-decreasing. An empty stream is valid here; whether
    /// an empty run is acceptable is the caller's decision.
    pub fn validate_stream(records: &[DetectionRecord]) -> ModelResult<()> {
        let mut previous: Option<&DetectionRecord> = None;

        for record in records {
            let ts = record.timestamp_seconds;
            if !ts.is_finite() || ts < 0.0 {
                return Err(ModelError::InvalidTimestamp {
                    frame_index: record.frame_index,
                    value: ts,
                });
            }

            if let Some(bad) = record
                .boxes
                .iter()
                .find(|b| !(0.0..=1.0).contains(&b.confidence))
            {
                return Err(ModelError::InvalidConfidence {
                    frame_index: record.frame_index,
                    value: bad.confidence,
                });
            }

            if let Some(prev) = previous {
                if record.frame_index <= prev.frame_index {
                    return Err(ModelError::FrameOrder {
                        previous: prev.frame_index,
                        current: record.frame_index,
                    });
                }
                if ts < prev.timestamp_seconds {
                    return Err(ModelError::TimestampOrder {
                        frame_index: record.frame_index,
                        previous: prev.timestamp_seconds,
                        current: ts,
                    });
                }
            }

            previous = Some(record);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(frame_index: u64, ts: f64, confidences: &[f32]) -> DetectionRecord {
        let boxes = confidences
            .iter()
            .map(|c| BoundingBox::new(0.0, 0.0, 10.0, 20.0, *c))
            .collect();
        DetectionRecord::from_boxes(frame_index, ts, boxes, 0.5)
    }

    #[test]
    fn test_has_bin_uses_threshold() {
        assert!(record(0, 0.0, &[0.2, 0.5]).has_bin);
        assert!(!record(0, 0.0, &[0.2, 0.49]).has_bin);
        assert!(!record(0, 0.0, &[]).has_bin);
    }

    #[test]
    fn test_peak_confidence() {
        assert_eq!(record(0, 0.0, &[0.3, 0.9, 0.6]).peak_confidence(), Some(0.9));
        assert_eq!(record(0, 0.0, &[]).peak_confidence(), None);
    }

    #[test]
    fn test_timestamp_for() {
        assert!((DetectionRecord::timestamp_for(10, 1.0) - 10.0).abs() < 1e-9);
        assert!((DetectionRecord::timestamp_for(10, 2.0) - 5.0).abs() < 1e-9);
        assert_eq!(DetectionRecord::timestamp_for(10, 0.0), 0.0);
    }

    #[test]
    fn test_validate_stream_accepts_ordered() {
        let stream = vec![record(0, 0.0, &[]), record(1, 1.0, &[0.8]), record(2, 1.0, &[])];
        assert!(DetectionRecord::validate_stream(&stream).is_ok());
        assert!(DetectionRecord::validate_stream(&[]).is_ok());
    }

    #[test]
    fn test_validate_stream_rejects_frame_order() {
        let stream = vec![record(3, 0.0, &[]), record(3, 1.0, &[])];
        assert_eq!(
            DetectionRecord::validate_stream(&stream),
            Err(ModelError::FrameOrder { previous: 3, current: 3 })
        );
    }

    #[test]
    fn test_validate_stream_rejects_time_travel() {
        let stream = vec![record(0, 5.0, &[]), record(1, 4.0, &[])];
        assert!(matches!(
            DetectionRecord::validate_stream(&stream),
            Err(ModelError::TimestampOrder { frame_index: 1, .. })
        ));
    }

    #[test]
    fn test_validate_stream_rejects_bad_values() {
        let stream = vec![record(0, f64::NAN, &[])];
        assert!(matches!(
            DetectionRecord::validate_stream(&stream),
            Err(ModelError::InvalidTimestamp { .. })
        ));

        let mut bad_box = record(0, 0.0, &[0.7]);
        bad_box.boxes[0].confidence = 1.5;
        assert!(matches!(
            DetectionRecord::validate_stream(&[bad_box]),
            Err(ModelError::InvalidConfidence { .. })
        ));
    }

    #[test]
    fn test_missing_required_field_fails_to_deserialize() {
        let json = r#"{"frame_index": 0, "boxes": [], "has_bin": false}"#;
        assert!(serde_json::from_str::<DetectionRecord>(json).is_err());
    }
}
