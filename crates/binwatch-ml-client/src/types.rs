//! Inference service request/response types.

use std::fmt;

use serde::{Deserialize, Serialize};

use binwatch_models::BoundingBox;

/// Request for bin detection on one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectRequest {
    /// Path to the frame image, readable by the service
    pub image_path: String,
    /// Minimum box confidence the service should return
    pub confidence: f32,
}

/// One box as reported by the detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedBox {
    /// `[x1, y1, x2, y2]`
    pub bbox: [f32; 4],
    pub confidence: f32,
    #[serde(default)]
    pub class_id: Option<u32>,
    #[serde(default)]
    pub class_name: Option<String>,
}

impl From<DetectedBox> for BoundingBox {
    fn from(b: DetectedBox) -> Self {
        let [x1, y1, x2, y2] = b.bbox;
        BoundingBox {
            x1,
            y1,
            x2,
            y2,
            confidence: b.confidence,
            class_id: b.class_id,
            class_name: b.class_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub detections: Vec<DetectedBox>,
}

/// Request for the overflow classifier on one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverflowRequest {
    pub image_path: String,
}

/// Class probabilities from the overflow classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverflowResponse {
    pub full_probability: f32,
    #[serde(default)]
    pub not_full_probability: Option<f32>,
}

/// Binary overflow label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowLabel {
    Full,
    NotFull,
}

impl OverflowLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowLabel::Full => "full",
            OverflowLabel::NotFull => "not_full",
        }
    }
}

impl fmt::Display for OverflowLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Thresholded verdict for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverflowVerdict {
    pub label: OverflowLabel,
    /// Probability of the chosen label
    pub probability: f32,
}

impl OverflowResponse {
    /// `full` when the full-class probability is strictly above `threshold`.
    pub fn verdict(&self, threshold: f32) -> OverflowVerdict {
        let full = self.full_probability.clamp(0.0, 1.0);
        let not_full = self
            .not_full_probability
            .map(|p| p.clamp(0.0, 1.0))
            .unwrap_or(1.0 - full);

        if full > threshold {
            OverflowVerdict {
                label: OverflowLabel::Full,
                probability: full,
            }
        } else {
            OverflowVerdict {
                label: OverflowLabel::NotFull,
                probability: not_full,
            }
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
    /// Models the service has loaded
    #[serde(default)]
    pub models: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_threshold() {
        let response = OverflowResponse {
            full_probability: 0.8,
            not_full_probability: None,
        };
        let verdict = response.verdict(0.5);
        assert_eq!(verdict.label, OverflowLabel::Full);
        assert!((verdict.probability - 0.8).abs() < 1e-6);

        let response = OverflowResponse {
            full_probability: 0.5,
            not_full_probability: Some(0.5),
        };
        assert_eq!(response.verdict(0.5).label, OverflowLabel::NotFull);
    }

    #[test]
    fn test_detected_box_conversion() {
        let raw: DetectedBox = serde_json::from_str(
            r#"{"bbox": [1.0, 2.0, 11.0, 22.0], "confidence": 0.7, "class_name": "bin"}"#,
        )
        .unwrap();
        let b: BoundingBox = raw.into();
        assert_eq!((b.x1, b.y1, b.x2, b.y2), (1.0, 2.0, 11.0, 22.0));
        assert_eq!(b.class_name.as_deref(), Some("bin"));
        assert_eq!(b.class_id, None);
    }
}
