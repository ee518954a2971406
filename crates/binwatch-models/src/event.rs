//! Bin-presence events.

use std::fmt;
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::classification::EventClassification;
use crate::error::{ModelError, ModelResult};

/// Sequential, 1-based event identifier.
pub type EventId = u32;

/// Sampling decision for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SamplingDisposition {
    /// Selected for classification
    Sampled,
    /// Eligible but not drawn
    Unsampled,
    /// Below the minimum detection count; kept for audit only
    NotEligible,
}

impl fmt::Display for SamplingDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SamplingDisposition::Sampled => "sampled",
            SamplingDisposition::Unsampled => "unsampled",
            SamplingDisposition::NotEligible => "not_eligible",
        };
        write!(f, "{}", s)
    }
}

/// A contiguous span of bin presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Event {
    pub event_id: EventId,
    /// Timestamp of the first bin detection
    pub start_time: f64,
    /// Timestamp of the last bin detection
    pub end_time: f64,
    /// Timestamp of the highest-confidence detection
    pub peak_timestamp: f64,
    /// Confidence of that detection
    pub peak_confidence: f32,
    /// Number of bin-positive frames in the span
    pub detection_count: usize,
    /// Frame indices of the bin-positive frames, in order
    pub frame_refs: Vec<u64>,
    /// Extracted clip, once available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_path: Option<PathBuf>,
    /// Why clip extraction failed, if it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disposition: Option<SamplingDisposition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<EventClassification>,
}

impl Event {
    /// Duration of the span in seconds.
    pub fn duration(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }

    /// Whether this event can be drawn by the sampler.
    pub fn is_eligible(&self) -> bool {
        self.disposition != Some(SamplingDisposition::NotEligible)
    }

    /// Whether this event was selected for classification.
    pub fn is_sampled(&self) -> bool {
        self.disposition == Some(SamplingDisposition::Sampled)
    }

    /// True if clip extraction was attempted and failed.
    pub fn is_clipless(&self) -> bool {
        self.clip_path.is_none() && self.clip_error.is_some()
    }

    /// Attach the sampling disposition. Fails if one is already set.
    pub fn assign_disposition(&mut self, disposition: SamplingDisposition) -> ModelResult<()> {
        if self.disposition.is_some() {
            return Err(ModelError::DispositionAlreadySet(self.event_id));
        }
        self.disposition = Some(disposition);
        Ok(())
    }

    /// Check `start_time <= peak_timestamp <= end_time` and a non-empty span.
    pub fn validate(&self) -> ModelResult<()> {
        let bounds_err = |message: String| ModelError::InvalidEventBounds {
            event_id: self.event_id,
            message,
        };

        if self.detection_count == 0 || self.frame_refs.is_empty() {
            return Err(bounds_err("event has no bin detections".to_string()));
        }
        if self.detection_count != self.frame_refs.len() {
            return Err(bounds_err(format!(
                "detection_count {} does not match {} frame refs",
                self.detection_count,
                self.frame_refs.len()
            )));
        }
        if !(self.start_time <= self.peak_timestamp && self.peak_timestamp <= self.end_time) {
            return Err(bounds_err(format!(
                "peak {}s outside [{}s, {}s]",
                self.peak_timestamp, self.start_time, self.end_time
            )));
        }
        Ok(())
    }

    /// Check a whole event list: each event valid, ids sequential from 1,
    /// sorted by start time and non-overlapping.
    pub fn validate_sequence(events: &[Event]) -> ModelResult<()> {
        let mut previous: Option<&Event> = None;

        for (position, event) in events.iter().enumerate() {
            event.validate()?;

            let expected_id = position as EventId + 1;
            if event.event_id != expected_id {
                return Err(ModelError::InvalidEventBounds {
                    event_id: event.event_id,
                    message: format!("expected event id {}", expected_id),
                });
            }

            if let Some(prev) = previous {
                if event.start_time <= prev.end_time {
                    return Err(ModelError::OverlappingEvents {
                        earlier: prev.event_id,
                        later: event.event_id,
                    });
                }
            }
            previous = Some(event);
        }

        Ok(())
    }
}
