//! Model invariant errors.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Violations of the data-model invariants.
///
/// Every variant indicates a contract violation by whoever produced the data;
/// callers treat these as fatal for the run.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Detection stream is empty")]
    EmptyStream,

    #[error("Frame index {current} does not follow frame index {previous}")]
    FrameOrder { previous: u64, current: u64 },

    #[error("Timestamp {current}s at frame {frame_index} precedes previous timestamp {previous}s")]
    TimestampOrder {
        frame_index: u64,
        previous: f64,
        current: f64,
    },

    #[error("Invalid timestamp at frame {frame_index}: {value}")]
    InvalidTimestamp { frame_index: u64, value: f64 },

    #[error("Box confidence {value} at frame {frame_index} is outside [0, 1]")]
    InvalidConfidence { frame_index: u64, value: f32 },

    #[error("Event {event_id} has inconsistent bounds: {message}")]
    InvalidEventBounds { event_id: u32, message: String },

    #[error("Event {later} overlaps or precedes event {earlier}")]
    OverlappingEvents { earlier: u32, later: u32 },

    #[error("Event {0} already has a sampling disposition")]
    DispositionAlreadySet(u32),

    #[error("Classification invariant violated: {0}")]
    InvalidClassification(String),
}
