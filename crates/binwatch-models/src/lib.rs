//! Shared data models for the BinWatch event pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Per-frame detection records and bounding boxes
//! - Bin-presence events and their sampling disposition
//! - Event classifications (taxonomy, confidence tier, provenance)
//! - Clip encoding settings
//! - Run reports consumed by the JSON/Markdown writers

pub mod classification;
pub mod detection;
pub mod encoding;
pub mod error;
pub mod event;
pub mod report;
pub mod timestamp;
pub mod video;

// Re-export common types
pub use classification::{
    ClassificationMethod, ConfidenceTier, EventClassification, EventType, EventTypeParseError,
};
pub use detection::{BoundingBox, DetectionRecord};
pub use encoding::ClipEncoding;
pub use error::{ModelError, ModelResult};
pub use event::{Event, EventId, SamplingDisposition};
pub use report::{CostSummary, RunReport, RunSummary, SamplingInfo};
pub use video::{VideoId, VideoSummary};
