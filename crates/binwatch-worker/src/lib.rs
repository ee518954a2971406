//! BinWatch event pipeline.
//!
//! This crate provides:
//! - Event segmentation over a per-frame detection stream
//! - Random sampling of events for paid analysis
//! - A run-scoped cost guard
//! - Hybrid fast / vision-language event classification
//! - Pipeline orchestration and JSON/Markdown reports
//! - One-off vision-language analysis of a single clip

pub mod classifier;
pub mod clip_analysis;
pub mod config;
pub mod cost_guard;
pub mod detector;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod sampler;
pub mod segmenter;
pub mod vlm;

pub use classifier::{
    analyze_frames, FrameVerdict, HybridClassifier, OverflowClassifier, VisionClassifier,
    VlmResponse, MAX_VLM_FRAMES, MIN_VLM_FRAMES,
};
pub use clip_analysis::{analyze_clip, classify_clip_frames, clip_context, ClipAnalysis};
pub use config::{PipelineConfig, VlmConfig};
pub use cost_guard::CostGuard;
pub use detector::BinDetector;
pub use error::{WorkerError, WorkerResult};
pub use logging::RunLogger;
pub use pipeline::{DetectionInput, Pipeline, PreparedVideo, RunOutcome};
pub use report::{write_reports, ReportPaths};
pub use sampler::sample;
pub use segmenter::{segment, EventSegmenter};
pub use vlm::OpenAiVisionClient;
