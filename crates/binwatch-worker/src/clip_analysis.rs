//! Vision-language analysis of a single event clip.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use binwatch_media::{clip_peak_timestamp, probe_video, sample_clip_frames};
use binwatch_models::{CostSummary, EventClassification};

use crate::classifier::{analyze_frames, VisionClassifier, MAX_VLM_FRAMES, MIN_VLM_FRAMES};
use crate::cost_guard::CostGuard;
use crate::error::WorkerResult;

/// Outcome of analyzing one clip.
#[derive(Debug, Clone)]
pub struct ClipAnalysis {
    pub clip: PathBuf,
    /// Clip length in seconds
    pub duration: f64,
    pub frames: Vec<PathBuf>,
    pub classification: EventClassification,
    pub cost: CostSummary,
}

/// Prompt context for a clip, with the source position when the file name
/// carries one.
pub fn clip_context(clip: &Path, duration: f64) -> String {
    match clip_peak_timestamp(clip) {
        Some(peak) => format!(
            "A {:.1} second clip centred near {:.1}s of the source video",
            duration, peak
        ),
        None => format!("A {:.1} second clip", duration),
    }
}

/// Classify already sampled clip frames under `guard`.
pub async fn classify_clip_frames(
    vlm: &dyn VisionClassifier,
    frames: &[PathBuf],
    guard: &mut CostGuard,
    context: &str,
) -> EventClassification {
    analyze_frames(vlm, frames, BTreeMap::new(), guard, context).await
}

/// Sample `num_frames` stills from `clip` and classify them in one call.
///
/// `num_frames` is clamped to what one vision-language call accepts.
pub async fn analyze_clip(
    vlm: &dyn VisionClassifier,
    clip: impl AsRef<Path>,
    frames_root: impl AsRef<Path>,
    num_frames: usize,
    max_cost_usd: f64,
) -> WorkerResult<ClipAnalysis> {
    let clip = clip.as_ref();
    let num_frames = num_frames.clamp(MIN_VLM_FRAMES, MAX_VLM_FRAMES);

    let info = probe_video(clip).await?;
    let frames: Vec<PathBuf> = sample_clip_frames(clip, frames_root, num_frames)
        .await?
        .into_iter()
        .map(|f| f.path)
        .collect();

    info!(
        frames = frames.len(),
        duration = info.duration,
        "Analyzing clip {}",
        clip.display()
    );

    let mut guard = CostGuard::new(max_cost_usd);
    let context = clip_context(clip, info.duration);
    let classification = classify_clip_frames(vlm, &frames, &mut guard, &context).await;

    Ok(ClipAnalysis {
        clip: clip.to_path_buf(),
        duration: info.duration,
        frames,
        classification,
        cost: guard.summary(),
    })
}
