//! Hybrid event classification.
//!
//! A cheap binary overflow classifier runs first; the paid vision-language
//! model covers everything it cannot settle. Each event walks an explicit
//! state machine:
//!
//! ```text
//! Pending ──► FastChecked ──┬──► Resolved ─────────────────┐
//!                           │                              ▼
//!                           └──► NeedsDeepAnalysis ──► Classified
//! ```
//!
//! Every failure inside this module degrades the event to
//! `no_event / low / none`; nothing here aborts the run.

mod consensus;
mod fast;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, info, warn, Instrument};

use binwatch_ml_client::OverflowVerdict;
use binwatch_models::{ConfidenceTier, Event, EventClassification, EventType};

use crate::cost_guard::CostGuard;
use crate::error::WorkerResult;

pub use consensus::{consensus, select_vlm_frames, Consensus, MAX_VLM_FRAMES, MIN_VLM_FRAMES};
pub use fast::{representative_frames, run_fast_vote, FastOutcome, FastVote};

/// Binary full / not-full classifier for a single still frame.
#[async_trait]
pub trait OverflowClassifier: Send + Sync {
    async fn classify(&self, frame: &Path, threshold: f32) -> WorkerResult<OverflowVerdict>;
}

/// One frame's label from the vision-language model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameVerdict {
    pub event_type: EventType,
    pub confidence: ConfidenceTier,
}

/// Parsed reply of one vision-language call.
#[derive(Debug, Clone, PartialEq)]
pub struct VlmResponse {
    /// One entry per frame the model judged
    pub frame_verdicts: Vec<FrameVerdict>,
    /// Free text; opaque to the pipeline
    pub description: String,
}

/// Paid multi-label classifier over a handful of frames.
///
/// Callers send between [`MIN_VLM_FRAMES`] and [`MAX_VLM_FRAMES`] frames per
/// call, in time order.
#[async_trait]
pub trait VisionClassifier: Send + Sync {
    /// Estimated USD cost of classifying `frames` in one call.
    fn estimate_cost(&self, frames: &[PathBuf]) -> f64;

    async fn classify(
        &self,
        frames: &[PathBuf],
        taxonomy: &[EventType],
        context: &str,
    ) -> WorkerResult<VlmResponse>;
}

/// Per-event classification progress.
#[derive(Debug)]
enum Stage {
    Pending,
    FastChecked(Option<FastVote>),
    Resolved(EventClassification),
    NeedsDeepAnalysis(Option<FastVote>),
    Classified(EventClassification),
}

/// Orchestrates the fast and vision-language classifiers for one run.
#[derive(Clone)]
pub struct HybridClassifier {
    fast: Option<Arc<dyn OverflowClassifier>>,
    vlm: Option<Arc<dyn VisionClassifier>>,
    overflow_threshold: f32,
}

impl HybridClassifier {
    pub fn new(overflow_threshold: f32) -> Self {
        Self {
            fast: None,
            vlm: None,
            overflow_threshold,
        }
    }

    pub fn with_fast(mut self, classifier: Arc<dyn OverflowClassifier>) -> Self {
        self.fast = Some(classifier);
        self
    }

    pub fn with_vlm(mut self, classifier: Arc<dyn VisionClassifier>) -> Self {
        self.vlm = Some(classifier);
        self
    }

    pub fn has_fast(&self) -> bool {
        self.fast.is_some()
    }

    pub fn has_vlm(&self) -> bool {
        self.vlm.is_some()
    }

    /// Classify one sampled event from its still frames.
    ///
    /// `frames` are the event's frame images in `frame_refs` order. Paid calls
    /// go through `guard`; a denied reservation degrades the event.
    pub async fn classify(
        &self,
        event: &Event,
        frames: &[PathBuf],
        guard: &mut CostGuard,
        context: &str,
    ) -> EventClassification {
        let mut stage = Stage::Pending;

        loop {
            stage = match stage {
                Stage::Pending => Stage::FastChecked(self.fast_check(frames).await),

                Stage::FastChecked(vote) => match vote.map(|v| v.decide(self.has_vlm())) {
                    Some(Ok(FastOutcome::Resolved(classification))) => {
                        Stage::Resolved(classification)
                    }
                    Some(Err(e)) => {
                        warn!(event_id = event.event_id, "Fast verdict rejected: {}", e);
                        Stage::NeedsDeepAnalysis(vote)
                    }
                    _ => Stage::NeedsDeepAnalysis(vote),
                },

                Stage::Resolved(classification) => Stage::Classified(classification),

                Stage::NeedsDeepAnalysis(vote) => {
                    Stage::Classified(self.deep_analysis(event, frames, vote, guard, context).await)
                }

                Stage::Classified(classification) => {
                    info!(
                        event_id = event.event_id,
                        method = %classification.method,
                        event_type = %classification.event_type,
                        confidence = %classification.confidence,
                        unanalyzed = classification.unanalyzed,
                        "Event classified"
                    );
                    return classification;
                }
            };
        }
    }

    async fn fast_check(&self, frames: &[PathBuf]) -> Option<FastVote> {
        let classifier = self.fast.as_ref()?;
        Some(run_fast_vote(classifier.as_ref(), frames, self.overflow_threshold).await)
    }

    async fn deep_analysis(
        &self,
        event: &Event,
        frames: &[PathBuf],
        fast_vote: Option<FastVote>,
        guard: &mut CostGuard,
        context: &str,
    ) -> EventClassification {
        let fast_votes = fast_vote.map(|v| v.votes()).unwrap_or_default();

        let Some(vlm) = self.vlm.as_ref() else {
            return EventClassification::degraded("no vision-language classifier configured")
                .with_votes(fast_votes);
        };

        let selected = select_vlm_frames(frames);
        analyze_frames(vlm.as_ref(), &selected, fast_votes, guard, context)
            .instrument(debug_span!("deep_analysis", event_id = event.event_id))
            .await
    }
}

/// Run one vision-language call over `frames` and reduce it to a verdict.
///
/// `frames` must hold between [`MIN_VLM_FRAMES`] and [`MAX_VLM_FRAMES`]
/// images; longer lists are thinned with [`select_vlm_frames`]. `prior_votes`
/// are merged into the result's vote map. A denied reservation, a failed call
/// or too few frames degrade the result instead of erroring.
pub async fn analyze_frames(
    vlm: &dyn VisionClassifier,
    frames: &[PathBuf],
    prior_votes: BTreeMap<String, u32>,
    guard: &mut CostGuard,
    context: &str,
) -> EventClassification {
    let degrade =
        |reason: &str| EventClassification::degraded(reason).with_votes(prior_votes.clone());

    let thinned;
    let frames = if frames.len() > MAX_VLM_FRAMES {
        thinned = select_vlm_frames(frames);
        thinned.as_slice()
    } else {
        frames
    };

    if frames.is_empty() {
        return degrade("no frames available");
    }
    if frames.len() < MIN_VLM_FRAMES {
        debug!(frames = frames.len(), "Too few frames for vision-language analysis");
        return degrade("too few frames for vision-language analysis");
    }

    let estimate = vlm.estimate_cost(frames);
    if !guard.reserve(estimate) {
        return degrade("budget exhausted");
    }

    debug!(frames = frames.len(), estimate, "Requesting vision-language analysis");

    let response = match vlm.classify(frames, EventType::ALL, context).await {
        Ok(response) => response,
        Err(e) => {
            guard.release(estimate);
            warn!("Vision-language analysis failed: {}", e);
            return degrade(&format!("vision-language call failed: {}", e));
        }
    };
    guard.record_images(frames.len());

    let Consensus {
        event_type,
        confidence,
        votes,
    } = consensus(&response.frame_verdicts, EventType::ALL).unwrap_or_else(|| Consensus {
        event_type: EventType::NoEvent,
        confidence: ConfidenceTier::Low,
        votes: Default::default(),
    });

    let mut all_votes = prior_votes;
    all_votes.extend(votes);

    EventClassification::from_vlm(
        event_type,
        confidence,
        response.description,
        all_votes,
        estimate,
    )
}
