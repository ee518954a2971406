//! Fast overflow vote over an event's representative frames.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use binwatch_ml_client::{InferenceClient, OverflowLabel, OverflowVerdict};
use binwatch_models::{ConfidenceTier, EventClassification, EventType};

use super::OverflowClassifier;
use crate::error::WorkerResult;

/// Agreeing frames needed for a definitive verdict.
const MIN_AGREEMENT: u32 = 2;

#[async_trait]
impl OverflowClassifier for InferenceClient {
    async fn classify(&self, frame: &Path, threshold: f32) -> WorkerResult<OverflowVerdict> {
        Ok(self.classify_overflow(frame, threshold).await?)
    }
}

/// First, middle and last frame, without duplicates.
pub fn representative_frames(frames: &[PathBuf]) -> Vec<&PathBuf> {
    if frames.is_empty() {
        return Vec::new();
    }
    let n = frames.len();
    let mut indices = vec![0, n / 2, n - 1];
    indices.dedup();
    indices.into_iter().map(|i| &frames[i]).collect()
}

/// Tally of per-frame overflow labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FastVote {
    pub full: u32,
    pub not_full: u32,
    /// Frames whose call failed; they cast no vote
    pub failed: u32,
}

/// What the fast vote settles on its own.
#[derive(Debug, Clone, PartialEq)]
pub enum FastOutcome {
    /// Definitive verdict; the vision-language stage is skipped
    Resolved(EventClassification),
    /// Overflow was not confirmed; other categories are still open
    Inconclusive,
}

impl FastVote {
    pub fn record(&mut self, label: OverflowLabel) {
        match label {
            OverflowLabel::Full => self.full += 1,
            OverflowLabel::NotFull => self.not_full += 1,
        }
    }

    pub fn cast(&self) -> u32 {
        self.full + self.not_full
    }

    /// Label counts for the audit trail.
    pub fn votes(&self) -> BTreeMap<String, u32> {
        let mut votes = BTreeMap::new();
        if self.full > 0 {
            votes.insert(OverflowLabel::Full.as_str().to_string(), self.full);
        }
        if self.not_full > 0 {
            votes.insert(OverflowLabel::NotFull.as_str().to_string(), self.not_full);
        }
        votes
    }

    /// Turn the tally into an outcome.
    ///
    /// A `full` majority of at least two frames is always definitive. A
    /// `not_full` majority only rules out overflow, so it settles the event as
    /// `no_event` only when no vision-language classifier will look at it.
    pub fn decide(&self, deep_analysis_available: bool) -> WorkerResult<FastOutcome> {
        if self.full >= MIN_AGREEMENT && self.full > self.not_full {
            let classification =
                EventClassification::from_fast(EventType::Overflow, ConfidenceTier::High, self.votes())?;
            return Ok(FastOutcome::Resolved(classification));
        }

        if !deep_analysis_available && self.not_full >= MIN_AGREEMENT && self.not_full > self.full {
            let confidence = if self.full == 0 && self.failed == 0 {
                ConfidenceTier::Medium
            } else {
                ConfidenceTier::Low
            };
            let classification =
                EventClassification::from_fast(EventType::NoEvent, confidence, self.votes())?;
            return Ok(FastOutcome::Resolved(classification));
        }

        Ok(FastOutcome::Inconclusive)
    }
}

/// Run the fast classifier on each representative frame in turn.
///
/// Frame-level failures are logged and skipped; they never fail the event.
pub async fn run_fast_vote(
    classifier: &dyn OverflowClassifier,
    frames: &[PathBuf],
    threshold: f32,
) -> FastVote {
    let mut vote = FastVote::default();

    for frame in representative_frames(frames) {
        match classifier.classify(frame, threshold).await {
            Ok(verdict) => {
                debug!(
                    frame = %frame.display(),
                    label = verdict.label.as_str(),
                    probability = verdict.probability,
                    "Overflow verdict"
                );
                vote.record(verdict.label);
            }
            Err(e) => {
                warn!(frame = %frame.display(), "Overflow classifier failed: {}", e);
                vote.failed += 1;
            }
        }
    }

    vote
}
