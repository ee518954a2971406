//! Frame selection and per-frame consensus for the vision-language stage.

use std::collections::BTreeMap;
use std::path::PathBuf;

use binwatch_models::{ConfidenceTier, EventType};

use super::FrameVerdict;

/// Fewest frames worth one vision-language call.
pub const MIN_VLM_FRAMES: usize = 2;

/// Most frames sent in one vision-language call.
pub const MAX_VLM_FRAMES: usize = 5;

/// Pick the frames sent to the vision-language model.
///
/// Short events send start, middle and end; longer ones add the quartiles.
/// A single-frame event yields one frame, which is below [`MIN_VLM_FRAMES`].
pub fn select_vlm_frames(frames: &[PathBuf]) -> Vec<PathBuf> {
    let n = frames.len();
    if n == 0 {
        return Vec::new();
    }

    let mut indices = if n > MAX_VLM_FRAMES {
        vec![0, n / 4, n / 2, 3 * n / 4, n - 1]
    } else {
        vec![0, n / 2, n - 1]
    };
    indices.dedup();
    indices.into_iter().map(|i| frames[i].clone()).collect()
}

/// Result of voting over per-frame labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Consensus {
    pub event_type: EventType,
    pub confidence: ConfidenceTier,
    /// Raw per-frame label counts
    pub votes: BTreeMap<String, u32>,
}

#[derive(Default)]
struct Tally {
    count: u32,
    weight: u32,
}

impl Tally {
    fn average_weight(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.weight as f64 / self.count as f64
        }
    }
}

/// Majority vote over per-frame verdicts.
///
/// Ties on count go to the label with the higher average self-reported
/// confidence, then to the label listed first in `taxonomy`. The winner's
/// confidence is the tier nearest its average weight. Returns `None` when
/// there is nothing to vote on.
pub fn consensus(verdicts: &[FrameVerdict], taxonomy: &[EventType]) -> Option<Consensus> {
    let mut tallies: BTreeMap<EventType, Tally> = BTreeMap::new();
    for verdict in verdicts {
        let tally = tallies.entry(verdict.event_type).or_default();
        tally.count += 1;
        tally.weight += verdict.confidence.weight();
    }

    let rank = |t: &EventType| {
        taxonomy
            .iter()
            .position(|candidate| candidate == t)
            .unwrap_or(taxonomy.len())
    };

    let (winner, tally) = tallies.iter().max_by(|(a_type, a), (b_type, b)| {
        a.count
            .cmp(&b.count)
            .then(a.average_weight().total_cmp(&b.average_weight()))
            // Earlier taxonomy position wins, so it must compare greater
            .then(rank(b_type).cmp(&rank(a_type)))
    })?;

    let votes = tallies
        .iter()
        .map(|(t, tally)| (t.as_str().to_string(), tally.count))
        .collect();

    Some(Consensus {
        event_type: *winner,
        confidence: ConfidenceTier::from_weight(tally.average_weight()),
        votes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(event_type: EventType, confidence: ConfidenceTier) -> FrameVerdict {
        FrameVerdict {
            event_type,
            confidence,
        }
    }

    fn frames(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("f{}.jpg", i))).collect()
    }

    #[test]
    fn test_frame_selection() {
        let picked = select_vlm_frames(&frames(3));
        assert_eq!(picked, frames(3));

        let eight = frames(8);
        let picked = select_vlm_frames(&eight);
        assert_eq!(
            picked,
            vec![
                eight[0].clone(),
                eight[2].clone(),
                eight[4].clone(),
                eight[6].clone(),
                eight[7].clone()
            ]
        );

        assert_eq!(select_vlm_frames(&frames(1)).len(), 1);
        assert_eq!(select_vlm_frames(&frames(2)).len(), 2);
        assert!(select_vlm_frames(&[]).is_empty());
    }

    #[test]
    fn test_majority_wins() {
        let verdicts = vec![
            verdict(EventType::BlockedAccess, ConfidenceTier::Medium),
            verdict(EventType::NoEvent, ConfidenceTier::High),
            verdict(EventType::BlockedAccess, ConfidenceTier::High),
        ];
        let result = consensus(&verdicts, EventType::ALL).unwrap();

        assert_eq!(result.event_type, EventType::BlockedAccess);
        assert_eq!(result.confidence, ConfidenceTier::High);
        assert_eq!(result.votes.get("blocked_access"), Some(&2));
        assert_eq!(result.votes.get("no_event"), Some(&1));
    }

    #[test]
    fn test_tie_prefers_higher_confidence() {
        let verdicts = vec![
            verdict(EventType::MissedCollection, ConfidenceTier::Low),
            verdict(EventType::Contamination, ConfidenceTier::High),
        ];
        let result = consensus(&verdicts, EventType::ALL).unwrap();
        assert_eq!(result.event_type, EventType::Contamination);
        assert_eq!(result.confidence, ConfidenceTier::High);
    }

    #[test]
    fn test_full_tie_falls_back_to_taxonomy_order() {
        let verdicts = vec![
            verdict(EventType::Overflow, ConfidenceTier::Medium),
            verdict(EventType::MissedCollection, ConfidenceTier::Medium),
        ];
        let result = consensus(&verdicts, EventType::ALL).unwrap();
        assert_eq!(result.event_type, EventType::MissedCollection);
    }

    #[test]
    fn test_mixed_confidence_averages() {
        let verdicts = vec![
            verdict(EventType::Overflow, ConfidenceTier::High),
            verdict(EventType::Overflow, ConfidenceTier::Low),
        ];
        let result = consensus(&verdicts, EventType::ALL).unwrap();
        assert_eq!(result.confidence, ConfidenceTier::Medium);
    }

    #[test]
    fn test_empty_verdicts() {
        assert!(consensus(&[], EventType::ALL).is_none());
    }
}
