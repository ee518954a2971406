//! Run report data handed to the JSON/Markdown writers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::event::{Event, SamplingDisposition};
use crate::video::VideoSummary;

/// Budget usage for the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CostSummary {
    pub total_cost_usd: f64,
    pub max_cost_usd: f64,
    pub remaining_usd: f64,
    pub calls_granted: u32,
    pub calls_denied: u32,
    pub images_analyzed: u32,
    /// Whether the ceiling was hit during the run
    pub exhausted: bool,
}

impl CostSummary {
    /// Budget utilization as a percentage, if a ceiling is set.
    pub fn utilization_percent(&self) -> Option<f64> {
        if self.max_cost_usd > 0.0 {
            Some(self.total_cost_usd / self.max_cost_usd * 100.0)
        } else {
            None
        }
    }
}

/// How the classified subset was chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SamplingInfo {
    /// Requested sample size (`None` = all eligible events)
    pub sample_size: Option<usize>,
    pub seed: Option<u64>,
    pub eligible_events: usize,
    pub sampled_events: usize,
    pub sampling_method: String,
}

/// Aggregate counts over the final event list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunSummary {
    pub total_events: usize,
    pub sampled: usize,
    pub unsampled: usize,
    pub not_eligible: usize,
    pub classified: usize,
    pub unanalyzed: usize,
    pub clipless: usize,
    /// Classified events per event type
    pub by_event_type: BTreeMap<String, usize>,
    /// Classified events per method
    pub by_method: BTreeMap<String, usize>,
}

impl RunSummary {
    /// Tally an event list.
    pub fn from_events(events: &[Event]) -> Self {
        let mut summary = RunSummary {
            total_events: events.len(),
            ..Default::default()
        };

        for event in events {
            match event.disposition {
                Some(SamplingDisposition::Sampled) => summary.sampled += 1,
                Some(SamplingDisposition::Unsampled) => summary.unsampled += 1,
                Some(SamplingDisposition::NotEligible) => summary.not_eligible += 1,
                None => {}
            }
            if event.is_clipless() {
                summary.clipless += 1;
            }
            if let Some(c) = &event.classification {
                if c.unanalyzed {
                    summary.unanalyzed += 1;
                } else {
                    summary.classified += 1;
                }
                *summary
                    .by_event_type
                    .entry(c.event_type.as_str().to_string())
                    .or_insert(0) += 1;
                *summary.by_method.entry(c.method.to_string()).or_insert(0) += 1;
            }
        }

        summary
    }
}

/// Everything a report writer needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunReport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub video: VideoSummary,
    pub summary: RunSummary,
    pub sampling: SamplingInfo,
    pub cost: CostSummary,
    pub events: Vec<Event>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::{ConfidenceTier, EventClassification, EventType};

    fn event(event_id: u32, disposition: SamplingDisposition) -> Event {
        Event {
            event_id,
            start_time: event_id as f64 * 10.0,
            end_time: event_id as f64 * 10.0 + 2.0,
            peak_timestamp: event_id as f64 * 10.0,
            peak_confidence: 0.8,
            detection_count: 3,
            frame_refs: vec![1, 2, 3],
            clip_path: None,
            clip_error: None,
            disposition: Some(disposition),
            classification: None,
        }
    }

    #[test]
    fn test_summary_counts() {
        let mut sampled = event(1, SamplingDisposition::Sampled);
        sampled.classification = Some(EventClassification::from_vlm(
            EventType::BlockedAccess,
            ConfidenceTier::High,
            "van parked in front",
            BTreeMap::new(),
            0.02,
        ));
        let mut degraded = event(2, SamplingDisposition::Sampled);
        degraded.classification = Some(EventClassification::degraded("budget exhausted"));
        degraded.clip_error = Some("ffmpeg failed".to_string());

        let events = vec![
            sampled,
            degraded,
            event(3, SamplingDisposition::Unsampled),
            event(4, SamplingDisposition::NotEligible),
        ];

        let summary = RunSummary::from_events(&events);
        assert_eq!(summary.total_events, 4);
        assert_eq!(summary.sampled, 2);
        assert_eq!(summary.unsampled, 1);
        assert_eq!(summary.not_eligible, 1);
        assert_eq!(summary.classified, 1);
        assert_eq!(summary.unanalyzed, 1);
        assert_eq!(summary.clipless, 1);
        assert_eq!(summary.by_event_type.get("blocked_access"), Some(&1));
        assert_eq!(summary.by_method.get("none"), Some(&1));
    }

    #[test]
    fn test_utilization() {
        let cost = CostSummary {
            total_cost_usd: 0.25,
            max_cost_usd: 1.0,
            ..Default::default()
        };
        assert!((cost.utilization_percent().unwrap() - 25.0).abs() < 1e-9);
        assert_eq!(CostSummary::default().utilization_percent(), None);
    }
}
