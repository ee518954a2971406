//! Event classification taxonomy and results.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ModelError, ModelResult};

/// Operational event taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Bin visible with no collection arm interacting with it
    MissedCollection,
    /// Non-recyclable items mixed into a recycling bin
    Contamination,
    /// Bin filled past the brim or spilling
    Overflow,
    /// Vehicle or obstacle in front of the bin
    BlockedAccess,
    /// None of the above
    NoEvent,
}

impl EventType {
    /// Full taxonomy, in prompt order.
    pub const ALL: &'static [EventType] = &[
        EventType::MissedCollection,
        EventType::Contamination,
        EventType::Overflow,
        EventType::BlockedAccess,
        EventType::NoEvent,
    ];

    /// Machine name used in reports and vote maps.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MissedCollection => "missed_collection",
            EventType::Contamination => "contamination",
            EventType::Overflow => "overflow",
            EventType::BlockedAccess => "blocked_access",
            EventType::NoEvent => "no_event",
        }
    }

    /// Human-readable label, as shown to the vision-language model.
    pub fn label(&self) -> &'static str {
        match self {
            EventType::MissedCollection => "Bin missed / not collected",
            EventType::Contamination => "Contamination detected",
            EventType::Overflow => "Overflowing bin or spillage",
            EventType::BlockedAccess => "Blocked access",
            EventType::NoEvent => "No event detected",
        }
    }

    /// What the model should look for when judging this category.
    pub fn guidance(&self) -> &'static str {
        match self {
            EventType::MissedCollection => {
                "The bin is visible but there is NO mechanical claw, arm, or collection equipment attached to or interacting with the bin"
            }
            EventType::Contamination => {
                "Non-recyclable waste items are mixed in with recyclable materials"
            }
            EventType::Overflow => {
                "The bin is filled to the brim and waste is protruding out or spilling over the edges"
            }
            EventType::BlockedAccess => {
                "A car, vehicle, or obstacle is parked directly in front of the bin, preventing collection access"
            }
            EventType::NoEvent => "None of the listed events is occurring",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventTypeParseError;

    /// Accepts machine names and the human labels, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().trim_matches('"').to_lowercase();
        EventType::ALL
            .iter()
            .copied()
            .find(|t| normalized == t.as_str() || normalized == t.label().to_lowercase())
            .ok_or_else(|| EventTypeParseError(s.to_string()))
    }
}

#[derive(Debug, Error)]
#[error("Unknown event type: {0}")]
pub struct EventTypeParseError(String);

/// Confidence tier attached to a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    /// Numeric weight (low=1, medium=2, high=3).
    pub fn weight(&self) -> u32 {
        match self {
            ConfidenceTier::Low => 1,
            ConfidenceTier::Medium => 2,
            ConfidenceTier::High => 3,
        }
    }

    /// Nearest tier for an average weight.
    pub fn from_weight(weight: f64) -> Self {
        if weight >= 2.5 {
            ConfidenceTier::High
        } else if weight >= 1.5 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    /// Lenient parse of model output; unknown values map to `Medium`.
    pub fn parse_lenient(s: &str) -> Self {
        let s = s.trim().to_lowercase();
        if s.starts_with("high") {
            ConfidenceTier::High
        } else if s.starts_with("low") {
            ConfidenceTier::Low
        } else {
            ConfidenceTier::Medium
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::Low => "low",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::High => "high",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which classifier produced the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    /// Fast binary overflow classifier
    Yolo,
    /// Vision-language model
    Vlm,
    /// No analysis performed (degraded)
    None,
}

impl fmt::Display for ClassificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClassificationMethod::Yolo => "yolo",
            ClassificationMethod::Vlm => "vlm",
            ClassificationMethod::None => "none",
        };
        write!(f, "{}", s)
    }
}

/// Final verdict for a sampled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EventClassification {
    pub event_type: EventType,
    pub confidence: ConfidenceTier,
    pub method: ClassificationMethod,
    /// Free text from the vision-language model; opaque to the pipeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Raw per-frame label counts, for auditing the consensus
    #[serde(default)]
    pub votes: BTreeMap<String, u32>,
    /// True when analysis was skipped or failed
    #[serde(default)]
    pub unanalyzed: bool,
    /// Why the event was left unanalyzed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Spend charged for this event in USD
    #[serde(default)]
    pub cost_usd: f64,
}

impl EventClassification {
    /// Verdict from the fast overflow classifier.
    ///
    /// The fast classifier is binary, so only `Overflow` and `NoEvent` are accepted.
    pub fn from_fast(
        event_type: EventType,
        confidence: ConfidenceTier,
        votes: BTreeMap<String, u32>,
    ) -> ModelResult<Self> {
        if !matches!(event_type, EventType::Overflow | EventType::NoEvent) {
            return Err(ModelError::InvalidClassification(format!(
                "fast classifier cannot produce '{}'",
                event_type
            )));
        }

        Ok(Self {
            event_type,
            confidence,
            method: ClassificationMethod::Yolo,
            description: None,
            votes,
            unanalyzed: false,
            skip_reason: None,
            cost_usd: 0.0,
        })
    }

    /// Verdict from the vision-language model.
    pub fn from_vlm(
        event_type: EventType,
        confidence: ConfidenceTier,
        description: impl Into<String>,
        votes: BTreeMap<String, u32>,
        cost_usd: f64,
    ) -> Self {
        Self {
            event_type,
            confidence,
            method: ClassificationMethod::Vlm,
            description: Some(description.into()),
            votes,
            unanalyzed: false,
            skip_reason: None,
            cost_usd,
        }
    }

    /// Degraded `no_event / low / none` result.
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            event_type: EventType::NoEvent,
            confidence: ConfidenceTier::Low,
            method: ClassificationMethod::None,
            description: None,
            votes: BTreeMap::new(),
            unanalyzed: true,
            skip_reason: Some(reason.into()),
            cost_usd: 0.0,
        }
    }

    /// Keep audit votes gathered before degrading.
    pub fn with_votes(mut self, votes: BTreeMap<String, u32>) -> Self {
        self.votes = votes;
        self
    }

    /// Check the method/type pairing.
    pub fn validate(&self) -> ModelResult<()> {
        match self.method {
            ClassificationMethod::Yolo
                if !matches!(self.event_type, EventType::Overflow | EventType::NoEvent) =>
            {
                Err(ModelError::InvalidClassification(format!(
                    "method yolo with event type '{}'",
                    self.event_type
                )))
            }
            ClassificationMethod::None if self.event_type != EventType::NoEvent => {
                Err(ModelError::InvalidClassification(format!(
                    "method none with event type '{}'",
                    self.event_type
                )))
            }
            _ => Ok(()),
        }
    }
}
