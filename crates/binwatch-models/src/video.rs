//! Source video identity and metadata.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a source video (YouTube id or local file stem).
///
/// Used as the per-video directory name for frames and clips.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Create from an existing string, replacing path separators and
    /// other characters that are unsafe in directory names.
    pub fn from_string(s: impl Into<String>) -> Self {
        let raw: String = s.into();
        let cleaned: String = raw
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let cleaned = cleaned.trim_matches('.').to_string();
        if cleaned.is_empty() {
            Self("video".to_string())
        } else {
            Self(cleaned)
        }
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

/// Source video properties needed by clip extraction and reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoSummary {
    pub video_id: VideoId,
    /// URL or local path the run was started with
    pub source: String,
    /// Duration in seconds
    pub duration: f64,
    /// Native frame rate
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// Rate at which frames were sampled for detection
    pub sample_rate_hz: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_id_sanitizes() {
        assert_eq!(VideoId::from_string("dQw4w9WgXcQ").as_str(), "dQw4w9WgXcQ");
        assert_eq!(VideoId::from_string("my clip/../x").as_str(), "my_clip_.._x");
        assert_eq!(VideoId::from_string("..").as_str(), "video");
        assert_eq!(VideoId::from_string("").as_str(), "video");
    }
}
