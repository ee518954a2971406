//! Event clip encoding profile.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How event clips are re-encoded.
///
/// Clips are short review artifacts, so the defaults favour encode speed over
/// size. The first video stream is always kept; audio is carried only when the
/// source has it and `audio_bitrate` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ClipEncoding {
    pub video_codec: String,
    pub preset: String,
    /// Constant Rate Factor, 0-51, lower is better
    pub crf: u8,
    /// AAC bitrate such as "96k"; `None` strips audio
    pub audio_bitrate: Option<String>,
}

impl Default for ClipEncoding {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 23,
            audio_bitrate: Some("96k".to_string()),
        }
    }
}

impl ClipEncoding {
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf.min(51);
        self
    }

    /// Drop the audio track from clips.
    pub fn video_only(mut self) -> Self {
        self.audio_bitrate = None;
        self
    }

    /// FFmpeg output arguments for this profile.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-map", "0:v:0"].iter().map(|s| s.to_string()).collect();

        match &self.audio_bitrate {
            // Trailing `?` keeps silent sources from failing the mapping
            Some(bitrate) => args.extend(
                ["-map", "0:a:0?", "-c:a", "aac", "-b:a", bitrate.as_str()]
                    .iter()
                    .map(|s| s.to_string()),
            ),
            None => args.push("-an".to_string()),
        }

        args.extend([
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
        ]);
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        let pos = args.iter().position(|a| a == flag)?;
        args.get(pos + 1).map(String::as_str)
    }

    #[test]
    fn test_default_keeps_optional_audio() {
        let args = ClipEncoding::default().to_ffmpeg_args();
        assert!(args.contains(&"0:a:0?".to_string()));
        assert_eq!(value_after(&args, "-b:a"), Some("96k"));
        assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
        assert!(!args.contains(&"-an".to_string()));
    }

    #[test]
    fn test_video_only() {
        let args = ClipEncoding::default().video_only().to_ffmpeg_args();
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("0:a")));
    }

    #[test]
    fn test_crf_is_capped() {
        let args = ClipEncoding::default().with_crf(80).to_ffmpeg_args();
        assert_eq!(value_after(&args, "-crf"), Some("51"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ClipEncoding = serde_json::from_str(r#"{"crf": 28}"#).unwrap();
        assert_eq!(config.crf, 28);
        assert_eq!(config.preset, "veryfast");
        assert_eq!(config.audio_bitrate.as_deref(), Some("96k"));
    }
}
