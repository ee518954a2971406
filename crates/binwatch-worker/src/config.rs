//! Pipeline configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use binwatch_ml_client::InferenceClientConfig;
use binwatch_models::ClipEncoding;

use crate::error::{WorkerError, WorkerResult};

/// Settings for the OpenAI-compatible vision-language endpoint.
#[derive(Clone)]
pub struct VlmConfig {
    /// `None` disables the vision-language path entirely
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_tokens: u32,
}

impl Default for VlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(60),
            max_tokens: 500,
        }
    }
}

impl fmt::Debug for VlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl VlmConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            model: std::env::var("OPENAI_MODEL").unwrap_or(defaults.model),
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            timeout: env_parse("VLM_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_tokens: env_parse("VLM_MAX_TOKENS").unwrap_or(defaults.max_tokens),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root for videos, frames, clips and reports
    pub output_dir: PathBuf,
    /// Frames sampled per second of video
    pub sample_rate_hz: f64,
    /// Box confidence at or above which a frame counts as containing a bin
    pub detection_confidence: f32,
    /// Longest tolerated absence inside one event
    pub max_gap_seconds: f64,
    /// Events with fewer bin frames are `not_eligible`
    pub min_detections: usize,
    pub clip_duration_seconds: f64,
    pub clip_pad_before_seconds: f64,
    pub clip_encoding: ClipEncoding,
    /// Full-class probability above which a frame votes `full`
    pub overflow_threshold: f32,
    /// `None` classifies every eligible event
    pub sample_size: Option<usize>,
    /// `None` draws from OS entropy
    pub seed: Option<u64>,
    /// Spend ceiling for paid calls in USD
    pub max_vlm_cost_usd: f64,
    /// Stop after segmentation and clip extraction
    pub skip_analysis: bool,
    pub use_fast_classifier: bool,
    /// Netscape cookies file passed to yt-dlp
    pub cookies: Option<PathBuf>,
    pub vlm: VlmConfig,
    pub inference: InferenceClientConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let clip_duration_seconds = 10.0;
        Self {
            output_dir: PathBuf::from("outputs"),
            sample_rate_hz: 1.0,
            detection_confidence: 0.5,
            max_gap_seconds: 2.0,
            min_detections: 2,
            clip_duration_seconds,
            clip_pad_before_seconds: clip_duration_seconds / 2.0,
            clip_encoding: ClipEncoding::default(),
            overflow_threshold: 0.5,
            sample_size: None,
            seed: None,
            max_vlm_cost_usd: 1.0,
            skip_analysis: false,
            use_fast_classifier: true,
            cookies: None,
            vlm: VlmConfig::default(),
            inference: InferenceClientConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let clip_duration_seconds =
            env_parse("BINWATCH_CLIP_DURATION_SECONDS").unwrap_or(defaults.clip_duration_seconds);

        Self {
            output_dir: std::env::var("BINWATCH_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            sample_rate_hz: env_parse("BINWATCH_SAMPLE_RATE_HZ").unwrap_or(defaults.sample_rate_hz),
            detection_confidence: env_parse("BINWATCH_DETECTION_CONFIDENCE")
                .unwrap_or(defaults.detection_confidence),
            max_gap_seconds: env_parse("BINWATCH_MAX_GAP_SECONDS")
                .unwrap_or(defaults.max_gap_seconds),
            min_detections: env_parse("BINWATCH_MIN_DETECTIONS").unwrap_or(defaults.min_detections),
            clip_duration_seconds,
            clip_pad_before_seconds: env_parse("BINWATCH_CLIP_PAD_BEFORE_SECONDS")
                .unwrap_or(clip_duration_seconds / 2.0),
            clip_encoding: clip_encoding_from_env(defaults.clip_encoding),
            overflow_threshold: env_parse("BINWATCH_OVERFLOW_THRESHOLD")
                .unwrap_or(defaults.overflow_threshold),
            sample_size: env_parse("BINWATCH_SAMPLE_SIZE"),
            seed: env_parse("BINWATCH_SEED"),
            max_vlm_cost_usd: env_parse("MAX_VLM_COST_USD").unwrap_or(defaults.max_vlm_cost_usd),
            skip_analysis: env_parse("BINWATCH_SKIP_ANALYSIS").unwrap_or(defaults.skip_analysis),
            use_fast_classifier: env_parse("BINWATCH_USE_FAST_CLASSIFIER")
                .unwrap_or(defaults.use_fast_classifier),
            cookies: std::env::var("BINWATCH_COOKIES").ok().map(PathBuf::from),
            vlm: VlmConfig::from_env(),
            inference: InferenceClientConfig::from_env(),
        }
    }

    /// Reject settings that would make the run meaningless.
    pub fn validate(&self) -> WorkerResult<()> {
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(WorkerError::config_error(format!(
                "sample rate must be positive, got {}",
                self.sample_rate_hz
            )));
        }
        if !(0.0..=1.0).contains(&self.detection_confidence) {
            return Err(WorkerError::config_error(format!(
                "detection confidence must be within [0, 1], got {}",
                self.detection_confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.overflow_threshold) {
            return Err(WorkerError::config_error(format!(
                "overflow threshold must be within [0, 1], got {}",
                self.overflow_threshold
            )));
        }
        if !(self.max_gap_seconds.is_finite() && self.max_gap_seconds >= 0.0) {
            return Err(WorkerError::config_error(format!(
                "max gap must be non-negative, got {}",
                self.max_gap_seconds
            )));
        }
        if self.min_detections == 0 {
            return Err(WorkerError::config_error("min detections must be at least 1"));
        }
        if !(self.clip_duration_seconds.is_finite() && self.clip_duration_seconds > 0.0) {
            return Err(WorkerError::config_error(format!(
                "clip duration must be positive, got {}",
                self.clip_duration_seconds
            )));
        }
        if !(self.clip_pad_before_seconds.is_finite() && self.clip_pad_before_seconds >= 0.0) {
            return Err(WorkerError::config_error(format!(
                "clip padding must be non-negative, got {}",
                self.clip_pad_before_seconds
            )));
        }
        if !(self.max_vlm_cost_usd.is_finite() && self.max_vlm_cost_usd >= 0.0) {
            return Err(WorkerError::config_error(format!(
                "cost ceiling must be non-negative, got {}",
                self.max_vlm_cost_usd
            )));
        }
        Ok(())
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.output_dir.join("videos")
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.output_dir.join("frames")
    }

    pub fn clips_dir(&self) -> PathBuf {
        self.output_dir.join("clips")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.output_dir.join("reports")
    }

    /// Point every output directory under `dir`.
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }
}

fn clip_encoding_from_env(defaults: ClipEncoding) -> ClipEncoding {
    let mut encoding = match env_parse::<u8>("BINWATCH_CLIP_CRF") {
        Some(crf) => defaults.with_crf(crf),
        None => defaults,
    };
    if env_parse("BINWATCH_CLIP_NO_AUDIO").unwrap_or(false) {
        encoding = encoding.video_only();
    }
    encoding
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
