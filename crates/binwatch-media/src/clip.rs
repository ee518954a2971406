//! Event clip extraction.
//!
//! Each event gets a fixed-length clip placed around its peak detection.
//! Output paths are deterministic, `{clip_dir}/{video_id}/event_{id:03}_t{peak:.2}s.mp4`,
//! and an existing non-empty file at that path is returned without running
//! FFmpeg again.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use binwatch_models::{ClipEncoding, Event, EventId, VideoId};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{nonempty_file_exists, publish_file, remove_if_exists};

/// Per-clip FFmpeg timeout.
const DEFAULT_CLIP_TIMEOUT_SECS: u64 = 300;

/// Time range of a clip within the source video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipWindow {
    pub start: f64,
    pub duration: f64,
}

impl ClipWindow {
    /// Window of `clip_duration` seconds starting `pad_before` seconds ahead
    /// of `peak`, shifted to stay inside `[0, video_duration]`.
    ///
    /// The full duration is preserved unless the video itself is shorter.
    pub fn around(
        peak: f64,
        clip_duration: f64,
        pad_before: f64,
        video_duration: f64,
    ) -> MediaResult<Self> {
        if !(clip_duration.is_finite() && clip_duration > 0.0) {
            return Err(MediaError::invalid_argument(format!(
                "clip duration must be positive, got {}",
                clip_duration
            )));
        }
        if !(pad_before.is_finite() && pad_before >= 0.0) {
            return Err(MediaError::invalid_argument(format!(
                "clip padding must be non-negative, got {}",
                pad_before
            )));
        }

        let duration = if video_duration > 0.0 {
            clip_duration.min(video_duration)
        } else {
            clip_duration
        };
        let latest_start = (video_duration - duration).max(0.0);
        let start = (peak - pad_before).clamp(0.0, latest_start);

        Ok(Self { start, duration })
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Deterministic clip path for an event.
pub fn clip_output_path(
    clip_dir: impl AsRef<Path>,
    video_id: &VideoId,
    event_id: EventId,
    peak_timestamp: f64,
) -> PathBuf {
    clip_dir
        .as_ref()
        .join(video_id.as_str())
        .join(format!("event_{:03}_t{:.2}s.mp4", event_id, peak_timestamp))
}

/// Peak timestamp encoded in a clip file name by [`clip_output_path`].
pub fn clip_peak_timestamp(clip: impl AsRef<Path>) -> Option<f64> {
    let stem = clip.as_ref().file_stem()?.to_str()?;
    let (_, tail) = stem.rsplit_once("_t")?;
    tail.strip_suffix('s')?.parse().ok()
}

/// The source video a run is clipping from.
#[derive(Debug, Clone)]
pub struct VideoHandle {
    pub video_id: VideoId,
    pub path: PathBuf,
    /// Duration in seconds, used for window clamping
    pub duration: f64,
}

/// Materializes event clips.
#[async_trait]
pub trait ClipSource: Send + Sync {
    /// Produce (or find) the clip for `event` and return its path.
    async fn extract(
        &self,
        event: &Event,
        video: &VideoHandle,
        clip_duration_seconds: f64,
        pad_before_seconds: f64,
    ) -> MediaResult<PathBuf>;
}

/// [`ClipSource`] that re-encodes clips with FFmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegClipExtractor {
    clip_dir: PathBuf,
    encoding: ClipEncoding,
    timeout_secs: u64,
}

impl FfmpegClipExtractor {
    pub fn new(clip_dir: impl Into<PathBuf>) -> Self {
        Self {
            clip_dir: clip_dir.into(),
            encoding: ClipEncoding::default(),
            timeout_secs: DEFAULT_CLIP_TIMEOUT_SECS,
        }
    }

    pub fn with_encoding(mut self, encoding: ClipEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn clip_dir(&self) -> &Path {
        &self.clip_dir
    }
}

#[async_trait]
impl ClipSource for FfmpegClipExtractor {
    async fn extract(
        &self,
        event: &Event,
        video: &VideoHandle,
        clip_duration_seconds: f64,
        pad_before_seconds: f64,
    ) -> MediaResult<PathBuf> {
        let output = clip_output_path(
            &self.clip_dir,
            &video.video_id,
            event.event_id,
            event.peak_timestamp,
        );

        if nonempty_file_exists(&output).await {
            debug!(event_id = event.event_id, "Clip already exists: {}", output.display());
            return Ok(output);
        }

        let window = ClipWindow::around(
            event.peak_timestamp,
            clip_duration_seconds,
            pad_before_seconds,
            video.duration,
        )
        .map_err(|e| MediaError::clip_extraction(event.event_id, e.to_string()))?;

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Encode next to the final path, then rename into place
        let partial = output.with_extension("part.mp4");
        let cmd = FfmpegCommand::new(&video.path, &partial)
            .seek(window.start)
            .duration(window.duration)
            .encoding(&self.encoding)
            .faststart();

        info!(
            event_id = event.event_id,
            start = window.start,
            duration = window.duration,
            "Extracting clip {}",
            output.display()
        );

        let runner = FfmpegRunner::new().with_timeout(self.timeout_secs);
        if let Err(e) = runner.run(&cmd).await {
            remove_if_exists(&partial).await;
            let detail = match &e {
                MediaError::FfmpegFailed {
                    stderr: Some(stderr),
                    ..
                } => format!("{}: {}", e, stderr.lines().last().unwrap_or_default()),
                _ => e.to_string(),
            };
            return Err(MediaError::clip_extraction(event.event_id, detail));
        }

        if !nonempty_file_exists(&partial).await {
            remove_if_exists(&partial).await;
            return Err(MediaError::clip_extraction(
                event.event_id,
                "FFmpeg produced an empty clip",
            ));
        }

        publish_file(&partial, &output)
            .await
            .map_err(|e| MediaError::clip_extraction(event.event_id, e.to_string()))?;

        Ok(output)
    }
}
