//! Still frames sampled evenly across a finished clip.
//!
//! Frames land in `{frames_root}/clip_{stem}/clip_frame_{i:02}_t{t:.2}.jpg`,
//! where `t` is the position inside the clip. Existing non-empty frames are
//! reused.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::frames::SampledFrame;
use crate::fs_utils::{nonempty_file_exists, publish_file, remove_if_exists};
use crate::probe::probe_video;

/// Distance kept from the clip's end so the last seek still lands on a frame.
const END_MARGIN_SECS: f64 = 0.1;
const FRAME_JPEG_QUALITY: u8 = 2;
const FRAME_TIMEOUT_SECS: u64 = 60;

/// Evenly spaced sample positions over a clip of `duration` seconds.
///
/// The first sample is at 0 and the last just before the end. A single sample
/// sits in the middle.
pub fn clip_sample_times(duration: f64, count: usize) -> Vec<f64> {
    if count == 0 || !(duration.is_finite() && duration > 0.0) {
        return Vec::new();
    }

    let last = (duration - END_MARGIN_SECS).max(0.0);
    if count == 1 {
        return vec![last / 2.0];
    }

    let step = last / (count - 1) as f64;
    (0..count).map(|i| i as f64 * step).collect()
}

/// Directory holding the sampled frames of `clip`.
pub fn clip_frame_dir(frames_root: impl AsRef<Path>, clip: impl AsRef<Path>) -> PathBuf {
    let stem = clip
        .as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "clip".to_string());
    frames_root.as_ref().join(format!("clip_{}", stem))
}

fn clip_frame_name(index: usize, timestamp: f64) -> String {
    format!("clip_frame_{:02}_t{:.2}.jpg", index, timestamp)
}

/// Grab `count` frames spread across `clip`.
///
/// Positions FFmpeg cannot decode are skipped; it is an error only when no
/// frame at all comes out.
pub async fn sample_clip_frames(
    clip: impl AsRef<Path>,
    frames_root: impl AsRef<Path>,
    count: usize,
) -> MediaResult<Vec<SampledFrame>> {
    let clip = clip.as_ref();

    if count == 0 {
        return Err(MediaError::invalid_argument("frame count must be at least 1"));
    }

    let info = probe_video(clip).await?;
    let times = clip_sample_times(info.duration, count);
    if times.is_empty() {
        return Err(MediaError::frame_extraction(format!(
            "clip {} has no usable duration",
            clip.display()
        )));
    }

    let dir = clip_frame_dir(frames_root, clip);
    tokio::fs::create_dir_all(&dir).await?;

    info!(
        frames = times.len(),
        duration = info.duration,
        "Sampling frames from clip {}",
        clip.display()
    );

    let runner = FfmpegRunner::new().with_timeout(FRAME_TIMEOUT_SECS);
    let mut frames = Vec::with_capacity(times.len());

    for (index, &timestamp) in times.iter().enumerate() {
        let output = dir.join(clip_frame_name(index, timestamp));
        let frame = SampledFrame {
            index: index as u64,
            timestamp_seconds: timestamp,
            path: output.clone(),
        };

        if nonempty_file_exists(&output).await {
            debug!("Reusing clip frame {}", output.display());
            frames.push(frame);
            continue;
        }

        let partial = output.with_extension("part.jpg");
        let cmd = FfmpegCommand::new(clip, &partial)
            .seek(timestamp)
            .single_frame()
            .image_quality(FRAME_JPEG_QUALITY);

        if let Err(e) = runner.run(&cmd).await {
            remove_if_exists(&partial).await;
            warn!(timestamp, "Clip frame extraction failed: {}", e);
            continue;
        }

        if !nonempty_file_exists(cmd.output_path()).await {
            remove_if_exists(&partial).await;
            warn!(timestamp, "FFmpeg wrote no frame");
            continue;
        }

        publish_file(&partial, &output).await?;
        frames.push(frame);
    }

    if frames.is_empty() {
        return Err(MediaError::frame_extraction(format!(
            "no frames could be read from {}",
            clip.display()
        )));
    }

    Ok(frames)
}
