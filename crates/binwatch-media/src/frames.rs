//! Fixed-rate frame sampling.
//!
//! Frames are written as `{frames_root}/{video_id}/{rate}hz/frame_{n:06}.jpg`
//! with a 0-based `n`, so the timestamp of frame `n` is `n / sample_rate_hz`.
//! The directory is keyed on the rate because timestamps are derived from it;
//! an existing non-empty directory for the same rate is reused as-is.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use binwatch_models::{DetectionRecord, VideoId};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

const FRAME_PREFIX: &str = "frame_";
const FRAME_EXT: &str = "jpg";
/// JPEG quality passed to `-q:v`
const FRAME_JPEG_QUALITY: u8 = 2;

/// One sampled still frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledFrame {
    /// 0-based sample index
    pub index: u64,
    /// Position in the source video in seconds
    pub timestamp_seconds: f64,
    pub path: PathBuf,
}

/// Directory holding a video's frames sampled at `sample_rate_hz`.
pub fn frame_dir(
    frames_root: impl AsRef<Path>,
    video_id: &VideoId,
    sample_rate_hz: f64,
) -> PathBuf {
    frames_root
        .as_ref()
        .join(video_id.as_str())
        .join(format!("{}hz", sample_rate_hz))
}

/// File name for sample `index`.
pub fn frame_file_name(index: u64) -> String {
    format!("{}{:06}.{}", FRAME_PREFIX, index, FRAME_EXT)
}

/// Parse the sample index out of a frame file name.
fn parse_frame_index(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(FRAME_PREFIX)?
        .strip_suffix(FRAME_EXT)?
        .strip_suffix('.')?
        .parse()
        .ok()
}

/// Sample frames from `video_path` at `sample_rate_hz`.
///
/// `duration_secs` is only used for progress logging.
pub async fn extract_frames(
    video_path: impl AsRef<Path>,
    frames_root: impl AsRef<Path>,
    video_id: &VideoId,
    sample_rate_hz: f64,
    duration_secs: f64,
) -> MediaResult<Vec<SampledFrame>> {
    let video_path = video_path.as_ref();

    if !(sample_rate_hz.is_finite() && sample_rate_hz > 0.0) {
        return Err(MediaError::invalid_argument(format!(
            "sample rate must be positive, got {}",
            sample_rate_hz
        )));
    }

    let dir = frame_dir(frames_root, video_id, sample_rate_hz);
    fs::create_dir_all(&dir).await?;

    let existing = list_frames(&dir, sample_rate_hz).await?;
    if !existing.is_empty() {
        info!(
            video_id = %video_id,
            frames = existing.len(),
            "Reusing previously extracted frames"
        );
        return Ok(existing);
    }

    let pattern = dir.join(format!("{}%06d.{}", FRAME_PREFIX, FRAME_EXT));
    let cmd = FfmpegCommand::new(video_path, &pattern)
        .video_filter(format!("fps={}", sample_rate_hz))
        .output_arg("-start_number")
        .output_arg("0")
        .image_quality(FRAME_JPEG_QUALITY);

    info!(
        video_id = %video_id,
        sample_rate_hz,
        "Extracting frames from {}",
        video_path.display()
    );

    let log_id = video_id.clone();
    FfmpegRunner::new()
        .run_with_progress(&cmd, move |progress| {
            debug!(
                video_id = %log_id,
                frames = progress.frame,
                percent = progress.percentage(duration_secs).round(),
                "Frame extraction progress"
            );
        })
        .await
        .map_err(|e| MediaError::frame_extraction(e.to_string()))?;

    let frames = list_frames(&dir, sample_rate_hz).await?;
    if frames.is_empty() {
        return Err(MediaError::frame_extraction(format!(
            "FFmpeg produced no frames in {}",
            dir.display()
        )));
    }

    info!(video_id = %video_id, frames = frames.len(), "Frame extraction complete");
    Ok(frames)
}

/// List frames already present in `dir`, ordered by index.
pub async fn list_frames(dir: impl AsRef<Path>, sample_rate_hz: f64) -> MediaResult<Vec<SampledFrame>> {
    let dir = dir.as_ref();
    let mut frames = Vec::new();

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(frames),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(index) = name.to_str().and_then(parse_frame_index) else {
            continue;
        };
        if entry.metadata().await?.len() == 0 {
            continue;
        }
        frames.push(SampledFrame {
            index,
            timestamp_seconds: DetectionRecord::timestamp_for(index, sample_rate_hz),
            path: entry.path(),
        });
    }

    frames.sort_by_key(|f| f.index);
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_frame_names() {
        assert_eq!(frame_file_name(7), "frame_000007.jpg");
        assert_eq!(parse_frame_index("frame_000007.jpg"), Some(7));
        assert_eq!(parse_frame_index("frame_000007.png"), None);
        assert_eq!(parse_frame_index("thumb_000007.jpg"), None);
        assert_eq!(parse_frame_index("frame_.jpg"), None);
    }

    #[tokio::test]
    async fn test_list_frames_sorted_with_timestamps() {
        let dir = TempDir::new().unwrap();
        for index in [3u64, 0, 1, 2] {
            fs::write(dir.path().join(frame_file_name(index)), b"jpeg")
                .await
                .unwrap();
        }
        fs::write(dir.path().join("frame_000004.jpg"), b"").await.unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").await.unwrap();

        let frames = list_frames(dir.path(), 2.0).await.unwrap();
        let indices: Vec<u64> = frames.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!((frames[3].timestamp_seconds - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_list_frames_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let frames = list_frames(dir.path().join("nope"), 1.0).await.unwrap();
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn test_extract_frames_reuses_existing() {
        let root = TempDir::new().unwrap();
        let video_id = VideoId::from_string("abc123");
        let dir = frame_dir(root.path(), &video_id, 1.0);
        fs::create_dir_all(&dir).await.unwrap();
        fs::write(dir.join(frame_file_name(0)), b"jpeg").await.unwrap();

        // The video path is never touched when frames already exist
        let frames = extract_frames("/does/not/exist.mp4", root.path(), &video_id, 1.0, 10.0)
            .await
            .unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_frame_dir_keyed_on_rate() {
        let video_id = VideoId::from_string("abc123");
        assert_eq!(
            frame_dir("frames", &video_id, 1.0),
            PathBuf::from("frames/abc123/1hz")
        );
        assert_eq!(
            frame_dir("frames", &video_id, 0.5),
            PathBuf::from("frames/abc123/0.5hz")
        );
    }

    #[tokio::test]
    async fn test_cached_frames_keep_their_own_rate() {
        let root = TempDir::new().unwrap();
        let video_id = VideoId::from_string("abc123");

        // A 1 Hz run left 20 frames behind
        let one_hz = frame_dir(root.path(), &video_id, 1.0);
        fs::create_dir_all(&one_hz).await.unwrap();
        for index in 0..20u64 {
            fs::write(one_hz.join(frame_file_name(index)), b"jpeg")
                .await
                .unwrap();
        }

        let frames = extract_frames("/does/not/exist.mp4", root.path(), &video_id, 1.0, 20.0)
            .await
            .unwrap();
        assert_eq!(frames.len(), 20);
        assert!((frames[10].timestamp_seconds - 10.0).abs() < 1e-9);

        // A 2 Hz run must not see the 1 Hz frames
        let two_hz = frame_dir(root.path(), &video_id, 2.0);
        assert_ne!(one_hz, two_hz);
        assert!(list_frames(&two_hz, 2.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extract_frames_rejects_zero_rate() {
        let root = TempDir::new().unwrap();
        let result = extract_frames("x.mp4", root.path(), &VideoId::from_string("v"), 0.0, 1.0).await;
        assert!(matches!(result, Err(MediaError::InvalidArgument(_))));
    }
}
