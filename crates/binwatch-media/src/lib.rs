//! FFmpeg CLI wrapper for the BinWatch pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a runner with progress and timeout
//! - Video probing via FFprobe
//! - Source acquisition (local file or yt-dlp download)
//! - Fixed-rate still-frame sampling
//! - Evenly spaced frame sampling from finished clips
//! - Deterministic, idempotent event clip extraction

pub mod clip;
pub mod clip_frames;
pub mod command;
pub mod download;
pub mod error;
pub mod frames;
pub mod fs_utils;
pub mod probe;
pub mod progress;

pub use clip::{
    clip_output_path, clip_peak_timestamp, ClipSource, ClipWindow, FfmpegClipExtractor,
    VideoHandle,
};
pub use clip_frames::{clip_frame_dir, clip_sample_times, sample_clip_frames};
pub use command::{check_ffmpeg, check_ffprobe, check_ytdlp, FfmpegCommand, FfmpegRunner};
pub use download::{acquire_video, youtube_video_id, AcquiredVideo, VideoSource};
pub use error::{MediaError, MediaResult};
pub use frames::{extract_frames, frame_dir, list_frames, SampledFrame};
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
