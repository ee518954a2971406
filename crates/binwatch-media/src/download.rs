//! Source video acquisition.
//!
//! A run starts from either a local file or a URL. URLs are downloaded once
//! with yt-dlp into `{videos_dir}/{video_id}.{ext}` and reused afterwards.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use binwatch_models::VideoId;

use crate::command::check_ytdlp;
use crate::error::{MediaError, MediaResult};

/// Prefer a single progressive mp4, else cap at 720p, else whatever exists.
const YTDLP_FORMAT: &str = "best[ext=mp4]/best[height<=720]/best";

/// Container extensions yt-dlp may produce for the format above.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "mov"];

/// Minimum size for a valid cookies file (bytes).
const MIN_COOKIES_FILE_SIZE: u64 = 50;

/// Where the run's video comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    Local(PathBuf),
    Remote(String),
}

impl VideoSource {
    /// Classify a CLI input: anything with an http(s) scheme is remote.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            VideoSource::Remote(trimmed.to_string())
        } else {
            VideoSource::Local(PathBuf::from(trimmed))
        }
    }

    /// The input as given, for reports.
    pub fn display(&self) -> String {
        match self {
            VideoSource::Local(path) => path.display().to_string(),
            VideoSource::Remote(url) => url.clone(),
        }
    }
}

/// A video ready for probing.
#[derive(Debug, Clone)]
pub struct AcquiredVideo {
    pub video_id: VideoId,
    pub path: PathBuf,
    /// True if the file was fetched during this call
    pub downloaded: bool,
}

/// Resolve `source` to a local file, downloading if needed.
pub async fn acquire_video(
    source: &VideoSource,
    videos_dir: impl AsRef<Path>,
    cookies: Option<&Path>,
) -> MediaResult<AcquiredVideo> {
    match source {
        VideoSource::Local(path) => {
            if !path.is_file() {
                return Err(MediaError::FileNotFound(path.clone()));
            }
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            Ok(AcquiredVideo {
                video_id: VideoId::from_string(stem),
                path: path.clone(),
                downloaded: false,
            })
        }
        VideoSource::Remote(url) => download_video(url, videos_dir.as_ref(), cookies).await,
    }
}

/// Extract a YouTube video id from common URL shapes.
pub fn youtube_video_id(url: &str) -> Option<String> {
    let id = if let Some((_, query)) = url.split_once("v=") {
        query.split(['&', '#']).next()
    } else if let Some((_, rest)) = url.split_once("youtu.be/") {
        rest.split(['?', '&', '#', '/']).next()
    } else if let Some((_, rest)) = url.split_once("/shorts/") {
        rest.split(['?', '&', '#', '/']).next()
    } else {
        None
    }?;

    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| id.to_string())
}

/// Look for a previous download of `video_id` in `dir`.
async fn find_existing_download(dir: &Path, video_id: &VideoId) -> Option<PathBuf> {
    for ext in VIDEO_EXTENSIONS {
        let candidate = dir.join(format!("{}.{}", video_id, ext));
        if let Ok(metadata) = tokio::fs::metadata(&candidate).await {
            if metadata.len() > 0 {
                return Some(candidate);
            }
        }
    }
    None
}

/// Ask yt-dlp for the id of a URL we cannot parse ourselves.
async fn fetch_remote_id(url: &str) -> MediaResult<String> {
    let output = Command::new("yt-dlp")
        .args(["--no-playlist", "--skip-download", "--print", "id", url])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let error_msg = stderr.lines().last().unwrap_or("Unknown error");
        return Err(MediaError::download_failed(format!(
            "yt-dlp could not resolve video id: {}",
            error_msg
        )));
    }

    let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if id.is_empty() {
        return Err(MediaError::download_failed("yt-dlp returned an empty video id"));
    }
    Ok(id)
}

/// Download a video from URL using yt-dlp.
pub async fn download_video(
    url: &str,
    videos_dir: &Path,
    cookies: Option<&Path>,
) -> MediaResult<AcquiredVideo> {
    check_ytdlp()?;
    tokio::fs::create_dir_all(videos_dir).await?;

    let raw_id = match youtube_video_id(url) {
        Some(id) => id,
        None => fetch_remote_id(url).await?,
    };
    let video_id = VideoId::from_string(raw_id);

    if let Some(existing) = find_existing_download(videos_dir, &video_id).await {
        info!(video_id = %video_id, "Using existing video file: {}", existing.display());
        return Ok(AcquiredVideo {
            video_id,
            path: existing,
            downloaded: false,
        });
    }

    info!(video_id = %video_id, "Downloading video from {}", url);

    let template = videos_dir.join(format!("{}.%(ext)s", video_id));
    let template_str = template.to_string_lossy().to_string();

    let mut args: Vec<String> = vec![
        "--no-playlist".into(),
        "--no-progress".into(),
        "-f".into(),
        YTDLP_FORMAT.into(),
        "-o".into(),
        template_str,
        "--print".into(),
        "after_move:filepath".into(),
    ];

    if let Some(path) = cookies {
        if cookies_usable(path).await {
            args.push("--cookies".into());
            args.push(path.to_string_lossy().to_string());
        } else {
            warn!("Ignoring cookies file {}: missing or not in Netscape format", path.display());
        }
    }
    args.push(url.to_string());

    let output = Command::new("yt-dlp")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("yt-dlp stderr: {}", stderr);

        let error_msg = stderr.lines().last().unwrap_or("Unknown error");
        if stderr.contains("429") || stderr.contains("Sign in to confirm") {
            warn!(url = %url, "yt-dlp reports rate limiting");
        }
        return Err(MediaError::download_failed(format!("yt-dlp failed: {}", error_msg)));
    }

    // yt-dlp prints the final path; fall back to scanning the directory
    let printed = String::from_utf8_lossy(&output.stdout)
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(PathBuf::from);

    let path = match printed.filter(|p| p.is_file()) {
        Some(path) => path,
        None => find_existing_download(videos_dir, &video_id)
            .await
            .ok_or_else(|| MediaError::download_failed("Output file not created"))?,
    };

    let file_size = tokio::fs::metadata(&path).await?.len();
    info!(
        video_id = %video_id,
        output = %path.display(),
        size_mb = file_size as f64 / (1024.0 * 1024.0),
        "Downloaded video successfully"
    );

    Ok(AcquiredVideo {
        video_id,
        path,
        downloaded: true,
    })
}

/// Whether a cookies file exists and looks like Netscape format.
async fn cookies_usable(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.len() >= MIN_COOKIES_FILE_SIZE => {}
        _ => return false,
    }
    match tokio::fs::read_to_string(path).await {
        Ok(content) => is_valid_netscape_cookies(&content),
        Err(_) => false,
    }
}

/// Netscape cookie files start with a known header or hold 7-field tab lines.
fn is_valid_netscape_cookies(content: &str) -> bool {
    if content.starts_with("# Netscape HTTP Cookie File") || content.starts_with("# HTTP Cookie File") {
        return true;
    }

    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .any(|l| l.split('\t').count() >= 6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_source_parse() {
        assert_eq!(
            VideoSource::parse("https://www.youtube.com/watch?v=abc"),
            VideoSource::Remote("https://www.youtube.com/watch?v=abc".to_string())
        );
        assert_eq!(
            VideoSource::parse("clips/truck.mp4"),
            VideoSource::Local(PathBuf::from("clips/truck.mp4"))
        );
    }

    #[test]
    fn test_youtube_video_id() {
        assert_eq!(
            youtube_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10s").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            youtube_video_id("https://youtu.be/dQw4w9WgXcQ?si=x").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            youtube_video_id("https://www.youtube.com/shorts/abc_DEF-1").as_deref(),
            Some("abc_DEF-1")
        );
        assert_eq!(youtube_video_id("https://vimeo.com/12345"), None);
    }

    #[test]
    fn test_netscape_cookie_detection() {
        assert!(is_valid_netscape_cookies("# Netscape HTTP Cookie File\n"));
        assert!(is_valid_netscape_cookies(
            ".youtube.com\tTRUE\t/\tTRUE\t0\tPREF\tf1=5"
        ));
        assert!(!is_valid_netscape_cookies("session=abc"));
    }

    #[tokio::test]
    async fn test_acquire_local_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("street cam.mp4");
        tokio::fs::write(&path, b"not really a video").await.unwrap();

        let acquired = acquire_video(&VideoSource::Local(path.clone()), dir.path(), None)
            .await
            .unwrap();
        assert_eq!(acquired.video_id.as_str(), "street_cam");
        assert_eq!(acquired.path, path);
        assert!(!acquired.downloaded);
    }

    #[tokio::test]
    async fn test_acquire_missing_local_file() {
        let dir = TempDir::new().unwrap();
        let result = acquire_video(
            &VideoSource::Local(dir.path().join("missing.mp4")),
            dir.path(),
            None,
        )
        .await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_find_existing_download() {
        let dir = TempDir::new().unwrap();
        let id = VideoId::from_string("abc");
        assert!(find_existing_download(dir.path(), &id).await.is_none());

        tokio::fs::write(dir.path().join("abc.webm"), b"data").await.unwrap();
        assert_eq!(
            find_existing_download(dir.path(), &id).await,
            Some(dir.path().join("abc.webm"))
        );
    }
}
