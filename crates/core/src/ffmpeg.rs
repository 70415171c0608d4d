//! FFmpeg/FFprobe command helpers.
//!
//! Used by the ingestion crate to read a survey video's duration before
//! its remote row is created, and to grab the still frame that becomes the
//! video's thumbnail.

use std::path::Path;
use std::process::Output;

use serde::Deserialize;
use tokio::process::Command;

/// Upper bound on the thumbnail seek position, in seconds.
pub const DEFAULT_THUMBNAIL_OFFSET_SECS: f64 = 5.0;

/// Default thumbnail width in pixels (height follows the aspect ratio).
pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 480;

#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("{tool} could not be started: {source}")]
    NotFound {
        tool: &'static str,
        source: std::io::Error,
    },

    #[error("{tool} exited with {exit_code:?}: {stderr}")]
    ExecutionFailed {
        tool: &'static str,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("unreadable ffprobe report: {0}")]
    ParseError(String),

    #[error("survey video {0} does not exist")]
    VideoNotFound(String),
}

/// The subset of `ffprobe -print_format json` output used for survey clips.
#[derive(Debug, Default, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    #[serde(default)]
    pub format: FfprobeFormat,
}

#[derive(Debug, Default, Deserialize)]
pub struct FfprobeStream {
    pub codec_type: Option<String>,
    pub duration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
}

/// Ask `ffprobe` for the container and stream durations of `path`.
pub async fn probe_video(path: &Path) -> Result<FfprobeOutput, FfmpegError> {
    require_file(path)?;

    let mut cmd = Command::new("ffprobe");
    cmd.args(["-v", "error", "-print_format", "json"])
        .args(["-show_entries", "format=duration:stream=codec_type,duration"])
        .arg(path);
    let output = run("ffprobe", cmd).await?;

    serde_json::from_slice(&output.stdout).map_err(|e| {
        FfmpegError::ParseError(format!("{e}: {}", String::from_utf8_lossy(&output.stdout)))
    })
}

/// Write the frame at `timestamp_secs` to `output_path` as a JPEG, scaled
/// to `width` pixels wide with the aspect ratio kept.
pub async fn extract_frame_jpeg(
    video_path: &Path,
    output_path: &Path,
    timestamp_secs: f64,
    width: u32,
) -> Result<(), FfmpegError> {
    require_file(video_path)?;

    // -ss before -i seeks on keyframes, which is enough for a thumbnail.
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-loglevel", "error", "-y"])
        .args(["-ss", &format!("{timestamp_secs:.3}")])
        .arg("-i")
        .arg(video_path)
        .args(["-frames:v", "1", "-q:v", "2"])
        .args(["-vf", &format!("scale={width}:-2")])
        .arg(output_path);
    run("ffmpeg", cmd).await?;
    Ok(())
}

/// Seek position for a thumbnail: `min(max_offset, duration)`, never negative.
pub fn thumbnail_offset(duration_secs: f64, max_offset_secs: f64) -> f64 {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return 0.0;
    }
    duration_secs.min(max_offset_secs).max(0.0)
}

/// Duration in seconds: the container's, else the first video stream's,
/// else zero.
pub fn parse_duration(probe: &FfprobeOutput) -> f64 {
    let from_stream = || {
        probe
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .and_then(|s| s.duration.as_deref())
    };

    [probe.format.duration.as_deref(), from_stream()]
        .into_iter()
        .flatten()
        .find_map(|raw| raw.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .unwrap_or(0.0)
}

fn require_file(path: &Path) -> Result<(), FfmpegError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(FfmpegError::VideoNotFound(path.display().to_string()))
    }
}

async fn run(tool: &'static str, mut cmd: Command) -> Result<Output, FfmpegError> {
    let output = cmd
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| FfmpegError::NotFound { tool, source })?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            tool,
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}
