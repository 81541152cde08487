//! Media probing – duration, resolution and sampled frames.
//!
//! Decoding is delegated to the `ffprobe` / `ffmpeg` binaries; the rest of
//! the crate only sees the [`MediaProber`] trait, so tests can swap in a
//! deterministic double.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::config::ThumbnailPolicy;
use crate::error::{Error, Result};
use crate::model::Thumbnail;

/// Stream facts extracted from one media file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    /// Seconds.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
}

/// Capability consumed by the sync engine. Implementations are called from
/// worker threads and must not panic on unreadable media; they return
/// [`Error::Probe`] instead.
pub trait MediaProber: Send + Sync {
    fn probe(&self, path: &Path) -> Result<MediaInfo>;

    /// Grab one JPEG frame per offset (seconds), scaled to `size`.
    fn sample_thumbnails(
        &self,
        path: &Path,
        offsets: &[u64],
        size: (u32, u32),
    ) -> Result<Vec<Thumbnail>>;
}

/* ─── sampling policy ─────────────────────────────────────────────── */

/// Offsets (seconds) at which frames are sampled.
///
/// Starts from the configured period, shrinks it so short clips still get
/// `min_images` frames and stretches it so long ones stay at or below
/// `max_images`. Period and duration are floored to whole seconds, never
/// below one; clips shorter than `min_images` seconds get one frame per
/// second.
pub fn sample_offsets(duration: f64, policy: &ThumbnailPolicy) -> Vec<u64> {
    let duration = if duration.is_finite() && duration >= 1.0 {
        duration.floor() as u64
    } else {
        1
    };
    let min = policy.min_images.max(1);
    let max = policy.max_images.max(min);
    let base = policy.period_secs.max(1);

    let period = if duration < base * min {
        duration / min
    } else if duration > base * max {
        duration.div_ceil(max)
    } else {
        base
    }
    .max(1);

    (0..duration).step_by(period as usize).collect()
}

/// Scale `source` to fit inside `bounds`, keeping the aspect ratio.
pub fn fit_resolution(bounds: (u32, u32), source: (u32, u32)) -> (u32, u32) {
    let (bw, bh) = bounds;
    let (w, h) = source;
    if w == 0 || h == 0 {
        return bounds;
    }
    let scale = (bw as f64 / w as f64).min(bh as f64 / h as f64);
    let tw = ((w as f64 * scale).round() as u32).max(1);
    let th = ((h as f64 * scale).round() as u32).max(1);
    (tw, th)
}

/// Default cover: the frame `ratio` of the way through the sampled set.
pub fn cover_index(len: usize, ratio: f64) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let idx = (len as f64 * ratio).floor() as usize;
    Some(idx.min(len - 1))
}

/* ─── ffmpeg adapter ──────────────────────────────────────────────── */

/// [`MediaProber`] backed by the ffmpeg command-line tools.
#[derive(Debug, Clone)]
pub struct FfmpegProber {
    ffprobe: PathBuf,
    ffmpeg: PathBuf,
}

impl Default for FfmpegProber {
    fn default() -> Self {
        Self {
            ffprobe: PathBuf::from("ffprobe"),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegProber {
    /// Use explicit binaries instead of whatever is on `PATH`.
    pub fn with_binaries<P: Into<PathBuf>, Q: Into<PathBuf>>(ffprobe: P, ffmpeg: Q) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            ffmpeg: ffmpeg.into(),
        }
    }
}

fn probe_err(path: &Path, reason: impl Into<String>) -> Error {
    Error::Probe {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Pull duration and the first video stream's size out of
/// `ffprobe -print_format json` output.
pub(crate) fn parse_ffprobe_json(path: &Path, raw: &[u8]) -> Result<MediaInfo> {
    let json: serde_json::Value = serde_json::from_slice(raw)
        .map_err(|e| probe_err(path, format!("bad ffprobe output: {e}")))?;

    let stream = json["streams"]
        .as_array()
        .and_then(|s| s.iter().find(|s| s["codec_type"] == "video"))
        .ok_or_else(|| probe_err(path, "no video stream"))?;

    let dim = |key: &str| stream[key].as_u64().map(|v| v as u32);
    let (width, height) = match (dim("width"), dim("height")) {
        (Some(w), Some(h)) => (w, h),
        _ => return Err(probe_err(path, "missing frame size")),
    };

    // Containers report duration on the format, raw streams on the stream.
    let duration = [&json["format"]["duration"], &stream["duration"]]
        .iter()
        .find_map(|v| v.as_str().and_then(|s| s.parse::<f64>().ok()))
        .ok_or_else(|| probe_err(path, "missing duration"))?;

    Ok(MediaInfo {
        duration,
        width,
        height,
    })
}

impl MediaProber for FfmpegProber {
    fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-select_streams",
                "v:0",
            ])
            .arg(path)
            .output()
            .map_err(|e| probe_err(path, format!("failed to run ffprobe: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(probe_err(path, format!("ffprobe failed: {}", stderr.trim())));
        }
        parse_ffprobe_json(path, &output.stdout)
    }

    fn sample_thumbnails(
        &self,
        path: &Path,
        offsets: &[u64],
        size: (u32, u32),
    ) -> Result<Vec<Thumbnail>> {
        let scale = format!("scale={}:{}", size.0, size.1);
        let mut thumbs = Vec::with_capacity(offsets.len());
        for &offset in offsets {
            let output = Command::new(&self.ffmpeg)
                .args(["-nostdin", "-loglevel", "error", "-ss"])
                .arg(offset.to_string())
                .arg("-i")
                .arg(path)
                .args(["-frames:v", "1", "-vf"])
                .arg(&scale)
                .args(["-f", "image2pipe", "-vcodec", "mjpeg", "-"])
                .output()
                .map_err(|e| probe_err(path, format!("failed to run ffmpeg: {e}")))?;

            if !output.status.success() || output.stdout.is_empty() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(probe_err(
                    path,
                    format!("no frame at {offset}s: {}", stderr.trim()),
                ));
            }
            debug!(file = %path.display(), offset, bytes = output.stdout.len(), "frame");
            thumbs.push(Thumbnail::new(offset, output.stdout));
        }
        Ok(thumbs)
    }
}
