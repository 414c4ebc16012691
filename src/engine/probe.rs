// Media probing using ffprobe

use crate::cancel::CancelToken;
use crate::engine::core::{RunError, RunLimits, run_process};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// Metadata for one media file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaProbe {
    /// ffprobe `format_name`, e.g. `mov,mp4,m4a,3gp,3g2,mj2`
    pub container: String,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    /// Overall bitrate in bits per second
    pub bitrate: Option<u64>,
    pub duration_s: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error(transparent)]
    Run(#[from] RunError),

    #[error("ffprobe exited with code {code}: {message}")]
    Failed { code: i32, message: String },

    #[error("failed to parse ffprobe output")]
    Parse(#[from] serde_json::Error),

    #[error("no audio or video stream found")]
    NoStreams,
}

/// Source of `MediaProbe`s. Implementations must be shareable across scan workers.
pub trait MediaProber: Send + Sync {
    fn probe(&self, path: &Path) -> Result<MediaProbe, ProbeError>;
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Parse `ffprobe -show_format -show_streams -print_format json` output
pub fn parse_ffprobe_json(json: &str) -> Result<MediaProbe, ProbeError> {
    let output: FfprobeOutput = serde_json::from_str(json)?;

    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));
    if video.is_none() && audio.is_none() {
        return Err(ProbeError::NoStreams);
    }

    let format = output.format.as_ref();
    Ok(MediaProbe {
        container: format
            .and_then(|f| f.format_name.clone())
            .unwrap_or_default(),
        video_codec: video.and_then(|s| s.codec_name.clone()),
        audio_codec: audio.and_then(|s| s.codec_name.clone()),
        width: video.and_then(|s| s.width),
        height: video.and_then(|s| s.height),
        fps: video.and_then(|s| {
            s.r_frame_rate
                .as_deref()
                .and_then(parse_fraction)
                .or_else(|| s.avg_frame_rate.as_deref().and_then(parse_fraction))
        }),
        bitrate: format
            .and_then(|f| f.bit_rate.as_deref())
            .and_then(|b| b.trim().parse().ok()),
        duration_s: format
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.trim().parse().ok()),
    })
}

/// Parse a fraction string like "30000/1001" to f64
fn parse_fraction(s: &str) -> Option<f64> {
    let (numerator, denominator) = s.split_once('/')?;
    let numerator: f64 = numerator.parse().ok()?;
    let denominator: f64 = denominator.parse().ok()?;

    if denominator == 0.0 {
        return None;
    }

    Some(numerator / denominator)
}

/// Probes files by running ffprobe
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe: PathBuf,
    limits: RunLimits,
}

impl FfprobeProber {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            limits: RunLimits::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.limits.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.limits.cancel = cancel;
        self
    }
}

impl MediaProber for FfprobeProber {
    fn probe(&self, path: &Path) -> Result<MediaProbe, ProbeError> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path);

        let mut json = String::new();
        let output = run_process(cmd, &self.limits, &mut |line| {
            json.push_str(line);
            json.push('\n');
        })?;
        if !output.success() {
            return Err(ProbeError::Failed {
                code: output.exit_code,
                message: output.stderr_summary(3),
            });
        }
        parse_ffprobe_json(&json)
    }
}
