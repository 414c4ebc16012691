use crate::engine::hardware::{SpeedTier, VideoEncoder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Bitrate in bits per second. Parsed from and rendered as `8M`, `2500k` or a plain integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Bitrate(u64);

impl Bitrate {
    pub fn from_bps(bps: u64) -> Self {
        Self(bps)
    }

    pub fn bps(&self) -> u64 {
        self.0
    }

    /// Twice the rate, used for VBV buffers
    pub fn doubled(&self) -> Self {
        Self(self.0.saturating_mul(2))
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1_000_000 && self.0 % 1_000_000 == 0 {
            write!(f, "{}M", self.0 / 1_000_000)
        } else if self.0 >= 1_000 && self.0 % 1_000 == 0 {
            write!(f, "{}k", self.0 / 1_000)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for Bitrate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (number, multiplier) = match trimmed.chars().last() {
            Some('k' | 'K') => (&trimmed[..trimmed.len() - 1], 1_000.0),
            Some('m' | 'M') => (&trimmed[..trimmed.len() - 1], 1_000_000.0),
            _ => (trimmed, 1.0),
        };
        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| format!("invalid bitrate '{}' (expected e.g. 8M, 2500k)", s))?;
        let bps = (value * multiplier).round();
        if !bps.is_finite() || bps < 1.0 {
            return Err(format!("bitrate '{}' must be positive", s));
        }
        Ok(Self(bps as u64))
    }
}

impl TryFrom<String> for Bitrate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Bitrate> for String {
    fn from(value: Bitrate) -> Self {
        value.to_string()
    }
}

/// Rate-control strategy without its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateControlMode {
    #[serde(rename = "cq")]
    ConstantQuality,
    #[serde(rename = "vbr")]
    VariableBitrate,
    #[serde(rename = "cbr")]
    ConstantBitrate,
    #[serde(rename = "two-pass")]
    TwoPass,
}

impl RateControlMode {
    pub fn uses_bitrate(&self) -> bool {
        !matches!(self, Self::ConstantQuality)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ConstantQuality => "cq",
            Self::VariableBitrate => "vbr",
            Self::ConstantBitrate => "cbr",
            Self::TwoPass => "two-pass",
        }
    }
}

impl fmt::Display for RateControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RateControlMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cq" | "crf" | "constant-quality" => Ok(Self::ConstantQuality),
            "vbr" => Ok(Self::VariableBitrate),
            "cbr" => Ok(Self::ConstantBitrate),
            "two-pass" | "2pass" | "twopass" => Ok(Self::TwoPass),
            other => Err(format!(
                "unknown rate control '{}' (expected cq, vbr, cbr or two-pass)",
                other
            )),
        }
    }
}

/// Rate control with the one value that is meaningful for the mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum RateControl {
    ConstantQuality { quality: u8 },
    VariableBitrate { bitrate: Bitrate },
    ConstantBitrate { bitrate: Bitrate },
    TwoPass { bitrate: Bitrate },
}

impl RateControl {
    pub fn mode(&self) -> RateControlMode {
        match self {
            Self::ConstantQuality { .. } => RateControlMode::ConstantQuality,
            Self::VariableBitrate { .. } => RateControlMode::VariableBitrate,
            Self::ConstantBitrate { .. } => RateControlMode::ConstantBitrate,
            Self::TwoPass { .. } => RateControlMode::TwoPass,
        }
    }

    pub fn quality(&self) -> Option<u8> {
        match self {
            Self::ConstantQuality { quality } => Some(*quality),
            _ => None,
        }
    }

    pub fn bitrate(&self) -> Option<Bitrate> {
        match self {
            Self::ConstantQuality { .. } => None,
            Self::VariableBitrate { bitrate }
            | Self::ConstantBitrate { bitrate }
            | Self::TwoPass { bitrate } => Some(*bitrate),
        }
    }

    pub fn is_two_pass(&self) -> bool {
        matches!(self, Self::TwoPass { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionPolicy {
    #[default]
    KeepOriginal,
    Target {
        width: u32,
        height: u32,
    },
}

impl FromStr for ResolutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s.is_empty() || s == "keep" || s == "original" {
            return Ok(Self::KeepOriginal);
        }
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| format!("invalid resolution '{}' (expected WIDTHxHEIGHT)", s))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid width in '{}'", s))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid height in '{}'", s))?;
        Ok(Self::Target { width, height })
    }
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeepOriginal => f.write_str("original"),
            Self::Target { width, height } => write!(f, "{}x{}", width, height),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameRatePolicy {
    #[default]
    KeepOriginal,
    Target(u32),
}

impl fmt::Display for FrameRatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeepOriginal => f.write_str("original"),
            Self::Target(fps) => write!(f, "{} fps", fps),
        }
    }
}

/// How subtitles get burned into the picture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleMode {
    #[default]
    None,
    /// ffmpeg's own `subtitles` filter
    Direct,
    /// Rendered through a generated frameserver script
    Compatibility,
}

impl FromStr for SubtitleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "direct" => Ok(Self::Direct),
            "compat" | "compatibility" => Ok(Self::Compatibility),
            other => Err(format!(
                "unknown subtitle mode '{}' (expected none, direct or compat)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioAction {
    #[default]
    Copy,
    /// Take audio from a separate file instead of the source
    Replace,
    /// Drop video, write audio only
    Extract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Mp3,
    Pcm,
    Flac,
    Copy,
}

impl AudioCodec {
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Self::Aac => "aac",
            Self::Mp3 => "libmp3lame",
            Self::Pcm => "pcm_s16le",
            Self::Flac => "flac",
            Self::Copy => "copy",
        }
    }

    /// Lossless and stream-copy codecs take no bitrate
    pub fn takes_bitrate(&self) -> bool {
        matches!(self, Self::Aac | Self::Mp3)
    }

    /// Extension and muxer for audio-only output
    pub fn audio_only_target(&self) -> (&'static str, &'static str) {
        match self {
            Self::Aac => ("m4a", "ipod"),
            Self::Mp3 => ("mp3", "mp3"),
            Self::Pcm => ("wav", "wav"),
            Self::Flac => ("flac", "flac"),
            Self::Copy => ("mka", "matroska"),
        }
    }
}

impl FromStr for AudioCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aac" => Ok(Self::Aac),
            "mp3" | "libmp3lame" => Ok(Self::Mp3),
            "pcm" | "wav" | "pcm_s16le" => Ok(Self::Pcm),
            "flac" => Ok(Self::Flac),
            "copy" => Ok(Self::Copy),
            other => Err(format!(
                "unknown audio codec '{}' (expected aac, mp3, pcm, flac or copy)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioPolicy {
    pub codec: AudioCodec,
    pub bitrate_kbps: u32,
}

impl Default for AudioPolicy {
    fn default() -> Self {
        Self {
            codec: AudioCodec::Aac,
            bitrate_kbps: 192,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mp4,
    Mkv,
    Mov,
    Ts,
    Avi,
    Mxf,
    Webm,
}

impl Container {
    pub const ALL: [Container; 7] = [
        Self::Mp4,
        Self::Mkv,
        Self::Mov,
        Self::Ts,
        Self::Avi,
        Self::Mxf,
        Self::Webm,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
            Self::Mov => "mov",
            Self::Ts => "ts",
            Self::Avi => "avi",
            Self::Mxf => "mxf",
            Self::Webm => "webm",
        }
    }

    /// Name passed to `-f`
    pub fn muxer(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mkv => "matroska",
            Self::Mov => "mov",
            Self::Ts => "mpegts",
            Self::Avi => "avi",
            Self::Mxf => "mxf",
            Self::Webm => "webm",
        }
    }

    pub fn wants_faststart(&self) -> bool {
        matches!(self, Self::Mp4 | Self::Mov)
    }

    /// WebM only carries VP8/VP9/AV1, none of which we encode
    pub fn accepts_h26x(&self) -> bool {
        !matches!(self, Self::Webm)
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Container {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.extension() == wanted)
            .ok_or_else(|| format!("unknown container '{}'", s))
    }
}

/// Fully resolved settings for one encode. Built by the resolver, read by the builder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EncodeParameters {
    pub encoder: VideoEncoder,
    pub rate_control: RateControl,
    pub speed: SpeedTier,
    pub resolution: ResolutionPolicy,
    pub frame_rate: FrameRatePolicy,
    pub subtitles: SubtitleMode,
    pub audio_action: AudioAction,
    pub audio: AudioPolicy,
    pub container: Container,
}

/// One encode request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeJob {
    pub id: Uuid,
    pub input: PathBuf,
    pub subtitle: Option<PathBuf>,
    pub replacement_audio: Option<PathBuf>,
    pub output: PathBuf,
    pub params: EncodeParameters,
    /// Extra ffmpeg arguments, shell-quoted
    pub extra_args: String,
    /// Build commands only, never spawn
    pub debug: bool,
}

impl EncodeJob {
    pub fn new(input: PathBuf, output: PathBuf, params: EncodeParameters) -> Self {
        Self {
            id: Uuid::new_v4(),
            input,
            subtitle: None,
            replacement_audio: None,
            output,
            params,
            extra_args: String::new(),
            debug: false,
        }
    }

    pub fn with_subtitle(mut self, path: impl Into<PathBuf>) -> Self {
        self.subtitle = Some(path.into());
        self
    }

    pub fn with_replacement_audio(mut self, path: impl Into<PathBuf>) -> Self {
        self.replacement_audio = Some(path.into());
        self
    }

    pub fn with_extra_args(mut self, args: impl Into<String>) -> Self {
        self.extra_args = args.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Lifecycle notifications emitted while a job runs
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Started {
        job_id: Uuid,
        passes: usize,
    },
    Progress {
        job_id: Uuid,
        pass: usize,
        out_time_s: f64,
        speed: Option<f64>,
    },
    PassFinished {
        job_id: Uuid,
        pass: usize,
    },
    Finished {
        job_id: Uuid,
        success: bool,
        summary: String,
    },
}

/// Parser for ffmpeg progress output (key=value format)
#[derive(Debug, Default, Clone)]
pub struct ProgressParser {
    pub out_time_us: u64,
    pub fps: Option<f64>,
    pub speed: Option<f64>,
    pub is_complete: bool,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single line of `-progress` output. Returns true when a block ends.
    pub fn parse_line(&mut self, line: &str) -> bool {
        let Some((key, value)) = line.split_once('=') else {
            return false;
        };
        let value = value.trim();
        match key.trim() {
            "out_time_us" => {
                if let Ok(us) = value.parse::<u64>() {
                    self.out_time_us = us;
                }
            }
            "fps" => {
                if let Ok(f) = value.parse::<f64>() {
                    self.fps = Some(f);
                }
            }
            "speed" => {
                // "1.23x"
                if let Ok(s) = value.trim_end_matches('x').parse::<f64>() {
                    self.speed = Some(s);
                }
            }
            "progress" => {
                if value == "end" {
                    self.is_complete = true;
                }
                return true;
            }
            _ => {}
        }
        false
    }

    pub fn out_time_s(&self) -> f64 {
        self.out_time_us as f64 / 1_000_000.0
    }
}
