use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use xuebox::engine::hardware::{SpeedTier, VideoEncoder};
use xuebox::engine::{
    AudioAction, AudioCodec, Bitrate, Container, FrameRatePolicy, ParameterOverrides,
    RateControlMode, ResolutionPolicy, SubtitleMode,
};
use xuebox::qc::Dimensions;

#[derive(Parser)]
#[command(name = "xuebox", version)]
#[command(
    about = "FFmpeg encode orchestration with hardware diagnostics and media-library QC",
    long_about = None
)]
pub struct Cli {
    /// Log at debug level (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encode one file from a preset plus overrides
    Encode(EncodeArgs),

    /// Change container without re-encoding
    Remux {
        /// Source media file
        input: PathBuf,

        /// Target container (mp4, mkv, mov, ts, avi, mxf, webm)
        #[arg(long)]
        container: Container,

        /// Output path (defaults to <name>_remux.<ext> next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the ffmpeg command without running it
        #[arg(long)]
        debug: bool,
    },

    /// List built-in and user presets
    Presets,

    /// Scan a directory for files that break the compatibility rules
    Qc(QcArgs),

    /// Print ffprobe metadata for a media file
    Probe {
        /// Path to the media file
        file: PathBuf,
    },

    /// Check that ffmpeg and ffprobe are installed and list hardware encoders
    CheckFfmpeg,

    /// Show config status and location, or create default config if missing
    InitConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AudioActionArg {
    /// Keep the source audio
    Copy,
    /// Use the first audio stream of --replace-audio
    Replace,
    /// Write an audio-only file
    Extract,
}

impl From<AudioActionArg> for AudioAction {
    fn from(value: AudioActionArg) -> Self {
        match value {
            AudioActionArg::Copy => AudioAction::Copy,
            AudioActionArg::Replace => AudioAction::Replace,
            AudioActionArg::Extract => AudioAction::Extract,
        }
    }
}

#[derive(Args)]
pub struct EncodeArgs {
    /// Source media file
    pub input: PathBuf,

    /// Output path (defaults to <name>_<encoder>.<ext> next to the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Preset id (see `xuebox presets`); defaults to the configured preset
    #[arg(short, long)]
    pub preset: Option<String>,

    /// Video encoder, e.g. libx264, hevc_nvenc, h264_qsv
    #[arg(long)]
    pub encoder: Option<VideoEncoder>,

    /// Rate control: cq, vbr, cbr or two-pass
    #[arg(long = "rate-control", value_name = "MODE")]
    pub rate_control: Option<RateControlMode>,

    /// Quality value for cq mode (CRF, CQ, global_quality or QP)
    #[arg(long)]
    pub quality: Option<u8>,

    /// Target bitrate for vbr, cbr and two-pass, e.g. 8M or 2500k
    #[arg(long)]
    pub bitrate: Option<Bitrate>,

    /// Speed preset (medium, slow, ...) or hardware tier (p1-p7)
    #[arg(long)]
    pub speed: Option<SpeedTier>,

    /// Output size WIDTHxHEIGHT, or "original"
    #[arg(long)]
    pub resolution: Option<ResolutionPolicy>,

    /// Output frame rate
    #[arg(long)]
    pub fps: Option<u32>,

    /// Subtitle file to burn in
    #[arg(long)]
    pub subtitle: Option<PathBuf>,

    /// none, direct or compat (defaults to direct when --subtitle is given)
    #[arg(long = "subtitle-mode", value_name = "MODE")]
    pub subtitle_mode: Option<SubtitleMode>,

    /// What to do with the audio track
    #[arg(long = "audio", value_enum)]
    pub audio_action: Option<AudioActionArg>,

    /// Audio file used by --audio replace
    #[arg(long = "replace-audio", value_name = "FILE")]
    pub replacement_audio: Option<PathBuf>,

    /// aac, mp3, pcm, flac or copy
    #[arg(long = "audio-codec")]
    pub audio_codec: Option<AudioCodec>,

    /// Audio bitrate in kbps
    #[arg(long = "audio-bitrate", value_name = "KBPS")]
    pub audio_bitrate: Option<u32>,

    /// Output container
    #[arg(long)]
    pub container: Option<Container>,

    /// Extra ffmpeg arguments, split like a shell would
    #[arg(long = "extra-args", allow_hyphen_values = true, value_name = "ARGS")]
    pub extra_args: Option<String>,

    /// Print the commands without running them
    #[arg(long)]
    pub debug: bool,

    /// Stop each ffmpeg pass after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl EncodeArgs {
    pub fn overrides(&self) -> ParameterOverrides {
        let subtitles = self
            .subtitle_mode
            .or_else(|| self.subtitle.as_ref().map(|_| SubtitleMode::Direct));
        let audio_action = self.audio_action.map(AudioAction::from).or_else(|| {
            self.replacement_audio
                .as_ref()
                .map(|_| AudioAction::Replace)
        });

        ParameterOverrides {
            encoder: self.encoder,
            rate_control: self.rate_control,
            quality: self.quality,
            bitrate: self.bitrate,
            speed: self.speed,
            resolution: self.resolution,
            frame_rate: self.fps.map(FrameRatePolicy::Target),
            subtitles,
            audio_action,
            audio_codec: self.audio_codec,
            audio_bitrate_kbps: self.audio_bitrate,
            container: self.container,
        }
    }
}

#[derive(Args)]
pub struct QcArgs {
    /// Directory to scan (defaults to current directory)
    pub directory: Option<PathBuf>,

    /// Rule set file; the [rules] section of the config is used otherwise
    #[arg(long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Disallowed containers, comma separated (e.g. mkv,webm)
    #[arg(long, value_name = "LIST")]
    pub containers: Option<String>,

    /// Disallowed codecs, comma separated (e.g. vp9,av1)
    #[arg(long, value_name = "LIST")]
    pub codecs: Option<String>,

    /// Disallowed image formats, comma separated (e.g. webp,heic)
    #[arg(long = "image-formats", value_name = "LIST")]
    pub image_formats: Option<String>,

    #[arg(long = "min-bitrate")]
    pub min_bitrate: Option<Bitrate>,

    #[arg(long = "max-bitrate")]
    pub max_bitrate: Option<Bitrate>,

    /// Smallest allowed frame size, WIDTHxHEIGHT
    #[arg(long = "min-resolution")]
    pub min_resolution: Option<Dimensions>,

    /// Largest allowed frame size, WIDTHxHEIGHT
    #[arg(long = "max-resolution")]
    pub max_resolution: Option<Dimensions>,

    /// Concurrent probe workers (defaults to the configured count)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Emit JSON instead of the text report
    #[arg(long)]
    pub json: bool,

    /// Write the report here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

pub fn parse() -> Cli {
    Cli::parse()
}
