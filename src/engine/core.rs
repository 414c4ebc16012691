mod ffmpeg_cmd;
mod ffmpeg_info;
mod preset;
mod process;
mod resolve;
mod types;

pub use ffmpeg_cmd::{
    BuildError, CommandBuilder, CompatRequest, EncodePlan, PathStyle, derive_output_path,
    derive_remux_output_path, escape_filter_path, format_command, job_work_dir, stats_file_for,
    two_pass_log_prefix, validate_inputs,
};
pub use ffmpeg_info::{ffmpeg_version, ffprobe_version};
pub use preset::{Preset, PresetCatalog, PresetError};
pub use process::{ProcessOutput, RunError, RunLimits, STDERR_TAIL_LINES, run_process};
pub use resolve::{ParameterOverrides, ResolutionError, quality_range, resolve};
pub use types::{
    AudioAction, AudioCodec, AudioPolicy, Bitrate, Container, EncodeJob, EncodeParameters,
    FrameRatePolicy, JobEvent, ProgressParser, RateControl, RateControlMode, ResolutionPolicy,
    SubtitleMode,
};
