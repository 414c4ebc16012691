use super::types::{
    AudioAction, Container, EncodeJob, EncodeParameters, FrameRatePolicy, RateControl,
    ResolutionPolicy, SubtitleMode,
};
use crate::engine::compat::CompatibilityScriptGenerator;
use crate::engine::hardware::{EncoderFamily, SpeedTier, VideoEncoder};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("{role} file not found: {}", path.display())]
    InputNotFound { role: &'static str, path: PathBuf },

    #[error("subtitle mode '{0:?}' needs a subtitle file")]
    MissingSubtitle(SubtitleMode),

    #[error("audio replacement needs a replacement audio file")]
    MissingReplacementAudio,

    #[error("output {} is the same file as the input", path.display())]
    OutputIsInput { path: PathBuf },

    #[error("path cannot be used in a filter expression: {} ({reason})", path.display())]
    UnsupportedPath { path: PathBuf, reason: &'static str },
}

/// Path syntax the subtitle filter expression is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStyle {
    Windows,
    Posix,
}

impl PathStyle {
    pub fn native() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Posix }
    }
}

/// Inputs for the compatibility script, produced right before the encode runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatRequest {
    pub video: PathBuf,
    pub subtitle: PathBuf,
    pub work_dir: PathBuf,
    pub script_path: PathBuf,
}

/// Everything needed to run one job: the ffmpeg invocations in order plus
/// the artifacts they share.
#[derive(Debug)]
pub struct EncodePlan {
    pub job_id: Uuid,
    pub encoder: VideoEncoder,
    pub passes: Vec<Command>,
    /// Per-job scratch directory, removed after the job
    pub job_dir: PathBuf,
    /// Two-pass statistics prefix shared by both passes
    pub stats_prefix: Option<PathBuf>,
    /// Set when the caller must generate a script and extend the search path first
    pub compat: Option<CompatRequest>,
}

impl EncodePlan {
    /// Statistics file pass 1 must leave behind
    pub fn stats_file(&self) -> Option<PathBuf> {
        self.stats_prefix.as_deref().map(stats_file_for)
    }

    pub fn formatted(&self) -> String {
        self.passes
            .iter()
            .map(format_command)
            .collect::<Vec<_>>()
            .join("\n&& \\\n")
    }
}

/// x264 appends `-0.log` to the pass log prefix
pub fn stats_file_for(prefix: &Path) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push("-0.log");
    PathBuf::from(name)
}

/// Scratch directory for a job under the configured working directory
pub fn job_work_dir(work_dir: &Path, job_id: Uuid) -> PathBuf {
    work_dir.join(format!("xuebox-{}", job_id))
}

pub fn two_pass_log_prefix(work_dir: &Path, job_id: Uuid) -> PathBuf {
    job_work_dir(work_dir, job_id).join("ffmpeg2pass")
}

fn null_output_target() -> &'static str {
    if cfg!(windows) { "NUL" } else { "/dev/null" }
}

/// Apply additional user-provided FFmpeg arguments to the command.
/// Uses shell-style parsing so quoted strings with spaces are preserved.
fn apply_additional_args(cmd: &mut Command, additional_args: &str) {
    if additional_args.trim().is_empty() {
        return;
    }

    if let Some(args) = shlex::split(additional_args) {
        cmd.args(args);
    } else {
        // Unbalanced quotes: fall back to simple whitespace split
        cmd.args(additional_args.split_whitespace());
    }
}

/// Quote a path for ffmpeg's `subtitles=` filter option.
///
/// Two escaping levels apply: the filter option parser (`\`, `'`, `:`) and
/// the filtergraph parser, handled by single-quoting the whole value.
pub fn escape_filter_path(path: &Path, style: PathStyle) -> Result<String, BuildError> {
    let raw = path.to_str().ok_or_else(|| BuildError::UnsupportedPath {
        path: path.to_path_buf(),
        reason: "path is not valid UTF-8",
    })?;
    let normalized = match style {
        PathStyle::Windows => raw.replace('\\', "/"),
        PathStyle::Posix => raw.to_string(),
    };

    let mut option_level = String::with_capacity(normalized.len() + 8);
    for c in normalized.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            option_level.push('\\');
        }
        option_level.push(c);
    }

    Ok(format!("'{}'", option_level.replace('\'', r"'\''")))
}

fn rate_control_args(cmd: &mut Command, encoder: VideoEncoder, rate_control: &RateControl) {
    let family = encoder.family();
    match rate_control {
        RateControl::ConstantQuality { quality } => {
            let q = quality.to_string();
            match family {
                EncoderFamily::Software => cmd.arg("-crf").arg(&q),
                EncoderFamily::Nvenc => cmd.arg("-cq").arg(&q),
                EncoderFamily::Qsv => cmd.arg("-global_quality").arg(&q),
                // QP values are ignored outside constant-QP mode
                EncoderFamily::Amf => cmd
                    .arg("-rc")
                    .arg("cqp")
                    .arg("-qp_i")
                    .arg(&q)
                    .arg("-qp_p")
                    .arg(&q),
            };
        }
        RateControl::VariableBitrate { bitrate } => {
            let b = bitrate.to_string();
            cmd.arg("-b:v").arg(&b);
            match family {
                EncoderFamily::Nvenc => {
                    cmd.arg("-rc").arg("vbr");
                }
                EncoderFamily::Amf => {
                    cmd.arg("-rc").arg("vbr_peak");
                }
                EncoderFamily::Software | EncoderFamily::Qsv => {}
            }
            cmd.arg("-maxrate")
                .arg(&b)
                .arg("-bufsize")
                .arg(bitrate.doubled().to_string());
        }
        RateControl::ConstantBitrate { bitrate } => {
            let b = bitrate.to_string();
            cmd.arg("-b:v").arg(&b);
            match family {
                EncoderFamily::Nvenc | EncoderFamily::Amf => {
                    cmd.arg("-rc").arg("cbr");
                }
                EncoderFamily::Software | EncoderFamily::Qsv => {}
            }
            cmd.arg("-minrate")
                .arg(&b)
                .arg("-maxrate")
                .arg(&b)
                .arg("-bufsize")
                .arg(&b);
        }
        RateControl::TwoPass { bitrate } => {
            cmd.arg("-b:v").arg(bitrate.to_string());
        }
    }
}

fn speed_args(cmd: &mut Command, encoder: VideoEncoder, speed: SpeedTier) {
    let family = encoder.family();
    match (speed, family) {
        (SpeedTier::Software(preset), EncoderFamily::Software) => {
            cmd.arg("-preset").arg(preset.name());
        }
        (SpeedTier::Hardware(tier), EncoderFamily::Nvenc | EncoderFamily::Qsv) => {
            if let Some(token) = tier.token_for(family) {
                cmd.arg("-preset").arg(token);
            }
        }
        (SpeedTier::Hardware(tier), EncoderFamily::Amf) => {
            if let Some(token) = tier.token_for(family) {
                cmd.arg("-quality").arg(token);
            }
        }
        // The resolver never produces a tier from the other vocabulary
        (SpeedTier::Software(_), _) | (SpeedTier::Hardware(_), EncoderFamily::Software) => {
            tracing::warn!(%encoder, %speed, "speed tier does not fit encoder; omitted");
        }
    }
}

fn audio_codec_args(cmd: &mut Command, params: &EncodeParameters) {
    cmd.arg("-c:a").arg(params.audio.codec.ffmpeg_name());
    if params.audio.codec.takes_bitrate() {
        cmd.arg("-b:a").arg(format!("{}k", params.audio.bitrate_kbps));
    }
}

fn output_args(cmd: &mut Command, container: Container, output: &Path) {
    if container.wants_faststart() {
        cmd.arg("-movflags").arg("+faststart");
    }
    cmd.arg("-f").arg(container.muxer());
    cmd.arg(output);
}

/// Default output path: `<stem>_<encoder>.<ext>` next to the input
pub fn derive_output_path(input: &Path, params: &EncodeParameters) -> PathBuf {
    let stem = input
        .file_stem()
        .unwrap_or_else(|| OsStr::new("output"))
        .to_string_lossy();
    let name = match params.audio_action {
        AudioAction::Extract => {
            let (ext, _) = params.audio.codec.audio_only_target();
            format!("{}_audio.{}", stem, ext)
        }
        AudioAction::Copy | AudioAction::Replace => {
            format!("{}_{}.{}", stem, params.encoder, params.container.extension())
        }
    };
    input.with_file_name(name)
}

/// Default remux output path: `<stem>_remux.<ext>` next to the input
pub fn derive_remux_output_path(input: &Path, container: Container) -> PathBuf {
    let stem = input
        .file_stem()
        .unwrap_or_else(|| OsStr::new("output"))
        .to_string_lossy();
    input.with_file_name(format!("{}_remux.{}", stem, container.extension()))
}

/// Format a command as a shell-safe string for display
pub fn format_command(cmd: &Command) -> String {
    let program = cmd.get_program().to_string_lossy().to_string();
    std::iter::once(program)
        .chain(cmd.get_args().map(|arg| {
            let s = arg.to_string_lossy();
            if s.contains(' ') {
                format!("\"{}\"", s)
            } else {
                s.to_string()
            }
        }))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Check that every file a job reads exists and the output does not clobber the input
pub fn validate_inputs(job: &EncodeJob) -> Result<(), BuildError> {
    let mut required = vec![("input", &job.input)];
    if let Some(subtitle) = &job.subtitle {
        required.push(("subtitle", subtitle));
    }
    if let Some(audio) = &job.replacement_audio {
        required.push(("replacement audio", audio));
    }
    for (role, path) in required {
        if !path.is_file() {
            return Err(BuildError::InputNotFound {
                role,
                path: path.clone(),
            });
        }
    }
    if job.output == job.input {
        return Err(BuildError::OutputIsInput {
            path: job.output.clone(),
        });
    }
    Ok(())
}

/// Translates a job into ffmpeg invocations. Performs no I/O.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    ffmpeg: PathBuf,
    work_dir: PathBuf,
    path_style: PathStyle,
}

impl CommandBuilder {
    pub fn new(ffmpeg: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            work_dir: work_dir.into(),
            path_style: PathStyle::native(),
        }
    }

    pub fn with_path_style(mut self, style: PathStyle) -> Self {
        self.path_style = style;
        self
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-hide_banner").arg("-y");
        cmd
    }

    /// Build the invocations for `job`. Identical jobs give identical argument lists.
    pub fn build(&self, job: &EncodeJob) -> Result<EncodePlan, BuildError> {
        let params = &job.params;
        let job_dir = job_work_dir(&self.work_dir, job.id);

        if params.audio_action == AudioAction::Extract {
            return Ok(EncodePlan {
                job_id: job.id,
                encoder: params.encoder,
                passes: vec![self.build_extract(job)],
                job_dir,
                stats_prefix: None,
                compat: None,
            });
        }

        let subtitle = match params.subtitles {
            SubtitleMode::None => None,
            mode => Some(
                job.subtitle
                    .as_deref()
                    .ok_or(BuildError::MissingSubtitle(mode))?,
            ),
        };
        if params.audio_action == AudioAction::Replace && job.replacement_audio.is_none() {
            return Err(BuildError::MissingReplacementAudio);
        }

        let compat = match (params.subtitles, subtitle) {
            (SubtitleMode::Compatibility, Some(subtitle)) => Some(CompatRequest {
                video: job.input.clone(),
                subtitle: subtitle.to_path_buf(),
                work_dir: job_dir.clone(),
                script_path: CompatibilityScriptGenerator::script_path(&job_dir),
            }),
            _ => None,
        };

        let mut filters = Vec::new();
        if let (SubtitleMode::Direct, Some(subtitle)) = (params.subtitles, subtitle) {
            filters.push(format!(
                "subtitles={}",
                escape_filter_path(subtitle, self.path_style)?
            ));
        }
        if let ResolutionPolicy::Target { width, height } = params.resolution {
            filters.push(format!("scale={}:{}", width, height));
        }

        let stats_prefix = params
            .rate_control
            .is_two_pass()
            .then(|| two_pass_log_prefix(&self.work_dir, job.id));

        let passes = match &stats_prefix {
            Some(prefix) => vec![
                self.build_encode_pass(job, compat.as_ref(), &filters, Some((1, prefix))),
                self.build_encode_pass(job, compat.as_ref(), &filters, Some((2, prefix))),
            ],
            None => vec![self.build_encode_pass(job, compat.as_ref(), &filters, None)],
        };

        Ok(EncodePlan {
            job_id: job.id,
            encoder: params.encoder,
            passes,
            job_dir,
            stats_prefix,
            compat,
        })
    }

    fn build_encode_pass(
        &self,
        job: &EncodeJob,
        compat: Option<&CompatRequest>,
        filters: &[String],
        pass: Option<(u8, &Path)>,
    ) -> Command {
        let params = &job.params;
        let mut cmd = self.base_command();

        // Input 0 carries the video; in compatibility mode that is the script
        // and the source follows as input 1 for its audio.
        let source_index = match compat {
            Some(request) => {
                cmd.arg("-i").arg(&request.script_path);
                cmd.arg("-i").arg(&job.input);
                1
            }
            None => {
                cmd.arg("-i").arg(&job.input);
                0
            }
        };
        let replacement_index = match (&job.replacement_audio, params.audio_action) {
            (Some(audio), AudioAction::Replace) => {
                cmd.arg("-i").arg(audio);
                Some(source_index + 1)
            }
            _ => None,
        };

        // Progress output (structured key=value to stdout)
        cmd.arg("-progress").arg("pipe:1").arg("-nostats");

        let is_analysis_pass = matches!(pass, Some((1, _)));

        cmd.arg("-map").arg("0:v:0");
        if !is_analysis_pass {
            match replacement_index {
                Some(index) => cmd.arg("-map").arg(format!("{}:a:0", index)),
                // Sources without audio are fine
                None => cmd.arg("-map").arg(format!("{}:a?", source_index)),
            };
        }

        if !filters.is_empty() {
            cmd.arg("-vf").arg(filters.join(","));
        }

        cmd.arg("-c:v").arg(params.encoder.ffmpeg_name());
        rate_control_args(&mut cmd, params.encoder, &params.rate_control);
        speed_args(&mut cmd, params.encoder, params.speed);

        if let FrameRatePolicy::Target(fps) = params.frame_rate {
            cmd.arg("-r").arg(fps.to_string());
        }

        if let Some((pass_num, prefix)) = pass {
            cmd.arg("-pass").arg(pass_num.to_string());
            cmd.arg("-passlogfile").arg(prefix);
        }

        if is_analysis_pass {
            cmd.arg("-an");
        } else {
            audio_codec_args(&mut cmd, params);
        }

        apply_additional_args(&mut cmd, &job.extra_args);

        if is_analysis_pass {
            // Pass 1 emits stats only; write to the null muxer
            cmd.arg("-f").arg("null").arg(null_output_target());
        } else {
            output_args(&mut cmd, params.container, &job.output);
        }

        cmd
    }

    fn build_extract(&self, job: &EncodeJob) -> Command {
        let params = &job.params;
        let mut cmd = self.base_command();
        cmd.arg("-i").arg(&job.input);
        cmd.arg("-progress").arg("pipe:1").arg("-nostats");
        cmd.arg("-map").arg("0:a:0").arg("-vn");
        audio_codec_args(&mut cmd, params);
        apply_additional_args(&mut cmd, &job.extra_args);
        let (_, muxer) = params.audio.codec.audio_only_target();
        cmd.arg("-f").arg(muxer).arg(&job.output);
        cmd
    }

    /// Container change without re-encoding
    pub fn build_remux(&self, input: &Path, output: &Path, container: Container) -> Command {
        let mut cmd = self.base_command();
        cmd.arg("-i").arg(input);
        cmd.arg("-progress").arg("pipe:1").arg("-nostats");
        cmd.arg("-c").arg("copy");
        output_args(&mut cmd, container, output);
        cmd
    }
}
