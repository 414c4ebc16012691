// Runs one encode plan: compatibility setup, passes in order, failure
// classification and artifact cleanup. One job at a time per runner.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::compat::{
    ArtifactSet, CompatError, CompatibilityScriptGenerator, PluginSet, ScopedSearchPath,
};
use super::core::{
    BuildError, EncodeJob, EncodePlan, JobEvent, ProgressParser, RunError, RunLimits,
    format_command, run_process, validate_inputs,
};
use super::hardware::{self, HardwareFailure, VideoEncoder};
use crate::cancel::CancelToken;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Compat(#[from] CompatError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error(transparent)]
    Hardware(#[from] HardwareFailure),

    #[error("{encoder} failed in pass {pass} with exit code {exit_code}:\n{detail}")]
    EncoderFailed {
        encoder: VideoEncoder,
        pass: usize,
        exit_code: i32,
        detail: String,
    },

    #[error("pass 1 left no statistics at {}", path.display())]
    StatsMissing { path: PathBuf },

    #[error("failed to prepare working directory {}", path.display())]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("job cancelled")]
    Cancelled,

    #[error("encoder timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

impl EncodeError {
    /// Only a busy hardware encoder is worth retrying unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Hardware(failure) if failure.kind.is_retryable())
    }
}

fn map_run_error(err: RunError) -> EncodeError {
    match err {
        RunError::Cancelled { .. } => EncodeError::Cancelled,
        RunError::TimedOut { timeout, .. } => EncodeError::TimedOut(timeout),
        other => EncodeError::Run(other),
    }
}

/// What happened to a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOutcome {
    pub job_id: Uuid,
    /// Display form of every invocation, in run order
    pub commands: Vec<String>,
    /// False in debug mode
    pub executed: bool,
    pub output: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    pub cancel: CancelToken,
    /// Limit for each ffmpeg invocation
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct EncodeRunner {
    generator: CompatibilityScriptGenerator,
}

impl EncodeRunner {
    pub fn new(plugins: PluginSet) -> Self {
        Self {
            generator: CompatibilityScriptGenerator::new(plugins),
        }
    }

    /// Execute `plan` for `job`, reporting through `on_event`.
    ///
    /// Debug jobs return the commands without spawning anything. Otherwise a
    /// `JobEvent::Finished` is emitted exactly once, on success or failure.
    pub fn execute(
        &self,
        job: &EncodeJob,
        plan: EncodePlan,
        options: &EncodeOptions,
        on_event: &mut dyn FnMut(&JobEvent),
    ) -> Result<EncodeOutcome, EncodeError> {
        let commands: Vec<String> = plan.passes.iter().map(format_command).collect();
        for (i, command) in commands.iter().enumerate() {
            info!(job = %job.id, pass = i + 1, "{}", command);
        }

        let outcome = EncodeOutcome {
            job_id: job.id,
            commands,
            executed: !job.debug,
            output: job.output.clone(),
        };
        if job.debug {
            info!(job = %job.id, "debug mode: commands not executed");
            return Ok(outcome);
        }

        let result = self.run(job, plan, options, on_event);
        let (success, summary) = match &result {
            Ok(()) => (
                true,
                format!("{} -> {}", job.input.display(), job.output.display()),
            ),
            Err(e) => {
                error!(job = %job.id, error = %e, "encode failed");
                (false, e.to_string())
            }
        };
        on_event(&JobEvent::Finished {
            job_id: job.id,
            success,
            summary,
        });

        result.map(|()| outcome)
    }

    fn run(
        &self,
        job: &EncodeJob,
        plan: EncodePlan,
        options: &EncodeOptions,
        on_event: &mut dyn FnMut(&JobEvent),
    ) -> Result<(), EncodeError> {
        validate_inputs(job)?;

        // Dropped last: removes the job directory, stats and script on every exit path
        let mut artifacts = ArtifactSet::new();
        if plan.stats_prefix.is_some() || plan.compat.is_some() {
            fs::create_dir_all(&plan.job_dir).map_err(|source| EncodeError::WorkDir {
                path: plan.job_dir.clone(),
                source,
            })?;
            artifacts.track_dir(&plan.job_dir);
        }

        // Held for every pass; restores PATH even if generation fails
        let _search_path = match &plan.compat {
            Some(request) => {
                artifacts.track_file(CompatibilityScriptGenerator::index_path(&request.video));
                let guard = ScopedSearchPath::acquire(&self.generator.plugins().dir)?;
                let script =
                    self.generator
                        .generate(&request.video, &request.subtitle, &request.work_dir)?;
                artifacts.track_file(script.index_file);
                Some(guard)
            }
            None => None,
        };

        let stats_file = plan.stats_file();
        let limits = RunLimits::new(options.cancel.clone(), options.timeout);
        let total = plan.passes.len();
        on_event(&JobEvent::Started {
            job_id: job.id,
            passes: total,
        });

        for (index, cmd) in plan.passes.into_iter().enumerate() {
            let pass = index + 1;
            if pass > 1 {
                if let Some(path) = &stats_file {
                    let usable = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
                    if !usable {
                        return Err(EncodeError::StatsMissing { path: path.clone() });
                    }
                }
            }

            let mut parser = ProgressParser::new();
            let output = run_process(cmd, &limits, &mut |line| {
                if parser.parse_line(line) {
                    on_event(&JobEvent::Progress {
                        job_id: job.id,
                        pass,
                        out_time_s: parser.out_time_s(),
                        speed: parser.speed,
                    });
                }
            })
            .map_err(map_run_error)?;

            if !output.success() {
                if plan.encoder.is_hardware() {
                    if let Some(failure) =
                        hardware::classify(plan.encoder, output.exit_code, &output.stderr_tail)
                    {
                        warn!(job = %job.id, kind = ?failure.kind, evidence = ?failure.evidence, "hardware encoder failed");
                        return Err(failure.into());
                    }
                }
                return Err(EncodeError::EncoderFailed {
                    encoder: plan.encoder,
                    pass,
                    exit_code: output.exit_code,
                    detail: output.stderr_summary(5),
                });
            }

            info!(job = %job.id, pass, total, "pass finished");
            on_event(&JobEvent::PassFinished {
                job_id: job.id,
                pass,
            });
        }

        Ok(())
    }
}
