use crate::cli::{Cli, Commands, EncodeArgs, QcArgs};
use anyhow::{Context, Result, bail};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use xuebox::cancel::{CancelToken, cancel_on_signals};
use xuebox::config::Config;
use xuebox::engine::hardware::{self, HardwareFailure};
use xuebox::engine::probe::{FfprobeProber, MediaProber};
use xuebox::engine::worker::{EncodeError, EncodeOptions, EncodeRunner};
use xuebox::engine::{
    self, CommandBuilder, EncodeJob, JobEvent, PresetCatalog, RateControl, RunLimits,
};
use xuebox::qc::{self, CompatibilityRuleSet, QualityScanner};

/// Config named on the command line, else the default location
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

pub fn run(cli: Cli, config: Config) -> Result<()> {
    let cancel = CancelToken::new();
    cancel_on_signals(&cancel);
    match cli.command {
        Commands::Encode(args) => handle_encode(&config, args, &cancel),
        Commands::Remux {
            input,
            container,
            output,
            debug,
        } => handle_remux(&config, input, container, output, debug, &cancel),
        Commands::Presets => handle_presets(&config),
        Commands::Qc(args) => handle_qc(&config, args, &cancel),
        Commands::Probe { file } => handle_probe(&config, file),
        Commands::CheckFfmpeg => handle_check_ffmpeg(&config),
        Commands::InitConfig => handle_init_config(),
    }
}

fn load_catalog(config: &Config) -> Result<PresetCatalog> {
    match &config.encode.presets_file {
        Some(path) => PresetCatalog::with_user_file(path)
            .with_context(|| format!("Failed to load presets from {}", path.display())),
        None => Ok(PresetCatalog::builtin()),
    }
}

fn describe_rate_control(rate_control: &RateControl) -> String {
    match rate_control {
        RateControl::ConstantQuality { quality } => format!("cq {}", quality),
        RateControl::VariableBitrate { bitrate } => format!("vbr {}", bitrate),
        RateControl::ConstantBitrate { bitrate } => format!("cbr {}", bitrate),
        RateControl::TwoPass { bitrate } => format!("two-pass {}", bitrate),
    }
}

fn print_event(event: &JobEvent) {
    match event {
        JobEvent::Started { passes, .. } => {
            eprintln!("Encoding ({} pass{})", passes, if *passes == 1 { "" } else { "es" });
        }
        JobEvent::Progress {
            pass,
            out_time_s,
            speed,
            ..
        } => {
            let speed = speed.map(|s| format!("{:.2}x", s)).unwrap_or_default();
            eprint!("\r  pass {}: {:>9.1}s {:>8}", pass, out_time_s, speed);
            let _ = std::io::stderr().flush();
        }
        JobEvent::PassFinished { pass, .. } => eprintln!("\r  pass {} done{:>20}", pass, ""),
        JobEvent::Finished { .. } => {}
    }
}

fn report_hardware_failure(failure: &HardwareFailure) {
    eprintln!("Hardware encoder failure: {}", failure.kind);
    if let Some(evidence) = &failure.evidence {
        eprintln!("  ffmpeg said: {}", evidence);
    }
    eprintln!("  {}", failure.remediation);
    if failure.kind.is_retryable() {
        eprintln!("  The device was busy; running the same command again may succeed.");
    }
}

fn handle_encode(config: &Config, args: EncodeArgs, cancel: &CancelToken) -> Result<()> {
    let catalog = load_catalog(config)?;
    let preset = args
        .preset
        .clone()
        .unwrap_or_else(|| config.encode.default_preset.clone());
    let params = engine::resolve(&catalog, &preset, &args.overrides())?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| engine::derive_output_path(&args.input, &params));
    let mut job = EncodeJob::new(args.input.clone(), output, params).with_debug(args.debug);
    if let Some(subtitle) = &args.subtitle {
        job = job.with_subtitle(subtitle);
    }
    if let Some(audio) = &args.replacement_audio {
        job = job.with_replacement_audio(audio);
    }
    if let Some(extra) = &args.extra_args {
        job = job.with_extra_args(extra.as_str());
    }

    let builder = CommandBuilder::new(&config.tools.ffmpeg, config.encode.work_dir());
    let plan = builder.build(&job)?;

    if plan.encoder.is_hardware() && !job.debug {
        let available = hardware::list_available_encoders(&config.tools.ffmpeg);
        if !available.contains(&plan.encoder) {
            warn!(
                encoder = %plan.encoder,
                "encoder not listed by this ffmpeg build; the encode will probably fail"
            );
        }
    }

    let options = EncodeOptions {
        cancel: cancel.clone(),
        timeout: args
            .timeout
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .or_else(|| config.encode.timeout()),
    };
    let runner = EncodeRunner::new(config.tools.plugins());
    match runner.execute(&job, plan, &options, &mut print_event) {
        Ok(outcome) if !outcome.executed => {
            for command in &outcome.commands {
                println!("{}", command);
            }
            Ok(())
        }
        Ok(outcome) => {
            println!("Encoded: {}", outcome.output.display());
            Ok(())
        }
        Err(EncodeError::Hardware(failure)) => {
            report_hardware_failure(&failure);
            Err(failure.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn handle_remux(
    config: &Config,
    input: PathBuf,
    container: engine::Container,
    output: Option<PathBuf>,
    debug: bool,
    cancel: &CancelToken,
) -> Result<()> {
    let output = output.unwrap_or_else(|| engine::derive_remux_output_path(&input, container));
    if output == input {
        bail!("Output would overwrite the input: {}", input.display());
    }

    let builder = CommandBuilder::new(&config.tools.ffmpeg, config.encode.work_dir());
    let cmd = builder.build_remux(&input, &output, container);
    let formatted = engine::format_command(&cmd);
    if debug {
        println!("{}", formatted);
        return Ok(());
    }
    if !input.is_file() {
        bail!("Input file not found: {}", input.display());
    }

    info!("{}", formatted);
    let limits = RunLimits::new(cancel.clone(), config.encode.timeout());
    let result = engine::run_process(cmd, &limits, &mut |_| {})?;
    if !result.success() {
        bail!(
            "ffmpeg exited with code {}:\n{}",
            result.exit_code,
            result.stderr_summary(5)
        );
    }
    println!("Remuxed: {}", output.display());
    Ok(())
}

fn handle_presets(config: &Config) -> Result<()> {
    let catalog = load_catalog(config)?;
    println!(
        "{:<16} {:<12} {:<14} {:<10} {:<6} DESCRIPTION",
        "ID", "ENCODER", "RATE", "SPEED", "FORMAT"
    );
    for preset in catalog.iter() {
        let marker = if preset.id == config.encode.default_preset {
            " (default)"
        } else {
            ""
        };
        println!(
            "{:<16} {:<12} {:<14} {:<10} {:<6} {}{}",
            preset.id,
            preset.encoder.to_string(),
            describe_rate_control(&preset.rate_control),
            preset.speed.to_string(),
            preset.container.to_string(),
            preset.description,
            marker
        );
    }
    Ok(())
}

fn effective_rules(config: &Config, args: &QcArgs) -> Result<CompatibilityRuleSet> {
    let mut rules = match &args.rules {
        Some(path) => CompatibilityRuleSet::load(path)?,
        None => config.rules.clone(),
    };

    if let Some(list) = &args.containers {
        rules = rules.with_disallowed_containers(qc::parse_list(list));
    }
    if let Some(list) = &args.codecs {
        rules = rules.with_disallowed_codecs(qc::parse_list(list));
    }
    if let Some(list) = &args.image_formats {
        rules = rules.with_disallowed_image_formats(qc::parse_list(list));
    }

    let min_bitrate = args.min_bitrate.or(rules.min_bitrate);
    let max_bitrate = args.max_bitrate.or(rules.max_bitrate);
    let min_resolution = args.min_resolution.or(rules.min_resolution);
    let max_resolution = args.max_resolution.or(rules.max_resolution);
    let rules = rules
        .with_bitrate_range(min_bitrate, max_bitrate)?
        .with_resolution_range(min_resolution, max_resolution)?;
    Ok(rules)
}

fn handle_qc(config: &Config, args: QcArgs, cancel: &CancelToken) -> Result<()> {
    let rules = effective_rules(config, &args)?;
    let dir = match &args.directory {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Could not determine current directory")?,
    };
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }

    let prober = FfprobeProber::new(&config.tools.ffprobe)
        .with_timeout(config.scan.probe_timeout())
        .with_cancel(cancel.clone());
    let scanner = QualityScanner::new(prober, rules).with_filter(config.scan.filter());
    let workers = args.workers.unwrap_or(config.scan.max_workers);

    eprintln!("Scanning {} ...", dir.display());
    let outcome = scanner.scan_parallel(&dir, cancel, workers);
    if outcome.cancelled {
        warn!("scan cancelled; report covers the files inspected so far");
    }

    let report = qc::generate(outcome.findings).with_files_scanned(outcome.files_scanned);
    let rendered = if args.json {
        report.to_json().context("Failed to serialize report")?
    } else {
        report.render_text()
    };

    match &args.output {
        Some(path) => {
            fs::write(path, &rendered)
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

fn handle_probe(config: &Config, file: PathBuf) -> Result<()> {
    let prober = FfprobeProber::new(&config.tools.ffprobe).with_timeout(config.scan.probe_timeout());
    let probe = prober
        .probe(&file)
        .with_context(|| format!("Failed to probe {}", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&probe)?);
    Ok(())
}

fn handle_check_ffmpeg(config: &Config) -> Result<()> {
    let version = engine::ffmpeg_version(&config.tools.ffmpeg)?;
    println!("ffmpeg found: {}", version);
    let probe_version = engine::ffprobe_version(&config.tools.ffprobe)?;
    println!("ffprobe found: {}", probe_version);

    let available = hardware::list_available_encoders(&config.tools.ffmpeg);
    println!("Encoders:");
    for encoder in hardware::VideoEncoder::ALL {
        let status = if available.contains(&encoder) {
            "available"
        } else {
            "missing"
        };
        println!("  {:<12} {:<10} {}", encoder.ffmpeg_name(), status, encoder.display_name());
    }
    Ok(())
}

fn handle_init_config() -> Result<()> {
    let path = Config::config_path()?;
    if Config::exists() {
        let cfg = Config::load_from(&path)?;
        println!("Config loaded successfully from {}", path.display());
        println!("{:#?}", cfg);
    } else {
        Config::ensure_default()?;
        println!("Default config saved to {}", path.display());
    }
    Ok(())
}
