// Config files, user presets and rule files working together

use std::path::PathBuf;
use xuebox::config::Config;
use xuebox::engine::hardware::VideoEncoder;
use xuebox::engine::{ParameterOverrides, PresetCatalog, PresetError, resolve};
use xuebox::qc::{CompatibilityRuleSet, Dimensions, RuleKind, RuleSetError, Severity};

use crate::common::assertions::*;
use crate::common::helpers::*;

const USER_PRESETS: &str = r#"
[[preset]]
id = "balanced"
description = "house default"
encoder = "libx265"
rate_control = "cq"
quality = 24

[[preset]]
id = "archive-720"
encoder = "libx264"
rate_control = "cbr"
bitrate = "3M"
resolution = "1280x720"
container = "mkv"
"#;

#[test]
fn test_user_presets_replace_and_extend_builtins() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "presets.toml", USER_PRESETS.as_bytes());

    let catalog = PresetCatalog::with_user_file(&path).unwrap();
    assert_eq!(catalog.len(), PresetCatalog::builtin().len() + 1);
    assert_eq!(catalog.get("balanced").unwrap().encoder, VideoEncoder::Libx265);

    let params = resolve(&catalog, "archive-720", &ParameterOverrides::default()).unwrap();
    let job = fixed_job(params, "/media/in.mkv", "/media/out.mkv");
    let cmd = &plan_commands(&posix_builder().build(&job).unwrap())[0];
    assert_cmd_has_flag_value(cmd, "-b:v", "3M");
    assert_cmd_has_flag_value(cmd, "-minrate", "3M");
    assert_cmd_has_flag_value(cmd, "-vf", "scale=1280:720");
    assert_cmd_has_flag_value(cmd, "-f", "matroska");
}

#[test]
fn test_missing_preset_file_is_an_io_error() {
    let err = PresetCatalog::with_user_file(&PathBuf::from("/nonexistent/presets.toml")).unwrap_err();
    assert!(matches!(err, PresetError::Io { .. }));
}

#[test]
fn test_unknown_preset_lists_alternatives() {
    let err = resolve(
        &PresetCatalog::builtin(),
        "nope",
        &ParameterOverrides::default(),
    )
    .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("nope"), "{}", message);
    assert!(message.contains("balanced"), "{}", message);
}

#[test]
fn test_config_file_drives_rules() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "config.toml",
        br#"
[tools]
ffmpeg = "/opt/ffmpeg/bin/ffmpeg"

[scan]
max_workers = 2
image_extensions = ["png"]

[rules]
disallowed_containers = ["avi"]
max_resolution = "1920x1080"

[rules.severity]
extension-mismatch = "error"
"#,
    );

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.tools.ffmpeg, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
    assert_eq!(config.scan.max_workers, 2);
    assert!(config.rules.is_container_disallowed("avi"));
    assert!(!config.rules.is_container_disallowed("mkv"));
    assert_eq!(config.rules.max_resolution, Some(Dimensions::new(1920, 1080)));
    assert_eq!(
        config.rules.severity.get(RuleKind::ExtensionMismatch),
        Severity::Error
    );

    let filter = config.scan.filter();
    assert!(filter.classify(std::path::Path::new("a.png")).is_some());
    assert!(filter.classify(std::path::Path::new("a.jpg")).is_none());
}

#[test]
fn test_rule_file_with_inverted_bitrates_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "rules.toml",
        b"min_bitrate = \"10M\"\nmax_bitrate = \"2M\"\n",
    );
    let err = CompatibilityRuleSet::load(&path).unwrap_err();
    assert!(err.to_string().contains("bitrate"), "{}", err);
    assert!(matches!(err, RuleSetError::Parse(_)));
}

#[test]
fn test_saved_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("xuebox").join("config.toml");

    let mut config = Config::default();
    config.encode.default_preset = "upload-8m".to_string();
    config.rules = config
        .rules
        .with_bitrate_range(None, Some("8M".parse().unwrap()))
        .unwrap();
    config.save_to(&path).unwrap();

    assert_eq!(Config::load_from(&path).unwrap(), config);
}
