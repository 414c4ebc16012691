// Command generation from built-in presets and overrides

use xuebox::engine::hardware::{HardwareTier, SpeedTier, VideoEncoder};
use xuebox::engine::{
    AudioAction, AudioCodec, BuildError, Container, FrameRatePolicy, ParameterOverrides,
    ResolutionError, ResolutionPolicy, SubtitleMode, derive_output_path,
};

use crate::common::assertions::*;
use crate::common::helpers::*;

fn single(preset: &str, overrides: &ParameterOverrides) -> String {
    let commands = build_commands(preset, overrides);
    assert_eq!(commands.len(), 1, "expected one pass: {:?}", commands);
    commands.into_iter().next().unwrap()
}

#[test]
fn test_balanced_preset_full_command() {
    let cmd = single("balanced", &ParameterOverrides::default());
    insta::assert_snapshot!(cmd, @"ffmpeg -hide_banner -y -i /media/in.mkv -progress pipe:1 -nostats -map 0:v:0 -map 0:a? -c:v libx264 -crf 18 -preset medium -c:a aac -b:a 192k -movflags +faststart -f mp4 /media/out.mp4");
}

#[test]
fn test_balanced_preset_has_no_subtitle_filter() {
    let cmd = single("balanced", &ParameterOverrides::default());
    assert_cmd_has_flag_value(&cmd, "-c:v", "libx264");
    assert_numeric_flag(&cmd, "-crf", 18);
    assert_cmd_not_contains(&cmd, "subtitles=");
    assert_cmd_not_contains(&cmd, "-vf");
    assert_cmd_not_contains(&cmd, "-pass");
}

#[test]
fn test_quality_override_replaces_preset_value() {
    let overrides = ParameterOverrides {
        quality: Some(24),
        ..Default::default()
    };
    let cmd = single("balanced", &overrides);
    assert_numeric_flag(&cmd, "-crf", 24);
}

#[test]
fn test_1080p_preset_scales_and_sets_rate() {
    let cmd = single("1080p-standard", &ParameterOverrides::default());
    assert_cmd_has_flag_value(&cmd, "-vf", "scale=1920:1080");
    assert_numeric_flag(&cmd, "-crf", 20);
    assert_numeric_flag(&cmd, "-r", 60);
}

#[test]
fn test_direct_subtitles_join_the_filter_chain() {
    let overrides = ParameterOverrides {
        subtitles: Some(SubtitleMode::Direct),
        ..Default::default()
    };
    let params = resolve_builtin("1080p-standard", &overrides);
    let job = fixed_job(params, "/media/in.mkv", "/media/out.mp4").with_subtitle("/media/subs.ass");
    let plan = posix_builder().build(&job).unwrap();
    let cmd = &plan_commands(&plan)[0];

    assert_cmd_has_flag_value(cmd, "-vf", "subtitles='/media/subs.ass',scale=1920:1080");
    assert!(plan.compat.is_none());
}

#[test]
fn test_subtitle_mode_without_file_is_rejected() {
    let overrides = ParameterOverrides {
        subtitles: Some(SubtitleMode::Direct),
        ..Default::default()
    };
    let job = fixed_job(
        resolve_builtin("balanced", &overrides),
        "/media/in.mkv",
        "/media/out.mp4",
    );
    let err = posix_builder().build(&job).unwrap_err();
    assert!(matches!(err, BuildError::MissingSubtitle(SubtitleMode::Direct)));
}

#[test]
fn test_nvenc_preset_uses_cq_and_tier() {
    let cmd = single("nvenc-fast", &ParameterOverrides::default());
    assert_cmd_has_flag_value(&cmd, "-c:v", "h264_nvenc");
    assert_numeric_flag(&cmd, "-cq", 23);
    assert_cmd_has_flag_value(&cmd, "-preset", "p4");
    assert_cmd_not_contains(&cmd, "-crf");
}

#[test]
fn test_encoder_switch_picks_family_default_speed() {
    let overrides = ParameterOverrides {
        encoder: Some(VideoEncoder::HevcNvenc),
        ..Default::default()
    };
    let cmd = single("balanced", &overrides);
    assert_cmd_has_flag_value(&cmd, "-c:v", "hevc_nvenc");
    assert_numeric_flag(&cmd, "-cq", 18);
    assert_cmd_has_flag_value(&cmd, "-preset", "p4");
}

#[test]
fn test_amf_quality_uses_constant_qp() {
    let cmd = single("amf-fast", &ParameterOverrides::default());
    assert_cmd_has_flag_value(&cmd, "-rc", "cqp");
    assert_numeric_flag(&cmd, "-qp_i", 23);
    assert_numeric_flag(&cmd, "-qp_p", 23);
    assert_cmd_has_flag_value(&cmd, "-quality", "speed");
}

#[test]
fn test_software_speed_on_hardware_encoder_is_rejected() {
    let overrides = ParameterOverrides {
        encoder: Some(VideoEncoder::Libx264),
        speed: Some(SpeedTier::Hardware(HardwareTier::P5)),
        ..Default::default()
    };
    let err = xuebox::engine::resolve(
        &xuebox::engine::PresetCatalog::builtin(),
        "balanced",
        &overrides,
    )
    .unwrap_err();
    assert!(matches!(err, ResolutionError::UnsupportedCombination(_)));
}

#[test]
fn test_out_of_range_frame_rate_is_rejected() {
    let overrides = ParameterOverrides {
        frame_rate: Some(FrameRatePolicy::Target(1000)),
        ..Default::default()
    };
    let err = xuebox::engine::resolve(
        &xuebox::engine::PresetCatalog::builtin(),
        "balanced",
        &overrides,
    )
    .unwrap_err();
    assert!(matches!(err, ResolutionError::OutOfRange { field: "frame rate", .. }));
}

#[test]
fn test_extra_args_are_split_like_a_shell() {
    let params = resolve_builtin("balanced", &ParameterOverrides::default());
    let job = fixed_job(params, "/media/in.mkv", "/media/out.mp4")
        .with_extra_args("-tune film -metadata \"title=My Film\"");
    let cmd = &plan_commands(&posix_builder().build(&job).unwrap())[0];
    assert_cmd_has_flag_value(cmd, "-tune", "film");
    assert_cmd_contains(cmd, "-metadata \"title=My Film\"");
}

#[test]
fn test_replacement_audio_maps_second_input() {
    let overrides = ParameterOverrides {
        audio_action: Some(AudioAction::Replace),
        ..Default::default()
    };
    let params = resolve_builtin("balanced", &overrides);
    let job = fixed_job(params, "/media/in.mkv", "/media/out.mp4")
        .with_replacement_audio("/media/dub.wav");
    let cmd = &plan_commands(&posix_builder().build(&job).unwrap())[0];
    assert_eq!(get_flag_values(cmd, "-i"), vec!["/media/in.mkv", "/media/dub.wav"]);
    assert_eq!(get_flag_values(cmd, "-map"), vec!["0:v:0", "1:a:0"]);
}

#[test]
fn test_mkv_container_skips_faststart() {
    let overrides = ParameterOverrides {
        container: Some(Container::Mkv),
        audio_codec: Some(AudioCodec::Flac),
        ..Default::default()
    };
    let cmd = single("balanced", &overrides);
    assert_cmd_has_flag_value(&cmd, "-f", "matroska");
    assert_cmd_has_flag_value(&cmd, "-c:a", "flac");
    assert_cmd_not_contains(&cmd, "-movflags");
}

#[test]
fn test_resolution_override_keeps_original_when_asked() {
    let overrides = ParameterOverrides {
        resolution: Some(ResolutionPolicy::KeepOriginal),
        ..Default::default()
    };
    let cmd = single("1080p-standard", &overrides);
    assert_cmd_not_contains(&cmd, "scale=");
}

#[test]
fn test_default_output_path_names_the_encoder() {
    let params = resolve_builtin("nvenc-fast", &ParameterOverrides::default());
    let output = derive_output_path(std::path::Path::new("/media/clip.mkv"), &params);
    assert_eq!(output, std::path::PathBuf::from("/media/clip_h264_nvenc.mp4"));
}
