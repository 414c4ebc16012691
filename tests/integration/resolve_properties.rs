// Property tests: resolution and command building are pure

use proptest::prelude::*;
use xuebox::engine::{
    Container, FrameRatePolicy, ParameterOverrides, PresetCatalog, resolve,
};

use crate::common::assertions::*;
use crate::common::helpers::*;

fn preset_ids() -> Vec<String> {
    PresetCatalog::builtin()
        .ids()
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn overrides_strategy() -> impl Strategy<Value = ParameterOverrides> {
    (
        prop::option::of(0u8..=60),
        prop::option::of(1u32..=300),
        prop::option::of(prop::sample::select(vec![
            Container::Mp4,
            Container::Mkv,
            Container::Mov,
            Container::Webm,
        ])),
        prop::option::of(16u32..=700),
    )
        .prop_map(|(quality, fps, container, audio_bitrate)| ParameterOverrides {
            quality,
            frame_rate: fps.map(FrameRatePolicy::Target),
            container,
            audio_bitrate_kbps: audio_bitrate,
            ..Default::default()
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_resolve_is_deterministic(
        preset in prop::sample::select(preset_ids()),
        overrides in overrides_strategy(),
    ) {
        let catalog = PresetCatalog::builtin();
        let first = resolve(&catalog, &preset, &overrides);
        let second = resolve(&catalog, &preset, &overrides);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_build_is_deterministic(
        preset in prop::sample::select(preset_ids()),
        overrides in overrides_strategy(),
    ) {
        let Ok(params) = resolve(&PresetCatalog::builtin(), &preset, &overrides) else {
            return Ok(());
        };
        let job = fixed_job(params, "/media/in.mkv", "/media/out.mp4");
        let first = plan_commands(&posix_builder().build(&job).unwrap());
        let second = plan_commands(&posix_builder().build(&job).unwrap());
        prop_assert_eq!(&first, &second);

        // No subtitles were requested, so none may appear
        for cmd in &first {
            prop_assert!(!cmd.contains("subtitles="), "{}", cmd);
            prop_assert!(!cmd.contains("compat.avs"), "{}", cmd);
        }
        let two_pass = first.len() == 2;
        prop_assert_eq!(two_pass, job.params.rate_control.is_two_pass());
    }

    #[test]
    fn prop_accepted_quality_reaches_the_command(
        quality in 0u8..=51,
    ) {
        let overrides = ParameterOverrides { quality: Some(quality), ..Default::default() };
        let commands = build_commands("balanced", &overrides);
        let expected = quality.to_string();
        prop_assert_eq!(get_flag_value(&commands[0], "-crf"), Some(expected.as_str()));
    }
}
