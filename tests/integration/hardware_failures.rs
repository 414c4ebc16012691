// Hardware encoder failure classification

use proptest::prelude::*;
use xuebox::engine::hardware::{HardwareErrorKind, VideoEncoder, classify};

const NVENC_NO_DEVICE: &str = "\
[h264_nvenc @ 0x55d0c8a4c0] OpenEncodeSessionEx failed: unsupported device (2): (no details)
[h264_nvenc @ 0x55d0c8a4c0] No NVENC capable devices found
Error initializing output stream 0:0 -- Error while opening encoder";

const NVENC_BUSY: &str = "\
[hevc_nvenc @ 0x5600] OpenEncodeSessionEx failed: incompatible client key (21): (no details)
[hevc_nvenc @ 0x5600] Could not open encoder";

const QSV_OLD_DRIVER: &str = "\
[h264_qsv @ 0x1] Selected ratecontrol mode is not supported by the current runtime";

const AMF_MISSING: &str = "\
[h264_amf @ 0x2] DLL amfrt64.dll failed to open";

#[test]
fn test_nvenc_without_device() {
    let failure = classify(VideoEncoder::H264Nvenc, 1, NVENC_NO_DEVICE).unwrap();
    assert_eq!(failure.kind, HardwareErrorKind::DeviceNotFound);
    assert_eq!(
        failure.evidence.as_deref(),
        Some("[h264_nvenc @ 0x55d0c8a4c0] No NVENC capable devices found")
    );
    assert_eq!(failure.remediation.fallback, Some(VideoEncoder::Libx264));
    assert!(failure.remediation.driver_url.is_some());
    assert!(!failure.kind.is_retryable());
}

#[test]
fn test_busy_wins_over_session_init() {
    let failure = classify(VideoEncoder::HevcNvenc, 1, NVENC_BUSY).unwrap();
    assert_eq!(failure.kind, HardwareErrorKind::DeviceBusy);
    assert!(failure.kind.is_retryable());
    assert_eq!(failure.remediation.fallback, None);
}

#[test]
fn test_qsv_runtime_too_old() {
    let failure = classify(VideoEncoder::H264Qsv, 1, QSV_OLD_DRIVER).unwrap();
    assert_eq!(failure.kind, HardwareErrorKind::DriverTooOld);
}

#[test]
fn test_amf_runtime_missing() {
    let failure = classify(VideoEncoder::H264Amf, 1, AMF_MISSING).unwrap();
    assert_eq!(failure.kind, HardwareErrorKind::DeviceNotFound);
    let text = failure.to_string();
    assert!(text.contains("h264_amf"), "{}", text);
    assert!(text.contains("--encoder libx264"), "{}", text);
}

#[test]
fn test_kernel_busy_applies_to_every_vendor() {
    for encoder in [VideoEncoder::H264Nvenc, VideoEncoder::HevcQsv, VideoEncoder::HevcAmf] {
        let failure = classify(encoder, 1, "Failed to open /dev/dri/renderD128: Device or resource busy")
            .unwrap();
        assert_eq!(failure.kind, HardwareErrorKind::DeviceBusy, "{}", encoder);
    }
}

#[test]
fn test_signatures_of_other_vendors_are_ignored() {
    // An NVENC message under a QSV encoder is not evidence for anything
    let failure = classify(VideoEncoder::H264Qsv, 1, NVENC_NO_DEVICE).unwrap();
    assert_eq!(failure.kind, HardwareErrorKind::Unknown);
    assert_eq!(failure.evidence, None);
}

#[test]
fn test_software_failures_are_unknown_without_fallback() {
    let failure = classify(VideoEncoder::Libx264, 1, NVENC_NO_DEVICE).unwrap();
    assert_eq!(failure.kind, HardwareErrorKind::Unknown);
    assert_eq!(failure.remediation.fallback, None);
}

proptest! {
    #[test]
    fn prop_classify_is_none_iff_success(
        encoder in prop::sample::select(VideoEncoder::ALL.to_vec()),
        exit_code in -255i32..=255,
        stderr in prop::sample::select(vec!["", NVENC_NO_DEVICE, NVENC_BUSY, QSV_OLD_DRIVER, AMF_MISSING]),
    ) {
        let failure = classify(encoder, exit_code, stderr);
        prop_assert_eq!(failure.is_none(), exit_code == 0);
        if let Some(failure) = failure {
            prop_assert_eq!(failure.exit_code, exit_code);
            prop_assert_eq!(failure.encoder, encoder);
            prop_assert_eq!(failure.kind.is_retryable(), failure.kind == HardwareErrorKind::DeviceBusy);
        }
    }
}

#[cfg(unix)]
mod execution {
    use crate::common::helpers::*;
    use xuebox::engine::hardware::HardwareErrorKind;
    use xuebox::engine::worker::{EncodeError, EncodeOptions, EncodeRunner};
    use xuebox::engine::{CommandBuilder, EncodeJob, ParameterOverrides};

    fn run_with_false(preset: &str) -> EncodeError {
        let dir = tempfile::tempdir().unwrap();
        let input = write_file(dir.path(), "in.mkv", b"video");
        let params = resolve_builtin(preset, &ParameterOverrides::default());
        let job = EncodeJob::new(input, dir.path().join("out.mp4"), params);
        // `false` ignores its arguments and exits 1 with no output
        let plan = CommandBuilder::new("false", dir.path()).build(&job).unwrap();
        EncodeRunner::default()
            .execute(&job, plan, &EncodeOptions::default(), &mut |_| {})
            .unwrap_err()
    }

    #[test]
    fn test_hardware_exit_is_classified() {
        match run_with_false("nvenc-fast") {
            EncodeError::Hardware(failure) => {
                assert_eq!(failure.kind, HardwareErrorKind::Unknown);
                assert_eq!(failure.exit_code, 1);
            }
            other => panic!("expected hardware failure, got {other:?}"),
        }
    }

    #[test]
    fn test_software_exit_is_a_plain_failure() {
        let err = run_with_false("balanced");
        assert!(
            matches!(err, EncodeError::EncoderFailed { pass: 1, exit_code: 1, .. }),
            "{err:?}"
        );
        assert!(!err.is_retryable());
    }
}
