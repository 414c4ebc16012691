// Preset + overrides -> validated EncodeParameters

use super::preset::PresetCatalog;
use super::types::{
    AudioAction, AudioCodec, AudioPolicy, Bitrate, Container, EncodeParameters, FrameRatePolicy,
    RateControl, RateControlMode, ResolutionPolicy, SubtitleMode,
};
use crate::engine::hardware::{EncoderFamily, SpeedTier, VideoEncoder};

/// User choices layered over a preset. `None` keeps the preset's value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterOverrides {
    pub encoder: Option<VideoEncoder>,
    pub rate_control: Option<RateControlMode>,
    pub quality: Option<u8>,
    pub bitrate: Option<Bitrate>,
    pub speed: Option<SpeedTier>,
    pub resolution: Option<ResolutionPolicy>,
    pub frame_rate: Option<FrameRatePolicy>,
    pub subtitles: Option<SubtitleMode>,
    pub audio_action: Option<AudioAction>,
    pub audio_codec: Option<AudioCodec>,
    pub audio_bitrate_kbps: Option<u32>,
    pub container: Option<Container>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("unknown preset '{id}' (available: {available})")]
    UnknownPreset { id: String, available: String },

    #[error("{field} cannot be set in {mode} rate control")]
    IncompatibleOverride {
        field: &'static str,
        mode: RateControlMode,
    },

    #[error("{field} {value} is out of range for {subject} (allowed {min}-{max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
        subject: String,
    },

    #[error("{mode} rate control needs a {field} value")]
    MissingValue {
        field: &'static str,
        mode: RateControlMode,
    },

    #[error("{0}")]
    UnsupportedCombination(String),
}

/// Valid quality values per encoder family: CRF, CQ, global_quality, QP
pub fn quality_range(encoder: VideoEncoder) -> (u8, u8) {
    match encoder.family() {
        EncoderFamily::Software => (0, 51),
        EncoderFamily::Nvenc => (0, 51),
        EncoderFamily::Qsv => (1, 51),
        EncoderFamily::Amf => (0, 51),
    }
}

pub const FRAME_RATE_RANGE: (u32, u32) = (1, 240);
pub const DIMENSION_RANGE: (u32, u32) = (16, 8192);
pub const AUDIO_BITRATE_RANGE: (u32, u32) = (32, 640);

fn check_range(
    field: &'static str,
    value: u32,
    (min, max): (u32, u32),
    subject: impl Into<String>,
) -> Result<(), ResolutionError> {
    if value < min || value > max {
        return Err(ResolutionError::OutOfRange {
            field,
            value,
            min,
            max,
            subject: subject.into(),
        });
    }
    Ok(())
}

/// Merge a preset with overrides. Pure: no I/O, no clock, no randomness.
pub fn resolve(
    catalog: &PresetCatalog,
    preset_id: &str,
    overrides: &ParameterOverrides,
) -> Result<EncodeParameters, ResolutionError> {
    let preset = catalog
        .get(preset_id)
        .ok_or_else(|| ResolutionError::UnknownPreset {
            id: preset_id.to_string(),
            available: catalog.ids().join(", "),
        })?;

    let encoder = overrides.encoder.unwrap_or(preset.encoder);
    let mode = overrides
        .rate_control
        .unwrap_or_else(|| preset.rate_control.mode());

    let rate_control = match mode {
        RateControlMode::ConstantQuality => {
            if overrides.bitrate.is_some() {
                return Err(ResolutionError::IncompatibleOverride {
                    field: "bitrate",
                    mode,
                });
            }
            let quality = overrides
                .quality
                .or_else(|| preset.rate_control.quality())
                .ok_or(ResolutionError::MissingValue {
                    field: "quality",
                    mode,
                })?;
            let range = quality_range(encoder);
            check_range(
                "quality",
                quality.into(),
                (range.0.into(), range.1.into()),
                encoder.ffmpeg_name(),
            )?;
            RateControl::ConstantQuality { quality }
        }
        RateControlMode::VariableBitrate
        | RateControlMode::ConstantBitrate
        | RateControlMode::TwoPass => {
            if overrides.quality.is_some() {
                return Err(ResolutionError::IncompatibleOverride {
                    field: "quality",
                    mode,
                });
            }
            let bitrate = overrides
                .bitrate
                .or_else(|| preset.rate_control.bitrate())
                .ok_or(ResolutionError::MissingValue {
                    field: "bitrate",
                    mode,
                })?;
            match mode {
                RateControlMode::VariableBitrate => RateControl::VariableBitrate { bitrate },
                RateControlMode::ConstantBitrate => RateControl::ConstantBitrate { bitrate },
                _ => RateControl::TwoPass { bitrate },
            }
        }
    };

    if rate_control.is_two_pass() && encoder != VideoEncoder::Libx264 {
        return Err(ResolutionError::UnsupportedCombination(format!(
            "two-pass encoding is only available with libx264, not {}",
            encoder
        )));
    }

    let family = encoder.family();
    let speed = match overrides.speed {
        Some(speed) if speed.fits(family) => speed,
        Some(speed) => {
            return Err(ResolutionError::UnsupportedCombination(format!(
                "speed '{}' does not apply to {} (use {})",
                speed,
                encoder,
                if encoder.is_hardware() {
                    "p1..p7"
                } else {
                    "ultrafast..veryslow"
                }
            )));
        }
        // Switching encoder family invalidates the preset's speed
        None if preset.speed.fits(family) => preset.speed,
        None => SpeedTier::default_for(family),
    };

    let resolution = overrides.resolution.unwrap_or(preset.resolution);
    if let ResolutionPolicy::Target { width, height } = resolution {
        check_range("width", width, DIMENSION_RANGE, "output resolution")?;
        check_range("height", height, DIMENSION_RANGE, "output resolution")?;
    }

    let frame_rate = overrides.frame_rate.unwrap_or(preset.frame_rate);
    if let FrameRatePolicy::Target(fps) = frame_rate {
        check_range("frame rate", fps, FRAME_RATE_RANGE, "output")?;
    }

    let audio = AudioPolicy {
        codec: overrides.audio_codec.unwrap_or(preset.audio.codec),
        bitrate_kbps: overrides
            .audio_bitrate_kbps
            .unwrap_or(preset.audio.bitrate_kbps),
    };
    if audio.codec.takes_bitrate() {
        check_range(
            "audio bitrate",
            audio.bitrate_kbps,
            AUDIO_BITRATE_RANGE,
            audio.codec.ffmpeg_name(),
        )?;
    } else if overrides.audio_bitrate_kbps.is_some() {
        return Err(ResolutionError::UnsupportedCombination(format!(
            "audio codec {} takes no bitrate",
            audio.codec.ffmpeg_name()
        )));
    }

    let subtitles = overrides.subtitles.unwrap_or_default();
    let audio_action = overrides.audio_action.unwrap_or_default();
    let container = overrides.container.unwrap_or(preset.container);

    if audio_action == AudioAction::Extract && subtitles != SubtitleMode::None {
        return Err(ResolutionError::UnsupportedCombination(
            "subtitles cannot be burned into an audio-only output".to_string(),
        ));
    }
    if audio_action != AudioAction::Extract && !container.accepts_h26x() {
        return Err(ResolutionError::UnsupportedCombination(format!(
            "{} output cannot hold {} video",
            container, encoder
        )));
    }

    Ok(EncodeParameters {
        encoder,
        rate_control,
        speed,
        resolution,
        frame_rate,
        subtitles,
        audio_action,
        audio,
        container,
    })
}
