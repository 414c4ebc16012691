// Named encode presets, built in or loaded from a user TOML file

use super::types::{
    AudioCodec, AudioPolicy, Bitrate, Container, FrameRatePolicy, RateControl, RateControlMode,
    ResolutionPolicy,
};
use crate::engine::hardware::{HardwareTier, SoftwarePreset, SpeedTier, VideoEncoder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PresetError {
    #[error("preset '{id}': {message}")]
    Invalid { id: String, message: String },

    #[error("failed to read preset file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse preset file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Immutable preset, owned by a `PresetCatalog`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preset {
    pub id: String,
    pub description: String,
    pub encoder: VideoEncoder,
    pub rate_control: RateControl,
    pub speed: SpeedTier,
    pub resolution: ResolutionPolicy,
    pub frame_rate: FrameRatePolicy,
    pub audio: AudioPolicy,
    pub container: Container,
}

/// On-disk shape of a `[[preset]]` table
#[derive(Debug, Clone, Deserialize)]
struct PresetDef {
    id: String,
    #[serde(default)]
    description: String,
    encoder: VideoEncoder,
    rate_control: RateControlMode,
    #[serde(default)]
    quality: Option<u8>,
    #[serde(default)]
    bitrate: Option<Bitrate>,
    #[serde(default)]
    speed: Option<SpeedTier>,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    fps: Option<u32>,
    #[serde(default = "default_audio_codec")]
    audio_codec: AudioCodec,
    #[serde(default = "default_audio_bitrate")]
    audio_bitrate_kbps: u32,
    #[serde(default)]
    container: Container,
}

fn default_audio_codec() -> AudioCodec {
    AudioCodec::Aac
}

fn default_audio_bitrate() -> u32 {
    192
}

#[derive(Debug, Deserialize)]
struct PresetFile {
    #[serde(default)]
    preset: Vec<PresetDef>,
}

impl TryFrom<PresetDef> for Preset {
    type Error = PresetError;

    fn try_from(def: PresetDef) -> Result<Self, Self::Error> {
        let invalid = |message: String| PresetError::Invalid {
            id: def.id.clone(),
            message,
        };

        let rate_control = match def.rate_control {
            RateControlMode::ConstantQuality => {
                if def.bitrate.is_some() {
                    return Err(invalid("bitrate is not used in cq mode".to_string()));
                }
                RateControl::ConstantQuality {
                    quality: def
                        .quality
                        .ok_or_else(|| invalid("cq mode needs a quality value".to_string()))?,
                }
            }
            mode => {
                if def.quality.is_some() {
                    return Err(invalid(format!("quality is not used in {} mode", mode)));
                }
                let bitrate = def
                    .bitrate
                    .ok_or_else(|| invalid(format!("{} mode needs a bitrate", mode)))?;
                match mode {
                    RateControlMode::VariableBitrate => RateControl::VariableBitrate { bitrate },
                    RateControlMode::ConstantBitrate => RateControl::ConstantBitrate { bitrate },
                    _ => RateControl::TwoPass { bitrate },
                }
            }
        };

        let family = def.encoder.family();
        let speed = def.speed.unwrap_or_else(|| SpeedTier::default_for(family));
        if !speed.fits(family) {
            return Err(invalid(format!(
                "speed '{}' does not apply to {}",
                speed, def.encoder
            )));
        }

        let resolution = match def.resolution.as_deref() {
            Some(s) => s.parse().map_err(invalid)?,
            None => ResolutionPolicy::KeepOriginal,
        };

        Ok(Preset {
            id: def.id.clone(),
            description: def.description.clone(),
            encoder: def.encoder,
            rate_control,
            speed,
            resolution,
            frame_rate: def
                .fps
                .map(FrameRatePolicy::Target)
                .unwrap_or(FrameRatePolicy::KeepOriginal),
            audio: AudioPolicy {
                codec: def.audio_codec,
                bitrate_kbps: def.audio_bitrate_kbps,
            },
            container: def.container,
        })
    }
}

/// Preset table keyed by id. Constructed explicitly and passed around; there is no global registry.
#[derive(Debug, Clone, Default)]
pub struct PresetCatalog {
    presets: BTreeMap<String, Preset>,
}

impl PresetCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Presets shipped with the tool
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for preset in builtin_presets() {
            catalog.insert(preset);
        }
        catalog
    }

    /// Parse `[[preset]]` tables
    pub fn from_toml_str(contents: &str) -> Result<Self, PresetError> {
        let file: PresetFile = toml::from_str(contents)?;
        let mut catalog = Self::empty();
        for def in file.preset {
            catalog.insert(Preset::try_from(def)?);
        }
        Ok(catalog)
    }

    /// Built-ins overlaid with a user file; user entries replace built-ins with the same id
    pub fn with_user_file(path: &Path) -> Result<Self, PresetError> {
        let contents = fs::read_to_string(path).map_err(|source| PresetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let user = Self::from_toml_str(&contents)?;
        let mut catalog = Self::builtin();
        catalog.merge(user);
        Ok(catalog)
    }

    pub fn merge(&mut self, other: PresetCatalog) {
        for (_, preset) in other.presets {
            self.insert(preset);
        }
    }

    pub fn insert(&mut self, preset: Preset) {
        if self.presets.contains_key(&preset.id) {
            tracing::debug!(id = %preset.id, "replacing preset");
        }
        self.presets.insert(preset.id.clone(), preset);
    }

    pub fn get(&self, id: &str) -> Option<&Preset> {
        self.presets.get(id)
    }

    /// Presets in id order
    pub fn iter(&self) -> impl Iterator<Item = &Preset> {
        self.presets.values()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.presets.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

fn builtin_presets() -> Vec<Preset> {
    let aac = |kbps| AudioPolicy {
        codec: AudioCodec::Aac,
        bitrate_kbps: kbps,
    };

    vec![
        Preset {
            id: "balanced".to_string(),
            description: "Balanced quality: libx264 CRF 18, source resolution and frame rate"
                .to_string(),
            encoder: VideoEncoder::Libx264,
            rate_control: RateControl::ConstantQuality { quality: 18 },
            speed: SpeedTier::Software(SoftwarePreset::Medium),
            resolution: ResolutionPolicy::KeepOriginal,
            frame_rate: FrameRatePolicy::KeepOriginal,
            audio: aac(192),
            container: Container::Mp4,
        },
        Preset {
            id: "1080p-standard".to_string(),
            description: "Everyday uploads: 1080p60, CRF 20".to_string(),
            encoder: VideoEncoder::Libx264,
            rate_control: RateControl::ConstantQuality { quality: 20 },
            speed: SpeedTier::Software(SoftwarePreset::Medium),
            resolution: ResolutionPolicy::Target {
                width: 1920,
                height: 1080,
            },
            frame_rate: FrameRatePolicy::Target(60),
            audio: aac(192),
            container: Container::Mp4,
        },
        Preset {
            id: "max-quality".to_string(),
            description: "Highest quality for AMVs and detailed footage: CRF 16, slow".to_string(),
            encoder: VideoEncoder::Libx264,
            rate_control: RateControl::ConstantQuality { quality: 16 },
            speed: SpeedTier::Software(SoftwarePreset::Slow),
            resolution: ResolutionPolicy::KeepOriginal,
            frame_rate: FrameRatePolicy::KeepOriginal,
            audio: aac(320),
            container: Container::Mp4,
        },
        Preset {
            id: "hevc-archive".to_string(),
            description: "Archival HEVC: libx265 CRF 22, slower".to_string(),
            encoder: VideoEncoder::Libx265,
            rate_control: RateControl::ConstantQuality { quality: 22 },
            speed: SpeedTier::Software(SoftwarePreset::Slower),
            resolution: ResolutionPolicy::KeepOriginal,
            frame_rate: FrameRatePolicy::KeepOriginal,
            audio: AudioPolicy {
                codec: AudioCodec::Flac,
                bitrate_kbps: 0,
            },
            container: Container::Mkv,
        },
        Preset {
            id: "nvenc-fast".to_string(),
            description: "Fast NVIDIA encode: h264_nvenc CQ 23, p4".to_string(),
            encoder: VideoEncoder::H264Nvenc,
            rate_control: RateControl::ConstantQuality { quality: 23 },
            speed: SpeedTier::Hardware(HardwareTier::P4),
            resolution: ResolutionPolicy::KeepOriginal,
            frame_rate: FrameRatePolicy::KeepOriginal,
            audio: aac(192),
            container: Container::Mp4,
        },
        Preset {
            id: "qsv-fast".to_string(),
            description: "Fast Intel Quick Sync encode: h264_qsv quality 23".to_string(),
            encoder: VideoEncoder::H264Qsv,
            rate_control: RateControl::ConstantQuality { quality: 23 },
            speed: SpeedTier::Hardware(HardwareTier::P3),
            resolution: ResolutionPolicy::KeepOriginal,
            frame_rate: FrameRatePolicy::KeepOriginal,
            audio: aac(192),
            container: Container::Mp4,
        },
        Preset {
            id: "amf-fast".to_string(),
            description: "Fast AMD encode: h264_amf QP 23".to_string(),
            encoder: VideoEncoder::H264Amf,
            rate_control: RateControl::ConstantQuality { quality: 23 },
            speed: SpeedTier::Hardware(HardwareTier::P2),
            resolution: ResolutionPolicy::KeepOriginal,
            frame_rate: FrameRatePolicy::KeepOriginal,
            audio: aac(192),
            container: Container::Mp4,
        },
        Preset {
            id: "upload-8m".to_string(),
            description: "Size-targeted upload: libx264 two-pass at 8 Mb/s".to_string(),
            encoder: VideoEncoder::Libx264,
            rate_control: RateControl::TwoPass {
                bitrate: Bitrate::from_bps(8_000_000),
            },
            speed: SpeedTier::Software(SoftwarePreset::Medium),
            resolution: ResolutionPolicy::KeepOriginal,
            frame_rate: FrameRatePolicy::KeepOriginal,
            audio: aac(192),
            container: Container::Mp4,
        },
    ]
}
