//! Video encoder catalogue, hardware speed tiers and hardware failure classification

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::process::Command;
use std::str::FromStr;
use std::sync::OnceLock;

/// QSV preset names, fastest first. Indexed by `HardwareTier`.
pub const QSV_PRESETS: &[&str] = &[
    "veryfast", "faster", "fast", "medium", "slow", "slower", "veryslow",
];

// ============================================================================
// Video Encoder Selection
// ============================================================================

/// Supported video encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VideoEncoder {
    #[serde(rename = "libx264")]
    Libx264, // Software H.264
    #[serde(rename = "libx265")]
    Libx265, // Software HEVC
    #[serde(rename = "h264_nvenc")]
    H264Nvenc,
    #[serde(rename = "hevc_nvenc")]
    HevcNvenc,
    #[serde(rename = "h264_qsv")]
    H264Qsv,
    #[serde(rename = "hevc_qsv")]
    HevcQsv,
    #[serde(rename = "h264_amf")]
    H264Amf,
    #[serde(rename = "hevc_amf")]
    HevcAmf,
}

/// Encoder family. Drives every hardware-specific branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderFamily {
    Software,
    Nvenc,
    Qsv,
    Amf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    Hevc,
}

impl VideoEncoder {
    pub const ALL: [VideoEncoder; 8] = [
        Self::Libx264,
        Self::Libx265,
        Self::H264Nvenc,
        Self::HevcNvenc,
        Self::H264Qsv,
        Self::HevcQsv,
        Self::H264Amf,
        Self::HevcAmf,
    ];

    /// Get the FFmpeg encoder name
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Self::Libx264 => "libx264",
            Self::Libx265 => "libx265",
            Self::H264Nvenc => "h264_nvenc",
            Self::HevcNvenc => "hevc_nvenc",
            Self::H264Qsv => "h264_qsv",
            Self::HevcQsv => "hevc_qsv",
            Self::H264Amf => "h264_amf",
            Self::HevcAmf => "hevc_amf",
        }
    }

    pub fn family(&self) -> EncoderFamily {
        match self {
            Self::Libx264 | Self::Libx265 => EncoderFamily::Software,
            Self::H264Nvenc | Self::HevcNvenc => EncoderFamily::Nvenc,
            Self::H264Qsv | Self::HevcQsv => EncoderFamily::Qsv,
            Self::H264Amf | Self::HevcAmf => EncoderFamily::Amf,
        }
    }

    pub fn codec(&self) -> VideoCodec {
        match self {
            Self::Libx264 | Self::H264Nvenc | Self::H264Qsv | Self::H264Amf => VideoCodec::H264,
            Self::Libx265 | Self::HevcNvenc | Self::HevcQsv | Self::HevcAmf => VideoCodec::Hevc,
        }
    }

    /// Check if this is a hardware encoder
    pub fn is_hardware(&self) -> bool {
        self.family() != EncoderFamily::Software
    }

    /// Software encoder producing the same codec, offered as a fallback
    pub fn software_equivalent(&self) -> VideoEncoder {
        match self.codec() {
            VideoCodec::H264 => Self::Libx264,
            VideoCodec::Hevc => Self::Libx265,
        }
    }

    /// Get user-friendly display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Libx264 => "H.264 (CPU - libx264)",
            Self::Libx265 => "H.265/HEVC (CPU - libx265)",
            Self::H264Nvenc => "H.264 (NVIDIA NVENC)",
            Self::HevcNvenc => "H.265/HEVC (NVIDIA NVENC)",
            Self::H264Qsv => "H.264 (Intel QSV)",
            Self::HevcQsv => "H.265/HEVC (Intel QSV)",
            Self::H264Amf => "H.264 (AMD AMF)",
            Self::HevcAmf => "H.265/HEVC (AMD AMF)",
        }
    }
}

impl fmt::Display for VideoEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

impl FromStr for VideoEncoder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|e| e.ffmpeg_name() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown encoder '{}' (expected one of: {})",
                    s,
                    Self::ALL.map(|e| e.ffmpeg_name()).join(", ")
                )
            })
    }
}

impl EncoderFamily {
    pub fn vendor(&self) -> &'static str {
        match self {
            Self::Software => "CPU",
            Self::Nvenc => "NVIDIA",
            Self::Qsv => "Intel",
            Self::Amf => "AMD",
        }
    }

    fn driver_url(&self) -> Option<&'static str> {
        match self {
            Self::Software => None,
            Self::Nvenc => Some("https://www.nvidia.com/Download/index.aspx"),
            Self::Qsv => Some("https://www.intel.com/content/www/us/en/download-center/home.html"),
            Self::Amf => Some("https://www.amd.com/en/support/download/drivers.html"),
        }
    }
}

// ============================================================================
// Speed tiers
// ============================================================================

/// x264/x265 speed presets, fastest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SoftwarePreset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
}

impl SoftwarePreset {
    pub const ALL: [SoftwarePreset; 9] = [
        Self::Ultrafast,
        Self::Superfast,
        Self::Veryfast,
        Self::Faster,
        Self::Fast,
        Self::Medium,
        Self::Slow,
        Self::Slower,
        Self::Veryslow,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Superfast => "superfast",
            Self::Veryfast => "veryfast",
            Self::Faster => "faster",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Slower => "slower",
            Self::Veryslow => "veryslow",
        }
    }
}

/// Hardware encoder speed/quality tier. P1 = fastest, P7 = best quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HardwareTier {
    P1,
    P2,
    P3,
    P4,
    P5,
    P6,
    P7,
}

impl HardwareTier {
    pub const ALL: [HardwareTier; 7] = [
        Self::P1,
        Self::P2,
        Self::P3,
        Self::P4,
        Self::P5,
        Self::P6,
        Self::P7,
    ];

    /// Zero-based position in the ordering
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Token passed to `-preset` (NVENC, QSV) or `-quality` (AMF)
    pub fn token_for(&self, family: EncoderFamily) -> Option<&'static str> {
        match family {
            EncoderFamily::Software => None,
            EncoderFamily::Nvenc => Some(["p1", "p2", "p3", "p4", "p5", "p6", "p7"][self.index()]),
            EncoderFamily::Qsv => Some(QSV_PRESETS[self.index()]),
            // AMF only exposes three quality levels
            EncoderFamily::Amf => Some(match self {
                Self::P1 | Self::P2 => "speed",
                Self::P3 | Self::P4 | Self::P5 => "balanced",
                Self::P6 | Self::P7 => "quality",
            }),
        }
    }
}

/// Speed setting: software presets and hardware tiers are separate vocabularies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SpeedTier {
    Software(SoftwarePreset),
    Hardware(HardwareTier),
}

impl SpeedTier {
    /// Default tier for an encoder family (medium / p4)
    pub fn default_for(family: EncoderFamily) -> Self {
        match family {
            EncoderFamily::Software => Self::Software(SoftwarePreset::Medium),
            EncoderFamily::Nvenc | EncoderFamily::Qsv | EncoderFamily::Amf => {
                Self::Hardware(HardwareTier::P4)
            }
        }
    }

    pub fn fits(&self, family: EncoderFamily) -> bool {
        matches!(
            (self, family),
            (Self::Software(_), EncoderFamily::Software)
                | (
                    Self::Hardware(_),
                    EncoderFamily::Nvenc | EncoderFamily::Qsv | EncoderFamily::Amf
                )
        )
    }
}

impl fmt::Display for SpeedTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Software(p) => f.write_str(p.name()),
            Self::Hardware(t) => write!(f, "p{}", t.index() + 1),
        }
    }
}

impl FromStr for SpeedTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if let Some(preset) = SoftwarePreset::ALL.into_iter().find(|p| p.name() == s) {
            return Ok(Self::Software(preset));
        }
        if let Some(n) = s.strip_prefix('p').and_then(|n| n.parse::<usize>().ok()) {
            if (1..=HardwareTier::ALL.len()).contains(&n) {
                return Ok(Self::Hardware(HardwareTier::ALL[n - 1]));
            }
        }
        Err(format!(
            "unknown speed '{}' (software: ultrafast..veryslow, hardware: p1..p7)",
            s
        ))
    }
}

impl TryFrom<String> for SpeedTier {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SpeedTier> for String {
    fn from(value: SpeedTier) -> Self {
        value.to_string()
    }
}

// ============================================================================
// Encoder availability
// ============================================================================

/// Cache for the output of `ffmpeg -encoders`. The first probed binary wins.
static FFMPEG_ENCODERS_OUTPUT_CACHE: OnceLock<String> = OnceLock::new();

fn ffmpeg_encoders_output(ffmpeg: &Path) -> &'static str {
    FFMPEG_ENCODERS_OUTPUT_CACHE.get_or_init(|| {
        Command::new(ffmpeg)
            .args(["-hide_banner", "-encoders"])
            .output()
            .ok()
            .map(|o| String::from_utf8_lossy(&o.stdout).to_string())
            .unwrap_or_default()
    })
}

/// Encoders named in `ffmpeg -encoders` output
pub fn parse_encoder_list(output: &str) -> Vec<VideoEncoder> {
    VideoEncoder::ALL
        .into_iter()
        .filter(|enc| {
            output
                .lines()
                .any(|line| line.split_whitespace().any(|w| w == enc.ffmpeg_name()))
        })
        .collect()
}

/// Encoders compiled into the local ffmpeg build (cached)
pub fn list_available_encoders(ffmpeg: &Path) -> Vec<VideoEncoder> {
    parse_encoder_list(ffmpeg_encoders_output(ffmpeg))
}

// ============================================================================
// Hardware failure classification
// ============================================================================

/// Structured reason a hardware encode failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HardwareErrorKind {
    DeviceNotFound,
    DriverTooOld,
    SessionInitFailed,
    UnsupportedProfile,
    /// All encoder sessions are taken; the only transient kind
    DeviceBusy,
    Unknown,
}

impl HardwareErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DeviceBusy)
    }
}

impl fmt::Display for HardwareErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DeviceNotFound => "encoder device not found",
            Self::DriverTooOld => "driver too old",
            Self::SessionInitFailed => "encoder session initialisation failed",
            Self::UnsupportedProfile => "unsupported profile or setting",
            Self::DeviceBusy => "encoder device busy",
            Self::Unknown => "unknown encoder failure",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Remediation {
    pub hint: String,
    pub driver_url: Option<&'static str>,
    pub fallback: Option<VideoEncoder>,
}

impl fmt::Display for Remediation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hint)?;
        if let Some(url) = self.driver_url {
            write!(f, " Drivers: {}", url)?;
        }
        if let Some(fallback) = self.fallback {
            write!(f, " Fallback: re-run with --encoder {}", fallback)?;
        }
        Ok(())
    }
}

/// A classified encoder failure, ready to show to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{encoder} failed (exit code {exit_code}): {kind}. {remediation}")]
pub struct HardwareFailure {
    pub kind: HardwareErrorKind,
    pub encoder: VideoEncoder,
    pub exit_code: i32,
    /// The diagnostic line that matched, if any
    pub evidence: Option<String>,
    pub remediation: Remediation,
}

struct Signature {
    kind: HardwareErrorKind,
    needles: &'static [&'static str],
}

// Order matters: busy before session-init, since a full session table
// surfaces through the same OpenEncodeSessionEx call.
const NVENC_SIGNATURES: &[Signature] = &[
    Signature {
        kind: HardwareErrorKind::DeviceBusy,
        needles: &["incompatible client key", "out of memory (10)", "nvenc_err_out_of_memory"],
    },
    Signature {
        kind: HardwareErrorKind::DeviceNotFound,
        needles: &[
            "no nvenc capable devices found",
            "cannot load nvcuda.dll",
            "cannot load libcuda.so",
            "cannot load nvencodeapi",
            "cuda_error_no_device",
        ],
    },
    Signature {
        kind: HardwareErrorKind::DriverTooOld,
        needles: &[
            "driver does not support the required nvenc api version",
            "minimum required nvidia driver",
        ],
    },
    Signature {
        kind: HardwareErrorKind::UnsupportedProfile,
        needles: &[
            "profile not supported",
            "10 bit encode not supported",
            "b frames as references are not supported",
            "no capable devices found for the requested",
        ],
    },
    Signature {
        kind: HardwareErrorKind::SessionInitFailed,
        needles: &["openencodesessionex failed", "nvenc_err_invalid_device", "initializeencoder failed"],
    },
];

const QSV_SIGNATURES: &[Signature] = &[
    Signature {
        kind: HardwareErrorKind::DeviceBusy,
        needles: &["mfx_err_device_busy", "device busy"],
    },
    Signature {
        kind: HardwareErrorKind::DeviceNotFound,
        needles: &[
            "error creating a mfx session",
            "no device available for encoder",
            "device creation failed",
            "failed to create a vaapi device",
        ],
    },
    Signature {
        kind: HardwareErrorKind::DriverTooOld,
        needles: &["not supported by the current runtime", "requires a newer driver", "mfx_err_unsupported_runtime"],
    },
    Signature {
        kind: HardwareErrorKind::UnsupportedProfile,
        needles: &[
            "current profile is unsupported",
            "selected ratecontrol mode is unsupported",
            "low power mode is unsupported",
            "mfx_err_unsupported",
        ],
    },
    Signature {
        kind: HardwareErrorKind::SessionInitFailed,
        needles: &["error initializing the encoder", "error initializing an internal mfx session"],
    },
];

const AMF_SIGNATURES: &[Signature] = &[
    Signature {
        kind: HardwareErrorKind::DeviceBusy,
        needles: &["amf_input_full", "device busy"],
    },
    Signature {
        kind: HardwareErrorKind::DeviceNotFound,
        needles: &[
            "amfrt64.dll failed to open",
            "amfrt32.dll failed to open",
            "libamfrt64.so.1 failed to open",
            "no amd gpu",
        ],
    },
    Signature {
        kind: HardwareErrorKind::DriverTooOld,
        needles: &["runtime version is too old", "amf version too old"],
    },
    Signature {
        kind: HardwareErrorKind::UnsupportedProfile,
        needles: &["amf_not_supported", "profile is not supported", "unsupported profile"],
    },
    Signature {
        kind: HardwareErrorKind::SessionInitFailed,
        needles: &["amf failed to initialise", "createcomponent() failed", "encoder->init() failed"],
    },
];

// Kernel-level busy report, shared by every hardware family
const GENERIC_BUSY: &[&str] = &["device or resource busy"];

fn signatures(family: EncoderFamily) -> &'static [Signature] {
    match family {
        EncoderFamily::Software => &[],
        EncoderFamily::Nvenc => NVENC_SIGNATURES,
        EncoderFamily::Qsv => QSV_SIGNATURES,
        EncoderFamily::Amf => AMF_SIGNATURES,
    }
}

fn find_line(stderr: &str, needle: &str) -> Option<String> {
    stderr
        .lines()
        .find(|line| line.to_ascii_lowercase().contains(needle))
        .map(|line| line.trim().to_string())
}

/// Classify a finished encoder run. Returns `None` iff `exit_code == 0`.
pub fn classify(encoder: VideoEncoder, exit_code: i32, stderr: &str) -> Option<HardwareFailure> {
    if exit_code == 0 {
        return None;
    }

    let family = encoder.family();
    let mut kind = HardwareErrorKind::Unknown;
    let mut evidence = None;

    if family != EncoderFamily::Software {
        'outer: for sig in signatures(family) {
            for needle in sig.needles {
                if let Some(line) = find_line(stderr, needle) {
                    kind = sig.kind;
                    evidence = Some(line);
                    break 'outer;
                }
            }
        }
        if kind == HardwareErrorKind::Unknown {
            if let Some(line) = GENERIC_BUSY.iter().find_map(|n| find_line(stderr, n)) {
                kind = HardwareErrorKind::DeviceBusy;
                evidence = Some(line);
            }
        }
    }

    Some(HardwareFailure {
        kind,
        encoder,
        exit_code,
        evidence,
        remediation: remediation(kind, encoder),
    })
}

/// Static remediation advice keyed by kind and encoder family
pub fn remediation(kind: HardwareErrorKind, encoder: VideoEncoder) -> Remediation {
    let family = encoder.family();
    let vendor = family.vendor();
    let fallback = encoder.is_hardware().then(|| encoder.software_equivalent());

    match (family, kind) {
        (EncoderFamily::Software, _) => Remediation {
            hint: "The software encoder rejected the job; check the ffmpeg output for the offending option."
                .to_string(),
            driver_url: None,
            fallback: None,
        },
        (_, HardwareErrorKind::DeviceNotFound) => Remediation {
            hint: format!(
                "No usable {} GPU was found for {}. Check that the card is present and its driver is loaded.",
                vendor, encoder
            ),
            driver_url: family.driver_url(),
            fallback,
        },
        (_, HardwareErrorKind::DriverTooOld) => Remediation {
            hint: format!(
                "The installed {} driver is too old for this ffmpeg build. Update the GPU driver.",
                vendor
            ),
            driver_url: family.driver_url(),
            fallback,
        },
        (_, HardwareErrorKind::SessionInitFailed) => Remediation {
            hint: format!(
                "{} could not open an encoder session. Reboot or reinstall the {} driver if this persists.",
                encoder, vendor
            ),
            driver_url: family.driver_url(),
            fallback,
        },
        (_, HardwareErrorKind::UnsupportedProfile) => Remediation {
            hint: format!(
                "This {} GPU does not support the requested profile, bit depth or rate-control mode.",
                vendor
            ),
            driver_url: None,
            fallback,
        },
        (_, HardwareErrorKind::DeviceBusy) => Remediation {
            hint: format!(
                "All {} encoder sessions are in use. Wait for other encodes to finish and retry.",
                vendor
            ),
            driver_url: None,
            fallback: None,
        },
        (_, HardwareErrorKind::Unknown) => Remediation {
            hint: format!("{} failed for an unrecognised reason; see the ffmpeg output.", encoder),
            driver_url: None,
            fallback,
        },
    }
}
