// Compatibility rule set for the QC scanner

use crate::engine::core::Bitrate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rule kinds, declared in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    FileAccess,
    ProbeFailed,
    DisallowedContainer,
    DisallowedCodec,
    ResolutionOutOfRange,
    BitrateOutOfRange,
    DisallowedImageFormat,
    ExtensionMismatch,
}

impl RuleKind {
    pub const ALL: [RuleKind; 8] = [
        Self::FileAccess,
        Self::ProbeFailed,
        Self::DisallowedContainer,
        Self::DisallowedCodec,
        Self::ResolutionOutOfRange,
        Self::BitrateOutOfRange,
        Self::DisallowedImageFormat,
        Self::ExtensionMismatch,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::FileAccess => "file-access",
            Self::ProbeFailed => "probe-failed",
            Self::DisallowedContainer => "disallowed-container",
            Self::DisallowedCodec => "disallowed-codec",
            Self::ResolutionOutOfRange => "resolution-out-of-range",
            Self::BitrateOutOfRange => "bitrate-out-of-range",
            Self::DisallowedImageFormat => "disallowed-image-format",
            Self::ExtensionMismatch => "extension-mismatch",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Severity assigned to each rule kind. Missing keys keep their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SeverityMap {
    pub file_access: Severity,
    pub probe_failed: Severity,
    pub disallowed_container: Severity,
    pub disallowed_codec: Severity,
    pub resolution_out_of_range: Severity,
    pub bitrate_out_of_range: Severity,
    pub disallowed_image_format: Severity,
    pub extension_mismatch: Severity,
}

impl Default for SeverityMap {
    fn default() -> Self {
        Self {
            file_access: Severity::Info,
            probe_failed: Severity::Info,
            disallowed_container: Severity::Warning,
            disallowed_codec: Severity::Warning,
            resolution_out_of_range: Severity::Warning,
            bitrate_out_of_range: Severity::Warning,
            disallowed_image_format: Severity::Error,
            extension_mismatch: Severity::Warning,
        }
    }
}

impl SeverityMap {
    pub fn get(&self, kind: RuleKind) -> Severity {
        *self.slot(kind)
    }

    pub fn set(&mut self, kind: RuleKind, severity: Severity) {
        *self.slot_mut(kind) = severity;
    }

    fn slot(&self, kind: RuleKind) -> &Severity {
        match kind {
            RuleKind::FileAccess => &self.file_access,
            RuleKind::ProbeFailed => &self.probe_failed,
            RuleKind::DisallowedContainer => &self.disallowed_container,
            RuleKind::DisallowedCodec => &self.disallowed_codec,
            RuleKind::ResolutionOutOfRange => &self.resolution_out_of_range,
            RuleKind::BitrateOutOfRange => &self.bitrate_out_of_range,
            RuleKind::DisallowedImageFormat => &self.disallowed_image_format,
            RuleKind::ExtensionMismatch => &self.extension_mismatch,
        }
    }

    fn slot_mut(&mut self, kind: RuleKind) -> &mut Severity {
        match kind {
            RuleKind::FileAccess => &mut self.file_access,
            RuleKind::ProbeFailed => &mut self.probe_failed,
            RuleKind::DisallowedContainer => &mut self.disallowed_container,
            RuleKind::DisallowedCodec => &mut self.disallowed_codec,
            RuleKind::ResolutionOutOfRange => &mut self.resolution_out_of_range,
            RuleKind::BitrateOutOfRange => &mut self.bitrate_out_of_range,
            RuleKind::DisallowedImageFormat => &mut self.disallowed_image_format,
            RuleKind::ExtensionMismatch => &mut self.extension_mismatch,
        }
    }
}

/// Frame size written as `WIDTHxHEIGHT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Dimensions {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid size '{}' (expected WIDTHxHEIGHT, e.g. 1920x1080)", s);
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(invalid)?;
        let width = w.trim().parse().map_err(|_| invalid())?;
        let height = h.trim().parse().map_err(|_| invalid())?;
        Ok(Self { width, height })
    }
}

impl TryFrom<String> for Dimensions {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Dimensions> for String {
    fn from(value: Dimensions) -> Self {
        value.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuleSetError {
    #[error("invalid rule set: {field} minimum {min} exceeds maximum {max}")]
    InvalidThreshold {
        field: &'static str,
        min: String,
        max: String,
    },

    #[error("failed to parse rule set: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read rule set {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub const DEFAULT_DISALLOWED_CONTAINERS: &[&str] = &["mkv", "webm", "ogv", "ogg", "flv"];
pub const DEFAULT_DISALLOWED_CODECS: &[&str] = &["vp8", "vp9", "av1", "theora"];
pub const DEFAULT_DISALLOWED_IMAGE_FORMATS: &[&str] = &["webp", "heic", "avif"];

/// Split a comma-separated list into lowercase entries without leading dots
pub fn parse_list(s: &str) -> BTreeSet<String> {
    s.split(',').map(normalize_entry).filter(|e| !e.is_empty()).collect()
}

fn normalize_entry(entry: &str) -> String {
    entry.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn normalize_all<I, S>(entries: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .map(|e| normalize_entry(e.as_ref()))
        .filter(|e| !e.is_empty())
        .collect()
}

/// What the QC scanner reports as incompatible. Loaded once and passed to
/// the scanner; thresholds are validated when the set is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RuleSetDef")]
pub struct CompatibilityRuleSet {
    pub disallowed_containers: BTreeSet<String>,
    pub disallowed_codecs: BTreeSet<String>,
    pub disallowed_image_formats: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_bitrate: Option<Bitrate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bitrate: Option<Bitrate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_resolution: Option<Dimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_resolution: Option<Dimensions>,
    pub severity: SeverityMap,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RuleSetDef {
    disallowed_containers: Vec<String>,
    disallowed_codecs: Vec<String>,
    disallowed_image_formats: Vec<String>,
    min_bitrate: Option<Bitrate>,
    max_bitrate: Option<Bitrate>,
    min_resolution: Option<Dimensions>,
    max_resolution: Option<Dimensions>,
    severity: SeverityMap,
}

impl Default for RuleSetDef {
    fn default() -> Self {
        let to_vec = |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };
        Self {
            disallowed_containers: to_vec(DEFAULT_DISALLOWED_CONTAINERS),
            disallowed_codecs: to_vec(DEFAULT_DISALLOWED_CODECS),
            disallowed_image_formats: to_vec(DEFAULT_DISALLOWED_IMAGE_FORMATS),
            min_bitrate: None,
            max_bitrate: None,
            min_resolution: None,
            max_resolution: None,
            severity: SeverityMap::default(),
        }
    }
}

impl TryFrom<RuleSetDef> for CompatibilityRuleSet {
    type Error = RuleSetError;

    fn try_from(def: RuleSetDef) -> Result<Self, Self::Error> {
        let rules = Self {
            disallowed_containers: normalize_all(def.disallowed_containers),
            disallowed_codecs: normalize_all(def.disallowed_codecs),
            disallowed_image_formats: normalize_all(def.disallowed_image_formats),
            min_bitrate: def.min_bitrate,
            max_bitrate: def.max_bitrate,
            min_resolution: def.min_resolution,
            max_resolution: def.max_resolution,
            severity: def.severity,
        };
        rules.validate()?;
        Ok(rules)
    }
}

impl Default for CompatibilityRuleSet {
    fn default() -> Self {
        Self {
            disallowed_containers: normalize_all(DEFAULT_DISALLOWED_CONTAINERS),
            disallowed_codecs: normalize_all(DEFAULT_DISALLOWED_CODECS),
            disallowed_image_formats: normalize_all(DEFAULT_DISALLOWED_IMAGE_FORMATS),
            min_bitrate: None,
            max_bitrate: None,
            min_resolution: None,
            max_resolution: None,
            severity: SeverityMap::default(),
        }
    }
}

impl CompatibilityRuleSet {
    pub fn from_toml_str(s: &str) -> Result<Self, RuleSetError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, RuleSetError> {
        let contents = fs::read_to_string(path).map_err(|source| RuleSetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Every min/max pair must satisfy min <= max
    pub fn validate(&self) -> Result<(), RuleSetError> {
        if let (Some(min), Some(max)) = (self.min_bitrate, self.max_bitrate) {
            if min > max {
                return Err(RuleSetError::InvalidThreshold {
                    field: "bitrate",
                    min: min.to_string(),
                    max: max.to_string(),
                });
            }
        }
        if let (Some(min), Some(max)) = (self.min_resolution, self.max_resolution) {
            if min.width > max.width || min.height > max.height {
                return Err(RuleSetError::InvalidThreshold {
                    field: "resolution",
                    min: min.to_string(),
                    max: max.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn with_disallowed_containers<I, S>(mut self, list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.disallowed_containers = normalize_all(list);
        self
    }

    pub fn with_disallowed_codecs<I, S>(mut self, list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.disallowed_codecs = normalize_all(list);
        self
    }

    pub fn with_disallowed_image_formats<I, S>(mut self, list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.disallowed_image_formats = normalize_all(list);
        self
    }

    pub fn with_bitrate_range(
        mut self,
        min: Option<Bitrate>,
        max: Option<Bitrate>,
    ) -> Result<Self, RuleSetError> {
        self.min_bitrate = min;
        self.max_bitrate = max;
        self.validate()?;
        Ok(self)
    }

    pub fn with_resolution_range(
        mut self,
        min: Option<Dimensions>,
        max: Option<Dimensions>,
    ) -> Result<Self, RuleSetError> {
        self.min_resolution = min;
        self.max_resolution = max;
        self.validate()?;
        Ok(self)
    }

    pub fn is_container_disallowed(&self, container: &str) -> bool {
        self.disallowed_containers.contains(&normalize_entry(container))
    }

    pub fn is_codec_disallowed(&self, codec: &str) -> bool {
        self.disallowed_codecs.contains(&normalize_entry(codec))
    }

    pub fn is_image_format_disallowed(&self, format: &str) -> bool {
        self.disallowed_image_formats.contains(&normalize_entry(format))
    }
}
