// Global configuration management

use crate::engine::compat::PluginSet;
use crate::qc::scanner::{
    DEFAULT_AUDIO_EXTENSIONS, DEFAULT_IMAGE_EXTENSIONS, DEFAULT_VIDEO_EXTENSIONS,
};
use crate::qc::{CompatibilityRuleSet, MediaFilter};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub encode: EncodeConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub rules: CompatibilityRuleSet,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,

    /// Directory holding the frameserver plugins for compatibility subtitles
    #[serde(default = "default_plugin_dir")]
    pub plugin_dir: PathBuf,

    #[serde(default = "default_source_plugin")]
    pub source_plugin: String,

    #[serde(default = "default_subtitle_plugin")]
    pub subtitle_plugin: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeConfig {
    /// Preset used when `--preset` is not given
    #[serde(default = "default_preset")]
    pub default_preset: String,

    /// Where per-job temporary files go (system temp dir when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,

    /// Limit for each ffmpeg invocation; none when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Extra `[[preset]]` definitions merged over the built-ins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presets_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,

    #[serde(default = "default_audio_extensions")]
    pub audio_extensions: Vec<String>,

    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter directive, e.g. `info` or `xuebox=debug`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Append log events to this file as well as stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_plugin_dir() -> PathBuf {
    PluginSet::default().dir
}

fn default_source_plugin() -> String {
    PluginSet::default().source_plugin
}

fn default_subtitle_plugin() -> String {
    PluginSet::default().subtitle_plugin
}

fn default_preset() -> String {
    "balanced".to_string()
}

fn default_max_workers() -> usize {
    4
}

fn default_probe_timeout_secs() -> u64 {
    30
}

fn to_strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn default_video_extensions() -> Vec<String> {
    to_strings(DEFAULT_VIDEO_EXTENSIONS)
}

fn default_audio_extensions() -> Vec<String> {
    to_strings(DEFAULT_AUDIO_EXTENSIONS)
}

fn default_image_extensions() -> Vec<String> {
    to_strings(DEFAULT_IMAGE_EXTENSIONS)
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            plugin_dir: default_plugin_dir(),
            source_plugin: default_source_plugin(),
            subtitle_plugin: default_subtitle_plugin(),
        }
    }
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            default_preset: default_preset(),
            work_dir: None,
            timeout_secs: None,
            presets_file: None,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            probe_timeout_secs: default_probe_timeout_secs(),
            video_extensions: default_video_extensions(),
            audio_extensions: default_audio_extensions(),
            image_extensions: default_image_extensions(),
        }
    }
}

impl ToolsConfig {
    pub fn plugins(&self) -> PluginSet {
        PluginSet {
            dir: self.plugin_dir.clone(),
            source_plugin: self.source_plugin.clone(),
            subtitle_plugin: self.subtitle_plugin.clone(),
        }
    }
}

impl EncodeConfig {
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }
}

impl ScanConfig {
    pub fn filter(&self) -> MediaFilter {
        MediaFilter::new(
            self.video_extensions.as_slice(),
            self.audio_extensions.as_slice(),
            self.image_extensions.as_slice(),
        )
    }

    pub fn probe_timeout(&self) -> Option<Duration> {
        (self.probe_timeout_secs > 0).then(|| Duration::from_secs(self.probe_timeout_secs))
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("xuebox")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("xuebox")
        };

        Ok(config_dir.join("config.toml"))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config")
    }

    /// Read a config file from an explicit location
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load config from disk, or create default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();

            // A read-only config directory is not fatal
            if let Err(e) = config.save() {
                eprintln!("Warning: Could not create default config file: {:#}", e);
                eprintln!(
                    "Using built-in defaults. Run 'xuebox init-config' to create a config file."
                );
            }

            Ok(config)
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Check if config file exists
    pub fn exists() -> bool {
        Self::config_path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Create a default config file if it doesn't exist
    pub fn ensure_default() -> Result<()> {
        if !Self::exists() {
            let config = Config::default();
            config.save()?;
        }
        Ok(())
    }
}
