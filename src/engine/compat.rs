//! Compatibility subtitle rendering
//!
//! Instead of ffmpeg's `subtitles` filter, the video is opened through an
//! AviSynth script that loads L-SMASH Works and VSFilter and burns the
//! subtitles in. ffmpeg then reads the script as its video input. The
//! plugin runtime locates its DLLs through `PATH`, so the encode has to run
//! with the plugin directory prepended; `ScopedSearchPath` owns that change.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

pub const SEARCH_PATH_VAR: &str = "PATH";
pub const SCRIPT_FILE_NAME: &str = "compat.avs";

#[derive(Debug, thiserror::Error)]
pub enum CompatError {
    #[error("path cannot be used in compatibility mode: {} ({reason})", path.display())]
    UnsupportedPath { path: PathBuf, reason: &'static str },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl CompatError {
    fn io(context: impl Into<String>) -> impl FnOnce(io::Error) -> Self {
        let context = context.into();
        move |source| Self::Io { context, source }
    }
}

/// Where the frameserver plugins live and what they are called
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSet {
    pub dir: PathBuf,
    pub source_plugin: String,
    pub subtitle_plugin: String,
}

impl Default for PluginSet {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("bin"),
            source_plugin: "LSMASHSource.dll".to_string(),
            subtitle_plugin: "VSFilter.dll".to_string(),
        }
    }
}

/// A script written to disk plus the side files it causes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityScript {
    pub script_path: PathBuf,
    /// ASCII-named copy of the subtitle the script points at
    pub subtitle_copy: PathBuf,
    /// Index the source plugin writes next to the video
    pub index_file: PathBuf,
    pub contents: String,
}

impl CompatibilityScript {
    pub fn artifacts(&self) -> [&Path; 3] {
        [&self.script_path, &self.subtitle_copy, &self.index_file]
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompatibilityScriptGenerator {
    plugins: PluginSet,
}

impl CompatibilityScriptGenerator {
    pub fn new(plugins: PluginSet) -> Self {
        Self { plugins }
    }

    pub fn plugins(&self) -> &PluginSet {
        &self.plugins
    }

    /// Script location inside a job's working directory
    pub fn script_path(work_dir: &Path) -> PathBuf {
        work_dir.join(SCRIPT_FILE_NAME)
    }

    /// Index file L-SMASH leaves beside the source (`<video>.lwi`)
    pub fn index_path(video: &Path) -> PathBuf {
        let mut name = video.as_os_str().to_owned();
        name.push(".lwi");
        PathBuf::from(name)
    }

    fn subtitle_copy_path(work_dir: &Path, subtitle: &Path) -> PathBuf {
        let ext = subtitle
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("ass")
            .to_ascii_lowercase();
        work_dir.join(format!("subtitle.{}", ext))
    }

    /// Script text for already-validated paths. No filesystem access.
    pub fn render(&self, video: &Path, subtitle_copy: &Path) -> Result<String, CompatError> {
        let source_plugin = script_path_literal(&self.plugins.dir.join(&self.plugins.source_plugin))?;
        let subtitle_plugin =
            script_path_literal(&self.plugins.dir.join(&self.plugins.subtitle_plugin))?;
        let video = script_path_literal(video)?;
        let subtitle = script_path_literal(subtitle_copy)?;

        Ok(format!(
            "LoadPlugin(\"{source_plugin}\")\n\
             LoadPlugin(\"{subtitle_plugin}\")\n\
             LWLibavVideoSource(\"{video}\", cache=False)\n\
             TextSub(\"{subtitle}\")\n\
             ConvertToYV12()\n"
        ))
    }

    /// Copy the subtitle under an ASCII name and write the script into `work_dir`.
    pub fn generate(
        &self,
        video: &Path,
        subtitle: &Path,
        work_dir: &Path,
    ) -> Result<CompatibilityScript, CompatError> {
        // VSFilter cannot open non-ASCII paths, and the subtitle copy lives here
        match work_dir.to_str() {
            Some(s) if s.is_ascii() => {}
            _ => {
                return Err(CompatError::UnsupportedPath {
                    path: work_dir.to_path_buf(),
                    reason: "working directory must be an ASCII path",
                });
            }
        }

        let video = std::path::absolute(video)
            .map_err(CompatError::io(format!("failed to resolve {}", video.display())))?;
        // Validate before touching the filesystem
        script_path_literal(&video)?;

        for plugin in [&self.plugins.source_plugin, &self.plugins.subtitle_plugin] {
            let path = self.plugins.dir.join(plugin);
            if !path.is_file() {
                warn!(plugin = %path.display(), "frameserver plugin not found");
            }
        }

        fs::create_dir_all(work_dir).map_err(CompatError::io(format!(
            "failed to create working directory {}",
            work_dir.display()
        )))?;

        let subtitle_copy = Self::subtitle_copy_path(work_dir, subtitle);
        fs::copy(subtitle, &subtitle_copy).map_err(CompatError::io(format!(
            "failed to copy subtitle {}",
            subtitle.display()
        )))?;
        debug!(from = %subtitle.display(), to = %subtitle_copy.display(), "copied subtitle");

        let contents = self.render(&video, &subtitle_copy)?;
        let script_path = Self::script_path(work_dir);
        // Plain UTF-8; the AviSynth demuxer rejects a BOM
        fs::write(&script_path, contents.as_bytes()).map_err(CompatError::io(format!(
            "failed to write script {}",
            script_path.display()
        )))?;
        info!(script = %script_path.display(), "generated compatibility script");

        Ok(CompatibilityScript {
            script_path,
            subtitle_copy,
            index_file: Self::index_path(&video),
            contents,
        })
    }
}

/// Forward-slash path suitable for a double-quoted script string
fn script_path_literal(path: &Path) -> Result<String, CompatError> {
    let unsupported = |reason| CompatError::UnsupportedPath {
        path: path.to_path_buf(),
        reason,
    };
    let s = path.to_str().ok_or_else(|| unsupported("path is not valid UTF-8"))?;
    if s.contains('"') {
        return Err(unsupported("path contains a double quote"));
    }
    if s.contains(['\n', '\r']) {
        return Err(unsupported("path contains a line break"));
    }
    Ok(s.replace('\\', "/"))
}

// ============================================================================
// Scoped search path
// ============================================================================

static SEARCH_PATH_LOCK: Mutex<()> = Mutex::new(());

/// Prepends a directory to a search-path variable for as long as it lives.
///
/// Only one guard exists at a time across the process; `acquire` blocks
/// until the previous holder is dropped. Dropping restores the exact prior
/// value, or removes the variable if it was unset.
#[derive(Debug)]
pub struct ScopedSearchPath {
    var: &'static str,
    previous: Option<OsString>,
    // Declared last so the lock is released after the value is restored
    _lock: MutexGuard<'static, ()>,
}

impl ScopedSearchPath {
    /// Prepend `dir` to `PATH`
    pub fn acquire(dir: &Path) -> Result<Self, CompatError> {
        Self::acquire_var(SEARCH_PATH_VAR, dir)
    }

    pub fn acquire_var(var: &'static str, dir: &Path) -> Result<Self, CompatError> {
        let lock = SEARCH_PATH_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = env::var_os(var);

        let mut entries = vec![dir.to_path_buf()];
        if let Some(prev) = &previous {
            entries.extend(env::split_paths(prev));
        }
        let joined = env::join_paths(entries).map_err(|_| CompatError::UnsupportedPath {
            path: dir.to_path_buf(),
            reason: "directory contains the search-path separator",
        })?;

        // SAFETY: every writer of this variable in the process goes through
        // SEARCH_PATH_LOCK, which is held until the guard is dropped.
        unsafe { env::set_var(var, &joined) };
        debug!(var, dir = %dir.display(), "search path extended");

        Ok(Self {
            var,
            previous,
            _lock: lock,
        })
    }
}

impl Drop for ScopedSearchPath {
    fn drop(&mut self) {
        // SAFETY: still holding SEARCH_PATH_LOCK (see acquire_var)
        unsafe {
            match &self.previous {
                Some(value) => env::set_var(self.var, value),
                None => env::remove_var(self.var),
            }
        }
        debug!(var = self.var, "search path restored");
    }
}

// ============================================================================
// Artifact cleanup
// ============================================================================

/// Temporary files and directories removed when the set is dropped.
/// Removal failures are logged and never escalated.
#[derive(Debug, Default)]
pub struct ArtifactSet {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_file(&mut self, path: impl Into<PathBuf>) {
        self.files.push(path.into());
    }

    /// Directory removed recursively; only track directories this process created
    pub fn track_dir(&mut self, path: impl Into<PathBuf>) {
        self.dirs.push(path.into());
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }

    /// Remove everything now. Safe to call more than once.
    pub fn cleanup(&mut self) {
        for file in self.files.drain(..) {
            match fs::remove_file(&file) {
                Ok(()) => debug!(path = %file.display(), "removed temporary file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %file.display(), error = %e, "failed to remove temporary file"),
            }
        }
        for dir in self.dirs.drain(..) {
            match fs::remove_dir_all(&dir) {
                Ok(()) => debug!(path = %dir.display(), "removed temporary directory"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "failed to remove temporary directory")
                }
            }
        }
    }
}

impl Drop for ArtifactSet {
    fn drop(&mut self) {
        self.cleanup();
    }
}
