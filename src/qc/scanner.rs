// Read-only directory walk applying the compatibility rules to each media file

use super::rules::{CompatibilityRuleSet, RuleKind, Severity};
use super::sniff::{self, ImageFormat};
use crate::cancel::CancelToken;
use crate::engine::core::Bitrate;
use crate::engine::probe::{MediaProbe, MediaProber};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, mpsc};
use std::thread;
use tracing::{debug, info};
use walkdir::WalkDir;

pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "webm", "flv", "wmv", "m4v", "ts", "mts", "m2ts", "mxf", "ogv",
];
pub const DEFAULT_AUDIO_EXTENSIONS: &[&str] =
    &["mp3", "wav", "flac", "aac", "m4a", "ogg", "opus", "wma"];
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff", "heic", "heif", "avif",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Image,
}

/// Decides which files are scanned, by extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFilter {
    video: BTreeSet<String>,
    audio: BTreeSet<String>,
    image: BTreeSet<String>,
}

impl Default for MediaFilter {
    fn default() -> Self {
        Self::new(
            DEFAULT_VIDEO_EXTENSIONS,
            DEFAULT_AUDIO_EXTENSIONS,
            DEFAULT_IMAGE_EXTENSIONS,
        )
    }
}

impl MediaFilter {
    pub fn new<S: AsRef<str>>(video: &[S], audio: &[S], image: &[S]) -> Self {
        let set = |list: &[S]| -> BTreeSet<String> {
            list.iter()
                .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect()
        };
        Self {
            video: set(video),
            audio: set(audio),
            image: set(image),
        }
    }

    pub fn classify(&self, path: &Path) -> Option<MediaKind> {
        let ext = extension_of(path)?;
        if self.video.contains(&ext) {
            Some(MediaKind::Video)
        } else if self.audio.contains(&ext) {
            Some(MediaKind::Audio)
        } else if self.image.contains(&ext) {
            Some(MediaKind::Image)
        } else {
            None
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bound {
    Min,
    Max,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Min => "below minimum",
            Self::Max => "above maximum",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

/// One rule violation and the values that triggered it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum Rule {
    FileAccess {
        message: String,
    },
    ProbeFailed {
        reason: String,
    },
    DisallowedContainer {
        container: String,
    },
    DisallowedCodec {
        stream: StreamKind,
        codec: String,
    },
    ResolutionOutOfRange {
        width: u32,
        height: u32,
        bound: Bound,
        limit: String,
    },
    BitrateOutOfRange {
        bitrate: Bitrate,
        bound: Bound,
        limit: Bitrate,
    },
    DisallowedImageFormat {
        format: String,
    },
    ExtensionMismatch {
        extension: String,
        claimed: Option<ImageFormat>,
        sniffed: ImageFormat,
    },
}

impl Rule {
    pub fn kind(&self) -> RuleKind {
        match self {
            Self::FileAccess { .. } => RuleKind::FileAccess,
            Self::ProbeFailed { .. } => RuleKind::ProbeFailed,
            Self::DisallowedContainer { .. } => RuleKind::DisallowedContainer,
            Self::DisallowedCodec { .. } => RuleKind::DisallowedCodec,
            Self::ResolutionOutOfRange { .. } => RuleKind::ResolutionOutOfRange,
            Self::BitrateOutOfRange { .. } => RuleKind::BitrateOutOfRange,
            Self::DisallowedImageFormat { .. } => RuleKind::DisallowedImageFormat,
            Self::ExtensionMismatch { .. } => RuleKind::ExtensionMismatch,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileAccess { message } => write!(f, "cannot read file: {}", message),
            Self::ProbeFailed { reason } => write!(f, "probe failed: {}", reason),
            Self::DisallowedContainer { container } => {
                write!(f, "container '{}' is not allowed", container)
            }
            Self::DisallowedCodec { stream, codec } => {
                let stream = match stream {
                    StreamKind::Video => "video",
                    StreamKind::Audio => "audio",
                };
                write!(f, "{} codec '{}' is not allowed", stream, codec)
            }
            Self::ResolutionOutOfRange {
                width,
                height,
                bound,
                limit,
            } => write!(f, "resolution {}x{} {} {}", width, height, bound, limit),
            Self::BitrateOutOfRange {
                bitrate,
                bound,
                limit,
            } => write!(f, "bitrate {} {} {}", bitrate, bound, limit),
            Self::DisallowedImageFormat { format } => {
                write!(f, "image format '{}' is not allowed", format)
            }
            Self::ExtensionMismatch {
                extension,
                claimed,
                sniffed,
            } => match claimed {
                Some(claimed) => write!(
                    f,
                    "extension .{} claims {} but content is {}",
                    extension, claimed, sniffed
                ),
                None => write!(f, "extension .{} but content is {}", extension, sniffed),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub path: PathBuf,
    pub severity: Severity,
    #[serde(flatten)]
    pub rule: Rule,
}

impl Finding {
    pub fn kind(&self) -> RuleKind {
        self.rule.kind()
    }
}

/// Result of a complete (or cancelled) scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Sorted by path; per-file order is rule-evaluation order
    pub findings: Vec<Finding>,
    pub files_scanned: usize,
    pub cancelled: bool,
}

pub struct QualityScanner<P> {
    prober: P,
    rules: CompatibilityRuleSet,
    filter: MediaFilter,
}

impl<P: MediaProber> QualityScanner<P> {
    pub fn new(prober: P, rules: CompatibilityRuleSet) -> Self {
        Self {
            prober,
            rules,
            filter: MediaFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: MediaFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn rules(&self) -> &CompatibilityRuleSet {
        &self.rules
    }

    fn finding(&self, path: &Path, rule: Rule) -> Finding {
        Finding {
            path: path.to_path_buf(),
            severity: self.rules.severity.get(rule.kind()),
            rule,
        }
    }

    /// Apply every rule to one file. Files the filter does not recognise yield nothing.
    pub fn inspect(&self, path: &Path) -> Vec<Finding> {
        match self.filter.classify(path) {
            Some(kind) => self.inspect_as(path, kind),
            None => Vec::new(),
        }
    }

    fn inspect_as(&self, path: &Path, kind: MediaKind) -> Vec<Finding> {
        let rules = match kind {
            MediaKind::Video | MediaKind::Audio => self.media_rules(path),
            MediaKind::Image => self.image_rules(path),
        };
        rules
            .into_iter()
            .map(|rule| self.finding(path, rule))
            .collect()
    }

    fn media_rules(&self, path: &Path) -> Vec<Rule> {
        let probe = match self.prober.probe(path) {
            Ok(probe) => probe,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "probe failed");
                return vec![Rule::ProbeFailed {
                    reason: e.to_string(),
                }];
            }
        };

        let mut found = Vec::new();
        if let Some(ext) = extension_of(path) {
            if self.rules.is_container_disallowed(&ext) {
                found.push(Rule::DisallowedContainer { container: ext });
            }
        }
        self.codec_rules(&probe, &mut found);
        self.resolution_rules(&probe, &mut found);
        self.bitrate_rules(&probe, &mut found);
        found
    }

    fn codec_rules(&self, probe: &MediaProbe, found: &mut Vec<Rule>) {
        let streams = [
            (StreamKind::Video, &probe.video_codec),
            (StreamKind::Audio, &probe.audio_codec),
        ];
        for (stream, codec) in streams {
            if let Some(codec) = codec {
                if self.rules.is_codec_disallowed(codec) {
                    found.push(Rule::DisallowedCodec {
                        stream,
                        codec: codec.to_ascii_lowercase(),
                    });
                }
            }
        }
    }

    fn resolution_rules(&self, probe: &MediaProbe, found: &mut Vec<Rule>) {
        let (Some(width), Some(height)) = (probe.width, probe.height) else {
            return;
        };
        if let Some(max) = self.rules.max_resolution {
            if width > max.width || height > max.height {
                found.push(Rule::ResolutionOutOfRange {
                    width,
                    height,
                    bound: Bound::Max,
                    limit: max.to_string(),
                });
            }
        }
        if let Some(min) = self.rules.min_resolution {
            if width < min.width || height < min.height {
                found.push(Rule::ResolutionOutOfRange {
                    width,
                    height,
                    bound: Bound::Min,
                    limit: min.to_string(),
                });
            }
        }
    }

    fn bitrate_rules(&self, probe: &MediaProbe, found: &mut Vec<Rule>) {
        let Some(bps) = probe.bitrate else {
            return;
        };
        let bitrate = Bitrate::from_bps(bps);
        if let Some(max) = self.rules.max_bitrate {
            if bitrate > max {
                found.push(Rule::BitrateOutOfRange {
                    bitrate,
                    bound: Bound::Max,
                    limit: max,
                });
            }
        }
        if let Some(min) = self.rules.min_bitrate {
            if bitrate < min {
                found.push(Rule::BitrateOutOfRange {
                    bitrate,
                    bound: Bound::Min,
                    limit: min,
                });
            }
        }
    }

    fn image_rules(&self, path: &Path) -> Vec<Rule> {
        let prefix = match sniff::read_prefix(path) {
            Ok(prefix) => prefix,
            Err(e) => {
                return vec![Rule::FileAccess {
                    message: e.to_string(),
                }];
            }
        };
        let extension = extension_of(path).unwrap_or_default();
        let claimed = ImageFormat::from_extension(&extension);
        let Some(sniffed) = sniff::sniff(&prefix) else {
            return vec![Rule::ProbeFailed {
                reason: "unrecognized image header".to_string(),
            }];
        };

        let mut found = Vec::new();
        let disallowed = sniffed
            .extensions()
            .iter()
            .any(|e| self.rules.is_image_format_disallowed(e))
            || self.rules.is_image_format_disallowed(&extension);
        if disallowed {
            found.push(Rule::DisallowedImageFormat {
                format: sniffed.canonical_extension().to_string(),
            });
        }
        if claimed != Some(sniffed) {
            found.push(Rule::ExtensionMismatch {
                extension,
                claimed,
                sniffed,
            });
        }
        found
    }

    /// Lazily walk `root`, one file at a time, in file-name order.
    ///
    /// Every call starts a fresh walk. The cancel token is checked before each
    /// file; once it is set the iterator ends after the findings already produced.
    pub fn scan<'a>(&'a self, root: &Path, cancel: &CancelToken) -> ScanIter<'a, P> {
        ScanIter {
            scanner: self,
            root: root.to_path_buf(),
            walker: WalkDir::new(root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter(),
            cancel: cancel.clone(),
            pending: VecDeque::new(),
            files_scanned: 0,
            cancelled: false,
            done: false,
        }
    }

    /// Walk on the calling thread and inspect files on up to `max_workers`
    /// threads. Output is ordered the same way as the sequential scan.
    pub fn scan_parallel(
        &self,
        root: &Path,
        cancel: &CancelToken,
        max_workers: usize,
    ) -> ScanOutcome {
        let workers = max_workers.max(1);
        let (path_tx, path_rx) = mpsc::sync_channel::<(PathBuf, MediaKind)>(workers * 2);
        let path_rx = Mutex::new(path_rx);
        let (result_tx, result_rx) = mpsc::channel::<(PathBuf, Vec<Finding>)>();
        let inspected = AtomicUsize::new(0);
        let mut walk_errors = Vec::new();
        let mut cancelled = false;

        thread::scope(|scope| {
            for _ in 0..workers {
                let path_rx = &path_rx;
                let result_tx = result_tx.clone();
                let inspected = &inspected;
                scope.spawn(move || {
                    loop {
                        let next = path_rx
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .recv();
                        let Ok((path, kind)) = next else {
                            break;
                        };
                        if cancel.is_cancelled() {
                            continue;
                        }
                        let findings = self.inspect_as(&path, kind);
                        inspected.fetch_add(1, Ordering::Relaxed);
                        if result_tx.send((path, findings)).is_err() {
                            break;
                        }
                    }
                });
            }

            let walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
            for entry in walker {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                match entry {
                    Ok(entry) if entry.file_type().is_file() => {
                        if let Some(kind) = self.filter.classify(entry.path()) {
                            if path_tx.send((entry.into_path(), kind)).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        let path = err
                            .path()
                            .map(Path::to_path_buf)
                            .unwrap_or_else(|| root.to_path_buf());
                        let rule = Rule::FileAccess {
                            message: err.to_string(),
                        };
                        walk_errors.push((path.clone(), vec![self.finding(&path, rule)]));
                    }
                }
            }
            drop(path_tx);
        });
        drop(result_tx);

        let mut per_file: Vec<(PathBuf, Vec<Finding>)> = result_rx.into_iter().collect();
        per_file.extend(walk_errors);
        per_file.sort_by(|a, b| a.0.cmp(&b.0));

        let cancelled = cancelled || cancel.is_cancelled();
        let outcome = ScanOutcome {
            findings: per_file.into_iter().flat_map(|(_, f)| f).collect(),
            files_scanned: inspected.into_inner(),
            cancelled,
        };
        info!(
            root = %root.display(),
            files = outcome.files_scanned,
            findings = outcome.findings.len(),
            cancelled = outcome.cancelled,
            "scan finished"
        );
        outcome
    }
}

/// Lazy sequence of findings produced by [`QualityScanner::scan`]
pub struct ScanIter<'a, P> {
    scanner: &'a QualityScanner<P>,
    root: PathBuf,
    walker: walkdir::IntoIter,
    cancel: CancelToken,
    pending: VecDeque<Finding>,
    files_scanned: usize,
    cancelled: bool,
    done: bool,
}

impl<P: MediaProber> ScanIter<'_, P> {
    pub fn files_scanned(&self) -> usize {
        self.files_scanned
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Drain the rest of the walk
    pub fn finish(mut self) -> ScanOutcome {
        let findings: Vec<Finding> = self.by_ref().collect();
        ScanOutcome {
            findings,
            files_scanned: self.files_scanned,
            cancelled: self.cancelled,
        }
    }
}

impl<P: MediaProber> Iterator for ScanIter<'_, P> {
    type Item = Finding;

    fn next(&mut self) -> Option<Finding> {
        loop {
            if let Some(finding) = self.pending.pop_front() {
                return Some(finding);
            }
            if self.done {
                return None;
            }
            if self.cancel.is_cancelled() {
                debug!(root = %self.root.display(), files = self.files_scanned, "scan cancelled");
                self.cancelled = true;
                self.done = true;
                return None;
            }

            match self.walker.next() {
                None => {
                    self.done = true;
                }
                Some(Ok(entry)) => {
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let Some(kind) = self.scanner.filter.classify(entry.path()) else {
                        continue;
                    };
                    self.files_scanned += 1;
                    self.pending
                        .extend(self.scanner.inspect_as(entry.path(), kind));
                }
                Some(Err(err)) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    let rule = Rule::FileAccess {
                        message: err.to_string(),
                    };
                    self.pending.push_back(self.scanner.finding(&path, rule));
                }
            }
        }
    }
}
