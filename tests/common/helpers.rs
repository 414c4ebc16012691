#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;
use xuebox::cancel::CancelToken;
use xuebox::engine::probe::{MediaProbe, MediaProber, ProbeError};
use xuebox::engine::{
    CommandBuilder, EncodeJob, EncodeParameters, EncodePlan, ParameterOverrides, PathStyle,
    PresetCatalog, format_command, resolve,
};

pub const FIXED_JOB_ID: u128 = 1;

/// Builder rooted at /tmp/work, POSIX filter paths on every platform
pub fn posix_builder() -> CommandBuilder {
    CommandBuilder::new("ffmpeg", "/tmp/work").with_path_style(PathStyle::Posix)
}

pub fn resolve_builtin(preset: &str, overrides: &ParameterOverrides) -> EncodeParameters {
    resolve(&PresetCatalog::builtin(), preset, overrides).unwrap()
}

/// Job with a stable id so work paths are predictable
pub fn fixed_job(params: EncodeParameters, input: &str, output: &str) -> EncodeJob {
    let mut job = EncodeJob::new(PathBuf::from(input), PathBuf::from(output), params);
    job.id = Uuid::from_u128(FIXED_JOB_ID);
    job
}

/// `<work>/xuebox-<fixed id>`
pub fn fixed_job_dir(work: &str) -> String {
    format!("{}/xuebox-{}", work, Uuid::from_u128(FIXED_JOB_ID))
}

pub fn plan_commands(plan: &EncodePlan) -> Vec<String> {
    plan.passes.iter().map(format_command).collect()
}

pub fn build_commands(preset: &str, overrides: &ParameterOverrides) -> Vec<String> {
    let job = fixed_job(
        resolve_builtin(preset, overrides),
        "/media/in.mkv",
        "/media/out.mp4",
    );
    plan_commands(&posix_builder().build(&job).unwrap())
}

pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

/// Executable stand-in for ffmpeg: writes first-pass statistics next to
/// `-passlogfile` (when given) and then blocks until it is stopped
#[cfg(unix)]
pub fn stalling_ffmpeg(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = write_file(
        dir,
        "fake-ffmpeg.sh",
        b"#!/bin/sh\n\
          log=''\n\
          while [ $# -gt 0 ]; do\n\
            if [ \"$1\" = -passlogfile ]; then log=\"$2\"; fi\n\
            shift\n\
          done\n\
          if [ -n \"$log\" ]; then echo stats > \"$log-0.log\"; fi\n\
          exec sleep 30\n",
    );
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script
}

/// Poll until `path` exists, giving up after `limit`
pub fn wait_for_file(path: &Path, limit: std::time::Duration) -> bool {
    let deadline = std::time::Instant::now() + limit;
    while std::time::Instant::now() < deadline {
        if path.exists() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    false
}

pub const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
pub const JPEG_HEADER: &[u8] = b"\xff\xd8\xff\xe0\0\x10JFIF\0\x01\x01\0\0\x01";

pub fn h264_probe(width: u32, height: u32, bitrate: u64) -> MediaProbe {
    MediaProbe {
        container: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
        video_codec: Some("h264".to_string()),
        audio_codec: Some("aac".to_string()),
        width: Some(width),
        height: Some(height),
        fps: Some(25.0),
        bitrate: Some(bitrate),
        duration_s: Some(60.0),
    }
}

/// In-memory prober keyed by file name. Unknown names get the fallback probe.
/// Optionally cancels a token once a given number of probes have run.
pub struct FakeProber {
    probes: HashMap<String, MediaProbe>,
    fallback: MediaProbe,
    calls: AtomicUsize,
    cancel_after: Option<(usize, CancelToken)>,
    seen: Mutex<Vec<PathBuf>>,
}

impl FakeProber {
    pub fn new(fallback: MediaProbe) -> Self {
        Self {
            probes: HashMap::new(),
            fallback,
            calls: AtomicUsize::new(0),
            cancel_after: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_probe(mut self, file_name: &str, probe: MediaProbe) -> Self {
        self.probes.insert(file_name.to_string(), probe);
        self
    }

    pub fn cancel_after(mut self, calls: usize, token: CancelToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

impl MediaProber for FakeProber {
    fn probe(&self, path: &Path) -> Result<MediaProbe, ProbeError> {
        self.seen.lock().unwrap().push(path.to_path_buf());
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.cancel_after {
            if calls >= *limit {
                token.cancel();
            }
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(self
            .probes
            .get(&name)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}
