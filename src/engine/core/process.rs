// Child process supervision: cancellation, timeout, output capture

use crate::cancel::CancelToken;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Lines of stderr kept for diagnostics
pub const STDERR_TAIL_LINES: usize = 400;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const TERMINATE_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to start {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed while waiting for {program}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} was cancelled")]
    Cancelled { program: String },

    #[error("{program} timed out after {}s", timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
}

/// Stop conditions for a child process
#[derive(Debug, Clone, Default)]
pub struct RunLimits {
    pub cancel: CancelToken,
    pub timeout: Option<Duration>,
}

impl RunLimits {
    pub fn new(cancel: CancelToken, timeout: Option<Duration>) -> Self {
        Self { cancel, timeout }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code; on Unix a signal death maps to 128 + signal
    pub exit_code: i32,
    /// Last `STDERR_TAIL_LINES` lines of stderr
    pub stderr_tail: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last `n` non-empty stderr lines, for error messages
    pub fn stderr_summary(&self, n: usize) -> String {
        let lines: Vec<&str> = self
            .stderr_tail
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect();
        lines[lines.len().saturating_sub(n)..].join("\n")
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// Ask the child to stop, then kill it if it ignores the request
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        // ffmpeg finalises its output on SIGTERM
        if let Ok(pid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: plain syscall on a pid we spawned and have not reaped
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
            let deadline = Instant::now() + TERMINATE_GRACE;
            while Instant::now() < deadline {
                if let Ok(Some(_)) = child.try_wait() {
                    return;
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
    if let Err(e) = child.kill() {
        debug!(error = %e, "kill failed; child probably exited");
    }
    let _ = child.wait();
}

fn spawn_reader<R: Read + Send + 'static>(
    stream: R,
    tx: Option<mpsc::Sender<String>>,
    keep: usize,
) -> thread::JoinHandle<VecDeque<String>> {
    thread::spawn(move || {
        let mut tail = VecDeque::with_capacity(keep.min(1024));
        let reader = BufReader::new(stream);
        for line in reader.lines().map_while(Result::ok) {
            if let Some(tx) = &tx {
                let _ = tx.send(line.clone());
            }
            if keep > 0 {
                if tail.len() == keep {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
        tail
    })
}

/// Run `cmd` to completion, feeding each stdout line to `on_stdout_line`.
/// Stdout is not retained; callers that need it collect it in the callback.
///
/// Cancellation and timeout are checked every poll interval; when either
/// fires the child is terminated and reaped before returning.
pub fn run_process(
    mut cmd: Command,
    limits: &RunLimits,
    on_stdout_line: &mut dyn FnMut(&str),
) -> Result<ProcessOutput, RunError> {
    let program = cmd.get_program().to_string_lossy().to_string();
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| RunError::Spawn {
        program: program.clone(),
        source,
    })?;
    debug!(%program, pid = child.id(), "spawned");

    let (tx, rx) = mpsc::channel();
    let stdout_thread = child
        .stdout
        .take()
        .map(|out| spawn_reader(out, Some(tx), 0));
    let stderr_thread = child
        .stderr
        .take()
        .map(|err| spawn_reader(err, None, STDERR_TAIL_LINES));

    let started = Instant::now();
    let status = loop {
        while let Ok(line) = rx.try_recv() {
            on_stdout_line(&line);
        }

        if limits.cancel.is_cancelled() {
            warn!(%program, "cancelling child process");
            terminate(&mut child);
            return Err(RunError::Cancelled { program });
        }
        if let Some(timeout) = limits.timeout {
            if started.elapsed() >= timeout {
                warn!(%program, ?timeout, "child process timed out");
                terminate(&mut child);
                return Err(RunError::TimedOut { program, timeout });
            }
        }

        match child.try_wait() {
            // A terminal Ctrl-C reaches the child too; it may exit on its own first
            Ok(Some(_)) if limits.cancel.is_cancelled() => {
                warn!(%program, "child exited after cancellation");
                return Err(RunError::Cancelled { program });
            }
            Ok(Some(status)) => break status,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => {
                terminate(&mut child);
                return Err(RunError::Wait { program, source });
            }
        }
    };

    if let Some(handle) = stdout_thread {
        let _ = handle.join();
    }
    for line in rx.try_iter() {
        on_stdout_line(&line);
    }
    let stderr_tail = stderr_thread
        .and_then(|handle| handle.join().ok())
        .map(|lines| lines.into_iter().collect::<Vec<_>>().join("\n"))
        .unwrap_or_default();

    let exit_code = exit_code(status);
    debug!(%program, exit_code, elapsed_ms = started.elapsed().as_millis() as u64, "exited");

    Ok(ProcessOutput {
        exit_code,
        stderr_tail,
    })
}
