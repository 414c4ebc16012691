// Cooperative cancellation shared between the caller and long-running work

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Cloneable cancellation flag. All clones observe the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

static SIGNAL_TOKEN: OnceLock<CancelToken> = OnceLock::new();

#[cfg(unix)]
extern "C" fn on_terminate_signal(_signal: libc::c_int) {
    // Only an atomic load and store happen here
    if let Some(token) = SIGNAL_TOKEN.get() {
        token.cancel();
    }
}

/// Route SIGINT and SIGTERM to `token` instead of killing the process, so
/// running children are stopped and temporary files removed on the way out.
///
/// Only the first token registered in a process is wired up; returns false
/// when another token already holds the signals.
pub fn cancel_on_signals(token: &CancelToken) -> bool {
    if SIGNAL_TOKEN.set(token.clone()).is_err() {
        return false;
    }
    #[cfg(unix)]
    {
        let handler = on_terminate_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        // SAFETY: the handler only touches an initialised OnceLock and an atomic
        unsafe {
            libc::signal(libc::SIGINT, handler);
            libc::signal(libc::SIGTERM, handler);
        }
    }
    true
}
