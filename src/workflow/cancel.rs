//! Cooperative cancellation checked at every session transition.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Shared flag; clones observe the same cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    follows_interrupt: bool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is also cancelled by SIGINT once
    /// [`install_interrupt_handler`] has run.
    pub fn interruptible() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            follows_interrupt: true,
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || (self.follows_interrupt && INTERRUPTED.load(Ordering::SeqCst))
    }
}

#[cfg(unix)]
extern "C" fn on_interrupt(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT to the process-wide interrupt flag. A running external call
/// is left to finish or time out; the session stops at the next transition.
#[cfg(unix)]
pub fn install_interrupt_handler() -> anyhow::Result<()> {
    let handler = on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
    let previous = unsafe { libc::signal(libc::SIGINT, handler) };
    if previous == libc::SIG_ERR {
        return Err(anyhow::anyhow!(
            "install SIGINT handler: {}",
            std::io::Error::last_os_error()
        ));
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn install_interrupt_handler() -> anyhow::Result<()> {
    Ok(())
}
