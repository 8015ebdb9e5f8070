//! Ctrl+C handling for the monitor
//!
//! SIGINT only raises a stop flag; the monitor loop notices it on its next
//! poll and runs its normal cleanup.

use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

static STOP_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

/// Route SIGINT to `flag`. Can be called once per process.
pub fn install(flag: Arc<AtomicBool>) -> Result<()> {
    if STOP_FLAG.set(flag).is_err() {
        bail!("Ctrl+C handler is already installed");
    }

    #[cfg(unix)]
    {
        // SAFETY: the handler only performs an atomic store
        let previous =
            unsafe { libc::signal(libc::SIGINT, handle_sigint as libc::sighandler_t) };
        if previous == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error().into());
        }
    }

    #[cfg(not(unix))]
    log::warn!("Ctrl+C handling is not available on this platform; close the window to stop");

    Ok(())
}

#[cfg(unix)]
extern "C" fn handle_sigint(_: libc::c_int) {
    if let Some(flag) = STOP_FLAG.get() {
        flag.store(true, Ordering::SeqCst);
    }
}
