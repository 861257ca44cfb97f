//! Process lifecycle: which lock is held, and how to let go of it on the
//! normal path and on a termination signal.
//!
//! The signal path may only use async-signal-safe calls, so everything it
//! needs is prepared up front: the lock path is kept as a C string behind an
//! atomic pointer, and the handler just unlinks it, resets the terminal if a
//! display is active, and `_exit`s. In-flight reload workers are abandoned.

use std::ffi::{CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use tracing::{debug, info};

use crate::error::LockError;
use crate::lock::LockHandle;

static LOCK_PATH: AtomicPtr<libc::c_char> = AtomicPtr::new(ptr::null_mut());
static DISPLAY_ACTIVE: AtomicBool = AtomicBool::new(false);

const DISPLAY_RESET: &[u8] = b"\x1b[0m\x1b[?25h\r\n";

pub(crate) fn register_lock_path(path: &Path) {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return;
    };
    // the previous string is leaked on purpose: a handler may be reading it
    LOCK_PATH.swap(c_path.into_raw(), Ordering::SeqCst);
}

pub(crate) fn forget_lock_path(path: &Path) {
    let current = LOCK_PATH.load(Ordering::SeqCst);
    if current.is_null() {
        return;
    }
    // SAFETY: non-null values always come from `CString::into_raw` and are never freed
    let registered = unsafe { CStr::from_ptr(current) };
    if registered.to_bytes() == path.as_os_str().as_bytes() {
        let _ = LOCK_PATH.compare_exchange(
            current,
            ptr::null_mut(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

/// Marks whether an interactive display owns the terminal, so the signal
/// path knows to reset it.
pub fn set_display_active(active: bool) {
    DISPLAY_ACTIVE.store(active, Ordering::SeqCst);
}

/// Async-signal-safe cleanup: no allocation, no locks.
pub fn emergency_cleanup() {
    let path = LOCK_PATH.swap(ptr::null_mut(), Ordering::SeqCst);
    if !path.is_null() {
        // SAFETY: `path` is a valid NUL-terminated string that is never freed
        unsafe {
            libc::unlink(path);
        }
    }
    if DISPLAY_ACTIVE.swap(false, Ordering::SeqCst) {
        // SAFETY: writing a static buffer to stderr, where the status line is drawn
        unsafe {
            libc::write(
                libc::STDERR_FILENO,
                DISPLAY_RESET.as_ptr().cast(),
                DISPLAY_RESET.len(),
            );
        }
    }
}

extern "C" fn on_terminate(_signal: libc::c_int) {
    emergency_cleanup();
    // SAFETY: `_exit` is async-signal-safe and skips atexit handlers and unwinding
    unsafe { libc::_exit(libc::EXIT_FAILURE) }
}

/// SIGINT, SIGHUP and SIGTERM run the emergency path; SIGPIPE is ignored.
pub fn install_signal_handlers() {
    // SAFETY: `on_terminate` only performs async-signal-safe operations
    unsafe {
        for signal in [libc::SIGINT, libc::SIGHUP, libc::SIGTERM] {
            libc::signal(signal, on_terminate as libc::sighandler_t);
        }
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
    debug!("installed signal handlers");
}

/// Lock state of the running process.
#[derive(Debug, Default)]
pub struct Lifecycle {
    lock: Option<LockHandle>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lock at `path`, releasing any lock held before. Used both
    /// for the initial lock and when the configuration moves the cache.
    pub fn lock(&mut self, path: &Path) -> Result<(), LockError> {
        if self.lock.as_ref().is_some_and(|held| held.path() == path) {
            return Ok(());
        }
        self.release();
        self.lock = Some(LockHandle::acquire(path)?);
        Ok(())
    }

    pub fn lock_path(&self) -> Option<&Path> {
        self.lock.as_ref().map(LockHandle::path)
    }

    pub fn release(&mut self) {
        if let Some(mut held) = self.lock.take() {
            held.release();
        }
    }

    /// Normal-path shutdown: drops the lock.
    pub fn shutdown(mut self) {
        self.release();
        info!("shut down");
    }
}
