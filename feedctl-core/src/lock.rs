//! Single-instance guard keyed by the cache file path.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, error, warn};

use crate::error::LockError;

pub const LOCK_SUFFIX: &str = ".lock";

/// Lock file path for a given cache file.
pub fn lock_path_for(cache_file: &Path) -> PathBuf {
    let mut name = cache_file.as_os_str().to_owned();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

/// Held lock. The lock is an exclusive `flock` on the file, which also
/// records the holder's PID; it is released on [`LockHandle::release`] or drop.
#[derive(Debug)]
pub struct LockHandle {
    path: PathBuf,
    file: Option<File>,
}

impl LockHandle {
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut file = loop {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .mode(0o600)
                .open(&path)
                .map_err(io_err)?;

            match file.try_lock_exclusive() {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    let pid = read_pid(&mut file);
                    error!(pid, path = %path.display(), "an instance is already running");
                    return Err(LockError::AlreadyRunning { pid });
                }
                Err(e) => {
                    error!(error = %e, path = %path.display(), "something went wrong with the lock");
                    return Err(io_err(e));
                }
            }

            // the previous holder may have unlinked the file between our open and lock
            if is_current(&file, &path).map_err(io_err)? {
                break file;
            }
            debug!(path = %path.display(), "lock file was replaced, retrying");
        };

        file.set_len(0).map_err(io_err)?;
        write!(file, "{}", std::process::id()).map_err(io_err)?;
        file.flush().map_err(io_err)?;

        crate::lifecycle::register_lock_path(&path);
        debug!(path = %path.display(), "acquired lock");
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Removes the lock file and drops the lock. Calling it again is a no-op.
    /// A file that was unlinked and replaced by another holder is left alone.
    pub fn release(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        if is_current(&file, &self.path).unwrap_or(false) {
            crate::lifecycle::forget_lock_path(&self.path);
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(error = %e, path = %self.path.display(), "failed to remove lock file");
                }
            }
        }
        drop(file);
        debug!(path = %self.path.display(), "released lock");
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Whether `file` is still the file linked at `path`.
fn is_current(file: &File, path: &Path) -> std::io::Result<bool> {
    let held = file.metadata()?;
    match std::fs::metadata(path) {
        Ok(linked) => Ok(held.dev() == linked.dev() && held.ino() == linked.ino()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_pid(file: &mut File) -> u32 {
    let mut content = String::new();
    if file.seek(SeekFrom::Start(0)).is_err() || file.read_to_string(&mut content).is_err() {
        return 0;
    }
    content.trim().parse().unwrap_or(0)
}
