//! Cross-process exclusive lock on a file.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive advisory lock held on a file. Dropping it unlocks the file.
///
/// The lock file is never removed, so waiters and later callers always lock
/// the same file.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Takes the lock without blocking. `Ok(None)` means another holder has it.
    pub fn try_lock(path: &Path) -> io::Result<Option<Self>> {
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(err) if is_contended(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Blocks until the lock is available.
    pub fn wait(path: &Path) -> io::Result<Self> {
        let file = open_lock_file(path)?;
        file.lock_exclusive()?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            debug!("failed to unlock {}: {err}", self.path.display());
        }
    }
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)
}

fn is_contended(err: &io::Error) -> bool {
    let contended = fs2::lock_contended_error();
    err.raw_os_error() == contended.raw_os_error() || err.kind() == io::ErrorKind::WouldBlock
}
