//! Repository-scoped advisory lock.
//!
//! Backup creation, message rewriting and rollback all move refs and the working tree,
//! so they hold an exclusive lock on `<git-dir>/git-lineage.lock` for their duration.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::LineageError;

pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(10);
const LOCK_RETRY: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub struct RepoLock {
    file: File,
    path: PathBuf,
}

impl RepoLock {
    /// Take the exclusive lock, retrying until `wait` elapses.
    pub fn acquire(lock_path: &Path, wait: Duration) -> Result<RepoLock, LineageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;

        let start = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => break,
                Err(err) => {
                    if err.kind() != ErrorKind::WouldBlock
                        && err.raw_os_error() != fs2::lock_contended_error().raw_os_error()
                    {
                        return Err(err.into());
                    }
                    if start.elapsed() >= wait {
                        return Err(LineageError::LockUnavailable(format!(
                            "{} is held by another process (waited {}ms)",
                            lock_path.display(),
                            wait.as_millis()
                        )));
                    }
                    std::thread::sleep(LOCK_RETRY);
                }
            }
        }

        Ok(RepoLock {
            file,
            path: lock_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
