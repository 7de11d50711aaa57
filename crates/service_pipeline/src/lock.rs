//! Run-level mutual exclusion through an advisory lock on a file.
//!
//! The operating system drops the lock when the holding process exits, so a
//! run killed mid-way never blocks later runs. The file itself is left in
//! place and records the holder's pid.

use crate::error::PipelineError;
use std::fs::{File, OpenOptions, TryLockError};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Held for the duration of a run; releases the lock on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: File,
}

impl RunLock {
    /// Take the lock at `path`, failing if another process holds it.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let path = path.into();
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
        {
            Ok(file) => file,
            Err(source) => return Err(PipelineError::Lock { path, source }),
        };

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(PipelineError::RunInProgress { path }),
            Err(TryLockError::Error(source)) => return Err(PipelineError::Lock { path, source }),
        }

        let mut lock = Self { path, file };
        match lock.claim() {
            Ok(Some(previous)) => warn!(
                path = %lock.path.display(),
                previous_pid = %previous,
                "Took over run lock left behind by an exited process"
            ),
            Ok(None) => {}
            Err(source) => {
                return Err(PipelineError::Lock {
                    path: lock.path.clone(),
                    source,
                })
            }
        }
        debug!(path = %lock.path.display(), "Run lock acquired");
        Ok(lock)
    }

    /// Replace the recorded pid with ours, returning any leftover one.
    fn claim(&mut self) -> io::Result<Option<String>> {
        let mut previous = String::new();
        self.file.read_to_string(&mut previous)?;
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        writeln!(self.file, "{}", std::process::id())?;
        self.file.flush()?;

        let previous = previous.trim();
        Ok((!previous.is_empty()).then(|| previous.to_string()))
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // An empty file marks a clean release.
        if let Err(e) = self.file.set_len(0) {
            warn!(path = %self.path.display(), error = %e, "Failed to clear run lock");
        }
        if let Err(e) = self.file.unlock() {
            warn!(path = %self.path.display(), error = %e, "Failed to release run lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind as PipelineErrorKind;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");

        let first = RunLock::acquire(&path).unwrap();
        assert!(path.exists());

        let err = RunLock::acquire(&path).unwrap_err();
        assert_eq!(err.kind(), PipelineErrorKind::RunInProgress);

        drop(first);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
        assert!(RunLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_leftover_lock_file_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");
        std::fs::write(&path, "999999\n").unwrap();

        let lock = RunLock::acquire(&path).unwrap();

        let recorded = std::fs::read_to_string(&path).unwrap();
        assert_eq!(recorded.trim(), std::process::id().to_string());
        drop(lock);
    }

    #[test]
    fn test_unwritable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("run.lock");
        let err = RunLock::acquire(&path).unwrap_err();
        assert!(matches!(err, PipelineError::Lock { .. }));
    }
}
