use crate::error::ErrorCode;
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// Advisory lock errors for the graph database.
#[derive(Debug)]
pub enum LockError {
    Timeout { path: PathBuf, waited: Duration },
    IoError(io::Error),
}

impl From<io::Error> for LockError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err)
    }
}

impl LockError {
    /// Machine-readable code associated with this lock error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::LockContention,
            Self::IoError(_) => ErrorCode::StoreFailure,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { path, waited } => {
                write!(
                    f,
                    "{}: graph lock timed out after {:?} at {}",
                    self.code().code(),
                    waited,
                    path.display()
                )
            }
            Self::IoError(err) => write!(f, "{}: {}", self.code().code(), err),
        }
    }
}

impl std::error::Error for LockError {}

/// Lock file used to serialize phase runs against `db_path`.
#[must_use]
pub fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut name = db_path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".lock");
    db_path.with_file_name(name)
}

/// RAII guard for the exclusive lock held while a phase mutates the graph.
#[derive(Debug)]
pub struct GraphLock {
    file: File,
    path: PathBuf,
}

impl GraphLock {
    /// Acquire an exclusive advisory lock on `path`, polling until `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] when another holder keeps the lock past
    /// `timeout`, or [`LockError::IoError`] when the lock file cannot be
    /// created.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)?;

            if file.try_lock_exclusive().is_ok() {
                tracing::debug!(path = %path.display(), "graph lock acquired");
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                });
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    waited: start.elapsed(),
                });
            }

            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Acquire the lock guarding the database at `db_path`.
    ///
    /// # Errors
    ///
    /// See [`GraphLock::acquire`].
    pub fn for_database(db_path: &Path, timeout: Duration) -> Result<Self, LockError> {
        Self::acquire(&lock_path_for(db_path), timeout)
    }

    /// Explicitly release the lock. Release also happens automatically on drop.
    pub fn release(self) {
        drop(self);
    }

    /// Return the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for GraphLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_path_sits_next_to_database() {
        assert_eq!(
            lock_path_for(Path::new("/data/graph.db")),
            PathBuf::from("/data/graph.db.lock")
        );
    }

    #[test]
    fn second_acquire_times_out_while_held() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("graph.db.lock");

        let held = GraphLock::acquire(&path, Duration::from_millis(100)).expect("first lock");
        let err = GraphLock::acquire(&path, Duration::from_millis(30)).expect_err("contended");
        assert!(matches!(err, LockError::Timeout { .. }));
        assert_eq!(err.code(), ErrorCode::LockContention);
        assert!(err.to_string().starts_with("E5002"));

        held.release();
        GraphLock::acquire(&path, Duration::from_millis(100)).expect("lock after release");
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = TempDir::new().expect("tempdir");
        let db = dir.path().join("nested/deeper/graph.db");
        let lock = GraphLock::for_database(&db, Duration::from_millis(50)).expect("lock");
        assert!(lock.path().exists());
    }
}
