//! Error types for `rollcall-store`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Identity keys are unique; re-enrolling is rejected, never merged.
    #[error("identity already enrolled: {0}")]
    DuplicateIdentity(String),

    /// A stored record is missing its embedding or the blob is corrupt.
    #[error("malformed enrollment record for {identity:?}: {reason}")]
    MalformedRecord { identity: String, reason: String },
}

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The file is locked or held open by another program. Retry after it is closed.
    #[error("attendance ledger {} is in use by another program", path.display())]
    StorageBusy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid student identity {0:?}")]
    InvalidIdentity(String),
}

impl LedgerError {
    /// Classify an I/O failure on `path`, separating lock contention from other errors.
    pub(crate) fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if is_busy(&source) {
            LedgerError::StorageBusy { path, source }
        } else {
            LedgerError::Io { path, source }
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, LedgerError::StorageBusy { .. })
    }
}

// EBUSY, ETXTBSY
#[cfg(unix)]
const BUSY_OS_CODES: &[i32] = &[16, 26];
// ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
#[cfg(windows)]
const BUSY_OS_CODES: &[i32] = &[32, 33];
#[cfg(not(any(unix, windows)))]
const BUSY_OS_CODES: &[i32] = &[];

/// Spreadsheet programs lock the file they have open; on Windows that
/// surfaces as a permission error on write.
fn is_busy(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
        || err.raw_os_error().is_some_and(|code| BUSY_OS_CODES.contains(&code))
}
