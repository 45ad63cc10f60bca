use std::{error::Error, fmt};

use backtrace::Backtrace;
use log::error;

/// The category of a `SmallError`, decides how the caller should
/// react to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    /// Read/write failure of the backing file.
    #[error("storage io error")]
    StorageIo,

    /// The tree (or the cache) is in a state that should never be
    /// observed. Indicates a defect, never retried.
    #[error("structural inconsistency")]
    StructuralInconsistency,

    /// The lock request would close a wait-for cycle. The requesting
    /// transaction should abort and may restart.
    #[error("lock abort")]
    LockAbort,

    /// The page cache is full of dirty pages.
    #[error("resource exhausted")]
    ResourceExhausted,

    /// Caller error, e.g. a malformed predicate or a tuple that
    /// doesn't fit the schema.
    #[error("invalid argument")]
    InvalidArgument,
}

#[derive(Debug)]
pub struct SmallError {
    kind: ErrorKind,
    details: String,
}

impl SmallError {
    pub fn new(kind: ErrorKind, msg: &str) -> SmallError {
        SmallError {
            kind,
            details: msg.to_string(),
        }
    }

    pub fn storage_io(msg: &str) -> SmallError {
        Self::new(ErrorKind::StorageIo, msg)
    }

    pub fn inconsistency(msg: &str) -> SmallError {
        Self::new(ErrorKind::StructuralInconsistency, msg)
    }

    pub fn lock_abort(msg: &str) -> SmallError {
        Self::new(ErrorKind::LockAbort, msg)
    }

    pub fn exhausted(msg: &str) -> SmallError {
        Self::new(ErrorKind::ResourceExhausted, msg)
    }

    pub fn invalid_argument(msg: &str) -> SmallError {
        Self::new(ErrorKind::InvalidArgument, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn details(&self) -> &str {
        &self.details
    }

    /// Lock aborts and a full cache go away once other transactions
    /// complete, so the caller may abort and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::LockAbort | ErrorKind::ResourceExhausted
        )
    }

    pub fn show_backtrace(&self) {
        let bt = Backtrace::new();
        error!("{}\nbacktrace:\n{:?}", self, bt);
    }
}

impl fmt::Display for SmallError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.details)
    }
}

impl Error for SmallError {}

impl From<std::io::Error> for SmallError {
    fn from(e: std::io::Error) -> Self {
        SmallError::storage_io(&e.to_string())
    }
}
