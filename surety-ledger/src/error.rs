//! Error types for the surety ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// The first four variants are the rejection kinds a caller can observe for
/// a well-formed request. Every rejected command is aborted as a whole: no
/// state change, no event, no value transfer.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller lacks the required role or ownership
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Global operational switch is off
    #[error("Operation blocked: ledger is not operational")]
    NotOperational,

    /// A business precondition does not hold
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Request, flight or policy has already reached its terminal state
    #[error("Already finalized: {0}")]
    AlreadyFinalized(String),

    /// Outbound value transfer failed
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Invariant violation (fund conservation, event chain, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::AccessDenied(_) => "access_denied",
            Error::NotOperational => "not_operational",
            Error::PreconditionFailed(_) => "precondition_failed",
            Error::AlreadyFinalized(_) => "already_finalized",
            Error::Transfer(_) => "transfer",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::InvariantViolation(_) => "invariant_violation",
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Other(_) => "other",
        }
    }

    /// Whether this is a business rejection rather than an infrastructure fault
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::AccessDenied(_)
                | Error::NotOperational
                | Error::PreconditionFailed(_)
                | Error::AlreadyFinalized(_)
        )
    }

    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Error::PreconditionFailed(msg.into())
    }

    pub(crate) fn finalized(msg: impl Into<String>) -> Self {
        Error::AlreadyFinalized(msg.into())
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
