//! Error taxonomy for the indexing and retrieval core.
//!
//! Every core operation returns [`Result`]. Bulk operations (directory
//! indexing) catch and count per-file errors instead of propagating them;
//! single-target operations (one query, one lookup) return them unchanged.
//!
//! | Variant | Raised by | Retry? |
//! |---------|-----------|--------|
//! | [`Error::Storage`] | SQLite / pool failures | only when [`Error::is_retryable`] |
//! | [`Error::Provider`] | embedding provider calls | caller's policy |
//! | [`Error::Config`] | invalid parameters, before any I/O | never |
//! | [`Error::NotFound`] | direct single-record lookups | never |

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("embedding provider error: {0}")]
    Provider(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding call timed out after {0}s")]
    Timeout(u64),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn provider(msg: impl Into<String>) -> Self {
        Error::Provider(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Whether retrying the same operation may succeed.
    ///
    /// Lock contention (`SQLITE_BUSY`, `SQLITE_LOCKED`) and pool acquisition
    /// timeouts are transient. Disk full, constraint violations, and
    /// corruption are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Storage(sqlx::Error::PoolTimedOut) => true,
            Error::Storage(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("5") | Some("6") | Some("261") | Some("517"))
            }
            _ => false,
        }
    }

    /// Process exit code used by the `fh` binary for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => 2,
            Error::NotFound(_) => 3,
            Error::Provider(_) | Error::Timeout(_) => 4,
            Error::Storage(_) => 5,
            Error::Io(_) | Error::Cancelled => 1,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Provider(e.to_string())
    }
}
