/// All errors that can be returned by a LedgerStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("ledger file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The backing file exists but does not hold a valid ledger.
    #[error("ledger file {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
