use thiserror::Error;

use tern_proto::DeviceAddress;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Distinct from [`StoreError::NotFound`]: a missing session means the
    /// caller needs a pre-key handshake, not that a lookup went wrong.
    #[error("No session for {0}")]
    NoSession(DeviceAddress),

    #[error("Local identity already exists and is immutable")]
    IdentityExists,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The in-memory mutation was applied but the durable write failed.
    /// Memory and disk disagree until the operation is retried.
    #[error("Durable write failed after in-memory update: {source}")]
    WriteThrough { source: sqlx::Error },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] tern_crypto::CryptoError),
}

impl StoreError {
    /// Tag a backend failure that happened after the in-memory map was
    /// already updated, so callers can tell partial from total failure.
    pub(crate) fn into_write_through(self) -> Self {
        match self {
            StoreError::Database(source) => StoreError::WriteThrough { source },
            other => other,
        }
    }
}
