//! Error types for Aroha store operations.
//!
//! Errors carry enough context (session id, record sequence) to diagnose a
//! failure without ever including decrypted content. The CLI layer maps these
//! to user-facing messages.

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Core error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Master secret, salt or KDF parameters are unusable
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// Authentication failed while opening a record (wrong key or tampering)
    #[error("Decryption failed for {context}")]
    Decryption { context: String },

    /// Record is structurally invalid
    #[error("Malformed record {context}: {reason}")]
    MalformedRecord { context: String, reason: String },

    /// Underlying disk or SQLite failure
    #[error("Store I/O error: {0}")]
    StoreIo(String),

    /// Unknown session or record
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StoreError {
    pub(crate) fn malformed(context: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::MalformedRecord {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Replace the context of a record-level error (e.g. with the session id
    /// and sequence number once they are known). Other errors pass through.
    pub(crate) fn in_context(self, context: impl Into<String>) -> Self {
        match self {
            StoreError::Decryption { .. } => StoreError::Decryption {
                context: context.into(),
            },
            StoreError::MalformedRecord { reason, .. } => StoreError::MalformedRecord {
                context: context.into(),
                reason,
            },
            other => other,
        }
    }

    /// Whether this error only affects a single record.
    ///
    /// Record-level failures are skipped and reported by history reads
    /// instead of aborting the whole read.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            StoreError::Decryption { .. } | StoreError::MalformedRecord { .. }
        )
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::StoreIo(err.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::StoreIo(format!("SQLite: {}", err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        // serde_json messages can quote input; keep only the location.
        StoreError::malformed(
            "payload",
            format!(
                "{:?} error at line {} column {}",
                err.classify(),
                err.line(),
                err.column()
            ),
        )
    }
}
