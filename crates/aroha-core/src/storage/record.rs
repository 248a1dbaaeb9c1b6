//! Encrypted record representation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// XChaCha20-Poly1305 nonce length in bytes.
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Record type discriminator, stored unencrypted next to each record and
/// bound into its associated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    SessionInfo,
    Turn,
    Flag,
    CrisisAccess,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::SessionInfo,
        RecordKind::Turn,
        RecordKind::Flag,
        RecordKind::CrisisAccess,
    ];

    pub fn as_u8(self) -> u8 {
        match self {
            RecordKind::SessionInfo => 1,
            RecordKind::Turn => 2,
            RecordKind::Flag => 3,
            RecordKind::CrisisAccess => 4,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(RecordKind::SessionInfo),
            2 => Ok(RecordKind::Turn),
            3 => Ok(RecordKind::Flag),
            4 => Ok(RecordKind::CrisisAccess),
            other => Err(StoreError::malformed(
                "record",
                format!("unknown record kind {}", other),
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::SessionInfo => "session_info",
            RecordKind::Turn => "turn",
            RecordKind::Flag => "flag",
            RecordKind::CrisisAccess => "crisis_access",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk form of a single encrypted entry.
///
/// Nothing here is trusted: the discriminator and the nonce/tag lengths of
/// records loaded from disk are checked by the cipher envelope before use.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedRecord {
    pub discriminator: u8,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub tag: Vec<u8>,
}

impl EncryptedRecord {
    /// Decoded record kind.
    pub fn kind(&self) -> Result<RecordKind> {
        RecordKind::from_u8(self.discriminator)
    }
}

impl fmt::Debug for EncryptedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedRecord")
            .field("discriminator", &self.discriminator)
            .field("nonce_len", &self.nonce.len())
            .field("ciphertext_len", &self.ciphertext.len())
            .field("tag_len", &self.tag.len())
            .finish()
    }
}

/// Identifies one appended record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordHandle {
    pub session_id: String,
    pub seq: i64,
}

/// A record as read back from the store.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub handle: RecordHandle,
    pub record: EncryptedRecord,
    /// Structural problem found while loading the row, e.g. a nonce column
    /// that no longer holds a blob. Such a record can never be opened.
    pub defect: Option<String>,
}
