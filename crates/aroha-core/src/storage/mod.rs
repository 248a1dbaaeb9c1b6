//! Storage layer for the conversation store.
//!
//! This module defines the `RecordStore` trait, the encrypted record format,
//! and the SQLite backend.
//!
//! ## Architecture
//!
//! The record store never sees plaintext. The façade seals every payload
//! with the cipher envelope before it gets here, and opens records after
//! they come back. What the store does know in the clear:
//! - session ids and their creation times
//! - record sequence numbers, kinds and append times
//! - the unencrypted header (format, cipher, KDF parameters)
//!
//! ## Guarantees
//!
//! - Appends are single transactions and serialized on one writer
//! - Records come back in append order
//! - A second process cannot open the same store (advisory lock)

pub mod lock;
pub mod record;
pub mod sqlite;
pub mod traits;

pub use lock::StoreLock;
pub use record::{EncryptedRecord, RecordHandle, RecordKind, StoredRecord, NONCE_LEN, TAG_LEN};
pub use sqlite::SqliteRecordStore;
pub use traits::{RecordCursor, RecordStore, SessionSummary, StoreHeader, DEFAULT_PAGE_SIZE};
