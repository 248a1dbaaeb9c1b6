//! Record store trait definition.
//!
//! The `RecordStore` trait is the seam between the conversation façade and
//! the on-disk format. It only ever sees encrypted records.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::record::{EncryptedRecord, RecordHandle, StoredRecord};
use crate::error::{Result, StoreError};

/// Default number of records fetched per cursor page.
pub const DEFAULT_PAGE_SIZE: usize = 64;

/// Unencrypted store header.
///
/// Identifies the format and key-derivation parameters. Never contains key
/// material, the master secret, or the salt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreHeader {
    pub format_version: String,
    pub cipher: String,
    pub kdf: String,
    pub kdf_iterations: u32,
    pub kdf_memory_kib: u32,
    pub created_at: DateTime<Utc>,
}

/// Per-session bookkeeping kept in plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub record_count: usize,
}

/// Storage interface for encrypted conversation records.
///
/// All implementations must ensure:
/// - Records are append-only; a session is deleted as a whole
/// - Within a session, records come back in append order
/// - An append either fully commits or fully fails
/// - Appends are mutually exclusive
pub trait RecordStore: Send + Sync {
    /// Unencrypted header of this store.
    fn header(&self) -> &StoreHeader;

    /// Append a record to a session, creating the session if needed.
    ///
    /// Returns once the record is durable according to the store's
    /// durability policy.
    fn append(&self, session_id: &str, record: &EncryptedRecord) -> Result<RecordHandle>;

    /// Fetch a single record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the handle does not exist.
    fn get(&self, handle: &RecordHandle) -> Result<StoredRecord>;

    /// Up to `limit` records of a session with `seq > after_seq`, oldest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` for an unknown session.
    fn page(&self, session_id: &str, after_seq: i64, limit: usize) -> Result<Vec<StoredRecord>>;

    /// Look up a session.
    fn session(&self, session_id: &str) -> Result<Option<SessionSummary>>;

    /// All sessions, oldest first.
    fn sessions(&self) -> Result<Vec<SessionSummary>>;

    /// Remove a session and every record in it.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` for an unknown session.
    fn delete_session(&self, session_id: &str) -> Result<usize>;

    /// Every record in the store, oldest first, for verification.
    fn all_records(&self) -> Result<Vec<StoredRecord>>;

    /// Check structural integrity of the underlying storage.
    fn check_integrity(&self) -> Result<()>;

    /// Lazily iterate a session's records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` for an unknown session.
    fn records(&self, session_id: &str) -> Result<RecordCursor<'_, Self>>
    where
        Self: Sized,
    {
        if self.session(session_id)?.is_none() {
            return Err(StoreError::NotFound(format!("session {}", session_id)));
        }
        Ok(RecordCursor::new(self, session_id))
    }
}

/// Lazy, paged iterator over one session's records.
///
/// The cursor remembers the last sequence number it yielded, so a reader can
/// stop and later resume with [`RecordCursor::resume_after`].
pub struct RecordCursor<'a, S: RecordStore> {
    store: &'a S,
    session_id: String,
    after_seq: i64,
    page_size: usize,
    buffer: VecDeque<StoredRecord>,
    exhausted: bool,
}

impl<'a, S: RecordStore> RecordCursor<'a, S> {
    fn new(store: &'a S, session_id: &str) -> Self {
        Self {
            store,
            session_id: session_id.to_string(),
            after_seq: 0,
            page_size: DEFAULT_PAGE_SIZE,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Continue from just after `seq`.
    pub fn resume_after(mut self, seq: i64) -> Self {
        self.after_seq = seq;
        self.buffer.clear();
        self.exhausted = false;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sequence number of the last record handed out (0 before the first).
    pub fn position(&self) -> i64 {
        self.after_seq
    }

    fn fill(&mut self) -> Result<()> {
        let page = self
            .store
            .page(&self.session_id, self.after_seq, self.page_size)?;
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl<S: RecordStore> Iterator for RecordCursor<'_, S> {
    type Item = Result<StoredRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fill() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
        let record = self.buffer.pop_front()?;
        self.after_seq = record.handle.seq;
        Some(Ok(record))
    }
}
