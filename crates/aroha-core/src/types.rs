//! Conversation data types.
//!
//! Public types are what the façade hands back after decryption. The
//! `*Payload` types are the JSON bodies sealed inside each record; they never
//! leave this crate.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::storage::RecordKind;

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(StoreError::InvalidInput(format!(
                "role must be \"user\" or \"assistant\" (got \"{}\")",
                other
            ))),
        }
    }
}

/// One decrypted conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    /// Record sequence number within the store
    pub seq: i64,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Opaque tag from the emotion classifier, if any
    pub emotion: Option<String>,
}

/// A record that was skipped while reading.
///
/// Carries only identifiers and the failure reason, never content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnreadableRecord {
    pub session_id: String,
    pub seq: i64,
    /// `None` when the stored kind discriminator itself is invalid
    pub kind: Option<RecordKind>,
    pub reason: String,
}

/// Result of a history read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct History {
    pub session_id: String,
    /// Readable turns, oldest first
    pub turns: Vec<Turn>,
    /// Records that could not be decrypted or decoded
    pub unreadable: Vec<UnreadableRecord>,
}

impl History {
    pub fn empty(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            turns: Vec::new(),
            unreadable: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Whether every turn record in the session could be read.
    pub fn is_complete(&self) -> bool {
        self.unreadable.is_empty()
    }

    /// Keep only the last `limit` turns.
    pub fn truncate_to_recent(&mut self, limit: usize) {
        if self.turns.len() > limit {
            let excess = self.turns.len() - limit;
            self.turns.drain(..excess);
        }
    }
}

/// Decrypted session metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Participant label given when the session began
    pub label: Option<String>,
    pub record_count: usize,
}

/// One logged display of crisis resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrisisAccess {
    pub seq: i64,
    pub timestamp: DateTime<Utc>,
    /// Identifiers of the resources that were shown
    pub resources: Vec<String>,
    pub emotion: Option<String>,
}

/// Crisis resource accesses of one session, read the same way as
/// [`History`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrisisLog {
    pub session_id: String,
    /// Readable entries, oldest first
    pub entries: Vec<CrisisAccess>,
    pub unreadable: Vec<UnreadableRecord>,
}

impl CrisisLog {
    pub fn empty(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            entries: Vec::new(),
            unreadable: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.unreadable.is_empty()
    }
}

/// Readable/unreadable counts for one record kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub readable: usize,
    pub unreadable: usize,
}

/// Outcome of a full store verification.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub sessions: usize,
    pub records: usize,
    pub by_kind: BTreeMap<RecordKind, KindCounts>,
    pub unreadable: Vec<UnreadableRecord>,
}

impl VerifyReport {
    pub fn readable(&self) -> usize {
        self.records - self.unreadable.len()
    }

    pub fn is_clean(&self) -> bool {
        self.unreadable.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TurnPayload {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SessionInfoPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FlagPayload {
    pub name: String,
    pub value: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CrisisPayload {
    pub resources: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
}
