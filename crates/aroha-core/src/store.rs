//! Conversation store façade.
//!
//! `ConversationStore` is what the assistant talks to. It owns the key
//! holder and a record store, seals every payload before it is appended and
//! opens records on the way back out.
//!
//! Reads are skip-and-report: a record that fails to decrypt or decode is
//! listed in [`History::unreadable`] and logged (sequence and kind only),
//! and the remaining records are still returned.

use std::path::Path;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::StoreConfig;
use crate::crypto::{envelope, resolve_master_secret, KeyHolder, SecretSource};
use crate::error::{Result, StoreError};
use crate::storage::{
    RecordHandle, RecordKind, RecordStore, SessionSummary, SqliteRecordStore, StoreHeader,
    StoredRecord,
};
use crate::types::{
    CrisisAccess, CrisisLog, CrisisPayload, FlagPayload, History, Role, SessionInfo,
    SessionInfoPayload, Turn, TurnPayload, UnreadableRecord, VerifyReport,
};

/// Session ids starting with this prefix are reserved for internal streams.
pub const RESERVED_PREFIX: &str = "__";

/// Internal stream holding flag records.
pub const SETTINGS_SESSION: &str = "__settings__";

/// Flag backing [`ConversationStore::voice_mode`].
pub const VOICE_MODE_FLAG: &str = "voice_mode";

/// Number of turns the assistant loop feeds back as context.
pub const DEFAULT_RECENT_TURNS: usize = 10;

const MAX_SESSION_ID_LEN: usize = 128;

/// Records of other kinds kept while scanning, to tell a wrong key apart from
/// corrupted records of the scanned kind.
const KEY_EVIDENCE_LIMIT: usize = 16;
const MAX_FLAG_NAME_LEN: usize = 64;

/// Encrypted conversation store.
pub struct ConversationStore<S: RecordStore = SqliteRecordStore> {
    records: S,
    keys: KeyHolder,
    secret_source: SecretSource,
}

struct Scan<P> {
    items: Vec<(i64, P)>,
    unreadable: Vec<UnreadableRecord>,
}

impl ConversationStore<SqliteRecordStore> {
    /// Open (or create) the store described by `config`.
    ///
    /// Resolves the master secret first: a brand-new store gets a generated
    /// key file if no secret is configured. The key itself is derived lazily
    /// by the first operation that needs it.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let StoreConfig {
            db_path,
            key_file,
            secret,
            kdf,
            durability,
        } = config;

        let store_exists = db_path.exists();
        let master = resolve_master_secret(secret, &key_file, store_exists)?;
        let records = SqliteRecordStore::open(&db_path, &kdf, durability)?;

        tracing::info!(
            path = %db_path.display(),
            secret_source = ?master.source,
            "conversation store opened"
        );

        Ok(Self::with_parts(
            records,
            KeyHolder::new(master.secret, kdf),
            master.source,
        ))
    }

    pub fn path(&self) -> &Path {
        self.records.path()
    }
}

impl<S: RecordStore> ConversationStore<S> {
    /// Assemble a store from an already opened record store and key holder.
    pub fn with_parts(records: S, keys: KeyHolder, secret_source: SecretSource) -> Self {
        Self {
            records,
            keys,
            secret_source,
        }
    }

    pub fn header(&self) -> &StoreHeader {
        self.records.header()
    }

    /// Where this process got its master secret from.
    pub fn secret_source(&self) -> SecretSource {
        self.secret_source
    }

    pub fn is_key_derived(&self) -> bool {
        self.keys.is_derived()
    }

    /// Derive the store key now rather than on first use.
    ///
    /// Callers that want key-derivation failures at startup (instead of on
    /// the first turn) call this once after opening.
    pub fn unlock(&self) -> Result<()> {
        self.keys.key().map(|_| ())
    }

    /// Start a new session with a fresh UUIDv7 id.
    ///
    /// `label` (e.g. the participant's name) is stored encrypted in the
    /// session's metadata record.
    pub fn begin_session(&self, label: Option<&str>) -> Result<String> {
        self.keys.key()?;

        let session_id = Uuid::now_v7().to_string();
        if self.records.session(&session_id)?.is_some() {
            return Err(StoreError::InvalidInput(format!(
                "session {} already exists",
                session_id
            )));
        }

        // The append creates the session row in the same transaction.
        let payload = SessionInfoPayload {
            label: label.map(str::to_string),
            created_at: Utc::now(),
        };
        self.append_payload(&session_id, RecordKind::SessionInfo, &payload)?;

        tracing::info!(session_id = %session_id, "session started");
        Ok(session_id)
    }

    /// Append a turn, creating the session on first use.
    pub fn record_turn(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        emotion: Option<&str>,
    ) -> Result<RecordHandle> {
        validate_session_id(session_id)?;

        if self.records.session(session_id)?.is_none() {
            tracing::info!(session_id, "session started");
        }

        let payload = TurnPayload {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
            emotion: emotion.map(str::to_string),
        };
        self.append_payload(session_id, RecordKind::Turn, &payload)
    }

    /// All readable turns of a session, oldest first.
    ///
    /// An unknown session yields an empty history.
    ///
    /// # Errors
    ///
    /// Returns `Decryption` if the session has turn records and none of them
    /// authenticate, which means the master secret is wrong. Individual
    /// unreadable records are reported in [`History::unreadable`] instead.
    pub fn history(&self, session_id: &str) -> Result<History> {
        validate_session_id(session_id)?;

        let Some(scan) = self.scan::<TurnPayload>(session_id, RecordKind::Turn)? else {
            return Ok(History::empty(session_id));
        };

        Ok(History {
            session_id: session_id.to_string(),
            turns: scan
                .items
                .into_iter()
                .map(|(seq, payload)| turn_from_payload(seq, payload))
                .collect(),
            unreadable: scan.unreadable,
        })
    }

    /// The last `limit` readable turns of a session, oldest first.
    pub fn recent_history(&self, session_id: &str, limit: usize) -> Result<History> {
        let mut history = self.history(session_id)?;
        history.truncate_to_recent(limit);
        Ok(history)
    }

    /// Decrypt a single turn by handle.
    pub fn read_turn(&self, handle: &RecordHandle) -> Result<Turn> {
        let stored = self.records.get(handle)?;
        let kind = stored
            .record
            .kind()
            .map_err(|e| e.in_context(record_context(&stored)))?;
        if kind != RecordKind::Turn {
            return Err(StoreError::InvalidInput(format!(
                "record {} in session {} is a {} record, not a turn",
                handle.seq, handle.session_id, kind
            )));
        }

        let payload: TurnPayload = self.open_payload(&stored)?;
        Ok(turn_from_payload(stored.handle.seq, payload))
    }

    /// Metadata of one session.
    pub fn session_info(&self, session_id: &str) -> Result<SessionInfo> {
        validate_session_id(session_id)?;

        let summary = self
            .records
            .session(session_id)?
            .ok_or_else(|| StoreError::NotFound(format!("session {}", session_id)))?;

        let label = self
            .scan::<SessionInfoPayload>(session_id, RecordKind::SessionInfo)?
            .and_then(|scan| scan.items.into_iter().next())
            .and_then(|(_, payload)| payload.label);

        Ok(SessionInfo {
            id: summary.id,
            created_at: summary.created_at,
            label,
            record_count: summary.record_count,
        })
    }

    /// User sessions, oldest first. Internal streams are not listed.
    pub fn sessions(&self) -> Result<Vec<SessionSummary>> {
        Ok(self
            .records
            .sessions()?
            .into_iter()
            .filter(|session| !session.id.starts_with(RESERVED_PREFIX))
            .collect())
    }

    /// Remove a session and all of its records.
    ///
    /// Returns the number of records removed.
    pub fn delete_session(&self, session_id: &str) -> Result<usize> {
        validate_session_id(session_id)?;
        self.records.delete_session(session_id)
    }

    /// Persist a named setting. The latest value wins.
    pub fn set_flag(&self, name: &str, value: &str) -> Result<RecordHandle> {
        validate_flag_name(name)?;

        let payload = FlagPayload {
            name: name.to_string(),
            value: value.to_string(),
            timestamp: Utc::now(),
        };
        self.append_payload(SETTINGS_SESSION, RecordKind::Flag, &payload)
    }

    /// Current value of a setting, or `None` if it was never set.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecord` if a settings record newer than the latest
    /// readable value of `name` cannot be read, since it may hold a newer
    /// value of this flag.
    pub fn flag(&self, name: &str) -> Result<Option<String>> {
        validate_flag_name(name)?;

        let Some(scan) = self.scan::<FlagPayload>(SETTINGS_SESSION, RecordKind::Flag)? else {
            return Ok(None);
        };

        let latest = scan
            .items
            .into_iter()
            .rev()
            .find(|(_, payload)| payload.name == name);
        let latest_seq = latest.as_ref().map_or(0, |(seq, _)| *seq);

        if let Some(newer) = scan.unreadable.iter().rev().find(|r| r.seq > latest_seq) {
            return Err(StoreError::malformed(
                format!("flag {}", name),
                format!(
                    "settings record {} is unreadable and may hold a newer value ({})",
                    newer.seq, newer.reason
                ),
            ));
        }

        Ok(latest.map(|(_, payload)| payload.value))
    }

    /// Whether spoken replies are enabled. Defaults to on.
    pub fn voice_mode(&self) -> Result<bool> {
        match self.flag(VOICE_MODE_FLAG)?.as_deref() {
            None | Some("on") => Ok(true),
            Some("off") => Ok(false),
            Some(other) => Err(StoreError::malformed(
                format!("flag {}", VOICE_MODE_FLAG),
                format!("unexpected value \"{}\"", other),
            )),
        }
    }

    pub fn set_voice_mode(&self, enabled: bool) -> Result<RecordHandle> {
        self.set_flag(VOICE_MODE_FLAG, if enabled { "on" } else { "off" })
    }

    /// Record that crisis resources were shown in a session.
    pub fn log_crisis_access(
        &self,
        session_id: &str,
        resources: &[&str],
        emotion: Option<&str>,
    ) -> Result<RecordHandle> {
        validate_session_id(session_id)?;
        if resources.is_empty() {
            return Err(StoreError::InvalidInput(
                "at least one crisis resource must be logged".to_string(),
            ));
        }

        let payload = CrisisPayload {
            resources: resources.iter().map(|r| r.to_string()).collect(),
            timestamp: Utc::now(),
            emotion: emotion.map(str::to_string),
        };
        self.append_payload(session_id, RecordKind::CrisisAccess, &payload)
    }

    /// Crisis resource accesses logged in a session, oldest first.
    ///
    /// Unreadable entries are skipped and listed in
    /// [`CrisisLog::unreadable`], as with [`Self::history`].
    pub fn crisis_log(&self, session_id: &str) -> Result<CrisisLog> {
        validate_session_id(session_id)?;

        let Some(scan) = self.scan::<CrisisPayload>(session_id, RecordKind::CrisisAccess)? else {
            return Ok(CrisisLog::empty(session_id));
        };

        Ok(CrisisLog {
            session_id: session_id.to_string(),
            entries: scan
                .items
                .into_iter()
                .map(|(seq, payload)| CrisisAccess {
                    seq,
                    timestamp: payload.timestamp,
                    resources: payload.resources,
                    emotion: payload.emotion,
                })
                .collect(),
            unreadable: scan.unreadable,
        })
    }

    /// Check storage integrity and try to open every record.
    pub fn verify(&self) -> Result<VerifyReport> {
        self.records.check_integrity()?;

        let mut report = VerifyReport {
            sessions: self.sessions()?.len(),
            ..VerifyReport::default()
        };

        for stored in self.records.all_records()? {
            report.records += 1;
            let kind = stored.record.kind().ok();

            match self.open_payload::<serde_json::Value>(&stored) {
                Ok(_) => {
                    if let Some(kind) = kind {
                        report.by_kind.entry(kind).or_default().readable += 1;
                    }
                }
                Err(err) if err.is_record_level() => {
                    if let Some(kind) = kind {
                        report.by_kind.entry(kind).or_default().unreadable += 1;
                    }
                    report.unreadable.push(UnreadableRecord {
                        session_id: stored.handle.session_id.clone(),
                        seq: stored.handle.seq,
                        kind,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        tracing::info!(
            records = report.records,
            unreadable = report.unreadable.len(),
            "store verified"
        );
        Ok(report)
    }

    fn append_payload<P: Serialize>(
        &self,
        session_id: &str,
        kind: RecordKind,
        payload: &P,
    ) -> Result<RecordHandle> {
        let key = self.keys.key()?;
        let plaintext = Zeroizing::new(serde_json::to_vec(payload)?);
        let record = envelope::seal(key, kind, session_id, &plaintext)?;
        let handle = self.records.append(session_id, &record)?;

        tracing::debug!(session_id, seq = handle.seq, kind = %kind, "record stored");
        Ok(handle)
    }

    /// Whether the current key opens at least one of `records`.
    fn any_authenticates(&self, records: &[StoredRecord]) -> Result<bool> {
        let key = self.keys.key()?;
        Ok(records.iter().any(|stored| {
            stored.defect.is_none()
                && envelope::open(key, &stored.record, &stored.handle.session_id)
                    .map(Zeroizing::new)
                    .is_ok()
        }))
    }

    fn open_payload<P: DeserializeOwned>(&self, stored: &StoredRecord) -> Result<P> {
        if let Some(defect) = &stored.defect {
            return Err(StoreError::malformed(record_context(stored), defect.clone()));
        }
        let key = self.keys.key()?;
        let plaintext = Zeroizing::new(
            envelope::open(key, &stored.record, &stored.handle.session_id)
                .map_err(|e| e.in_context(record_context(stored)))?,
        );
        serde_json::from_slice(&plaintext)
            .map_err(|e| StoreError::from(e).in_context(record_context(stored)))
    }

    /// Open every record of `kind` in a session, skipping unreadable ones.
    ///
    /// Records with an invalid kind discriminator are reported too, since
    /// they might have been of the requested kind. Returns `None` for an
    /// unknown session.
    fn scan<P: DeserializeOwned>(
        &self,
        session_id: &str,
        kind: RecordKind,
    ) -> Result<Option<Scan<P>>> {
        let cursor = match self.records.records(session_id) {
            Ok(cursor) => cursor,
            Err(StoreError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };

        let mut scan = Scan {
            items: Vec::new(),
            unreadable: Vec::new(),
        };
        let mut auth_failures = 0usize;
        let mut other_kinds = Vec::new();

        for stored in cursor {
            let stored = stored?;
            let stored_kind = stored.record.kind().ok();
            if stored_kind.is_some_and(|k| k != kind) {
                if other_kinds.len() < KEY_EVIDENCE_LIMIT {
                    other_kinds.push(stored);
                }
                continue;
            }

            match self.open_payload::<P>(&stored) {
                Ok(payload) => scan.items.push((stored.handle.seq, payload)),
                Err(err) if err.is_record_level() => {
                    if matches!(err, StoreError::Decryption { .. }) {
                        auth_failures += 1;
                    }
                    tracing::warn!(
                        session_id,
                        seq = stored.handle.seq,
                        kind = ?stored_kind,
                        error = %err,
                        "skipping unreadable record"
                    );
                    scan.unreadable.push(UnreadableRecord {
                        session_id: session_id.to_string(),
                        seq: stored.handle.seq,
                        kind: stored_kind,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        // Nothing authenticated, not even a record of another kind in the
        // same session: the secret is wrong, not the data.
        if scan.items.is_empty()
            && auth_failures > 0
            && auth_failures == scan.unreadable.len()
            && !self.any_authenticates(&other_kinds)?
        {
            return Err(StoreError::Decryption {
                context: format!(
                    "session {}: no {} record could be authenticated (wrong master secret?)",
                    session_id, kind
                ),
            });
        }

        Ok(Some(scan))
    }
}

fn turn_from_payload(seq: i64, payload: TurnPayload) -> Turn {
    Turn {
        seq,
        role: payload.role,
        content: payload.content,
        timestamp: payload.timestamp,
        emotion: payload.emotion,
    }
}

fn record_context(stored: &StoredRecord) -> String {
    format!(
        "session {} record {}",
        stored.handle.session_id, stored.handle.seq
    )
}

fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.trim().is_empty() {
        return Err(StoreError::InvalidInput(
            "session id must not be empty".to_string(),
        ));
    }
    if session_id.starts_with(RESERVED_PREFIX) {
        return Err(StoreError::InvalidInput(format!(
            "session ids starting with \"{}\" are reserved",
            RESERVED_PREFIX
        )));
    }
    if session_id.len() > MAX_SESSION_ID_LEN || session_id.chars().any(char::is_control) {
        return Err(StoreError::InvalidInput(format!(
            "session id must be at most {} printable characters",
            MAX_SESSION_ID_LEN
        )));
    }
    Ok(())
}

fn validate_flag_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_FLAG_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !valid {
        return Err(StoreError::InvalidInput(format!(
            "invalid flag name \"{}\" (use letters, digits, '_', '-' or '.')",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_validation() {
        assert!(validate_session_id("s1").is_ok());
        assert!(validate_session_id("0190c6a2-7b4e-7000-8000-000000000000").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("   ").is_err());
        assert!(validate_session_id(SETTINGS_SESSION).is_err());
        assert!(validate_session_id("__anything").is_err());
        assert!(validate_session_id("line\nbreak").is_err());
        assert!(validate_session_id(&"x".repeat(MAX_SESSION_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_flag_name_validation() {
        assert!(validate_flag_name(VOICE_MODE_FLAG).is_ok());
        assert!(validate_flag_name("ui.theme-v2").is_ok());
        assert!(validate_flag_name("").is_err());
        assert!(validate_flag_name("has space").is_err());
        assert!(validate_flag_name(&"f".repeat(MAX_FLAG_NAME_LEN + 1)).is_err());
    }
}
