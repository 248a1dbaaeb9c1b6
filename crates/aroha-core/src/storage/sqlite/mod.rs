//! SQLite record store.
//!
//! One SQLite file in WAL mode. Records are individually encrypted before
//! they reach this module; the only plaintext columns are ids, sequence
//! numbers, record kinds and timestamps.
//!
//! A writer connection (behind a mutex) serializes appends. A separate
//! read-only connection serves queries, so reads never wait for an append's
//! fsync.

mod row;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension};

use crate::config::Durability;
use crate::crypto::KdfParams;
use crate::error::{Result, StoreError};
use crate::storage::lock::StoreLock;
use crate::storage::record::{EncryptedRecord, RecordHandle, StoredRecord};
use crate::storage::traits::{RecordStore, SessionSummary, StoreHeader};

use row::{parse_timestamp, RecordRow, SessionRow};

/// On-disk format version written to the header.
pub const FORMAT_VERSION: &str = "1";
pub const CIPHER_NAME: &str = "xchacha20poly1305";
pub const KDF_NAME: &str = "argon2id";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        created_at TEXT NOT NULL
    );

    -- Append-only; AUTOINCREMENT keeps seq monotonic even after deletes
    CREATE TABLE IF NOT EXISTS records (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        kind INTEGER NOT NULL,
        nonce BLOB NOT NULL,
        ciphertext BLOB NOT NULL,
        tag BLOB NOT NULL,
        created_at TEXT NOT NULL,

        FOREIGN KEY (session_id) REFERENCES sessions(id)
    );

    CREATE INDEX IF NOT EXISTS records_session_seq
    ON records (session_id, seq);
"#;

/// SQLite-backed [`RecordStore`].
pub struct SqliteRecordStore {
    path: PathBuf,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    header: StoreHeader,
    durability: Durability,
    // Dropped last, after both connections are closed.
    _lock: StoreLock,
}

impl SqliteRecordStore {
    /// Open the store at `path`, creating it if it does not exist.
    ///
    /// # Errors
    ///
    /// - `StoreIo` if the file cannot be opened, is locked by another
    ///   process, or has an unsupported format
    /// - `KeyDerivation` if the store was created with different KDF
    ///   parameters than `kdf`
    pub fn open(path: &Path, kdf: &KdfParams, durability: Durability) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::StoreIo(format!(
                        "Failed to create store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let lock = StoreLock::acquire(path)?;

        let writer = Connection::open(path)?;
        writer.busy_timeout(BUSY_TIMEOUT)?;
        writer.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = {};
             PRAGMA foreign_keys = ON;",
            durability.pragma()
        ))?;
        writer.execute_batch(SCHEMA)?;
        let header = load_or_init_header(&writer, kdf)?;

        let reader = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        reader.busy_timeout(BUSY_TIMEOUT)?;

        tracing::debug!(
            path = %path.display(),
            durability = %durability,
            format_version = %header.format_version,
            "record store opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            header,
            durability,
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn durability(&self) -> Durability {
        self.durability
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StoreError::StoreIo("SQLite writer connection poisoned".to_string()))
    }

    fn lock_reader(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StoreError::StoreIo("SQLite reader connection poisoned".to_string()))
    }

    fn session_exists(conn: &Connection, session_id: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM sessions WHERE id = ?", [session_id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }
}

/// Fixed-width UTC timestamp, so text ordering matches time ordering.
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn load_or_init_header(conn: &Connection, kdf: &KdfParams) -> Result<StoreHeader> {
    let get = |key: &str| -> Result<Option<String>> {
        Ok(conn
            .query_row("SELECT value FROM meta WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?)
    };

    let Some(format_version) = get("format_version")? else {
        let created_at = Utc::now();
        let header = StoreHeader {
            format_version: FORMAT_VERSION.to_string(),
            cipher: CIPHER_NAME.to_string(),
            kdf: KDF_NAME.to_string(),
            kdf_iterations: kdf.iterations(),
            kdf_memory_kib: kdf.memory_kib(),
            created_at,
        };
        let entries = [
            ("format_version", header.format_version.clone()),
            ("cipher", header.cipher.clone()),
            ("kdf", header.kdf.clone()),
            ("kdf_iterations", header.kdf_iterations.to_string()),
            ("kdf_memory_kib", header.kdf_memory_kib.to_string()),
            ("created_at", created_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        ];
        conn.execute_batch("BEGIN IMMEDIATE")?;
        for (key, value) in &entries {
            if let Err(err) = conn.execute(
                "INSERT INTO meta (key, value) VALUES (?, ?)",
                [*key, value.as_str()],
            ) {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(err.into());
            }
        }
        conn.execute_batch("COMMIT")?;
        tracing::info!("initialized new conversation store");
        return Ok(header);
    };

    if format_version != FORMAT_VERSION {
        return Err(StoreError::StoreIo(format!(
            "Unsupported store format version {} (expected {})",
            format_version, FORMAT_VERSION
        )));
    }

    let required = |key: &str| -> Result<String> {
        get(key)?.ok_or_else(|| StoreError::StoreIo(format!("Store header is missing {}", key)))
    };
    let parse_u32 = |key: &str| -> Result<u32> {
        required(key)?
            .parse::<u32>()
            .map_err(|_| StoreError::StoreIo(format!("Store header has invalid {}", key)))
    };

    let header = StoreHeader {
        format_version,
        cipher: required("cipher")?,
        kdf: required("kdf")?,
        kdf_iterations: parse_u32("kdf_iterations")?,
        kdf_memory_kib: parse_u32("kdf_memory_kib")?,
        created_at: parse_timestamp(&required("created_at")?)?,
    };

    if header.cipher != CIPHER_NAME || header.kdf != KDF_NAME {
        return Err(StoreError::StoreIo(format!(
            "Unsupported store cipher/kdf {}/{}",
            header.cipher, header.kdf
        )));
    }
    if header.kdf_iterations != kdf.iterations() || header.kdf_memory_kib != kdf.memory_kib() {
        return Err(StoreError::KeyDerivation(format!(
            "Store was created with {} iterations and {} KiB memory, \
             but {} iterations and {} KiB are configured",
            header.kdf_iterations,
            header.kdf_memory_kib,
            kdf.iterations(),
            kdf.memory_kib()
        )));
    }

    Ok(header)
}

impl RecordStore for SqliteRecordStore {
    fn header(&self) -> &StoreHeader {
        &self.header
    }

    fn append(&self, session_id: &str, record: &EncryptedRecord) -> Result<RecordHandle> {
        let mut conn = self.lock_writer()?;
        let now = now_timestamp();

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO sessions (id, created_at) VALUES (?, ?)",
            [session_id, now.as_str()],
        )?;
        tx.execute(
            "INSERT INTO records (session_id, kind, nonce, ciphertext, tag, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                session_id,
                i64::from(record.discriminator),
                record.nonce,
                record.ciphertext,
                record.tag,
                now,
            ],
        )?;
        let seq = tx.last_insert_rowid();
        tx.commit()?;

        tracing::debug!(
            session_id,
            seq,
            kind = record.discriminator,
            "record appended"
        );

        Ok(RecordHandle {
            session_id: session_id.to_string(),
            seq,
        })
    }

    fn get(&self, handle: &RecordHandle) -> Result<StoredRecord> {
        let conn = self.lock_reader()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM records WHERE seq = ? AND session_id = ?",
                    RecordRow::COLUMNS
                ),
                rusqlite::params![handle.seq, handle.session_id],
                RecordRow::from_row,
            )
            .optional()?;
        row.map(StoredRecord::from).ok_or_else(|| {
            StoreError::NotFound(format!(
                "record {} in session {}",
                handle.seq, handle.session_id
            ))
        })
    }

    fn page(&self, session_id: &str, after_seq: i64, limit: usize) -> Result<Vec<StoredRecord>> {
        let conn = self.lock_reader()?;
        if !Self::session_exists(&conn, session_id)? {
            return Err(StoreError::NotFound(format!("session {}", session_id)));
        }

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM records WHERE session_id = ? AND seq > ? ORDER BY seq ASC LIMIT ?",
            RecordRow::COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                rusqlite::params![session_id, after_seq, limit],
                RecordRow::from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows.into_iter().map(StoredRecord::from).collect())
    }

    fn session(&self, session_id: &str) -> Result<Option<SessionSummary>> {
        let conn = self.lock_reader()?;
        let row = conn
            .query_row(
                "SELECT s.id, s.created_at,
                        (SELECT COUNT(*) FROM records r WHERE r.session_id = s.id)
                 FROM sessions s WHERE s.id = ?",
                [session_id],
                |row| {
                    Ok(SessionRow {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                        record_count: row.get(2)?,
                    })
                },
            )
            .optional()?;
        row.map(SessionSummary::try_from).transpose()
    }

    fn sessions(&self) -> Result<Vec<SessionSummary>> {
        let conn = self.lock_reader()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.created_at,
                    (SELECT COUNT(*) FROM records r WHERE r.session_id = s.id)
             FROM sessions s ORDER BY s.created_at ASC, s.rowid ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SessionRow {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    record_count: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(SessionSummary::try_from).collect()
    }

    fn delete_session(&self, session_id: &str) -> Result<usize> {
        let mut conn = self.lock_writer()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM records WHERE session_id = ?", [session_id])?;
        let sessions = tx.execute("DELETE FROM sessions WHERE id = ?", [session_id])?;
        if sessions == 0 {
            // Dropping the transaction rolls it back.
            return Err(StoreError::NotFound(format!("session {}", session_id)));
        }
        tx.commit()?;

        tracing::info!(session_id, records = removed, "session deleted");
        Ok(removed)
    }

    fn all_records(&self) -> Result<Vec<StoredRecord>> {
        let conn = self.lock_reader()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM records ORDER BY seq ASC",
            RecordRow::COLUMNS
        ))?;
        let rows = stmt
            .query_map([], RecordRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().map(StoredRecord::from).collect())
    }

    fn check_integrity(&self) -> Result<()> {
        let conn = self.lock_reader()?;

        let mut stmt = conn.prepare("PRAGMA integrity_check")?;
        let results = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if results.len() != 1 || results[0] != "ok" {
            return Err(StoreError::StoreIo(format!(
                "SQLite integrity check failed: {}",
                results.join("; ")
            )));
        }

        let orphans: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE session_id NOT IN (SELECT id FROM sessions)",
            [],
            |row| row.get(0),
        )?;
        if orphans > 0 {
            return Err(StoreError::StoreIo(format!(
                "{} records belong to no session",
                orphans
            )));
        }

        Ok(())
    }
}
