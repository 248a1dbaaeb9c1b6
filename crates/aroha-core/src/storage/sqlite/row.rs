//! Row types for record store queries.

use chrono::{DateTime, Utc};
use rusqlite::types::ValueRef;

use crate::error::{Result, StoreError};
use crate::storage::record::{EncryptedRecord, RecordHandle, StoredRecord};
use crate::storage::traits::SessionSummary;

/// Raw row data from the records table, before parsing into domain types.
///
/// Columns that can be damaged independently of the row are read without a
/// type conversion; `None` means the stored value had the wrong type.
#[derive(Debug)]
pub struct RecordRow {
    pub seq: i64,
    pub session_id: String,
    pub kind: Option<i64>,
    pub nonce: Option<Vec<u8>>,
    pub ciphertext: Option<Vec<u8>>,
    pub tag: Option<Vec<u8>>,
}

impl RecordRow {
    pub const COLUMNS: &'static str = "seq, session_id, kind, nonce, ciphertext, tag";

    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            session_id: row.get(1)?,
            kind: match row.get_ref(2)? {
                ValueRef::Integer(value) => Some(value),
                _ => None,
            },
            nonce: blob(row, 3)?,
            ciphertext: blob(row, 4)?,
            tag: blob(row, 5)?,
        })
    }
}

fn blob(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<Option<Vec<u8>>> {
    Ok(match row.get_ref(index)? {
        ValueRef::Blob(bytes) => Some(bytes.to_vec()),
        _ => None,
    })
}

impl From<RecordRow> for StoredRecord {
    fn from(row: RecordRow) -> Self {
        let mut damaged = Vec::new();

        // Out-of-range discriminators become 0, which the envelope rejects as
        // malformed when the record is opened.
        let discriminator = match row.kind {
            Some(kind) => u8::try_from(kind).unwrap_or(0),
            None => {
                damaged.push("kind");
                0
            }
        };
        let mut column = |value: Option<Vec<u8>>, name: &'static str| {
            value.unwrap_or_else(|| {
                damaged.push(name);
                Vec::new()
            })
        };
        let nonce = column(row.nonce, "nonce");
        let ciphertext = column(row.ciphertext, "ciphertext");
        let tag = column(row.tag, "tag");

        let defect = (!damaged.is_empty()).then(|| {
            format!(
                "{} column{} the wrong storage type",
                damaged.join(", "),
                if damaged.len() == 1 { " has" } else { "s have" }
            )
        });

        StoredRecord {
            handle: RecordHandle {
                session_id: row.session_id,
                seq: row.seq,
            },
            record: EncryptedRecord {
                discriminator,
                nonce,
                ciphertext,
                tag,
            },
            defect,
        }
    }
}

/// Raw row data from the sessions table joined with its record count.
#[derive(Debug)]
pub struct SessionRow {
    pub id: String,
    pub created_at: String,
    pub record_count: i64,
}

impl TryFrom<SessionRow> for SessionSummary {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self> {
        let created_at = parse_timestamp(&row.created_at)?;
        Ok(SessionSummary {
            id: row.id,
            created_at,
            record_count: usize::try_from(row.record_count).unwrap_or(0),
        })
    }
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::StoreIo(format!("Invalid timestamp in store: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> RecordRow {
        RecordRow {
            seq: 7,
            session_id: "s1".to_string(),
            kind: Some(2),
            nonce: Some(vec![0; 24]),
            ciphertext: Some(vec![1, 2, 3]),
            tag: Some(vec![0; 16]),
        }
    }

    #[test]
    fn test_intact_row_has_no_defect() {
        let stored = StoredRecord::from(row());
        assert!(stored.defect.is_none());
        assert_eq!(stored.record.discriminator, 2);
        assert_eq!(stored.handle.seq, 7);
    }

    #[test]
    fn test_wrongly_typed_columns_become_defect() {
        let mut damaged = row();
        damaged.nonce = None;
        damaged.tag = None;

        let stored = StoredRecord::from(damaged);
        let defect = stored.defect.expect("defect should be recorded");
        assert!(defect.contains("nonce, tag columns"));
        assert!(stored.record.nonce.is_empty());
        assert_eq!(stored.record.discriminator, 2);
    }

    #[test]
    fn test_non_integer_kind_becomes_defect() {
        let mut damaged = row();
        damaged.kind = None;

        let stored = StoredRecord::from(damaged);
        assert_eq!(stored.record.discriminator, 0);
        assert!(stored.defect.expect("defect").starts_with("kind column has"));
    }
}
