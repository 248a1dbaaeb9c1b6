//! Cipher envelope: XChaCha20-Poly1305 around individual records.
//!
//! Every call to [`seal`] draws a fresh random 24-byte nonce; nonces are
//! stored with the record and never derived from content. The record kind
//! and session id are authenticated as associated data, so a record moved to
//! another session or relabelled fails to open.

use chacha20poly1305::aead::{AeadCore, AeadInPlace, KeyInit, OsRng};
use chacha20poly1305::{Key, Tag, XChaCha20Poly1305, XNonce};
use zeroize::Zeroizing;

use crate::crypto::DerivedKey;
use crate::error::{Result, StoreError};
use crate::storage::record::{EncryptedRecord, RecordKind, NONCE_LEN, TAG_LEN};

const AAD_PREFIX: &[u8] = b"aroha/v1";

fn associated_data(kind: RecordKind, session_id: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_PREFIX.len() + 2 + session_id.len());
    aad.extend_from_slice(AAD_PREFIX);
    aad.push(0);
    aad.push(kind.as_u8());
    aad.extend_from_slice(session_id.as_bytes());
    aad
}

fn cipher(key: &DerivedKey) -> XChaCha20Poly1305 {
    XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
}

/// Encrypt `plaintext` into a new record.
///
/// # Examples
///
/// ```
/// use aroha_core::crypto::{derive_key, envelope, KdfParams};
/// use aroha_core::storage::RecordKind;
///
/// let params = KdfParams::new(b"installation-salt-0001".to_vec(), 2, 8 * 1024).unwrap();
/// let key = derive_key("my-master-secret", &params).unwrap();
///
/// let record = envelope::seal(&key, RecordKind::Turn, "s1", b"hello").unwrap();
/// let plaintext = envelope::open(&key, &record, "s1").unwrap();
/// assert_eq!(plaintext.as_slice(), b"hello");
/// ```
pub fn seal(
    key: &DerivedKey,
    kind: RecordKind,
    session_id: &str,
    plaintext: &[u8],
) -> Result<EncryptedRecord> {
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let aad = associated_data(kind, session_id);

    let mut buffer = plaintext.to_vec();
    let tag = cipher(key)
        .encrypt_in_place_detached(&nonce, &aad, &mut buffer)
        .map_err(|_| StoreError::StoreIo(format!("Encryption failed for {} record", kind)))?;

    Ok(EncryptedRecord {
        discriminator: kind.as_u8(),
        nonce: nonce.to_vec(),
        ciphertext: buffer,
        tag: tag.to_vec(),
    })
}

/// Decrypt and authenticate a record.
///
/// # Errors
///
/// - `MalformedRecord` if the kind discriminator is unknown or the nonce or
///   tag has the wrong length
/// - `Decryption` if authentication fails (wrong key, wrong session, or any
///   modified byte)
pub fn open(key: &DerivedKey, record: &EncryptedRecord, session_id: &str) -> Result<Vec<u8>> {
    let kind = record.kind()?;
    if record.nonce.len() != NONCE_LEN {
        return Err(StoreError::malformed(
            format!("{} record", kind),
            format!("nonce is {} bytes, expected {}", record.nonce.len(), NONCE_LEN),
        ));
    }
    if record.tag.len() != TAG_LEN {
        return Err(StoreError::malformed(
            format!("{} record", kind),
            format!("tag is {} bytes, expected {}", record.tag.len(), TAG_LEN),
        ));
    }

    let nonce = XNonce::from_slice(&record.nonce);
    let tag = Tag::from_slice(&record.tag);
    let aad = associated_data(kind, session_id);

    let mut buffer = Zeroizing::new(record.ciphertext.clone());
    cipher(key)
        .decrypt_in_place_detached(nonce, &aad, buffer.as_mut_slice(), tag)
        .map_err(|_| StoreError::Decryption {
            context: format!("{} record", kind),
        })?;

    Ok(std::mem::take(&mut *buffer))
}
