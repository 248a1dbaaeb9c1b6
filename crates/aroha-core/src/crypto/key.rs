//! Key derivation using Argon2id.
//!
//! This module turns a master secret into the 256-bit store key. The
//! configured iteration count is Argon2id's time cost; memory cost is
//! configured alongside it.

use argon2::Argon2;
use once_cell::sync::OnceCell;
use secrecy::{ExposeSecret, SecretString};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::{Result, StoreError};

/// Smallest accepted iteration count (time cost).
pub const MIN_ITERATIONS: u32 = 2;

/// Largest accepted iteration count. Anything above this makes every process
/// start take minutes.
pub const MAX_ITERATIONS: u32 = 64;

/// Memory cost bounds in KiB (8 MiB ..= 1 GiB).
pub const MIN_MEMORY_KIB: u32 = 8 * 1024;
pub const MAX_MEMORY_KIB: u32 = 1024 * 1024;

/// Minimum salt length in bytes.
pub const MIN_SALT_LENGTH: usize = 16;

const ARGON2_PARALLELISM: u32 = 1;

/// Length of derived key in bytes (256 bits for XChaCha20-Poly1305).
pub const KEY_LENGTH: usize = 32;

/// Validated key-derivation parameters.
///
/// The salt is not secret, but it never leaves this struct on its way to
/// disk: the store header records only the iteration and memory costs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    salt: Vec<u8>,
    iterations: u32,
    memory_kib: u32,
}

impl KdfParams {
    /// Build parameters, rejecting malformed salts and out-of-range costs.
    pub fn new(salt: impl Into<Vec<u8>>, iterations: u32, memory_kib: u32) -> Result<Self> {
        let salt = salt.into();
        if salt.len() < MIN_SALT_LENGTH {
            return Err(StoreError::KeyDerivation(format!(
                "Salt must be at least {} bytes (got {})",
                MIN_SALT_LENGTH,
                salt.len()
            )));
        }
        if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&iterations) {
            let hint = if iterations > MAX_ITERATIONS {
                "; PBKDF2-style round counts such as 100000 do not apply"
            } else {
                ""
            };
            return Err(StoreError::KeyDerivation(format!(
                "Iteration count (KEY_ITERATIONS) is the Argon2id time cost and must be \
                 between {} and {} (got {}){}",
                MIN_ITERATIONS, MAX_ITERATIONS, iterations, hint
            )));
        }
        if !(MIN_MEMORY_KIB..=MAX_MEMORY_KIB).contains(&memory_kib) {
            return Err(StoreError::KeyDerivation(format!(
                "Memory cost must be between {} and {} KiB (got {})",
                MIN_MEMORY_KIB, MAX_MEMORY_KIB, memory_kib
            )));
        }
        Ok(Self {
            salt,
            iterations,
            memory_kib,
        })
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn memory_kib(&self) -> u32 {
        self.memory_kib
    }
}

/// A key derived from the master secret.
///
/// Key material is zeroized from memory when dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; KEY_LENGTH],
}

impl DerivedKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { key: bytes }
    }

    /// Raw key bytes. Use only for immediate cipher operations.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Derive the store key from a master secret.
///
/// Same secret, salt and costs always produce the same key, which is what
/// keeps the store readable across restarts.
///
/// # Examples
///
/// ```
/// use aroha_core::crypto::{derive_key, KdfParams};
///
/// let params = KdfParams::new(b"installation-salt-0001".to_vec(), 2, 8 * 1024).unwrap();
/// let key = derive_key("my-master-secret", &params).unwrap();
/// assert_eq!(key.as_bytes().len(), 32);
/// ```
pub fn derive_key(secret: &str, params: &KdfParams) -> Result<DerivedKey> {
    if secret.trim().is_empty() {
        return Err(StoreError::KeyDerivation(
            "Master secret cannot be empty".to_string(),
        ));
    }

    let argon_params = argon2::Params::new(
        params.memory_kib,
        params.iterations,
        ARGON2_PARALLELISM,
        Some(KEY_LENGTH),
    )
    .map_err(|e| StoreError::KeyDerivation(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon_params,
    );

    let mut key_bytes = Zeroizing::new([0u8; KEY_LENGTH]);
    argon2
        .hash_password_into(secret.as_bytes(), &params.salt, &mut key_bytes[..])
        .map_err(|e| StoreError::KeyDerivation(format!("Key derivation failed: {}", e)))?;

    Ok(DerivedKey::from_bytes(*key_bytes))
}

/// Holds the master secret and derives the store key on first use.
///
/// Derivation runs at most once per holder; every later call returns the
/// cached key. Dropping the holder drops (and zeroizes) the key.
pub struct KeyHolder {
    secret: SecretString,
    params: KdfParams,
    key: OnceCell<DerivedKey>,
}

impl KeyHolder {
    pub fn new(secret: SecretString, params: KdfParams) -> Self {
        Self {
            secret,
            params,
            key: OnceCell::new(),
        }
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    /// The derived key, deriving it now if this is the first request.
    pub fn key(&self) -> Result<&DerivedKey> {
        self.key.get_or_try_init(|| {
            tracing::debug!(
                iterations = self.params.iterations,
                memory_kib = self.params.memory_kib,
                "deriving store key"
            );
            derive_key(self.secret.expose_secret(), &self.params)
        })
    }

    /// Whether the key has been derived yet.
    pub fn is_derived(&self) -> bool {
        self.key.get().is_some()
    }
}

impl std::fmt::Debug for KeyHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHolder")
            .field("params", &self.params)
            .field("derived", &self.is_derived())
            .finish()
    }
}
