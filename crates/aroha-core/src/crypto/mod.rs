//! Cryptographic operations for the conversation store.
//!
//! - **Argon2id** turns the master secret into the store key
//! - **XChaCha20-Poly1305** seals every record individually
//!
//! ## Security Model
//!
//! - No plaintext conversation content reaches disk
//! - The derived key lives only in memory and is zeroized on drop
//! - The master secret is never written into the store; an auto-generated
//!   secret lives in its own key file
//!
//! ## Threat Model
//!
//! We defend against:
//! - Theft of the store file
//! - Tampering with or reshuffling individual records
//!
//! We do NOT defend against:
//! - Compromised OS / keylogger
//! - Theft of the key file together with the store

pub mod envelope;
pub mod key;
pub mod secret;

pub use key::{
    derive_key, DerivedKey, KdfParams, KeyHolder, KEY_LENGTH, MAX_ITERATIONS, MAX_MEMORY_KIB,
    MIN_ITERATIONS, MIN_MEMORY_KIB, MIN_SALT_LENGTH,
};
pub use secret::{generate_secret, resolve_master_secret, MasterSecret, SecretSource};
