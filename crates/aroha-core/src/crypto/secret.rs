//! Master secret resolution and the auto-generated key file.
//!
//! Resolution order:
//! 1. `ENCRYPTION_KEY` (passed in as the configured secret)
//! 2. the key file, if it exists
//! 3. a freshly generated secret written to the key file, but only when no
//!    store exists yet
//!
//! The key file is a single line holding 32 random bytes in base64, created
//! with `0600` permissions. It is written by [`resolve_master_secret`] (first
//! run) and by [`write_key_file`]; nothing else touches it, and it is never
//! regenerated while a store depends on it.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::config::ENV_ENCRYPTION_KEY;
use crate::error::{Result, StoreError};
use crate::fs::write_atomic;

/// Number of random bytes in a generated secret.
pub const GENERATED_SECRET_BYTES: usize = 32;

/// Where the master secret came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    /// Supplied through configuration (`ENCRYPTION_KEY`)
    Configured,
    /// Read from an existing key file
    KeyFile,
    /// Generated on this run and written to the key file
    Generated,
}

/// A resolved master secret.
pub struct MasterSecret {
    pub secret: SecretString,
    pub source: SecretSource,
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterSecret")
            .field("secret", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

/// Generate a new random master secret (base64 of 32 random bytes).
pub fn generate_secret() -> Result<SecretString> {
    let mut bytes = Zeroizing::new([0u8; GENERATED_SECRET_BYTES]);
    getrandom::getrandom(&mut bytes[..]).map_err(|e| {
        StoreError::KeyDerivation(format!("Failed to generate secret bytes: {}", e))
    })?;
    Ok(SecretString::from(STANDARD.encode(&bytes[..])))
}

/// Resolve the master secret for a store.
///
/// `store_exists` guards against silently replacing a lost key file: once a
/// store has been written, only the original secret can read it.
pub fn resolve_master_secret(
    configured: Option<SecretString>,
    key_file: &Path,
    store_exists: bool,
) -> Result<MasterSecret> {
    if let Some(secret) = configured {
        if secret.expose_secret().trim().is_empty() {
            return Err(StoreError::KeyDerivation(format!(
                "{} is set but empty",
                ENV_ENCRYPTION_KEY
            )));
        }
        return Ok(MasterSecret {
            secret,
            source: SecretSource::Configured,
        });
    }

    if key_file.exists() {
        let secret = read_key_file(key_file)?;
        tracing::debug!(path = %key_file.display(), "using master secret from key file");
        return Ok(MasterSecret {
            secret,
            source: SecretSource::KeyFile,
        });
    }

    if store_exists {
        return Err(StoreError::KeyDerivation(format!(
            "{} is not set and key file {} is missing, but a store already exists; \
             restore the key file or set {}",
            ENV_ENCRYPTION_KEY,
            key_file.display(),
            ENV_ENCRYPTION_KEY
        )));
    }

    let secret = generate_secret()?;
    write_key_file(key_file, &secret)?;
    tracing::info!(path = %key_file.display(), "generated new master secret");
    Ok(MasterSecret {
        secret,
        source: SecretSource::Generated,
    })
}

/// Read a key file written by [`write_key_file`].
pub fn read_key_file(path: &Path) -> Result<SecretString> {
    let contents = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
        StoreError::StoreIo(format!("Failed to read key file {}: {}", path.display(), e))
    })?);
    let line = contents.trim();
    if line.is_empty() {
        return Err(StoreError::KeyDerivation(format!(
            "Key file {} is empty",
            path.display()
        )));
    }
    Ok(SecretString::from(line.to_string()))
}

/// Write a new key file. Refuses to overwrite an existing one.
pub fn write_key_file(path: &Path, secret: &SecretString) -> Result<()> {
    if path.exists() {
        return Err(StoreError::InvalidInput(format!(
            "Key file already exists: {}",
            path.display()
        )));
    }
    let contents = Zeroizing::new(format!("{}\n", secret.expose_secret()));
    write_atomic(path, contents.as_bytes(), true).map_err(|e| {
        StoreError::StoreIo(format!("Failed to write key file {}: {}", path.display(), e))
    })
}

/// Set `ENCRYPTION_KEY=<secret>` in a dotenv-style file.
///
/// An existing `ENCRYPTION_KEY=` line is replaced; other lines are kept. The
/// file is created if missing.
pub fn write_env_secret(path: &Path, secret: &SecretString) -> Result<()> {
    let existing = if path.exists() {
        Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            StoreError::StoreIo(format!("Failed to read {}: {}", path.display(), e))
        })?)
    } else {
        Zeroizing::new(String::new())
    };

    let assignment = format!("{}={}", ENV_ENCRYPTION_KEY, secret.expose_secret());
    let prefix = format!("{}=", ENV_ENCRYPTION_KEY);
    let mut replaced = false;
    let mut lines: Vec<&str> = Vec::new();
    for line in existing.lines() {
        if line.trim_start().starts_with(&prefix) {
            if !replaced {
                lines.push(&assignment);
                replaced = true;
            }
        } else {
            lines.push(line);
        }
    }
    if !replaced {
        lines.push(&assignment);
    }
    let contents = Zeroizing::new(format!("{}\n", lines.join("\n")));

    write_atomic(path, contents.as_bytes(), true)
        .map_err(|e| StoreError::StoreIo(format!("Failed to write {}: {}", path.display(), e)))
}
