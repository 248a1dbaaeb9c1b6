//! Store configuration.
//!
//! Raw settings come from a TOML file and/or the environment
//! (`ENCRYPTION_KEY`, `DB_SALT`, `KEY_ITERATIONS`, ...). They are only
//! trusted after [`StoreSettings::validate`] has turned them into a
//! [`StoreConfig`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::crypto::KdfParams;
use crate::error::{Result, StoreError};

/// Salt used when `DB_SALT` is not configured.
pub const DEFAULT_SALT: &str = "aroha_default_salt";

/// Argon2id time cost used when `KEY_ITERATIONS` is not configured.
pub const DEFAULT_ITERATIONS: u32 = 3;

/// Argon2id memory cost (KiB) used when `KEY_MEMORY_KIB` is not configured.
pub const DEFAULT_MEMORY_KIB: u32 = 64 * 1024;

pub const ENV_ENCRYPTION_KEY: &str = "ENCRYPTION_KEY";
pub const ENV_DB_SALT: &str = "DB_SALT";
pub const ENV_KEY_ITERATIONS: &str = "KEY_ITERATIONS";
pub const ENV_KEY_MEMORY_KIB: &str = "KEY_MEMORY_KIB";
pub const ENV_DB_PATH: &str = "AROHA_DB_PATH";
pub const ENV_KEY_FILE: &str = "AROHA_KEY_FILE";
pub const ENV_DURABILITY: &str = "AROHA_DURABILITY";

/// How hard an append works to reach the disk before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// Every acknowledged append is synced (`synchronous = FULL`).
    #[default]
    Full,
    /// Best effort: WAL with `synchronous = NORMAL`. A power loss can drop
    /// the most recent commits but never leaves a half-written record.
    Normal,
}

impl Durability {
    pub(crate) fn pragma(self) -> &'static str {
        match self {
            Durability::Full => "FULL",
            Durability::Normal => "NORMAL",
        }
    }
}

impl FromStr for Durability {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Durability::Full),
            "normal" => Ok(Durability::Normal),
            other => Err(StoreError::Config(format!(
                "durability must be \"full\" or \"normal\" (got \"{}\")",
                other
            ))),
        }
    }
}

impl fmt::Display for Durability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Durability::Full => write!(f, "full"),
            Durability::Normal => write!(f, "normal"),
        }
    }
}

/// Raw, unvalidated settings as read from a config file or the environment.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub kdf: KdfSection,
    /// Master secret. Only ever taken from the environment.
    #[serde(skip)]
    pub secret: Option<SecretString>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoreSection {
    pub path: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub durability: Option<Durability>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct KdfSection {
    pub salt: Option<String>,
    pub iterations: Option<u32>,
    pub memory_kib: Option<u32>,
}

impl StoreSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let iterations = get(ENV_KEY_ITERATIONS)
            .map(|value| parse_u32(ENV_KEY_ITERATIONS, &value))
            .transpose()?;
        let memory_kib = get(ENV_KEY_MEMORY_KIB)
            .map(|value| parse_u32(ENV_KEY_MEMORY_KIB, &value))
            .transpose()?;
        let durability = get(ENV_DURABILITY)
            .map(|value| value.parse::<Durability>())
            .transpose()?;

        Ok(Self {
            store: StoreSection {
                path: get(ENV_DB_PATH).map(PathBuf::from),
                key_file: get(ENV_KEY_FILE).map(PathBuf::from),
                durability,
            },
            kdf: KdfSection {
                salt: get(ENV_DB_SALT),
                iterations,
                memory_kib,
            },
            secret: get(ENV_ENCRYPTION_KEY).map(SecretString::from),
        })
    }

    /// Parse settings from TOML config file contents.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| StoreError::Config(format!("Invalid config: {}", e)))
    }

    /// Layer `other` on top of `self`; values set in `other` win.
    pub fn overlay(self, other: StoreSettings) -> StoreSettings {
        StoreSettings {
            store: StoreSection {
                path: other.store.path.or(self.store.path),
                key_file: other.store.key_file.or(self.store.key_file),
                durability: other.store.durability.or(self.store.durability),
            },
            kdf: KdfSection {
                salt: other.kdf.salt.or(self.kdf.salt),
                iterations: other.kdf.iterations.or(self.kdf.iterations),
                memory_kib: other.kdf.memory_kib.or(self.kdf.memory_kib),
            },
            secret: other.secret.or(self.secret),
        }
    }

    /// Validate the settings, filling in documented defaults.
    pub fn validate(self) -> Result<StoreConfig> {
        let db_path = match self.store.path {
            Some(path) => path,
            None => xdg_data_dir()?.join("aroha.db"),
        };
        let key_file = match self.store.key_file {
            Some(path) => path,
            None => xdg_data_dir()?.join("aroha.key"),
        };
        if db_path == key_file {
            return Err(StoreError::Config(
                "key file must live outside the store file".to_string(),
            ));
        }

        let salt = match self.kdf.salt {
            Some(salt) => salt,
            None => {
                tracing::warn!(
                    "{} is not set; using the built-in default salt",
                    ENV_DB_SALT
                );
                DEFAULT_SALT.to_string()
            }
        };
        let kdf = KdfParams::new(
            salt.into_bytes(),
            self.kdf.iterations.unwrap_or(DEFAULT_ITERATIONS),
            self.kdf.memory_kib.unwrap_or(DEFAULT_MEMORY_KIB),
        )
        .map_err(|err| match err {
            StoreError::KeyDerivation(message) => StoreError::Config(message),
            other => other,
        })?;

        Ok(StoreConfig {
            db_path,
            key_file,
            secret: self.secret,
            kdf,
            durability: self.store.durability.unwrap_or_default(),
        })
    }
}

/// Validated configuration consumed by [`crate::ConversationStore::open`].
#[derive(Debug)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub key_file: PathBuf,
    pub secret: Option<SecretString>,
    pub kdf: KdfParams,
    pub durability: Durability,
}

impl StoreConfig {
    /// Configuration rooted in `dir`, mostly useful for tests and tooling.
    pub fn in_dir(dir: &Path, kdf: KdfParams) -> Self {
        Self {
            db_path: dir.join("aroha.db"),
            key_file: dir.join("aroha.key"),
            secret: None,
            kdf,
            durability: Durability::Full,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(SecretString::from(secret.into()));
        self
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }
}

/// Default data directory (`$XDG_DATA_HOME/aroha` or `~/.local/share/aroha`).
pub fn xdg_data_dir() -> Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_DATA_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("aroha"));
        }
    }
    let home = std::env::var("HOME").map_err(|_| {
        StoreError::Config("HOME is not set; cannot resolve default paths".to_string())
    })?;
    Ok(PathBuf::from(home).join(".local").join("share").join("aroha"))
}

fn parse_u32(name: &str, value: &str) -> Result<u32> {
    value.trim().parse::<u32>().map_err(|_| {
        StoreError::Config(format!(
            "{} must be a positive integer (got \"{}\")",
            name, value
        ))
    })
}
