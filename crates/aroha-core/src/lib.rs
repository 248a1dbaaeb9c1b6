//! # Aroha Core
//!
//! Encrypted local conversation store for the Aroha voice assistant.
//!
//! Conversation turns, session metadata, settings flags and crisis-resource
//! access logs are each sealed with XChaCha20-Poly1305 under a key derived
//! (Argon2id) from a master secret, then appended to a single SQLite file.
//! Speech, chat completion and emotion classification live outside this
//! crate; it only accepts and returns plain text.
//!
//! ## Architecture
//!
//! - **crypto**: key derivation, master secret resolution, cipher envelope
//! - **storage**: `RecordStore` trait and the SQLite backend
//! - **store**: `ConversationStore`, the façade the assistant uses
//! - **config**: raw settings and their validation
//!
//! ## Example
//!
//! ```no_run
//! use aroha_core::{ConversationStore, Role, StoreSettings};
//!
//! let config = StoreSettings::from_env()?.validate()?;
//! let store = ConversationStore::open(config)?;
//!
//! store.record_turn("s1", Role::User, "I feel anxious", Some("anxious"))?;
//! store.record_turn("s1", Role::Assistant, "I'm here for you", None)?;
//!
//! for turn in store.history("s1")?.turns {
//!     println!("{}: {}", turn.role, turn.content);
//! }
//! # Ok::<(), aroha_core::StoreError>(())
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod fs;
pub mod storage;
pub mod store;
pub mod types;

pub use config::{Durability, StoreConfig, StoreSettings};
pub use crypto::{KdfParams, KeyHolder, SecretSource};
pub use error::{Result, StoreError};
pub use storage::{RecordHandle, RecordKind, RecordStore, SessionSummary, SqliteRecordStore};
pub use store::{ConversationStore, DEFAULT_RECENT_TURNS};
pub use types::{
    CrisisAccess, CrisisLog, History, Role, SessionInfo, Turn, UnreadableRecord, VerifyReport,
};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
