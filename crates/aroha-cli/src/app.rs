//! Application context for the Aroha CLI.
//!
//! Bundles the parsed arguments with a lazily opened store, so commands
//! that never touch the store (completions, keygen) never open it.

use once_cell::unsync::OnceCell;

use aroha_core::{ConversationStore, StoreConfig};

use crate::cli::Cli;
use crate::config::load_store_config;

pub struct AppContext<'a> {
    cli: &'a Cli,
    store: OnceCell<ConversationStore>,
}

impl<'a> AppContext<'a> {
    pub fn new(cli: &'a Cli) -> Self {
        Self {
            cli,
            store: OnceCell::new(),
        }
    }

    pub fn quiet(&self) -> bool {
        self.cli.quiet
    }

    /// Validated store configuration from file, environment and flags.
    pub fn store_config(&self) -> anyhow::Result<StoreConfig> {
        load_store_config(self.cli)
    }

    /// The conversation store, opened on first use.
    pub fn store(&self) -> anyhow::Result<&ConversationStore> {
        self.store.get_or_try_init(|| {
            let config = self.store_config()?;
            Ok(ConversationStore::open(config)?)
        })
    }
}
