//! Config file discovery and layering.
//!
//! Settings are layered lowest to highest: config file, environment
//! (`ENCRYPTION_KEY`, `DB_SALT`, `KEY_ITERATIONS`, ...), then `--db`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use aroha_core::{StoreConfig, StoreSettings};

use crate::cli::Cli;

/// Default config path: `$XDG_CONFIG_HOME/aroha/config.toml`, falling back
/// to `~/.config/aroha/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_CONFIG_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("aroha").join("config.toml"));
        }
    }
    let home = std::env::var("HOME").context("HOME is not set; cannot locate config file")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("aroha")
        .join("config.toml"))
}

/// Read a config file. A missing file is only an error if it was named
/// explicitly.
pub fn read_config_file(path: &Path, explicit: bool) -> anyhow::Result<StoreSettings> {
    if !path.exists() {
        if explicit {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        return Ok(StoreSettings::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    Ok(StoreSettings::from_toml(&contents)?)
}

/// Merge file, environment and flag settings.
pub fn layer_settings(
    file: StoreSettings,
    env: StoreSettings,
    db_override: Option<&Path>,
) -> StoreSettings {
    let mut merged = file.overlay(env);
    if let Some(db) = db_override {
        merged.store.path = Some(db.to_path_buf());
    }
    merged
}

pub fn load_store_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let (path, explicit) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (default_config_path()?, false),
    };
    let file = read_config_file(&path, explicit)?;
    let env = StoreSettings::from_env()?;

    let config = layer_settings(file, env, cli.db.as_deref()).validate()?;
    tracing::debug!(
        db = %config.db_path.display(),
        key_file = %config.key_file.display(),
        "configuration loaded"
    );
    Ok(config)
}
