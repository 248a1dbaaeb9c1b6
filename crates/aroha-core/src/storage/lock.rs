//! Cross-process exclusion for a store file.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Result, StoreError};

/// Exclusive advisory lock on `<store>.lock`, held for the lifetime of an
/// open store. A second process (or a second open in the same process)
/// fails fast instead of interleaving writes.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    pub fn acquire(store_path: &Path) -> Result<Self> {
        let path = lock_path(store_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                StoreError::StoreIo(format!("Failed to open lock file {}: {}", path.display(), e))
            })?;

        file.try_lock_exclusive().map_err(|_| {
            StoreError::StoreIo(format!(
                "Store {} is in use by another process",
                store_path.display()
            ))
        })?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // The lock file itself stays; removing it would race a waiting opener.
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_path(store_path: &Path) -> PathBuf {
    let mut name = store_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    store_path.with_file_name(name)
}
