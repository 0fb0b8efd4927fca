// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON file store with atomic writes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use super::KeyValueStore;

/// File name used inside the state directory.
pub const SESSION_FILE: &str = "session.json";

/// Key-value store persisted as one JSON object on disk.
///
/// Every mutation rewrites the whole file (write tmp + rename), so readers
/// never observe a half-applied change.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`. A missing or corrupt file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match load(&path) {
            Ok(entries) => entries,
            Err(e) => {
                if path.exists() {
                    tracing::warn!(path = %path.display(), err = %e, "ignoring unreadable session file");
                }
                BTreeMap::new()
            }
        };
        Self { path, entries: Mutex::new(entries) }
    }

    /// Open `session.json` inside `dir`, creating the directory if needed.
    pub fn in_dir(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self::open(dir.join(SESSION_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> anyhow::Result<()> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        f(&mut next);
        save(&self.path, &next)?;
        *entries = next;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.mutate(|m| {
            m.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.mutate(|m| {
            m.remove(key);
        })
    }

    fn remove_many(&self, keys: &[&str]) -> anyhow::Result<()> {
        self.mutate(|m| {
            for key in keys {
                m.remove(*key);
            }
        })
    }
}

fn load(path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Write `entries` next to `path` under a per-write temp name, then rename
/// over `path`. The temp file is removed if the rename fails.
fn save(path: &Path, entries: &BTreeMap<String, String>) -> anyhow::Result<()> {
    static SEQ: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_string_pretty(entries)?;
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let tmp = path.with_file_name(format!(
        "{file_name}.{}.{}.tmp",
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::write(&tmp, json)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        if let Err(cleanup) = std::fs::remove_file(&tmp) {
            tracing::warn!(path = %tmp.display(), err = %cleanup, "failed to remove temp session file");
        }
        return Err(e.into());
    }
    Ok(())
}
