// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;

use super::*;

fn pair(access: &str, refresh: &str) -> TokenPair {
    TokenPair { access_token: access.into(), refresh_token: refresh.into(), expires_in_secs: 3600 }
}

fn alice() -> UserProfile {
    UserProfile {
        id: 7,
        name: "Alice".into(),
        email: "alice@example.com".into(),
        email_verified: true,
        image_url: None,
        provider: "local".into(),
    }
}

/// Memory store that rejects writes to selected keys.
#[derive(Default)]
struct RejectingStore {
    inner: MemoryStore,
    reject: HashSet<&'static str>,
}

impl KeyValueStore for RejectingStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if self.reject.contains(key) {
            anyhow::bail!("quota exceeded");
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.inner.remove(key)
    }
}

#[test]
fn save_then_load_returns_everything() -> anyhow::Result<()> {
    let store = SessionStore::in_memory();
    store.save(&pair("a1", "r1"), Some(&alice()));

    let loaded = store.load();
    assert_eq!(loaded.access_token.as_deref(), Some("a1"));
    assert_eq!(loaded.refresh_token.as_deref(), Some("r1"));
    assert_eq!(loaded.user, Some(alice()));
    assert!(loaded.has_tokens());
    Ok(())
}

#[test]
fn load_from_empty_store() -> anyhow::Result<()> {
    let loaded = SessionStore::in_memory().load();
    assert_eq!(loaded, StoredSession::default());
    assert!(!loaded.has_tokens());
    Ok(())
}

#[test]
fn load_returns_partial_subset() -> anyhow::Result<()> {
    let kv = Arc::new(MemoryStore::default());
    kv.set(REFRESH_TOKEN_KEY, "r-only")?;
    let loaded = SessionStore::new(kv).load();
    assert_eq!(loaded.access_token, None);
    assert_eq!(loaded.refresh_token.as_deref(), Some("r-only"));
    assert!(!loaded.has_tokens());
    Ok(())
}

#[test]
fn malformed_profile_degrades_to_absent() -> anyhow::Result<()> {
    let kv = Arc::new(MemoryStore::default());
    kv.set(ACCESS_TOKEN_KEY, "a1")?;
    kv.set(USER_KEY, "{not json")?;
    let loaded = SessionStore::new(kv).load();
    assert_eq!(loaded.access_token.as_deref(), Some("a1"));
    assert_eq!(loaded.user, None);
    Ok(())
}

#[test]
fn failed_write_leaves_other_keys_intact() -> anyhow::Result<()> {
    let kv = Arc::new(RejectingStore {
        reject: HashSet::from([USER_KEY]),
        ..Default::default()
    });
    kv.inner.set(USER_KEY, r#"{"id":1,"name":"Old","email":"old@example.com"}"#)?;
    let store = SessionStore::new(kv);

    store.save(&pair("a2", "r2"), Some(&alice()));

    let loaded = store.load();
    assert_eq!(loaded.access_token.as_deref(), Some("a2"));
    assert_eq!(loaded.refresh_token.as_deref(), Some("r2"));
    assert_eq!(loaded.user.map(|u| u.name), Some("Old".to_owned()));
    Ok(())
}

#[test]
fn clear_removes_all_keys_including_timer_hint() -> anyhow::Result<()> {
    let kv = Arc::new(MemoryStore::default());
    let store = SessionStore::new(Arc::clone(&kv) as Arc<dyn KeyValueStore>);
    store.save(&pair("a1", "r1"), Some(&alice()));
    store.set_timer_hint("timer-1");
    assert_eq!(kv.len(), 4);

    store.clear();
    assert!(kv.is_empty());

    store.clear();
    assert!(kv.is_empty());
    Ok(())
}

#[test]
fn take_timer_hint_consumes_it() -> anyhow::Result<()> {
    let store = SessionStore::in_memory();
    store.set_timer_hint("timer-9");
    assert_eq!(store.take_timer_hint().as_deref(), Some("timer-9"));
    assert_eq!(store.take_timer_hint(), None);
    Ok(())
}

#[test]
fn file_store_survives_reopen() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    {
        let store = SessionStore::new(Arc::new(FileStore::in_dir(dir.path())?));
        store.save(&pair("a1", "r1"), Some(&alice()));
    }

    let reopened = SessionStore::new(Arc::new(FileStore::in_dir(dir.path())?));
    let loaded = reopened.load();
    assert_eq!(loaded.access_token.as_deref(), Some("a1"));
    assert_eq!(loaded.user, Some(alice()));
    Ok(())
}

#[test]
fn file_store_clear_empties_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = Arc::new(FileStore::in_dir(dir.path())?);
    let store = SessionStore::new(Arc::clone(&file) as Arc<dyn KeyValueStore>);
    store.save(&pair("a1", "r1"), None);
    store.set_timer_hint("t");

    store.clear();

    let on_disk: std::collections::BTreeMap<String, String> =
        serde_json::from_str(&std::fs::read_to_string(file.path())?)?;
    assert!(on_disk.is_empty());
    Ok(())
}

#[test]
fn file_store_ignores_corrupt_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join(file::SESSION_FILE);
    std::fs::write(&path, "garbage")?;

    let store = SessionStore::new(Arc::new(FileStore::open(&path)));
    assert_eq!(store.load(), StoredSession::default());

    store.save(&pair("a1", "r1"), None);
    assert_eq!(store.load().access_token.as_deref(), Some("a1"));
    Ok(())
}

#[test]
fn file_store_leaves_no_temp_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = SessionStore::new(Arc::new(FileStore::in_dir(dir.path())?));
    store.save(&pair("a1", "r1"), Some(&alice()));
    store.clear();

    let names: Vec<String> = std::fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec![file::SESSION_FILE.to_owned()]);
    Ok(())
}

#[test]
fn file_store_failed_rename_leaves_no_temp_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let target = dir.path().join(file::SESSION_FILE);
    std::fs::create_dir(&target)?;
    std::fs::write(target.join("occupied"), "x")?;

    let file = FileStore::open(&target);
    assert!(file.set(ACCESS_TOKEN_KEY, "a1").is_err());
    assert_eq!(file.get(ACCESS_TOKEN_KEY)?, None);

    let temps = std::fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(temps, 0);
    Ok(())
}
