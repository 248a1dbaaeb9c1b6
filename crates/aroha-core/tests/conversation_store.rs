use std::fs;
use std::path::Path;

use aroha_core::crypto::{KdfParams, MIN_ITERATIONS, MIN_MEMORY_KIB};
use aroha_core::{ConversationStore, RecordKind, Role, SecretSource, StoreConfig, StoreError};
use tempfile::tempdir;

const SECRET: &str = "integration-master-secret";

fn kdf() -> KdfParams {
    KdfParams::new(
        b"integration-test-salt".to_vec(),
        MIN_ITERATIONS,
        MIN_MEMORY_KIB,
    )
    .expect("test kdf params should be valid")
}

fn config(dir: &Path) -> StoreConfig {
    StoreConfig::in_dir(dir, kdf()).with_secret(SECRET)
}

fn open(dir: &Path) -> ConversationStore {
    ConversationStore::open(config(dir)).expect("open should succeed")
}

fn flip_ciphertext_byte(db: &Path, seq: i64) {
    let conn = rusqlite::Connection::open(db).expect("db should open");
    let mut blob: Vec<u8> = conn
        .query_row(
            "SELECT ciphertext FROM records WHERE seq = ?",
            [seq],
            |row| row.get(0),
        )
        .expect("record should exist");
    blob[0] ^= 0x01;
    conn.execute(
        "UPDATE records SET ciphertext = ? WHERE seq = ?",
        rusqlite::params![blob, seq],
    )
    .expect("update should succeed");
}

#[test]
fn test_two_turns_survive_restart() {
    let dir = tempdir().expect("tempdir");

    {
        let store = open(dir.path());
        store
            .record_turn("s1", Role::User, "I feel anxious", Some("anxious"))
            .expect("record user turn");
        store
            .record_turn("s1", Role::Assistant, "I'm here for you", None)
            .expect("record assistant turn");
    }

    let store = open(dir.path());
    let history = store.history("s1").expect("history should succeed");

    assert!(history.is_complete());
    assert_eq!(history.turns.len(), 2);
    assert_eq!(history.turns[0].role, Role::User);
    assert_eq!(history.turns[0].content, "I feel anxious");
    assert_eq!(history.turns[0].emotion.as_deref(), Some("anxious"));
    assert_eq!(history.turns[1].role, Role::Assistant);
    assert_eq!(history.turns[1].content, "I'm here for you");
    assert_eq!(history.turns[1].emotion, None);
}

#[test]
fn test_order_preserved_across_restarts_between_appends() {
    let dir = tempdir().expect("tempdir");

    for content in ["T1", "T2", "T3"] {
        let store = open(dir.path());
        store
            .record_turn("s1", Role::User, content, None)
            .expect("record turn");
    }

    let store = open(dir.path());
    let contents: Vec<String> = store
        .history("s1")
        .expect("history should succeed")
        .turns
        .into_iter()
        .map(|turn| turn.content)
        .collect();
    assert_eq!(contents, vec!["T1", "T2", "T3"]);
}

#[test]
fn test_corrupted_turn_is_skipped_and_reported() {
    let dir = tempdir().expect("tempdir");

    let (h1, h2, h3) = {
        let store = open(dir.path());
        (
            store.record_turn("s1", Role::User, "T1", None).expect("T1"),
            store.record_turn("s1", Role::Assistant, "T2", None).expect("T2"),
            store.record_turn("s1", Role::User, "T3", None).expect("T3"),
        )
    };
    flip_ciphertext_byte(&dir.path().join("aroha.db"), h2.seq);

    let store = open(dir.path());
    let history = store.history("s1").expect("history should still succeed");

    let contents: Vec<&str> = history.turns.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec!["T1", "T3"]);
    assert_eq!(history.unreadable.len(), 1);
    assert_eq!(history.unreadable[0].seq, h2.seq);
    assert_eq!(history.unreadable[0].kind, Some(RecordKind::Turn));
    assert!(!history.unreadable[0].reason.contains("T2"));

    assert_eq!(store.read_turn(&h1).expect("T1 readable").content, "T1");
    assert_eq!(store.read_turn(&h3).expect("T3 readable").content, "T3");
    assert!(matches!(
        store.read_turn(&h2),
        Err(StoreError::Decryption { .. })
    ));
}

#[test]
fn test_wrong_secret_fails_with_decryption_error() {
    let dir = tempdir().expect("tempdir");
    let handle = {
        let store = open(dir.path());
        store
            .record_turn("s1", Role::User, "private words", None)
            .expect("record turn")
    };

    let store = ConversationStore::open(
        StoreConfig::in_dir(dir.path(), kdf()).with_secret("a-different-secret"),
    )
    .expect("open with another secret still succeeds");

    assert!(matches!(
        store.history("s1"),
        Err(StoreError::Decryption { .. })
    ));
    assert!(matches!(
        store.read_turn(&handle),
        Err(StoreError::Decryption { .. })
    ));
}

#[test]
fn test_unknown_session_reads_as_empty() {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path());

    let history = store.history("never-created").expect("history");
    assert!(history.is_empty());
    assert!(history.is_complete());
    assert!(store
        .crisis_log("never-created")
        .expect("crisis log")
        .entries
        .is_empty());
    assert!(matches!(
        store.session_info("never-created"),
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.delete_session("never-created"),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn test_key_derived_lazily_once() {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path());

    assert!(!store.is_key_derived());
    store.history("s1").expect("history of unknown session");
    assert!(!store.is_key_derived());

    store
        .record_turn("s1", Role::User, "hello", None)
        .expect("record turn");
    assert!(store.is_key_derived());
}

#[test]
fn test_generated_key_file_is_reused() {
    let dir = tempdir().expect("tempdir");
    let key_file = dir.path().join("aroha.key");

    {
        let store = ConversationStore::open(StoreConfig::in_dir(dir.path(), kdf()))
            .expect("first open generates a key");
        assert_eq!(store.secret_source(), SecretSource::Generated);
        store
            .record_turn("s1", Role::User, "remember me", None)
            .expect("record turn");
    }
    assert!(key_file.exists());
    let generated = fs::read_to_string(&key_file).expect("key file readable");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&key_file).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    let store = ConversationStore::open(StoreConfig::in_dir(dir.path(), kdf()))
        .expect("second open reads the key file");
    assert_eq!(store.secret_source(), SecretSource::KeyFile);
    assert_eq!(
        store.history("s1").expect("history").turns[0].content,
        "remember me"
    );
    assert_eq!(
        fs::read_to_string(&key_file).expect("key file readable"),
        generated
    );
}

#[test]
fn test_missing_key_file_with_existing_store_fails() {
    let dir = tempdir().expect("tempdir");
    {
        let store = ConversationStore::open(StoreConfig::in_dir(dir.path(), kdf()))
            .expect("first open generates a key");
        store
            .record_turn("s1", Role::User, "hello", None)
            .expect("record turn");
    }
    fs::remove_file(dir.path().join("aroha.key")).expect("remove key file");

    let result = ConversationStore::open(StoreConfig::in_dir(dir.path(), kdf()));
    assert!(matches!(result, Err(StoreError::KeyDerivation(_))));
    assert!(!dir.path().join("aroha.key").exists());
}

#[test]
fn test_header_mismatch_fails() {
    let dir = tempdir().expect("tempdir");
    drop(open(dir.path()));

    let other = KdfParams::new(
        b"integration-test-salt".to_vec(),
        MIN_ITERATIONS,
        MIN_MEMORY_KIB * 2,
    )
    .expect("valid params");
    let result = ConversationStore::open(StoreConfig::in_dir(dir.path(), other).with_secret(SECRET));
    assert!(matches!(result, Err(StoreError::KeyDerivation(_))));
}

#[test]
fn test_flags_latest_value_wins_across_reopen() {
    let dir = tempdir().expect("tempdir");

    {
        let store = open(dir.path());
        assert_eq!(store.flag("theme").expect("flag"), None);
        assert!(store.voice_mode().expect("voice mode default"));

        store.set_flag("theme", "dark").expect("set theme");
        store.set_flag("theme", "light").expect("set theme again");
        store.set_voice_mode(false).expect("disable voice");
    }

    let store = open(dir.path());
    assert_eq!(store.flag("theme").expect("flag").as_deref(), Some("light"));
    assert!(!store.voice_mode().expect("voice mode"));

    store.set_voice_mode(true).expect("enable voice");
    assert!(store.voice_mode().expect("voice mode"));

    // The settings stream is internal.
    assert!(store.sessions().expect("sessions").is_empty());
    assert!(matches!(
        store.history("__settings__"),
        Err(StoreError::InvalidInput(_))
    ));
}

#[test]
fn test_crisis_log_round_trip() {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path());

    store
        .record_turn("s1", Role::User, "I can't do this anymore", Some("crisis"))
        .expect("record turn");
    store
        .log_crisis_access("s1", &["lifeline", "crisis_text_line"], Some("crisis"))
        .expect("log access");
    store
        .log_crisis_access("s2", &["emergency_services"], None)
        .expect("log access");

    let log = store.crisis_log("s1").expect("crisis log");
    assert!(log.is_complete());
    assert_eq!(log.entries.len(), 1);
    assert_eq!(log.entries[0].resources, vec!["lifeline", "crisis_text_line"]);
    assert_eq!(log.entries[0].emotion.as_deref(), Some("crisis"));

    // Crisis entries are not turns.
    assert_eq!(store.history("s1").expect("history").turns.len(), 1);

    assert!(matches!(
        store.log_crisis_access("s1", &[], None),
        Err(StoreError::InvalidInput(_))
    ));
}

#[test]
fn test_begin_session_and_listing() {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path());

    let first = store.begin_session(Some("Mere")).expect("begin session");
    let second = store.begin_session(None).expect("begin session");
    assert_ne!(first, second);

    store
        .record_turn(&first, Role::User, "kia ora", None)
        .expect("record turn");

    let info = store.session_info(&first).expect("session info");
    assert_eq!(info.label.as_deref(), Some("Mere"));
    assert_eq!(info.record_count, 2);
    assert_eq!(store.session_info(&second).expect("info").label, None);

    let ids: Vec<String> = store
        .sessions()
        .expect("sessions")
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec![first.clone(), second]);

    // Session metadata is not part of the turn history.
    assert_eq!(store.history(&first).expect("history").turns.len(), 1);
}

#[test]
fn test_recent_history_keeps_last_turns() {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path());

    for i in 1..=12 {
        store
            .record_turn("s1", Role::User, &format!("turn {}", i), None)
            .expect("record turn");
    }

    let recent = store
        .recent_history("s1", aroha_core::DEFAULT_RECENT_TURNS)
        .expect("recent history");
    assert_eq!(recent.turns.len(), 10);
    assert_eq!(recent.turns[0].content, "turn 3");
    assert_eq!(recent.turns[9].content, "turn 12");
}

#[test]
fn test_delete_session_leaves_others() {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path());

    store.record_turn("s1", Role::User, "one", None).expect("s1");
    store.record_turn("s1", Role::User, "two", None).expect("s1");
    store.record_turn("s2", Role::User, "three", None).expect("s2");

    assert_eq!(store.delete_session("s1").expect("delete"), 2);
    assert!(store.history("s1").expect("history").is_empty());
    assert_eq!(store.history("s2").expect("history").turns.len(), 1);

    let ids: Vec<String> = store
        .sessions()
        .expect("sessions")
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec!["s2"]);
}

#[test]
fn test_second_open_fails_while_first_alive() {
    let dir = tempdir().expect("tempdir");
    let first = open(dir.path());

    let second = ConversationStore::open(config(dir.path()));
    assert!(matches!(second, Err(StoreError::StoreIo(_))));

    drop(first);
    assert!(ConversationStore::open(config(dir.path())).is_ok());
}

#[test]
fn test_no_plaintext_on_disk() {
    let dir = tempdir().expect("tempdir");
    let marker = "zebra-marmalade-confession";
    {
        let store = open(dir.path());
        store
            .record_turn("s1", Role::User, marker, Some("sad"))
            .expect("record turn");
        store.set_flag("secret_flag", marker).expect("set flag");
    }

    for entry in fs::read_dir(dir.path()).expect("read dir") {
        let path = entry.expect("dir entry").path();
        let bytes = fs::read(&path).expect("read file");
        let haystack = String::from_utf8_lossy(&bytes);
        assert!(
            !haystack.contains(marker),
            "plaintext found in {}",
            path.display()
        );
    }
}

#[test]
fn test_record_moved_to_other_session_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let moved = {
        let store = open(dir.path());
        store.record_turn("s2", Role::User, "mine", None).expect("s2");
        store.record_turn("s1", Role::User, "stolen", None).expect("s1")
    };

    let conn = rusqlite::Connection::open(dir.path().join("aroha.db")).expect("db");
    conn.execute(
        "UPDATE records SET session_id = 's2' WHERE seq = ?",
        [moved.seq],
    )
    .expect("move record");
    drop(conn);

    let store = open(dir.path());
    let history = store.history("s2").expect("history");
    assert_eq!(history.turns.len(), 1);
    assert_eq!(history.turns[0].content, "mine");
    assert_eq!(history.unreadable.len(), 1);
    assert_eq!(history.unreadable[0].seq, moved.seq);
}

#[test]
fn test_unknown_record_kind_is_reported() {
    let dir = tempdir().expect("tempdir");
    let odd = {
        let store = open(dir.path());
        store.record_turn("s1", Role::User, "fine", None).expect("turn");
        store.record_turn("s1", Role::User, "odd", None).expect("turn")
    };

    let conn = rusqlite::Connection::open(dir.path().join("aroha.db")).expect("db");
    conn.execute("UPDATE records SET kind = 99 WHERE seq = ?", [odd.seq])
        .expect("relabel record");
    drop(conn);

    let store = open(dir.path());
    let history = store.history("s1").expect("history");
    assert_eq!(history.turns.len(), 1);
    assert_eq!(history.unreadable.len(), 1);
    assert_eq!(history.unreadable[0].kind, None);
}

#[test]
fn test_wrongly_typed_column_is_skipped_and_reported() {
    let dir = tempdir().expect("tempdir");
    let bad = {
        let store = open(dir.path());
        store.record_turn("s1", Role::User, "first", None).expect("turn");
        let bad = store.record_turn("s1", Role::Assistant, "second", None).expect("turn");
        store.record_turn("s1", Role::User, "third", None).expect("turn");
        bad
    };

    let conn = rusqlite::Connection::open(dir.path().join("aroha.db")).expect("db");
    conn.execute("UPDATE records SET nonce = 'garbage' WHERE seq = ?", [bad.seq])
        .expect("retype nonce");
    drop(conn);

    let store = open(dir.path());
    let history = store.history("s1").expect("history");
    let contents: Vec<&str> = history.turns.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "third"]);
    assert_eq!(history.unreadable.len(), 1);
    assert_eq!(history.unreadable[0].seq, bad.seq);
    assert_eq!(history.unreadable[0].kind, Some(RecordKind::Turn));
    assert!(history.unreadable[0].reason.contains("nonce"));

    let report = store.verify().expect("verify");
    assert_eq!(report.unreadable.len(), 1);
}

#[test]
fn test_corrupt_only_turn_with_readable_session_info_is_reported() {
    let dir = tempdir().expect("tempdir");
    let (session, turn) = {
        let store = open(dir.path());
        let session = store.begin_session(Some("label")).expect("begin session");
        let turn = store
            .record_turn(&session, Role::User, "only turn", None)
            .expect("turn");
        (session, turn)
    };

    flip_ciphertext_byte(&dir.path().join("aroha.db"), turn.seq);

    let store = open(dir.path());
    let info = store.session_info(&session).expect("session info");
    assert_eq!(info.label.as_deref(), Some("label"));

    let history = store.history(&session).expect("history should not fail");
    assert!(history.turns.is_empty());
    assert_eq!(history.unreadable.len(), 1);
    assert_eq!(history.unreadable[0].seq, turn.seq);
}

#[test]
fn test_wrong_secret_still_detected_with_session_info() {
    let dir = tempdir().expect("tempdir");
    let session = {
        let store = open(dir.path());
        let session = store.begin_session(Some("label")).expect("begin session");
        store
            .record_turn(&session, Role::User, "hello", None)
            .expect("turn");
        session
    };

    let store =
        ConversationStore::open(StoreConfig::in_dir(dir.path(), kdf()).with_secret("other"))
            .expect("open");
    assert!(matches!(
        store.history(&session),
        Err(StoreError::Decryption { .. })
    ));
}

#[test]
fn test_unreadable_latest_flag_is_not_masked() {
    let dir = tempdir().expect("tempdir");
    let off = {
        let store = open(dir.path());
        store.set_voice_mode(true).expect("flag");
        store.set_voice_mode(false).expect("flag")
    };

    flip_ciphertext_byte(&dir.path().join("aroha.db"), off.seq);

    let store = open(dir.path());
    assert!(matches!(
        store.voice_mode(),
        Err(StoreError::MalformedRecord { .. })
    ));
    assert!(store.flag("voice_mode").is_err());

    // A value written after the damaged record is trusted again.
    store.set_voice_mode(false).expect("flag");
    assert!(!store.voice_mode().expect("voice mode"));
}

#[test]
fn test_unreadable_crisis_entry_is_reported() {
    let dir = tempdir().expect("tempdir");
    let second = {
        let store = open(dir.path());
        store
            .log_crisis_access("s1", &["crisis_text_line"], None)
            .expect("log access");
        store
            .log_crisis_access("s1", &["emergency_services"], Some("crisis"))
            .expect("log access")
    };

    flip_ciphertext_byte(&dir.path().join("aroha.db"), second.seq);

    let store = open(dir.path());
    let log = store.crisis_log("s1").expect("crisis log");
    assert_eq!(log.entries.len(), 1);
    assert_eq!(log.entries[0].resources, vec!["crisis_text_line"]);
    assert!(!log.is_complete());
    assert_eq!(log.unreadable[0].seq, second.seq);
    assert_eq!(log.unreadable[0].kind, Some(RecordKind::CrisisAccess));
}

#[test]
fn test_begin_session_writes_session_and_metadata_together() {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path());

    let session = store.begin_session(None).expect("begin session");
    let info = store.session_info(&session).expect("session info");
    assert_eq!(info.record_count, 1);
    assert_eq!(info.label, None);
}

#[test]
fn test_verify_counts_readable_and_unreadable() {
    let dir = tempdir().expect("tempdir");
    let bad = {
        let store = open(dir.path());
        store.begin_session(Some("label")).expect("session");
        store.record_turn("s1", Role::User, "a", None).expect("turn");
        store.set_voice_mode(false).expect("flag");
        store.record_turn("s1", Role::Assistant, "b", None).expect("turn")
    };

    {
        let store = open(dir.path());
        let report = store.verify().expect("verify");
        assert!(report.is_clean());
        assert_eq!(report.records, 4);
        assert_eq!(report.sessions, 2);
        assert_eq!(report.by_kind[&RecordKind::Turn].readable, 2);
        assert_eq!(report.by_kind[&RecordKind::Flag].readable, 1);
    }

    flip_ciphertext_byte(&dir.path().join("aroha.db"), bad.seq);

    let store = open(dir.path());
    let report = store.verify().expect("verify");
    assert!(!report.is_clean());
    assert_eq!(report.readable(), 3);
    assert_eq!(report.unreadable[0].seq, bad.seq);
    assert_eq!(report.by_kind[&RecordKind::Turn].unreadable, 1);
}

#[test]
fn test_normal_durability_round_trip() {
    let dir = tempdir().expect("tempdir");
    {
        let store = ConversationStore::open(
            config(dir.path()).with_durability(aroha_core::Durability::Normal),
        )
        .expect("open");
        store.record_turn("s1", Role::User, "quick", None).expect("turn");
    }

    let store = open(dir.path());
    assert_eq!(store.history("s1").expect("history").turns[0].content, "quick");
}
