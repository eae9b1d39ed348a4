//! Integration tests for backups and restore.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use emberdb::backup::{
    self, BackupChain, BackupError, BackupErrorKind, BackupManifest, BackupReport, CaptureKind,
    RestoreRequest, WaitOutcome, CHECKPOINT_FILE, MANIFEST_FILE,
};
use emberdb::{Database, DatabaseConfig, DocumentStore, Error, RetentionMode};
use emberdb_storage::journal::{replay_segments, RecoveryMode};
use serde_json::{json, Value};
use tempfile::tempdir;

fn linear_config(dir: &Path) -> DatabaseConfig {
    DatabaseConfig::builder()
        .data_directory(dir)
        .retention_mode(RetentionMode::Linear)
        .incremental_backups_allowed(true)
        .build()
        .expect("failed to build config")
}

fn open_linear(dir: &Path) -> Database {
    Database::open(linear_config(dir)).expect("failed to open database")
}

fn backup(db: &Database, location: &Path, incremental: bool) -> BackupReport {
    db.start_backup(location, incremental, Value::Null).expect("failed to start backup");
    match db.wait_for_backup(None).expect("no backup handle") {
        WaitOutcome::Completed(report) => report,
        other => panic!("backup did not complete: {other:?}"),
    }
}

fn backup_error(db: &Database, location: &Path, incremental: bool) -> BackupErrorKind {
    db.start_backup(location, incremental, Value::Null).expect("failed to start backup");
    match db.wait_for_backup(None).expect("no backup handle") {
        WaitOutcome::Failed(e) => e.kind(),
        other => panic!("backup should have failed: {other:?}"),
    }
}

fn restore_into(location: &Path, target: PathBuf) -> Database {
    Database::restore(&RestoreRequest::new(location, &target).defrag(true), |_| {})
        .expect("failed to restore");
    open_linear(&target)
}

fn email(db: &Database, key: &str) -> Value {
    db.get(key)
        .expect("failed to read document")
        .unwrap_or_else(|| panic!("missing {key}"))
        .body["email"]
        .clone()
}

fn names(db: &Database) -> Vec<String> {
    db.documents().expect("failed to list documents").into_iter().map(|d| d.key).collect()
}

// ============================================================================
// Full and Incremental Chains
// ============================================================================

#[test]
fn test_full_then_incremental_restores_both_documents() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let restored = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    let db = open_linear(data.path());
    db.put("users/1", &json!({"email": "ayende@ayende.com"})).expect("put");
    let full = backup(&db, &location, false);
    assert_eq!(full.kind, CaptureKind::Full);
    assert_eq!(full.ordinal, 0);
    assert_eq!(full.covers.start, 0);

    db.put("users/2", &json!({"email": "itamar@ayende.com"})).expect("put");
    let inc = backup(&db, &location, true);
    assert_eq!(inc.kind, CaptureKind::Incremental);
    assert_eq!(inc.ordinal, 1);
    assert_eq!(inc.covers.start, full.covers.end);

    let restored = restore_into(&location, restored.path().join("db"));
    assert_eq!(names(&restored), vec!["users/1", "users/2"]);
    assert_eq!(email(&restored, "users/1"), "ayende@ayende.com");
    assert_eq!(email(&restored, "users/2"), "itamar@ayende.com");
    assert_eq!(restored.documents().expect("documents"), db.documents().expect("documents"));
}

#[test]
fn test_chain_of_two_incrementals_with_pauses() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let restored = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    let db = open_linear(data.path());
    db.put("users/1", &json!({"email": "ayende@ayende.com"})).expect("put");
    backup(&db, &location, false);

    thread::sleep(Duration::from_secs(1));
    db.put("users/2", &json!({"email": "itamar@ayende.com"})).expect("put");
    backup(&db, &location, true);

    thread::sleep(Duration::from_secs(1));
    db.put("users/3", &json!({"email": "michael.yarichuk@ayende.com"})).expect("put");
    let last = backup(&db, &location, true);
    assert_eq!(last.ordinal, 2);
    assert_eq!(last.last_txid(), db.last_txid().expect("last txid"));

    let summaries = backup::verify(&location).expect("chain should verify");
    assert_eq!(summaries.len(), 3);
    assert_eq!(summaries[0].kind, CaptureKind::Full);

    let target = restored.path().join("db");
    let request = RestoreRequest::new(&location, &target).defrag(true);
    let mut lines = Vec::new();
    let report =
        Database::restore(&request, |line| lines.push(line.to_string())).expect("restore");
    assert_eq!(report.captures_applied, 3);
    assert_eq!(report.documents, 3);
    assert_eq!(report.replayed_through, last.last_txid());
    assert!(!lines.is_empty());

    let restored = open_linear(&target);
    assert_eq!(email(&restored, "users/1"), "ayende@ayende.com");
    assert_eq!(email(&restored, "users/2"), "itamar@ayende.com");
    assert_eq!(email(&restored, "users/3"), "michael.yarichuk@ayende.com");
    assert_eq!(restored.documents().expect("documents"), db.documents().expect("documents"));
}

#[test]
fn test_deletes_survive_restore() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let restored = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    let db = open_linear(data.path());
    db.put("a", &json!(1)).expect("put");
    db.put("b", &json!(2)).expect("put");
    backup(&db, &location, false);
    db.delete("a").expect("delete");
    db.put("b", &json!(3)).expect("put");
    backup(&db, &location, true);

    let restored = restore_into(&location, restored.path().join("db"));
    assert!(restored.get("a").expect("get").is_none());
    assert_eq!(restored.get("b").expect("get").expect("missing b").body, json!(3));
}

#[test]
fn test_empty_incremental_is_legal() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let restored = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    let db = open_linear(data.path());
    db.put("a", &json!(1)).expect("put");
    let full = backup(&db, &location, false);
    let inc = backup(&db, &location, true);
    assert!(inc.covers.is_empty());
    assert_eq!(inc.covers.start, full.covers.end);
    assert_eq!(inc.segments_copied, 0);

    let restored = restore_into(&location, restored.path().join("db"));
    assert_eq!(names(&restored), vec!["a"]);
}

#[test]
fn test_full_backup_replaces_previous_chain() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    let db = open_linear(data.path());
    db.put("a", &json!(1)).expect("put");
    backup(&db, &location, false);
    db.put("b", &json!(2)).expect("put");
    backup(&db, &location, true);
    db.put("c", &json!(3)).expect("put");
    backup(&db, &location, false);

    let summaries = backup::verify(&location).expect("verify");
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].covers.end, db.last_txid().expect("last txid"));
}

#[test]
fn test_metadata_is_stored_in_manifest() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    let db = open_linear(data.path());
    db.put("a", &json!(1)).expect("put");
    db.start_backup(&location, false, json!({"requested_by": "nightly"})).expect("start");
    assert!(db.wait_for_backup(None).expect("handle").is_completed());

    let manifest = BackupManifest::load(&location).expect("load").expect("manifest missing");
    assert_eq!(manifest.metadata, json!({"requested_by": "nightly"}));
}

// ============================================================================
// Concurrent Writers
// ============================================================================

#[test]
fn test_backups_during_concurrent_writes_restore_everything() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let restored = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    let config = DatabaseConfig::builder()
        .data_directory(data.path())
        .retention_mode(RetentionMode::Linear)
        .incremental_backups_allowed(true)
        .max_segment_size(4096)
        .build()
        .expect("config");
    let db = Database::open(config).expect("open");
    db.put("seed", &json!({"n": -1})).expect("put");

    let mut captures = Vec::new();
    thread::scope(|scope| {
        let writer = scope.spawn(|| {
            for i in 0..400 {
                let key = format!("docs/{}", i % 97);
                db.put(&key, &json!({"n": i, "pad": "x".repeat(64)})).expect("put");
                if i % 7 == 0 {
                    db.delete(&format!("docs/{}", (i + 13) % 97)).expect("delete");
                }
            }
        });

        captures.push(backup(&db, &location, false));
        for _ in 0..6 {
            thread::sleep(Duration::from_millis(5));
            db.run_maintenance().expect("maintenance");
            captures.push(backup(&db, &location, true));
        }
        writer.join().expect("writer panicked");
    });
    db.run_maintenance().expect("maintenance");
    captures.push(backup(&db, &location, true));

    for pair in captures.windows(2) {
        assert_eq!(pair[1].ordinal, pair[0].ordinal + 1);
        assert_eq!(pair[1].covers.start, pair[0].covers.end);
    }
    let last = captures.last().expect("captures");
    assert_eq!(last.last_txid(), db.last_txid().expect("last txid"));

    let restored = restore_into(&location, restored.path().join("db"));
    assert_eq!(restored.documents().expect("documents"), db.documents().expect("documents"));
    assert_eq!(restored.last_txid().expect("last txid"), db.last_txid().expect("last txid"));
}

// ============================================================================
// Refused Requests
// ============================================================================

#[test]
fn test_incremental_with_circular_retention_is_misconfigured() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    let config = DatabaseConfig::builder()
        .data_directory(data.path())
        .retention_mode(RetentionMode::Circular)
        .incremental_backups_allowed(true)
        .build()
        .expect("config");
    let db = Database::open(config).expect("open");

    let err = db.start_backup(&location, true, Value::Null).expect_err("should be refused");
    assert!(matches!(err, Error::Backup(BackupError::Misconfiguration(_))));
    assert!(!location.exists());
    assert!(db.wait_for_backup(None).is_none());
}

#[test]
fn test_incremental_not_allowed_is_misconfigured() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    let config = DatabaseConfig::builder()
        .data_directory(data.path())
        .retention_mode(RetentionMode::Linear)
        .incremental_backups_allowed(false)
        .build()
        .expect("config");
    let db = Database::open(config).expect("open");

    let err = db.start_backup(&location, true, Value::Null).expect_err("should be refused");
    assert!(matches!(err, Error::Backup(BackupError::Misconfiguration(_))));
    assert!(!location.exists());
}

#[test]
fn test_in_memory_database_cannot_back_up() {
    let backups = tempdir().expect("tempdir");
    let config = DatabaseConfig::builder().run_in_memory(true).build().expect("config");
    let db = Database::open(config).expect("open");

    let err = db.start_backup(backups.path(), false, Value::Null).expect_err("refused");
    assert!(matches!(err, Error::Backup(BackupError::Misconfiguration(_))));
}

#[test]
fn test_concurrent_backup_is_refused() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");

    let db = open_linear(data.path());
    for i in 0..200 {
        db.put(&format!("docs/{i}"), &json!({"n": i, "pad": "x".repeat(512)})).expect("put");
    }

    let mut refused = false;
    for attempt in 0..20 {
        let location = backups.path().join(format!("chain-{attempt}"));
        db.start_backup(&location, false, Value::Null).expect("first start");
        let second = db.start_backup(backups.path().join("other"), false, Value::Null);
        let outcome = db.wait_for_backup(None).expect("handle");
        match second {
            Err(Error::Backup(e)) => {
                assert_eq!(e.kind(), BackupErrorKind::BackupAlreadyRunning);
                assert!(e.is_retryable());
                assert!(outcome.is_completed());
                refused = true;
                break;
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => {}
        }
    }
    assert!(refused, "a second backup was never refused while one was running");
    assert!(!db.is_backup_running());
}

#[test]
fn test_incremental_without_full_capture_fails() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");

    let db = open_linear(data.path());
    db.put("a", &json!(1)).expect("put");
    let kind = backup_error(&db, &backups.path().join("nothing-here"), true);
    assert_eq!(kind, BackupErrorKind::ChainDiscontinuity);
    assert!(!db.is_backup_running());
}

#[test]
fn test_incremental_to_a_different_location_fails() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");

    let db = open_linear(data.path());
    db.put("a", &json!(1)).expect("put");
    backup(&db, &backups.path().join("first"), false);
    backup(&db, &backups.path().join("second"), false);
    db.put("b", &json!(2)).expect("put");

    let kind = backup_error(&db, &backups.path().join("first"), true);
    assert_eq!(kind, BackupErrorKind::ChainDiscontinuity);
    backup(&db, &backups.path().join("second"), true);
}

// ============================================================================
// Restore Failures
// ============================================================================

#[test]
fn test_restore_into_non_empty_target_is_refused() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let target = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    let db = open_linear(data.path());
    db.put("a", &json!(1)).expect("put");
    backup(&db, &location, false);
    fs::write(target.path().join("leftover"), b"x").expect("write");

    let err = Database::restore(&RestoreRequest::new(&location, target.path()), |_| {})
        .expect_err("should refuse");
    assert!(matches!(err, Error::Backup(BackupError::TargetNotEmpty(_))));
    assert_eq!(fs::read(target.path().join("leftover")).expect("read"), b"x");
}

#[test]
fn test_restore_onto_a_regular_file_is_refused() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let target = tempdir().expect("tempdir");
    let location = backups.path().join("chain");
    let file = target.path().join("db");

    let db = open_linear(data.path());
    db.put("a", &json!(1)).expect("put");
    backup(&db, &location, false);
    fs::write(&file, b"x").expect("write");

    let err = Database::restore(&RestoreRequest::new(&location, &file), |_| {})
        .expect_err("should refuse");
    assert!(matches!(err, Error::Backup(BackupError::TargetNotEmpty(_))));
    assert_eq!(fs::read(&file).expect("read"), b"x");
}

#[test]
fn test_missing_incremental_manifest_breaks_chain() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let restored = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    let db = open_linear(data.path());
    db.put("a", &json!(1)).expect("put");
    backup(&db, &location, false);
    db.put("b", &json!(2)).expect("put");
    let middle = backup(&db, &location, true);
    db.put("c", &json!(3)).expect("put");
    backup(&db, &location, true);

    fs::remove_file(middle.capture_dir.join(MANIFEST_FILE)).expect("remove manifest");

    let request = RestoreRequest::new(&location, restored.path().join("db"));
    let err = Database::restore(&request, |_| {}).expect_err("chain is broken");
    assert!(matches!(err, Error::Backup(BackupError::ChainDiscontinuity(_))));
}

#[test]
fn test_tampered_ordinal_breaks_chain() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let restored = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    let db = open_linear(data.path());
    db.put("a", &json!(1)).expect("put");
    backup(&db, &location, false);
    db.put("b", &json!(2)).expect("put");
    let inc = backup(&db, &location, true);

    let path = inc.capture_dir.join(MANIFEST_FILE);
    let mut manifest: Value =
        serde_json::from_slice(&fs::read(&path).expect("read")).expect("parse manifest");
    manifest["ordinal"] = json!(5);
    fs::write(&path, serde_json::to_vec(&manifest).expect("encode")).expect("write");

    let request = RestoreRequest::new(&location, restored.path().join("db"));
    let err = Database::restore(&request, |_| {}).expect_err("chain is broken");
    assert!(matches!(err, Error::Backup(BackupError::ChainDiscontinuity(_))));
}

#[test]
fn test_missing_full_capture_breaks_chain() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let restored = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    let db = open_linear(data.path());
    db.put("a", &json!(1)).expect("put");
    backup(&db, &location, false);
    fs::remove_file(location.join(MANIFEST_FILE)).expect("remove manifest");

    let request = RestoreRequest::new(&location, restored.path().join("db"));
    let err = Database::restore(&request, |_| {}).expect_err("no full capture");
    assert!(matches!(err, Error::Backup(BackupError::ChainDiscontinuity(_))));
}

// ============================================================================
// Checkpoint Recovery
// ============================================================================

#[test]
fn test_lost_checkpoint_is_rebuilt_from_chain() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let restored = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    {
        let db = open_linear(data.path());
        db.put("a", &json!(1)).expect("put");
        backup(&db, &location, false);
        db.put("b", &json!(2)).expect("put");
        backup(&db, &location, true);
    }
    fs::remove_file(data.path().join(CHECKPOINT_FILE)).expect("remove checkpoint");

    let db = open_linear(data.path());
    assert!(db.backup_checkpoint().expect("checkpoint").is_none());
    db.put("c", &json!(3)).expect("put");
    let inc = backup(&db, &location, true);
    assert_eq!(inc.ordinal, 2);

    let checkpoint = db.backup_checkpoint().expect("checkpoint").expect("committed");
    assert_eq!(checkpoint.last_backed_up_txid, db.last_txid().expect("last txid"));

    let restored = restore_into(&location, restored.path().join("db"));
    assert_eq!(names(&restored), vec!["a", "b", "c"]);
}

// ============================================================================
// Failed Runs
// ============================================================================

#[test]
fn test_failed_incremental_keeps_checkpoint_and_retry_succeeds() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let restored = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    let db = open_linear(data.path());
    db.put("a", &json!(1)).expect("put");
    let full = backup(&db, &location, false);
    db.put("b", &json!(2)).expect("put");
    let before = db.backup_checkpoint().expect("checkpoint").expect("committed");

    // The newest segment holds "b"; hide it so copying it fails.
    let journal = data.path().join("journal");
    let mut segments: Vec<PathBuf> = fs::read_dir(&journal)
        .expect("read journal")
        .map(|entry| entry.expect("entry").path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "seg"))
        .collect();
    segments.sort();
    let newest = segments.pop().expect("a journal segment");
    let hidden = newest.with_extension("hold");
    fs::rename(&newest, &hidden).expect("hide segment");

    assert_eq!(backup_error(&db, &location, true), BackupErrorKind::IoFailure);
    assert_eq!(db.backup_checkpoint().expect("checkpoint"), Some(before));
    assert_eq!(backup::verify(&location).expect("chain").len(), 1);
    let leftovers = fs::read_dir(&location)
        .expect("read location")
        .filter(|entry| {
            entry.as_ref().expect("entry").file_name().to_string_lossy().starts_with("inc-")
        })
        .count();
    assert_eq!(leftovers, 0);

    fs::rename(&hidden, &newest).expect("restore segment");
    let inc = backup(&db, &location, true);
    assert_eq!(inc.ordinal, 1);
    assert_eq!(inc.covers.start, full.covers.end);
    assert_eq!(inc.last_txid(), db.last_txid().expect("last txid"));

    let restored = restore_into(&location, restored.path().join("db"));
    assert_eq!(names(&restored), vec!["a", "b"]);
}

// ============================================================================
// Retention Mode
// ============================================================================

#[test]
fn test_reopening_linear_database_as_circular_is_refused() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let restored = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    {
        let db = open_linear(data.path());
        db.put("a", &json!(1)).expect("put");
        backup(&db, &location, false);
        db.put("b", &json!(2)).expect("put");
    }

    let circular = DatabaseConfig::builder()
        .data_directory(data.path())
        .retention_mode(RetentionMode::Circular)
        .build()
        .expect("config");
    let err = Database::open(circular).expect_err("mode change refused");
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(
        Database::stored_retention_mode(data.path()).expect("stored mode"),
        Some(RetentionMode::Linear)
    );

    let db = open_linear(data.path());
    db.run_maintenance().expect("maintenance");
    let inc = backup(&db, &location, true);
    assert_eq!(inc.ordinal, 1);

    let restored = restore_into(&location, restored.path().join("db"));
    assert_eq!(names(&restored), vec!["a", "b"]);
}

// ============================================================================
// Restored Databases
// ============================================================================

#[test]
fn test_restored_database_continues_transaction_ids() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let restored = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    let db = open_linear(data.path());
    for i in 0..10 {
        db.put(&format!("docs/{i}"), &json!(i)).expect("put");
    }
    backup(&db, &location, false);
    db.put("docs/10", &json!(10)).expect("put");
    backup(&db, &location, true);
    let source_last = db.last_txid().expect("last txid");

    let target = restored.path().join("db");
    {
        let restored = restore_into(&location, target.clone());
        assert_eq!(restored.last_txid().expect("last txid"), source_last);
        assert_eq!(restored.put("docs/11", &json!(11)).expect("put"), source_last + 1);
    }

    let reopened = open_linear(&target);
    assert_eq!(reopened.last_txid().expect("last txid"), source_last + 1);
    assert_eq!(reopened.documents().expect("documents").len(), 12);
}

#[test]
fn test_restore_with_defrag_keeps_documents() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let restored = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    let db = open_linear(data.path());
    for i in 0..50 {
        db.put(&format!("docs/{i}"), &json!({"pad": "y".repeat(256)})).expect("put");
    }
    backup(&db, &location, false);
    for i in 0..40 {
        db.delete(&format!("docs/{i}")).expect("delete");
    }
    backup(&db, &location, true);

    let target = restored.path().join("db");
    let request = RestoreRequest::new(&location, &target).defrag(true);
    let report = Database::restore(&request, |_| {}).expect("restore");
    assert_eq!(report.documents, 10);

    let restored = open_linear(&target);
    assert_eq!(names(&restored), names(&db));
}

#[test]
fn test_replaying_an_incremental_twice_changes_nothing() {
    let data = tempdir().expect("tempdir");
    let backups = tempdir().expect("tempdir");
    let restored = tempdir().expect("tempdir");
    let location = backups.path().join("chain");

    let db = open_linear(data.path());
    db.put("a", &json!(1)).expect("put");
    backup(&db, &location, false);
    db.put("b", &json!(2)).expect("put");
    db.put("a", &json!(3)).expect("put");
    backup(&db, &location, true);

    let target = restored.path().join("db");
    Database::restore(&RestoreRequest::new(&location, &target), |_| {}).expect("restore");

    let chain = BackupChain::load(&location).expect("load chain");
    let segments = chain.incrementals()[0].segment_paths();
    let mut store = DocumentStore::open(&target.join("data.redb"), None).expect("open store");
    let before = store.documents().expect("documents");
    let stats = replay_segments(&segments, &mut store, RecoveryMode::Strict).expect("replay");
    assert_eq!(stats.records_applied, 0);
    assert_eq!(store.documents().expect("documents"), before);
}
