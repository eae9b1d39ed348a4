//! Property-based tests for backup chains.
//!
//! However a write history is split into a full capture and incrementals,
//! restoring the chain yields exactly the documents of the source database.

use proptest::prelude::*;
use serde_json::{json, Value};
use tempfile::tempdir;

use emberdb::backup::{RestoreRequest, WaitOutcome};
use emberdb::{Database, DatabaseConfig, Document, RetentionMode};

#[derive(Debug, Clone)]
enum Op {
    Put(u8, i64),
    Delete(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..8, any::<i64>()).prop_map(|(k, v)| Op::Put(k, v)),
        1 => (0u8..8).prop_map(Op::Delete),
    ]
}

fn apply(db: &Database, op: &Op) {
    match op {
        Op::Put(k, v) => {
            db.put(&format!("docs/{k}"), &json!({ "v": v })).expect("put failed");
        }
        Op::Delete(k) => {
            db.delete(&format!("docs/{k}")).expect("delete failed");
        }
    }
}

fn backup(db: &Database, location: &std::path::Path, incremental: bool) {
    db.start_backup(location, incremental, Value::Null).expect("start failed");
    match db.wait_for_backup(None).expect("no handle") {
        WaitOutcome::Completed(_) => {}
        other => panic!("backup failed: {other:?}"),
    }
}

fn bodies(docs: Vec<Document>) -> Vec<(String, Value)> {
    docs.into_iter().map(|d| (d.key, d.body)).collect()
}

// ============================================================================
// Chain Invariants
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// Restoring full + incrementals reproduces the source documents
    #[test]
    fn prop_restore_matches_source(
        batches in prop::collection::vec(prop::collection::vec(op_strategy(), 0..12), 1..5)
    ) {
        let data = tempdir().expect("tempdir");
        let backups = tempdir().expect("tempdir");
        let restored = tempdir().expect("tempdir");
        let location = backups.path().join("chain");

        let config = DatabaseConfig::builder()
            .data_directory(data.path())
            .retention_mode(RetentionMode::Linear)
            .incremental_backups_allowed(true)
            .build()
            .expect("config");
        let db = Database::open(config).expect("open failed");

        for (i, batch) in batches.iter().enumerate() {
            for op in batch {
                apply(&db, op);
            }
            backup(&db, &location, i > 0);
        }

        let target = restored.path().join("db");
        let report = Database::restore(&RestoreRequest::new(&location, &target), |_| {})
            .expect("restore failed");
        prop_assert_eq!(report.captures_applied, batches.len());
        prop_assert_eq!(report.replayed_through, db.last_txid().expect("last txid"));

        let restored = Database::open(DatabaseConfig::at(&target).expect("config"))
            .expect("open restored failed");
        prop_assert_eq!(
            bodies(restored.documents().expect("documents")),
            bodies(db.documents().expect("documents"))
        );
    }
}
