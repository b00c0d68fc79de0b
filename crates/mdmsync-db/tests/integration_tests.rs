//! Integration tests for mdmsync-db against an in-memory SQLite database.

use chrono::{Duration, Utc};

use mdmsync_db::{
    run_migrations, DbPool, FinalizeSyncRun, RunCounts, RunMode, RunStatus, SyncRecord, SyncRun,
    SyncStatus, SyncWatermark, UpsertSyncRecord,
};

async fn setup() -> DbPool {
    let pool = DbPool::in_memory().await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

fn success<'a>(id: &'a str, target: Option<i64>, fingerprint: &'a str) -> UpsertSyncRecord<'a> {
    UpsertSyncRecord {
        external_id: id,
        target_id: target,
        fingerprint: Some(fingerprint),
        status: SyncStatus::Success,
        error: None,
    }
}

fn failure<'a>(id: &'a str, fingerprint: &'a str, error: &'a str) -> UpsertSyncRecord<'a> {
    UpsertSyncRecord {
        external_id: id,
        target_id: None,
        fingerprint: Some(fingerprint),
        status: SyncStatus::Failed,
        error: Some(error),
    }
}

// =============================================================================
// Sync Records
// =============================================================================

#[tokio::test]
async fn test_upsert_creates_then_updates_in_place() {
    let pool = setup().await;
    let now = Utc::now();

    let created = SyncRecord::upsert(pool.inner(), &success("dev-1", Some(10), "fp-a"), now)
        .await
        .unwrap();
    assert_eq!(created.target_id, Some(10));
    assert_eq!(created.last_fingerprint.as_deref(), Some("fp-a"));
    assert_eq!(created.status, SyncStatus::Success);
    assert!(created.last_success_at.is_some());

    let later = now + Duration::seconds(5);
    let updated = SyncRecord::upsert(pool.inner(), &success("dev-1", None, "fp-b"), later)
        .await
        .unwrap();
    assert_eq!(updated.target_id, Some(10), "target id must be kept");
    assert_eq!(updated.last_fingerprint.as_deref(), Some("fp-b"));
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at > created.updated_at);

    let stats = SyncRecord::statistics(pool.inner()).await.unwrap();
    assert_eq!(stats.total, 1);
}

#[tokio::test]
async fn test_failure_keeps_fingerprint_and_counts_retries() {
    let pool = setup().await;
    let now = Utc::now();

    SyncRecord::upsert(pool.inner(), &success("dev-1", Some(10), "fp-good"), now)
        .await
        .unwrap();

    let failed = SyncRecord::upsert(pool.inner(), &failure("dev-1", "fp-new", "GLPI down"), now)
        .await
        .unwrap();
    assert_eq!(failed.status, SyncStatus::Failed);
    assert_eq!(failed.last_fingerprint.as_deref(), Some("fp-good"));
    assert_eq!(failed.last_error.as_deref(), Some("GLPI down"));
    assert_eq!(failed.retry_count, 1);
    assert_eq!(failed.target_id, Some(10));

    let again = SyncRecord::upsert(pool.inner(), &failure("dev-1", "fp-new", "still down"), now)
        .await
        .unwrap();
    assert_eq!(again.retry_count, 2);

    let recovered = SyncRecord::upsert(pool.inner(), &success("dev-1", Some(10), "fp-new"), now)
        .await
        .unwrap();
    assert_eq!(recovered.retry_count, 0);
    assert_eq!(recovered.last_error, None);
    assert_eq!(recovered.last_fingerprint.as_deref(), Some("fp-new"));
}

#[tokio::test]
async fn test_first_attempt_failure_has_no_fingerprint() {
    let pool = setup().await;

    let record = SyncRecord::upsert(pool.inner(), &failure("dev-9", "fp", "boom"), Utc::now())
        .await
        .unwrap();
    assert_eq!(record.last_fingerprint, None);
    assert_eq!(record.retry_count, 1);
    assert_eq!(record.target_id, None);
}

#[tokio::test]
async fn test_upsert_rejects_blank_id() {
    let pool = setup().await;
    let err = SyncRecord::upsert(pool.inner(), &success("  ", None, "fp"), Utc::now())
        .await
        .unwrap_err();
    assert!(err.is_invalid_input());
}

#[tokio::test]
async fn test_list_failed_newest_first_with_limit() {
    let pool = setup().await;
    let base = Utc::now();

    for (i, id) in ["a", "b", "c"].iter().enumerate() {
        let at = base + Duration::seconds(i64::try_from(i).unwrap());
        SyncRecord::upsert(pool.inner(), &failure(id, "fp", "err"), at)
            .await
            .unwrap();
    }
    SyncRecord::upsert(pool.inner(), &success("ok", Some(1), "fp"), base)
        .await
        .unwrap();

    let failed = SyncRecord::list_failed(pool.inner(), 2).await.unwrap();
    let ids: Vec<&str> = failed.iter().map(|r| r.external_id.as_str()).collect();
    assert_eq!(ids, vec!["c", "b"]);
}

#[tokio::test]
async fn test_cleanup_keeps_failed_records() {
    let pool = setup().await;
    let old = Utc::now() - Duration::days(60);

    SyncRecord::upsert(pool.inner(), &success("old-ok", Some(1), "fp"), old)
        .await
        .unwrap();
    SyncRecord::upsert(pool.inner(), &failure("old-failed", "fp", "err"), old)
        .await
        .unwrap();
    SyncRecord::upsert(pool.inner(), &success("fresh", Some(2), "fp"), Utc::now())
        .await
        .unwrap();

    let cutoff = Utc::now() - Duration::days(30);
    let deleted = SyncRecord::delete_successful_before(pool.inner(), cutoff)
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    assert!(SyncRecord::find(pool.inner(), "old-ok").await.unwrap().is_none());
    assert!(SyncRecord::find(pool.inner(), "old-failed").await.unwrap().is_some());
    assert!(SyncRecord::find(pool.inner(), "fresh").await.unwrap().is_some());
}

#[tokio::test]
async fn test_statistics() {
    let pool = setup().await;
    let now = Utc::now();

    SyncRecord::upsert(pool.inner(), &success("a", Some(1), "fp"), now).await.unwrap();
    SyncRecord::upsert(pool.inner(), &success("b", Some(2), "fp"), now).await.unwrap();
    SyncRecord::upsert(pool.inner(), &failure("c", "fp", "err"), now).await.unwrap();

    let stats = SyncRecord::statistics(pool.inner()).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.success, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.pending, 0);
}

// =============================================================================
// Run Ledger
// =============================================================================

fn finished(status: RunStatus) -> FinalizeSyncRun {
    FinalizeSyncRun {
        status,
        counts: RunCounts {
            processed: 3,
            created: 1,
            updated: 1,
            failed: 0,
            skipped: 1,
        },
        duration_ms: 1_250,
        errors: vec!["Device x: boom".to_string()],
        error_message: None,
        completed_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_run_start_and_finalize() {
    let pool = setup().await;

    let run = SyncRun::start(pool.inner(), RunMode::Full, Utc::now()).await.unwrap();
    assert_eq!(run.status, RunStatus::InProgress);
    assert!(run.errors.is_empty());

    let done = SyncRun::finalize(pool.inner(), run.id, &finished(RunStatus::Success))
        .await
        .unwrap();
    assert_eq!(done.status, RunStatus::Success);
    assert_eq!(done.counts.skipped, 1);
    assert_eq!(done.duration_ms, Some(1_250));
    assert_eq!(done.errors, vec!["Device x: boom".to_string()]);

    let found = SyncRun::find(pool.inner(), run.id).await.unwrap().unwrap();
    assert_eq!(found, done);
}

#[tokio::test]
async fn test_run_finalized_only_once() {
    let pool = setup().await;

    let run = SyncRun::start(pool.inner(), RunMode::Manual, Utc::now()).await.unwrap();
    SyncRun::finalize(pool.inner(), run.id, &finished(RunStatus::Failed))
        .await
        .unwrap();

    let err = SyncRun::finalize(pool.inner(), run.id, &finished(RunStatus::Success))
        .await
        .unwrap_err();
    assert!(err.is_run_not_open());

    let err = SyncRun::finalize(pool.inner(), run.id, &finished(RunStatus::InProgress))
        .await
        .unwrap_err();
    assert!(err.is_invalid_input());
}

#[tokio::test]
async fn test_latest_and_recent_runs() {
    let pool = setup().await;
    let base = Utc::now();

    let first = SyncRun::start(pool.inner(), RunMode::Full, base).await.unwrap();
    let second = SyncRun::start(pool.inner(), RunMode::Incremental, base + Duration::seconds(1))
        .await
        .unwrap();

    let latest = SyncRun::latest(pool.inner()).await.unwrap().unwrap();
    assert_eq!(latest.id, second.id);

    let recent = SyncRun::list_recent(pool.inner(), 10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[1].id, first.id);
}

#[tokio::test]
async fn test_run_cleanup_spares_in_progress() {
    let pool = setup().await;
    let old = Utc::now() - Duration::days(90);

    let done = SyncRun::start(pool.inner(), RunMode::Full, old).await.unwrap();
    SyncRun::finalize(pool.inner(), done.id, &finished(RunStatus::Success))
        .await
        .unwrap();
    let stuck = SyncRun::start(pool.inner(), RunMode::Full, old).await.unwrap();

    let deleted = SyncRun::delete_finished_before(pool.inner(), Utc::now() - Duration::days(30))
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(SyncRun::find(pool.inner(), stuck.id).await.unwrap().is_some());
}

// =============================================================================
// Watermarks
// =============================================================================

#[tokio::test]
async fn test_watermark_set_and_overwrite() {
    let pool = setup().await;

    assert!(SyncWatermark::get(pool.inner(), RunMode::Incremental)
        .await
        .unwrap()
        .is_none());

    let first = Utc::now() - Duration::hours(1);
    SyncWatermark::set(pool.inner(), RunMode::Incremental, first).await.unwrap();
    let second = Utc::now();
    SyncWatermark::set(pool.inner(), RunMode::Incremental, second).await.unwrap();

    let stored = SyncWatermark::get(pool.inner(), RunMode::Incremental)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, second);
    assert!(SyncWatermark::get(pool.inner(), RunMode::Full).await.unwrap().is_none());
}

#[tokio::test]
async fn test_manual_mode_has_no_watermark() {
    let pool = setup().await;
    let err = SyncWatermark::set(pool.inner(), RunMode::Manual, Utc::now())
        .await
        .unwrap_err();
    assert!(err.is_invalid_input());
}

#[tokio::test]
async fn test_ping() {
    let pool = setup().await;
    assert!(pool.ping().await.is_ok());
}
