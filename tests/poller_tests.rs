mod common;

use common::{
    InterposedStore, PoolBehavior, ScriptedPool, fast_intervals, settings, submit_fs_job,
    write_file,
};
use compression_job_handler::engine::{JobStore, SqliteJobStore};
use compression_job_handler::pipeline::{JobPoller, OrchestratorContext};
use compression_job_handler::{JobStatus, StatusUpdate};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn input_tree() -> TempDir {
    let root = tempfile::tempdir().unwrap();
    write_file(root.path(), "in/a.log", 4);
    write_file(root.path(), "in/b.log", 4);
    root
}

fn poll_once(store: &dyn JobStore, pool: &ScriptedPool, root: &TempDir) -> usize {
    let ctx = OrchestratorContext::new(store, pool, settings(root.path(), root.path()))
        .with_intervals(fast_intervals());
    JobPoller::new(ctx).poll_once().unwrap()
}

// --- lifecycle ---

#[test]
fn test_pending_job_runs_to_done() {
    let root = input_tree();
    let store = SqliteJobStore::open_in_memory().unwrap();
    let id = submit_fs_job(&store, &["/in"], json!({}));
    let pool = ScriptedPool::new(PoolBehavior::AllSucceed);

    assert_eq!(poll_once(&store, &pool, &root), 1);
    let job = store.get_job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert!(!job.errors);
    let (begin, end) = (job.begin_timestamp.unwrap(), job.end_timestamp.unwrap());
    assert!(begin <= end);
    assert_eq!(pool.total_submitted(), 1);
}

#[test]
fn test_validation_errors_end_done_with_errors() {
    let root = input_tree();
    let store = SqliteJobStore::open_in_memory().unwrap();
    let id = submit_fs_job(&store, &["/in", "/nope"], json!({}));
    let pool = ScriptedPool::new(PoolBehavior::AllSucceed);
    poll_once(&store, &pool, &root);
    let job = store.get_job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert!(job.errors);
}

#[test]
fn test_sub_job_failure_ends_failed() {
    let root = input_tree();
    let store = SqliteJobStore::open_in_memory().unwrap();
    let id = submit_fs_job(&store, &["/in", "/nope"], json!({}));
    let pool = ScriptedPool::new(PoolBehavior::FailIndices(vec![0]));
    poll_once(&store, &pool, &root);
    let job = store.get_job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(!job.errors);
}

#[test]
fn test_unparsable_metadata_goes_running_then_failed() {
    let root = input_tree();
    let store = SqliteJobStore::open_in_memory().unwrap();
    let id = submit_fs_job(&store, &["/in"], json!({}));
    store
        .connection()
        .execute("UPDATE jobs SET input_config = 'garbage' WHERE id = ?1", [&id])
        .unwrap();
    let pool = ScriptedPool::new(PoolBehavior::AllSucceed);
    poll_once(&store, &pool, &root);
    let job = store.get_job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.begin_timestamp.is_some());
    assert!(job.end_timestamp.is_some());
    assert_eq!(pool.total_submitted(), 0);
}

#[test]
fn test_jobs_run_in_submission_order() {
    let root = input_tree();
    let store = SqliteJobStore::open_in_memory().unwrap();
    let ids: Vec<String> = (0..3)
        .map(|_| submit_fs_job(&store, &["/in/a.log"], json!({})))
        .collect();
    let pool = ScriptedPool::new(PoolBehavior::AllSucceed);
    assert_eq!(poll_once(&store, &pool, &root), 3);
    let order: Vec<String> = pool
        .batches()
        .iter()
        .map(|batch| batch[0].job_id.clone())
        .collect();
    assert_eq!(order, ids);
}

// --- cancellation ---

#[test]
fn test_cancelling_job_is_confirmed() {
    let root = input_tree();
    let store = SqliteJobStore::open_in_memory().unwrap();
    let id = submit_fs_job(&store, &["/in"], json!({}));
    assert!(store.request_cancellation(&id).unwrap());
    let pool = ScriptedPool::new(PoolBehavior::AllSucceed);
    poll_once(&store, &pool, &root);
    assert_eq!(store.get_job(&id).unwrap().status, JobStatus::Cancelled);
    assert_eq!(pool.total_submitted(), 0);
}

#[test]
fn test_cancellation_racing_claim_never_runs() {
    let root = input_tree();
    let inner = SqliteJobStore::open_in_memory().unwrap();
    let id = submit_fs_job(&inner, &["/in"], json!({}));
    let mut store = InterposedStore::new(&inner);
    store.cancel_before_claim = true;
    let pool = ScriptedPool::new(PoolBehavior::AllSucceed);

    assert_eq!(poll_once(&store, &pool, &root), 1);
    let job = inner.get_job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.begin_timestamp.is_none());
    assert_eq!(pool.total_submitted(), 0);
}

#[test]
fn test_stale_cancelling_read_is_harmless() {
    let root = input_tree();
    let inner = SqliteJobStore::open_in_memory().unwrap();
    let id = submit_fs_job(&inner, &["/in"], json!({}));
    inner.request_cancellation(&id).unwrap();
    inner
        .set_job_status(
            &id,
            JobStatus::Cancelled,
            JobStatus::Cancelling,
            StatusUpdate::default(),
        )
        .unwrap();
    let mut store = InterposedStore::new(&inner);
    store.scan_overrides.insert(id.clone(), JobStatus::Cancelling);
    let pool = ScriptedPool::new(PoolBehavior::AllSucceed);

    let ctx = OrchestratorContext::new(&store, &pool, settings(root.path(), root.path()))
        .with_intervals(fast_intervals());
    let mut poller = JobPoller::new(ctx);
    assert_eq!(poller.poll_once().unwrap(), 1);
    assert_eq!(poller.poll_once().unwrap(), 0);
    assert_eq!(inner.get_job(&id).unwrap().status, JobStatus::Cancelled);
}

#[test]
fn test_denied_terminal_transition_leaves_job_running() {
    let root = input_tree();
    let inner = SqliteJobStore::open_in_memory().unwrap();
    let id = submit_fs_job(&inner, &["/in"], json!({}));
    let mut store = InterposedStore::new(&inner);
    store.deny_terminal = true;
    let pool = ScriptedPool::new(PoolBehavior::AllSucceed);
    poll_once(&store, &pool, &root);
    let job = inner.get_job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert!(job.end_timestamp.is_none());
}

#[test]
fn test_in_flight_and_terminal_jobs_untouched() {
    let root = input_tree();
    let store = SqliteJobStore::open_in_memory().unwrap();
    let running = submit_fs_job(&store, &["/in"], json!({}));
    store
        .set_job_status(&running, JobStatus::Running, JobStatus::Pending, StatusUpdate::default())
        .unwrap();
    let pool = ScriptedPool::new(PoolBehavior::AllSucceed);
    assert_eq!(poll_once(&store, &pool, &root), 1);
    assert_eq!(store.get_job(&running).unwrap().status, JobStatus::Running);
    assert_eq!(pool.total_submitted(), 0);
}

// --- watermark ---

#[test]
fn test_watermark_advances_and_never_reprocesses() {
    let root = input_tree();
    let store = SqliteJobStore::open_in_memory().unwrap();
    let first = submit_fs_job(&store, &["/in"], json!({}));
    let pool = ScriptedPool::new(PoolBehavior::AllSucceed);
    let ctx = OrchestratorContext::new(&store, &pool, settings(root.path(), root.path()))
        .with_intervals(fast_intervals());
    let mut poller = JobPoller::new(ctx);
    assert!(poller.watermark().is_none());

    assert_eq!(poller.poll_once().unwrap(), 1);
    assert_eq!(
        poller.watermark(),
        Some(store.get_job_submission_timestamp(&first).unwrap())
    );
    assert_eq!(poller.poll_once().unwrap(), 0);

    let second = submit_fs_job(&store, &["/in"], json!({}));
    assert_eq!(poller.poll_once().unwrap(), 1);
    assert_eq!(store.get_job(&second).unwrap().status, JobStatus::Done);
    assert_eq!(pool.total_submitted(), 2);
}

// --- run loop ---

#[test]
fn test_run_returns_immediately_when_shut_down() {
    let root = input_tree();
    let inner = SqliteJobStore::open_in_memory().unwrap();
    let store = InterposedStore::new(&inner);
    let pool = ScriptedPool::new(PoolBehavior::AllSucceed);
    let ctx = OrchestratorContext::new(&store, &pool, settings(root.path(), root.path()))
        .with_intervals(fast_intervals());
    JobPoller::new(ctx).run(&AtomicBool::new(true));
    assert_eq!(store.scans.get(), 0);
}

#[test]
fn test_run_processes_jobs_until_shutdown() {
    let root = input_tree();
    let inner = SqliteJobStore::open_in_memory().unwrap();
    let id = submit_fs_job(&inner, &["/in"], json!({}));
    let store = InterposedStore::new(&inner);
    let pool = ScriptedPool::new(PoolBehavior::AllSucceed);
    let ctx = OrchestratorContext::new(&store, &pool, settings(root.path(), root.path()))
        .with_intervals(fast_intervals());

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        flag.store(true, Ordering::Relaxed);
    });
    JobPoller::new(ctx).run(&shutdown);
    stopper.join().unwrap();

    assert_eq!(inner.get_job(&id).unwrap().status, JobStatus::Done);
    assert!(store.scans.get() >= 2);
}

// --- store errors ---

#[test]
fn test_unknown_status_row_does_not_block_later_jobs() {
    let root = input_tree();
    let store = SqliteJobStore::open_in_memory().unwrap();
    store
        .connection()
        .execute(
            "INSERT INTO jobs (id, status, input_type, input_config, output_config, \
             submission_timestamp) VALUES ('odd', 'PAUSED', 'fs', '{}', '{}', 1)",
            [],
        )
        .unwrap();
    let good = submit_fs_job(&store, &["/in"], json!({}));
    let pool = ScriptedPool::new(PoolBehavior::AllSucceed);
    let ctx = OrchestratorContext::new(&store, &pool, settings(root.path(), root.path()))
        .with_intervals(fast_intervals());
    let mut poller = JobPoller::new(ctx);

    assert_eq!(poller.poll_once().unwrap(), 2);
    assert_eq!(store.get_job(&good).unwrap().status, JobStatus::Done);
    assert_eq!(
        poller.watermark(),
        Some(store.get_job_submission_timestamp(&good).unwrap())
    );
    assert_eq!(poller.poll_once().unwrap(), 0);
    assert_eq!(pool.total_submitted(), 1);
}

#[test]
fn test_failed_claim_is_retried_on_next_scan() {
    let root = input_tree();
    let inner = SqliteJobStore::open_in_memory().unwrap();
    let id = submit_fs_job(&inner, &["/in"], json!({}));
    let store = InterposedStore::new(&inner);
    store.failing_claims.set(1);
    let pool = ScriptedPool::new(PoolBehavior::AllSucceed);
    let ctx = OrchestratorContext::new(&store, &pool, settings(root.path(), root.path()))
        .with_intervals(fast_intervals());
    let mut poller = JobPoller::new(ctx);

    assert_eq!(poller.poll_once().unwrap(), 0);
    assert_eq!(inner.get_job(&id).unwrap().status, JobStatus::Pending);
    assert!(poller.watermark().is_none());
    assert_eq!(pool.total_submitted(), 0);

    assert_eq!(poller.poll_once().unwrap(), 1);
    assert_eq!(inner.get_job(&id).unwrap().status, JobStatus::Done);
    assert_eq!(pool.total_submitted(), 1);
}

#[test]
fn test_timestamp_lookup_error_resumes_at_failed_job() {
    let root = input_tree();
    let inner = SqliteJobStore::open_in_memory().unwrap();
    let ids: Vec<String> = (0..3)
        .map(|_| submit_fs_job(&inner, &["/in/a.log"], json!({})))
        .collect();
    let store = InterposedStore::new(&inner);
    *store.failing_timestamp_lookup.borrow_mut() = Some(ids[1].clone());
    let pool = ScriptedPool::new(PoolBehavior::AllSucceed);
    let ctx = OrchestratorContext::new(&store, &pool, settings(root.path(), root.path()))
        .with_intervals(fast_intervals());
    let mut poller = JobPoller::new(ctx);

    assert!(poller.poll_once().is_err());
    assert_eq!(inner.get_job(&ids[0]).unwrap().status, JobStatus::Done);
    assert_eq!(inner.get_job(&ids[1]).unwrap().status, JobStatus::Pending);
    assert_eq!(inner.get_job(&ids[2]).unwrap().status, JobStatus::Pending);
    assert_eq!(
        poller.watermark(),
        Some(inner.get_job_submission_timestamp(&ids[0]).unwrap())
    );

    assert_eq!(poller.poll_once().unwrap(), 2);
    for id in &ids {
        assert_eq!(inner.get_job(id).unwrap().status, JobStatus::Done);
    }
    assert_eq!(pool.total_submitted(), 3);
}

#[test]
fn test_run_recovers_from_failing_claims() {
    let root = input_tree();
    let inner = SqliteJobStore::open_in_memory().unwrap();
    let id = submit_fs_job(&inner, &["/in"], json!({}));
    let store = InterposedStore::new(&inner);
    store.failing_claims.set(2);
    let pool = ScriptedPool::new(PoolBehavior::AllSucceed);
    let ctx = OrchestratorContext::new(&store, &pool, settings(root.path(), root.path()))
        .with_intervals(fast_intervals());

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        flag.store(true, Ordering::Relaxed);
    });
    JobPoller::new(ctx).run(&shutdown);
    stopper.join().unwrap();

    assert_eq!(inner.get_job(&id).unwrap().status, JobStatus::Done);
    assert_eq!(store.failing_claims.get(), 0);
    assert!(store.scans.get() >= 3);
}
