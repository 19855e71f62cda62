//! Stop semantics: running sessions are stopped (counted as failed),
//! pending sessions stay pending, and late callbacks become no-ops.

mod helpers;

use std::time::Duration;

use helpers::{fast_scheduler, make_batch, offline_pool, wait_until, ScriptedRunner};
use session_dispatch::batch::{BatchStatus, SessionStatus};

#[tokio::test]
async fn test_stop_running_batch() {
    // 5 sessions, cap 2: two admitted, three pending. Runs are slow enough
    // that both admitted sessions are still in flight when we stop.
    let runner = ScriptedRunner::new(Duration::from_secs(10));
    let scheduler = fast_scheduler(offline_pool(), runner.clone());
    scheduler.insert_batch(make_batch("stop1", 5, 2, 0));
    scheduler.start_batch("stop1").unwrap();

    let sched = scheduler.clone();
    assert!(
        wait_until(Duration::from_secs(5), move || {
            sched.batch_view("stop1").unwrap().stats.running == 2
        })
        .await,
        "two sessions should be running"
    );

    assert!(scheduler.stop_batch("stop1"));

    let view = scheduler.batch_view("stop1").unwrap();
    assert_eq!(view.status, BatchStatus::Stopped);
    assert!(view.completed_at.is_some());

    let stopped: Vec<_> = view
        .sessions
        .iter()
        .filter(|s| s.status == SessionStatus::Stopped)
        .collect();
    let pending: Vec<_> = view
        .sessions
        .iter()
        .filter(|s| s.status == SessionStatus::Pending)
        .collect();
    assert_eq!(stopped.len(), 2, "running sessions become stopped");
    assert_eq!(pending.len(), 3, "pending sessions are not auto-failed");

    // Stopped sessions count as failed in the stats.
    assert_eq!(view.stats.failed, 2);
    assert_eq!(view.stats.pending, 3);
    assert_eq!(view.stats.running, 0);
    assert_eq!(
        view.stats.pending + view.stats.running + view.stats.completed + view.stats.failed,
        view.stats.total
    );
}

#[tokio::test]
async fn test_stop_is_rejected_unless_running() {
    let runner = ScriptedRunner::new(Duration::from_millis(10));
    let scheduler = fast_scheduler(offline_pool(), runner.clone());
    scheduler.insert_batch(make_batch("stop2", 1, 1, 0));

    assert!(!scheduler.stop_batch("stop2"), "pending batch");
    assert!(!scheduler.stop_batch("missing"), "unknown batch");

    scheduler.start_batch("stop2").unwrap();
    let sched = scheduler.clone();
    assert!(
        wait_until(Duration::from_secs(5), move || {
            sched.batch_view("stop2").unwrap().status == BatchStatus::Completed
        })
        .await
    );
    assert!(!scheduler.stop_batch("stop2"), "completed batch");
}

#[tokio::test]
async fn test_late_callbacks_after_stop_are_noops() {
    // The in-flight run settles *after* the stop; its completion callback
    // must observe the Stopped status and leave all counters alone.
    let runner = ScriptedRunner::new(Duration::from_millis(200));
    let scheduler = fast_scheduler(offline_pool(), runner.clone());
    scheduler.insert_batch(make_batch("stop3", 1, 1, 0));
    scheduler.start_batch("stop3").unwrap();

    let sched = scheduler.clone();
    assert!(
        wait_until(Duration::from_secs(5), move || {
            sched.batch_view("stop3").unwrap().stats.running == 1
        })
        .await
    );
    assert!(scheduler.stop_batch("stop3"));

    // Let the scripted run finish and its callback fire.
    tokio::time::sleep(Duration::from_millis(400)).await;

    let view = scheduler.batch_view("stop3").unwrap();
    assert_eq!(view.status, BatchStatus::Stopped, "never flips to completed");
    assert_eq!(view.sessions[0].status, SessionStatus::Stopped);
    assert_eq!(view.stats.failed, 1);
    assert_eq!(view.stats.completed, 0);
}

#[tokio::test]
async fn test_stopped_batch_admits_nothing_more() {
    let runner = ScriptedRunner::new(Duration::from_millis(100));
    let scheduler = fast_scheduler(offline_pool(), runner.clone());
    scheduler.insert_batch(make_batch("stop4", 4, 1, 0));
    scheduler.start_batch("stop4").unwrap();

    let sched = scheduler.clone();
    assert!(
        wait_until(Duration::from_secs(5), move || {
            sched.batch_view("stop4").unwrap().stats.running == 1
        })
        .await
    );
    assert!(scheduler.stop_batch("stop4"));

    tokio::time::sleep(Duration::from_millis(300)).await;
    let view = scheduler.batch_view("stop4").unwrap();
    assert_eq!(view.stats.pending, 3, "no pending session was admitted after stop");
    assert!(view
        .sessions
        .iter()
        .all(|s| s.attempt_count <= 1));
}
