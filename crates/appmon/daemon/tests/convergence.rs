//! End-to-end convergence over the in-memory store

use appmon_daemon::{
    Leadership, MemoryStore, ReconcilerConfig, RunLoop, StoreInstanceController, StoreLayout,
};
use appmon_types::MonitorName;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const SETTLE: Duration = Duration::from_millis(100);

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.ensure_path("/app-monitors").unwrap();
    store.ensure_path("/scheduled").unwrap();
    store
}

fn instances(store: &MemoryStore, monitor: &str) -> Vec<String> {
    let prefix = format!("{}#", monitor);
    store
        .children("/scheduled")
        .unwrap()
        .into_iter()
        .filter(|name| name.starts_with(&prefix))
        .collect()
}

fn schedule(store: &MemoryStore, monitor: &str, count: usize) {
    for _ in 0..count {
        store
            .create_sequential("/scheduled", &format!("{}#", monitor), Vec::new())
            .unwrap();
    }
}

fn run_loop(store: &MemoryStore, controller: StoreInstanceController, leadership: Leadership) -> RunLoop {
    RunLoop::new(
        Arc::new(store.clone()),
        Arc::new(controller),
        StoreLayout::default(),
        ReconcilerConfig::default(),
        leadership,
    )
}

fn spawn(store: &MemoryStore) -> JoinHandle<()> {
    let controller = StoreInstanceController::new(store.clone(), StoreLayout::default());
    let run = run_loop(store, controller, Leadership::Assume);
    tokio::spawn(async move {
        run.run().await.unwrap();
    })
}

#[tokio::test(start_paused = true)]
async fn test_scales_up_to_target() {
    let store = seeded_store();
    store.create("/app-monitors/web", "count: 3").unwrap();

    let task = spawn(&store);
    tokio::time::sleep(SETTLE).await;

    assert_eq!(instances(&store, "web").len(), 3);
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_scales_down_keeping_oldest() {
    let store = seeded_store();
    schedule(&store, "web", 5);
    store.create("/app-monitors/web", "count: 2").unwrap();

    let task = spawn(&store);
    tokio::time::sleep(SETTLE).await;

    assert_eq!(
        instances(&store, "web"),
        vec!["web#0000000000".to_string(), "web#0000000001".to_string()]
    );
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_follows_count_changes() {
    let store = seeded_store();
    store.create("/app-monitors/web", "count: 2").unwrap();

    let task = spawn(&store);
    tokio::time::sleep(SETTLE).await;
    assert_eq!(instances(&store, "web").len(), 2);

    store.set("/app-monitors/web", "count: 1").unwrap();
    tokio::time::sleep(SETTLE).await;
    assert_eq!(instances(&store, "web").len(), 1);

    // A new target clears the scale-up backoff.
    store.set("/app-monitors/web", "count: 4").unwrap();
    tokio::time::sleep(SETTLE).await;
    assert_eq!(instances(&store, "web").len(), 4);
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_replacement_waits_for_backoff() {
    let store = seeded_store();
    store.create("/app-monitors/web", "count: 2").unwrap();

    let task = spawn(&store);
    tokio::time::sleep(SETTLE).await;
    let first = instances(&store, "web");
    assert_eq!(first.len(), 2);

    store.delete(&format!("/scheduled/{}", first[0])).unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(instances(&store, "web").len(), 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(instances(&store, "web").len(), 2);
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_invalid_monitor_does_not_block_others() {
    let store = seeded_store();
    store.create("/app-monitors/bad", "count: [oops").unwrap();
    store.create("/app-monitors/empty", "").unwrap();
    store.create("/app-monitors/web", "count: 1").unwrap();

    let task = spawn(&store);
    tokio::time::sleep(SETTLE).await;

    assert!(instances(&store, "bad").is_empty());
    assert!(instances(&store, "empty").is_empty());
    assert_eq!(instances(&store, "web").len(), 1);
    assert!(!task.is_finished());
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_removed_monitor_is_no_longer_managed() {
    let store = seeded_store();
    store.create("/app-monitors/web", "count: 2").unwrap();

    let task = spawn(&store);
    tokio::time::sleep(SETTLE).await;
    assert_eq!(instances(&store, "web").len(), 2);

    store.delete("/app-monitors/web").unwrap();
    tokio::time::sleep(SETTLE).await;

    // Existing instances are left alone and nothing replaces them.
    let remaining = instances(&store, "web");
    assert_eq!(remaining.len(), 2);
    store.delete(&format!("/scheduled/{}", remaining[0])).unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(instances(&store, "web").len(), 1);
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_recreated_monitor_is_watched_again() {
    let store = seeded_store();
    store.create("/app-monitors/web", "count: 1").unwrap();

    let task = spawn(&store);
    tokio::time::sleep(SETTLE).await;

    store.delete("/app-monitors/web").unwrap();
    tokio::time::sleep(SETTLE).await;
    store.create("/app-monitors/web", "count: 3").unwrap();
    tokio::time::sleep(SETTLE).await;

    assert_eq!(instances(&store, "web").len(), 3);
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_unconfigured_application_is_skipped() {
    let store = seeded_store();
    store.create("/app-monitors/ghost", "count: 2").unwrap();
    store.create("/app-monitors/web", "count: 1").unwrap();

    let controller = StoreInstanceController::new(store.clone(), StoreLayout::default())
        .with_unknown([MonitorName::new("ghost")]);
    let task = tokio::spawn(run_loop(&store, controller, Leadership::Assume).run());
    tokio::time::sleep(Duration::from_secs(90)).await;

    assert!(instances(&store, "ghost").is_empty());
    assert_eq!(instances(&store, "web").len(), 1);
    assert!(!task.is_finished());
    task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_standby_takes_over_after_leader_stops() {
    let store = seeded_store();
    store.create("/app-monitors/web", "count: 2").unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let leader = tokio::spawn(
        run_loop(
            &store,
            StoreInstanceController::new(store.clone(), StoreLayout::default()),
            Leadership::Elect,
        )
        .run_until(async {
            let _ = stop_rx.await;
        }),
    );
    tokio::time::sleep(SETTLE).await;

    let standby = tokio::spawn(
        run_loop(
            &store,
            StoreInstanceController::new(store.clone(), StoreLayout::default()),
            Leadership::Elect,
        )
        .run(),
    );
    tokio::time::sleep(SETTLE).await;
    assert_eq!(instances(&store, "web").len(), 2);

    stop_tx.send(()).unwrap();
    leader.await.unwrap().unwrap();
    tokio::time::sleep(SETTLE).await;

    // The standby now holds the lock and reacts to changes.
    store.set("/app-monitors/web", "count: 3").unwrap();
    tokio::time::sleep(SETTLE).await;
    assert_eq!(instances(&store, "web").len(), 3);
    assert!(!standby.is_finished());
    standby.abort();
}
