//! End-to-end behaviour of the acquire / skip / terminal protocol.

use std::sync::Arc;

use monoplan_state::{
    AcquireOutcome, ExecutionStateStore, FakeClock, JobStatus, MemoryStateStore, StateRecord,
    StateStore, StoreConfig, SurrealStateStore, TerminalOutcome, TrackedJob, TtlPolicy,
};

const NOW: i64 = 1_700_000_000;

fn job(ts: i64) -> TrackedJob {
    TrackedJob {
        correlation_key: "refs/heads/main".to_string(),
        app_path: "apps/api".to_string(),
        job_key: "deploy".to_string(),
        label: "apps/api / deploy".to_string(),
        commit_hash: format!("{ts:040x}"),
        commit_ts: ts,
    }
}

fn memory_state() -> (ExecutionStateStore, Arc<MemoryStateStore>, FakeClock) {
    let clock = FakeClock::new(NOW);
    let store = Arc::new(MemoryStateStore::with_clock(Arc::new(clock.clone())));
    let state = ExecutionStateStore::new(store.clone(), TtlPolicy::default())
        .with_clock(Arc::new(clock.clone()));
    (state, store, clock)
}

#[tokio::test]
async fn newer_commit_preempts_running_older_commit() {
    let (state, _, _) = memory_state();

    assert!(state.try_acquire_running(&job(100)).await.unwrap().is_acquired());
    assert!(state.try_acquire_running(&job(200)).await.unwrap().is_acquired());

    match state.try_acquire_running(&job(50)).await.unwrap() {
        AcquireOutcome::Preempted { holder } => {
            assert_eq!(holder.unwrap().commit_ts, 200);
        }
        AcquireOutcome::Acquired => panic!("older commit must not take the slot"),
    }
}

#[tokio::test]
async fn retry_of_same_commit_is_preempted_by_itself() {
    let (state, _, _) = memory_state();
    assert!(state.try_acquire_running(&job(100)).await.unwrap().is_acquired());
    assert!(!state.try_acquire_running(&job(100)).await.unwrap().is_acquired());
}

#[tokio::test]
async fn success_records_state_and_releases_running() {
    let (state, store, _) = memory_state();
    let j = job(100);
    state.try_acquire_running(&j).await.unwrap();

    let report = state.mark_terminal(&j, TerminalOutcome::Success).await.unwrap();
    assert_eq!(report.success_recorded, Some(true));
    assert!(report.running_released);

    let records = store.query_partition(&j.partition_key()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].job_status, JobStatus::Success);
    assert_eq!(records[0].commit_ts, 100);
    assert_eq!(records[0].key(), j.key(JobStatus::Success));
    assert!(records.iter().all(|r| r.key() != j.key(JobStatus::Running)));
}

#[tokio::test]
async fn failure_releases_running_without_success_record() {
    let (state, store, _) = memory_state();
    let j = job(100);
    state.try_acquire_running(&j).await.unwrap();

    let report = state.mark_terminal(&j, TerminalOutcome::Failure).await.unwrap();
    assert_eq!(report.success_recorded, None);
    assert!(report.running_released);
    assert!(store.is_empty());
}

#[tokio::test]
async fn finishing_older_run_leaves_newer_running_record() {
    let (state, store, _) = memory_state();
    state.try_acquire_running(&job(100)).await.unwrap();
    state.try_acquire_running(&job(200)).await.unwrap();

    let report = state
        .mark_terminal(&job(100), TerminalOutcome::Cancelled)
        .await
        .unwrap();
    assert!(!report.running_released);

    let records = store.query_partition(&job(200).partition_key()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].commit_ts, 200);
}

#[tokio::test]
async fn older_success_never_overwrites_newer_success() {
    let (state, _, _) = memory_state();
    state.mark_terminal(&job(200), TerminalOutcome::Success).await.unwrap();

    let report = state.mark_terminal(&job(100), TerminalOutcome::Success).await.unwrap();
    assert_eq!(report.success_recorded, Some(false));

    let skip = state.query_skip_set("refs/heads/main").await.unwrap();
    assert_eq!(
        skip.preempting("apps/api", "deploy", 100).map(|r| r.commit_ts),
        Some(200)
    );
}

#[tokio::test]
async fn skip_set_covers_running_and_success() {
    let (state, _, _) = memory_state();
    state.mark_terminal(&job(100), TerminalOutcome::Success).await.unwrap();
    state.try_acquire_running(&job(300)).await.unwrap();

    let skip = state.query_skip_set("refs/heads/main").await.unwrap();
    assert!(skip.preempting("apps/api", "deploy", 300).is_some());
    assert!(skip.preempting("apps/api", "deploy", 301).is_none());
    assert!(skip.preempting("apps/web", "deploy", 1).is_none());
}

#[tokio::test]
async fn crashed_run_is_reclaimed_after_running_ttl() {
    let (state, _, clock) = memory_state();
    let ttl = state.ttl_policy();
    state.try_acquire_running(&job(200)).await.unwrap();

    clock.advance(ttl.running_secs - 1);
    assert!(!state.try_acquire_running(&job(100)).await.unwrap().is_acquired());

    clock.advance(1);
    assert!(state.try_acquire_running(&job(100)).await.unwrap().is_acquired());
}

#[tokio::test]
async fn custom_ttl_policy_controls_expiry() {
    let clock = FakeClock::new(NOW);
    let store = Arc::new(MemoryStateStore::with_clock(Arc::new(clock.clone())));
    let ttl = TtlPolicy::from_durations("10m", "1h").unwrap();
    let state = ExecutionStateStore::new(store, ttl).with_clock(Arc::new(clock.clone()));

    state.mark_terminal(&job(100), TerminalOutcome::Success).await.unwrap();
    clock.advance(3_600);

    let skip = state.query_skip_set("refs/heads/main").await.unwrap();
    assert!(skip.is_empty());
    assert_eq!(state.purge_expired().await.unwrap(), 1);
}

#[tokio::test]
async fn surreal_backend_runs_full_lifecycle() {
    let clock = FakeClock::new(NOW);
    let store = Arc::new(
        SurrealStateStore::in_memory()
            .await
            .unwrap()
            .with_clock(Arc::new(clock.clone())),
    );
    let state = ExecutionStateStore::new(store, TtlPolicy::default())
        .with_clock(Arc::new(clock));

    let newer = job(200);
    assert!(state.try_acquire_running(&newer).await.unwrap().is_acquired());
    assert!(!state.try_acquire_running(&job(100)).await.unwrap().is_acquired());

    let report = state.mark_terminal(&newer, TerminalOutcome::Success).await.unwrap();
    assert_eq!(report.success_recorded, Some(true));
    assert!(report.running_released);

    let skip = state.query_skip_set("refs/heads/main").await.unwrap();
    assert_eq!(skip.len(), 1);
    assert!(skip.preempting("apps/api", "deploy", 200).is_some());
}

#[tokio::test]
async fn local_store_creates_its_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state");
    let config = StoreConfig::Url(format!("surrealkv://{}", path.display()));

    let store = Arc::new(SurrealStateStore::connect(&config).await.unwrap());
    assert!(path.is_dir());

    let state = ExecutionStateStore::new(store.clone(), TtlPolicy::default());
    assert!(state.try_acquire_running(&job(100)).await.unwrap().is_acquired());
    let records = store
        .query_partition(&job(100).partition_key())
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].job_status, JobStatus::Running);
}

fn job_in(correlation_key: &str, ts: i64) -> TrackedJob {
    TrackedJob {
        correlation_key: correlation_key.to_string(),
        ..job(ts)
    }
}

async fn race(state: &ExecutionStateStore, jobs: Vec<TrackedJob>) -> Vec<(i64, AcquireOutcome)> {
    let tasks: Vec<_> = jobs
        .into_iter()
        .map(|j| {
            let state = state.clone();
            tokio::spawn(async move {
                let outcome = state.try_acquire_running(&j).await;
                (j.commit_ts, outcome)
            })
        })
        .collect();

    let mut outcomes = Vec::new();
    for task in tasks {
        let (ts, outcome) = task.await.unwrap();
        outcomes.push((ts, outcome.expect("same-slot race must not surface as an error")));
    }
    outcomes
}

async fn only_record(store: &dyn StateStore, correlation_key: &str) -> StateRecord {
    let records = store
        .query_partition(&job_in(correlation_key, 0).partition_key())
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    records.into_iter().next().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquires_of_one_commit_have_one_winner() {
    let store = Arc::new(SurrealStateStore::in_memory().await.unwrap());
    let state = ExecutionStateStore::new(store.clone(), TtlPolicy::default());

    for round in 0..20 {
        let key = format!("refs/heads/race-{round}");
        let outcomes = race(&state, (0..8).map(|_| job_in(&key, 100)).collect()).await;

        let winners = outcomes.iter().filter(|(_, o)| o.is_acquired()).count();
        assert_eq!(winners, 1, "round {round}");
        assert_eq!(only_record(store.as_ref(), &key).await.commit_ts, 100);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquires_leave_newest_commit_holding_the_slot() {
    let store = Arc::new(SurrealStateStore::in_memory().await.unwrap());
    let state = ExecutionStateStore::new(store.clone(), TtlPolicy::default());

    for round in 0..20 {
        let key = format!("refs/heads/race-{round}");
        // Interleave timestamps so arrival order differs from commit order.
        let jobs = (0..8).map(|i| job_in(&key, 100 + (i * 5 + round) % 8)).collect();
        let outcomes = race(&state, jobs).await;

        let newest = outcomes.iter().map(|(ts, _)| *ts).max().unwrap();
        assert!(outcomes
            .iter()
            .filter(|(ts, _)| *ts == newest)
            .all(|(_, o)| o.is_acquired()));
        assert_eq!(only_record(store.as_ref(), &key).await.commit_ts, newest);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_successes_keep_the_newest_commit() {
    let store = Arc::new(SurrealStateStore::in_memory().await.unwrap());
    let state = ExecutionStateStore::new(store.clone(), TtlPolicy::default());
    let key = "refs/heads/finish-race";

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let state = state.clone();
            let j = job_in(key, 100 + (i * 3) % 8);
            tokio::spawn(async move { state.mark_terminal(&j, TerminalOutcome::Success).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().expect("success race must not surface as an error");
    }

    let record = only_record(store.as_ref(), key).await;
    assert_eq!(record.job_status, JobStatus::Success);
    assert_eq!(record.commit_ts, 107);
}
