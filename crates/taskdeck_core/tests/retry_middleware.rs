use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskdeck_core::store::StoreDeps;
use taskdeck_core::{
    EntityStore, ErrorRecord, ManualScheduler, RetryMiddleware, RetryPolicy, SqliteBackend,
    StoreError, StoreResult, Task,
};

fn middleware(policy: RetryPolicy) -> RetryMiddleware {
    RetryMiddleware::new("tasks", policy, Arc::new(ManualScheduler::default()))
}

async fn fail_then_succeed(calls: &AtomicU32, failures: u32) -> StoreResult<&'static str> {
    let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
    if attempt <= failures {
        Err(StoreError::operation(format!("timeout on attempt {attempt}")))
    } else {
        Ok("saved")
    }
}

#[tokio::test(start_paused = true)]
async fn fails_twice_then_succeeds_on_third_attempt() {
    let calls = AtomicU32::new(0);
    let started = tokio::time::Instant::now();

    let result = middleware(RetryPolicy::default())
        .run("update", || fail_then_succeed(&calls, 2))
        .await;

    assert_eq!(result, Ok("saved"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 1000 ms after the first failure, 2000 ms after the second.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(3_000));
    assert!(elapsed < Duration::from_millis(3_100));
}

#[tokio::test(start_paused = true)]
async fn exhaustion_surfaces_last_error_and_reports_record() {
    let calls = AtomicU32::new(0);
    let records: Arc<Mutex<Vec<ErrorRecord>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&records);

    let err = middleware(RetryPolicy::interactive())
        .with_error_callback(Arc::new(move |record: &ErrorRecord| {
            sink.lock().unwrap().push(record.clone());
        }))
        .run("create", || fail_then_succeed(&calls, u32::MAX))
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match &err {
        StoreError::RetryExhausted {
            attempts,
            record,
            last,
        } => {
            assert_eq!(*attempts, 3);
            assert_eq!(record.attempt, 3);
            assert_eq!(record.store, "tasks");
            assert_eq!(record.action, "create");
            assert_eq!(record.code, "operation_failed");
            assert_eq!(
                **last,
                StoreError::operation("timeout on attempt 3")
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.code(), "retry_exhausted");

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message, "operation failed: timeout on attempt 3");
}

#[tokio::test(start_paused = true)]
async fn local_errors_are_never_retried() {
    let calls = AtomicU32::new(0);
    let err = middleware(RetryPolicy::default())
        .run("update", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(StoreError::not_found("task", "missing"))
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test(start_paused = true)]
async fn delay_ceiling_caps_backoff() {
    let calls = AtomicU32::new(0);
    let started = tokio::time::Instant::now();
    let policy = RetryPolicy {
        max_attempts: 4,
        base_delay_ms: 1_000,
        max_delay_ms: Some(1_500),
    };

    middleware(policy)
        .run("fetch", || fail_then_succeed(&calls, 3))
        .await
        .unwrap();

    // 1000 + min(2000, 1500) + min(4000, 1500)
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(4_000));
    assert!(elapsed < Duration::from_millis(4_100));
}

#[tokio::test(start_paused = true)]
async fn unreadable_rows_fail_a_reload_without_retrying() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskdeck.sqlite3");
    let backend = SqliteBackend::open(&path).unwrap();
    rusqlite::Connection::open(&path)
        .unwrap()
        .execute(
            "INSERT INTO entities (kind, id, user_id, payload, created_at, updated_at)
             VALUES ('task', 'x', 'user-1', '{not json', 0, 0);",
            [],
        )
        .unwrap();

    let records = Arc::new(Mutex::new(0u32));
    let sink = Arc::clone(&records);
    let clock = Arc::new(ManualScheduler::default());
    let store = EntityStore::<Task>::new(StoreDeps {
        user_id: "user-1".to_string(),
        backend: Arc::new(backend),
        middleware: RetryMiddleware::new("tasks", RetryPolicy::default(), clock.clone())
            .with_error_callback(Arc::new(move |_: &ErrorRecord| {
                *sink.lock().unwrap() += 1;
            })),
        clock,
        preferences: None,
    });

    let started = tokio::time::Instant::now();
    let err = store.fetch_all().await.unwrap_err();

    assert!(matches!(err, StoreError::Rejected { .. }));
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(*records.lock().unwrap(), 0);
    assert!(!store.snapshot().is_loading());
}
