//! Circuit breakers around a single free-standing operation.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use breaker_gate::{new_circuit_breaker, CallError, CircuitState, Operation, TimeoutError, UsageError};
use futures_util::future::join_all;
use tokio::sync::oneshot;
use tokio::time::{sleep, Instant};

mod common;

use common::{Behavior, ExpectedFailure, ScriptedBackend, Tally, CALL_FREQUENCY, SAMPLE_COUNT};

fn scripted(backend: &Arc<ScriptedBackend>) -> Operation<(), (), ExpectedFailure> {
    let backend = backend.clone();
    Operation::new("fetch", move |_: ()| backend.invoke())
}

#[tokio::test(start_paused = true)]
async fn test_well_behaved_operation() {
    let gated = new_circuit_breaker(
        Operation::unnamed(|_: ()| async { Ok::<Option<()>, ExpectedFailure>(None) }),
        0,
        10,
        10,
    );

    for _ in 0..SAMPLE_COUNT {
        sleep(CALL_FREQUENCY).await;
        let outcome = gated.call(()).await;
        assert!(matches!(outcome, Ok(None)), "unexpected outcome: {outcome:?}");
        assert_eq!(gated.breaker().state(), CircuitState::Closed);
        assert_eq!(gated.breaker().consecutive_failures(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_arguments_are_passed_through() {
    const PASS_THROUGH: &str = "hello world";
    let gated = new_circuit_breaker(
        Operation::unnamed(|(first, second): (String, String)| async move {
            assert_eq!(first, PASS_THROUGH, "Arguments MUST be propagated");
            Ok::<_, ExpectedFailure>(second)
        }),
        0,
        10,
        10,
    );

    for _ in 0..SAMPLE_COUNT {
        sleep(CALL_FREQUENCY).await;
        let result = gated
            .call((PASS_THROUGH.to_string(), PASS_THROUGH.to_string()))
            .await
            .unwrap();
        assert_eq!(result, PASS_THROUGH);
    }
}

#[tokio::test(start_paused = true)]
async fn test_failing_operation_opens_and_recovers() {
    let sample = Arc::new(AtomicU32::new(SAMPLE_COUNT));
    let remaining = sample.clone();
    let gated = new_circuit_breaker(
        Operation::unnamed(move |_: ()| {
            let n = remaining.load(Ordering::SeqCst);
            async move {
                if (5..=15).contains(&n) {
                    Err(ExpectedFailure)
                } else {
                    Ok(())
                }
            }
        }),
        0,
        100,
        100,
    );

    let mut tally = Tally::default();
    let mut last = None;
    for _ in 0..SAMPLE_COUNT {
        sleep(CALL_FREQUENCY).await;
        sample.fetch_sub(1, Ordering::SeqCst);
        let outcome = gated.call(()).await;
        tally.record(&outcome);
        last = Some(outcome);
    }

    assert!(tally.errors() > 0, "Should be non-zero errors due to failing functions.");
    assert!(tally.failed > 0);
    assert!(tally.rejected > 0, "breaker should have failed fast while open");
    assert!(matches!(last, Some(Ok(()))), "breaker should have closed again");
    assert_eq!(gated.breaker().state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_operations_that_never_complete_time_out() {
    let backend = ScriptedBackend::new(Behavior::Hang);
    let gated = new_circuit_breaker(scripted(&backend), 0, 50, 75);

    let mut pending = Vec::new();
    for _ in 0..SAMPLE_COUNT {
        sleep(CALL_FREQUENCY).await;
        pending.push(gated.call(()));
    }

    let mut tally = Tally::default();
    for outcome in join_all(pending).await {
        tally.record(&outcome);
    }

    assert_eq!(tally.ok, 0);
    assert_eq!(tally.errors(), SAMPLE_COUNT);
    assert!(tally.timed_out > 0, "Should be non-zero errors due to timeouts.");
    assert_eq!(tally.timed_out, backend.invocations());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_delivered_once_and_counted() {
    let backend = ScriptedBackend::new(Behavior::Hang);
    let gated = new_circuit_breaker(scripted(&backend), 5, 50, 1_000);

    let err = gated.call(()).await.unwrap_err();
    match err {
        CallError::Timeout(TimeoutError { operation, elapsed_ms }) => {
            assert_eq!(operation, "fetch");
            assert_eq!(elapsed_ms, 50);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(gated.breaker().consecutive_failures(), 1);
    assert_eq!(gated.breaker().state(), CircuitState::Closed);
    assert_eq!(backend.invocations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_late_completion_after_timeout_is_ignored() {
    let gated = new_circuit_breaker(
        Operation::unnamed(|_: ()| async {
            sleep(Duration::from_millis(200)).await;
            Ok::<_, ExpectedFailure>(())
        }),
        5,
        50,
        1_000,
    );

    assert!(gated.call(()).await.unwrap_err().is_timeout());
    sleep(Duration::from_millis(300)).await;

    // A late success would have reset the counter.
    assert_eq!(gated.breaker().consecutive_failures(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_opens_on_call_reaching_threshold() {
    let backend = ScriptedBackend::new(Behavior::Fail);
    let gated = new_circuit_breaker(scripted(&backend), 3, 100, 1_000);

    for expected in [CircuitState::Closed, CircuitState::Closed, CircuitState::Open] {
        let err = gated.call(()).await.unwrap_err();
        assert_eq!(err.into_operation_error(), Some(ExpectedFailure));
        assert_eq!(gated.breaker().state(), expected);
    }
    assert_eq!(gated.breaker().consecutive_failures(), 3);

    assert!(gated.call(()).await.unwrap_err().is_breaker_open());
    assert_eq!(backend.invocations(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_fails_fast_without_invoking() {
    let backend = ScriptedBackend::new(Behavior::Fail);
    let gated = new_circuit_breaker(scripted(&backend), 0, 10_000, 60_000);
    gated.call(()).await.unwrap_err();
    assert_eq!(gated.breaker().state(), CircuitState::Open);

    let started = Instant::now();
    for _ in 0..5 {
        match gated.call(()).await {
            Err(CallError::BreakerOpen(e)) => assert_eq!(e.operation, "fetch"),
            other => panic!("expected fail-fast, got {other:?}"),
        }
    }
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(backend.invocations(), 1);
    assert_eq!(gated.breaker().consecutive_failures(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_dispatches_single_probe() {
    let backend = ScriptedBackend::new(Behavior::Fail);
    let gated = new_circuit_breaker(scripted(&backend), 0, 1_000, 100);
    gated.call(()).await.unwrap_err();

    sleep(Duration::from_millis(150)).await;
    assert_eq!(gated.breaker().state(), CircuitState::HalfOpen);

    backend.set(Behavior::WaitForRelease);
    let probe = gated.call(());
    let concurrent: Vec<_> = (0..3).map(|_| gated.call(())).collect();
    for outcome in join_all(concurrent).await {
        assert!(outcome.unwrap_err().is_breaker_open());
    }
    assert_eq!(backend.invocations(), 2);

    backend.release();
    probe.await.unwrap();
    assert_eq!(gated.breaker().state(), CircuitState::Closed);
    assert_eq!(gated.breaker().consecutive_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_probe_reopens() {
    let backend = ScriptedBackend::new(Behavior::Fail);
    let gated = new_circuit_breaker(scripted(&backend), 0, 1_000, 100);
    gated.call(()).await.unwrap_err();

    sleep(Duration::from_millis(150)).await;
    assert!(gated.call(()).await.unwrap_err().into_operation_error().is_some());
    assert_eq!(gated.breaker().state(), CircuitState::Open);

    sleep(Duration::from_millis(150)).await;
    assert_eq!(gated.breaker().state(), CircuitState::HalfOpen);
}

#[tokio::test]
async fn test_completion_callback_is_never_synchronous() {
    let backend = ScriptedBackend::new(Behavior::Fail);
    let gated = new_circuit_breaker(scripted(&backend), 0, 1_000, 60_000);

    for expect_open in [false, true] {
        let delivered = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();
        let flag = delivered.clone();
        gated
            .call_with((), move |outcome| {
                flag.store(true, Ordering::SeqCst);
                let _ = tx.send(outcome);
            })
            .unwrap();
        assert!(!delivered.load(Ordering::SeqCst));

        let outcome = rx.await.unwrap();
        assert_eq!(outcome.unwrap_err().is_breaker_open(), expect_open);
    }
}

#[tokio::test(start_paused = true)]
async fn test_dropped_call_is_still_accounted() {
    let backend = ScriptedBackend::new(Behavior::Fail);
    let gated = new_circuit_breaker(scripted(&backend), 5, 100, 1_000);

    drop(gated.call(()));
    sleep(Duration::from_millis(1)).await;

    assert_eq!(backend.invocations(), 1);
    assert_eq!(gated.breaker().consecutive_failures(), 1);
}

#[test]
fn test_call_dropped_by_runtime_shutdown_is_interrupted() {
    let backend = ScriptedBackend::new(Behavior::Hang);
    let gated = new_circuit_breaker(scripted(&backend), 0, 10_000, 60_000);

    let first = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let pending = first.block_on(async { gated.call(()) });
    drop(first);

    let second = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let outcome = second.block_on(pending);

    match outcome {
        Err(CallError::Interrupted { operation }) => assert_eq!(operation, "fetch"),
        other => panic!("expected interruption, got {other:?}"),
    }
    assert_eq!(backend.invocations(), 1);
    assert_eq!(gated.breaker().consecutive_failures(), 0);
    assert_eq!(gated.breaker().state(), CircuitState::Closed);
}

#[test]
fn test_call_without_runtime_is_usage_error() {
    let backend = ScriptedBackend::new(Behavior::Succeed);
    let gated = new_circuit_breaker(scripted(&backend), 0, 10, 10);

    let err = gated.try_call(()).unwrap_err();
    assert_eq!(err, UsageError::NoRuntime { operation: "fetch".into() });
    assert_eq!(backend.invocations(), 0);

    let err = gated.call_with((), |_| {}).unwrap_err();
    assert!(matches!(err, UsageError::NoRuntime { .. }));
    assert_eq!(gated.breaker().consecutive_failures(), 0);
}

#[test]
#[should_panic(expected = "outside a Tokio runtime")]
fn test_call_without_runtime_panics() {
    let backend = ScriptedBackend::new(Behavior::Succeed);
    let gated = new_circuit_breaker(scripted(&backend), 0, 10, 10);
    let _ = gated.call(());
}
