//! Integration tests for resilience module
//!
//! Exercises the throttle, deduplicator and retry primitives together the way
//! a request pipeline composes them.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskdesk_common::resilience::{
    ClassifiedRetryPolicy, ConcurrencyThrottle, RequestDeduplicator, RetryConfig,
};
use taskdesk_common::{ErrorClassification, ErrorSeverity};

#[derive(Debug, Clone, PartialEq)]
struct Transient;

impl ErrorClassification for Transient {
    fn is_retryable(&self) -> bool {
        true
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Warning
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Validates that the throttle bounds concurrency across many tasks.
///
/// # Test Steps
/// 1. Spawn 25 tasks against a throttle of 10 slots
/// 2. Each task records the in-flight high-water mark while holding a slot
/// 3. Verify the high-water mark never exceeded the bound
#[tokio::test(start_paused = true)]
async fn test_throttle_never_exceeds_bound() {
    let throttle = ConcurrencyThrottle::new(10).unwrap();
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..25)
        .map(|_| {
            let throttle = throttle.clone();
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            tokio::spawn(async move {
                let _slot = throttle.acquire().await.unwrap();
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(peak.load(Ordering::SeqCst), 10);
    let metrics = throttle.metrics();
    assert_eq!(metrics.in_flight, 0);
    assert_eq!(metrics.queued, 0);
    assert_eq!(metrics.total_admitted, 25);
}

/// Validates a dedup group that runs a retrying execution.
///
/// # Test Steps
/// 1. Five identical callers join one dedup group
/// 2. The execution fails twice with a transient error, then succeeds
/// 3. Verify one execution, three attempts, and delays of 1s then 2s
#[tokio::test(start_paused = true)]
async fn test_dedup_group_shares_retried_outcome() {
    let dedup: RequestDeduplicator<String, Result<Arc<String>, Transient>> =
        RequestDeduplicator::new(Duration::from_secs(5));
    let attempts = Arc::new(AtomicUsize::new(0));
    let executions = Arc::new(AtomicUsize::new(0));

    let make = {
        let attempts = Arc::clone(&attempts);
        let executions = Arc::clone(&executions);
        move || {
            let attempts = Arc::clone(&attempts);
            let executions = Arc::clone(&executions);
            async move {
                executions.fetch_add(1, Ordering::SeqCst);
                let config = RetryConfig::default();
                let policy = ClassifiedRetryPolicy::new();
                let started = tokio::time::Instant::now();
                let mut attempt = 0;
                loop {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n >= 2 {
                        return Ok(Arc::new(format!("done after {:?}", started.elapsed())));
                    }
                    match config.next_delay(&policy, &Transient, attempt) {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => return Err(Transient),
                    }
                    attempt += 1;
                }
            }
        }
    };

    let callers: Vec<_> = (0..5)
        .map(|_| {
            let dedup = dedup.clone();
            let make = make.clone();
            tokio::spawn(async move { dedup.run("GET /tasks?page=1".to_string(), make).await })
        })
        .collect();

    let mut results = Vec::new();
    for caller in callers {
        results.push(caller.await.unwrap().unwrap());
    }

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(results[0].as_str(), "done after 3s");
    assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
}
