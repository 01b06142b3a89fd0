// ABOUTME: Tests for the concurrency limiter.
// ABOUTME: Covers slot accounting, queueing behind held slots, and cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::limiter::{Cancelled, ConcurrencyLimiter};

#[tokio::test]
async fn test_new_limiter_starts_empty() {
    let limiter = ConcurrencyLimiter::new(4);
    assert_eq!(limiter.capacity(), 4);
    assert_eq!(limiter.available(), 4);
    assert_eq!(limiter.in_flight(), 0);
}

#[tokio::test]
async fn test_acquire_and_release() {
    let limiter = ConcurrencyLimiter::new(2);

    let first = limiter.acquire(std::future::pending::<()>()).await.unwrap();
    let _second = limiter.acquire(std::future::pending::<()>()).await.unwrap();
    assert_eq!(limiter.in_flight(), 2);

    drop(first);
    assert_eq!(limiter.in_flight(), 1);
    assert_eq!(limiter.available(), 1);
}

#[tokio::test]
async fn test_acquire_waits_for_release() {
    let limiter = ConcurrencyLimiter::new(1);
    let held = limiter.acquire(std::future::pending::<()>()).await.unwrap();

    let waiter = {
        let limiter = limiter.clone();
        tokio::spawn(async move { limiter.acquire(std::future::pending::<()>()).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished(), "waiter should queue behind the held slot");

    drop(held);
    let result = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter should start once the slot frees")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_acquire_cancelled() {
    let limiter = ConcurrencyLimiter::new(1);
    let _held = limiter.acquire(std::future::pending::<()>()).await.unwrap();

    let cancel = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
    };
    let result = limiter.acquire(cancel).await;
    assert_eq!(result.err(), Some(Cancelled));
    assert_eq!(limiter.in_flight(), 1);
}

#[tokio::test]
async fn test_already_cancelled_wins_over_free_slot() {
    let limiter = ConcurrencyLimiter::new(1);
    let result = limiter.acquire(std::future::ready(())).await;
    assert_eq!(result.err(), Some(Cancelled));
    assert_eq!(limiter.available(), 1);
}

#[tokio::test]
async fn test_cancelled_error_display() {
    assert_eq!(Cancelled.to_string(), "operation cancelled");
}

#[tokio::test]
async fn test_never_exceeds_capacity() {
    let limiter = ConcurrencyLimiter::new(4);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();

    for _ in 0..8 {
        let limiter = limiter.clone();
        let running = running.clone();
        let peak = peak.clone();
        handles.push(tokio::spawn(async move {
            let _permit = limiter.acquire(std::future::pending::<()>()).await.unwrap();
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            running.fetch_sub(1, Ordering::SeqCst);
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(peak.load(Ordering::SeqCst), 4);
    assert_eq!(limiter.in_flight(), 0);
}
