//! Integration tests for concurrent use of a shared registry
//!
//! One registry per category is shared by every request; fan-outs from
//! different requests must not interfere with each other.

use dentcode_ai::types::ActivationOutcome;
use dentcode_ai::{RegistryOptions, SubtopicRegistry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fan_outs_are_independent() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = SubtopicRegistry::with_options(
        "Preventive",
        RegistryOptions {
            activation_timeout: Duration::from_secs(5),
            max_workers: 2,
        },
    );

    let counter = Arc::clone(&calls);
    registry
        .register_blocking("D1110-D1120", "Dental Prophylaxis", move |scenario| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            Ok(ActivationOutcome::from(format!(
                "CODE: D1110\nEXPLANATION: {scenario}"
            )))
        })
        .unwrap();
    registry
        .register_async("D1206-D1208", "Topical Fluoride Treatment", |scenario| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(ActivationOutcome::from(format!("CODE: D1206\nEXPLANATION: {scenario}")))
        })
        .unwrap();

    let registry = Arc::new(registry);
    let mut join_set = JoinSet::new();

    for i in 0..10 {
        let registry = Arc::clone(&registry);
        join_set.spawn(async move {
            let scenario = format!("visit {i}");
            let aggregate = registry
                .activate_all(&scenario, "D1110-D1120,D1206-D1208")
                .await;
            (scenario, aggregate)
        });
    }

    let mut completed = 0;
    while let Some(result) = join_set.join_next().await {
        let (scenario, aggregate) = result.unwrap();
        completed += 1;

        assert_eq!(aggregate.topic_result.len(), 2);
        assert_eq!(
            aggregate.activated_subtopics,
            vec!["Dental Prophylaxis", "Topical Fluoride Treatment"]
        );
        // Each fan-out only sees its own scenario
        for record in &aggregate.topic_result {
            assert_eq!(record.explanation.as_deref(), Some(scenario.as_str()));
        }
    }

    assert_eq!(completed, 10);
    assert_eq!(calls.load(Ordering::SeqCst), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_entries_do_not_stall_async_entries() {
    let mut registry = SubtopicRegistry::with_options(
        "Diagnostic",
        RegistryOptions {
            activation_timeout: Duration::from_secs(5),
            max_workers: 8,
        },
    );

    registry
        .register_blocking("A", "Blocking Exam", |_| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(ActivationOutcome::from("CODE: D0150"))
        })
        .unwrap();
    registry
        .register_async("A", "Async Imaging", |_| async {
            Ok(ActivationOutcome::from("CODE: D0210"))
        })
        .unwrap();

    let registry = Arc::new(registry);
    let watcher = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.activate_all("x", "A").await })
    };

    // The runtime keeps making progress while the blocking job sleeps
    let ticks = Arc::new(AtomicUsize::new(0));
    let ticker = {
        let ticks = Arc::clone(&ticks);
        tokio::spawn(async move {
            for _ in 0..5 {
                tokio::time::sleep(Duration::from_millis(20)).await;
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    let aggregate = watcher.await.unwrap();
    ticker.await.unwrap();

    assert_eq!(ticks.load(Ordering::SeqCst), 5);
    assert_eq!(aggregate.activated_subtopics, vec!["Async Imaging", "Blocking Exam"]);
}
