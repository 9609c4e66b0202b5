//! Integration tests for the subtopic registry fan-out
//!
//! Covers selection, failure isolation, normalization of mixed sync/async
//! outcomes, timeouts and worker pool teardown.

use dentcode_ai::types::ActivationOutcome;
use dentcode_ai::{RegistryOptions, SubtopicRegistry};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn registry_with_timeout(timeout: Duration) -> SubtopicRegistry {
    SubtopicRegistry::with_options(
        "Diagnostic",
        RegistryOptions {
            activation_timeout: timeout,
            max_workers: 4,
        },
    )
}

// ============================================================================
// End-to-End Scenarios
// ============================================================================

#[tokio::test]
async fn test_mixed_sync_and_async_entries() {
    let mut registry = SubtopicRegistry::new("Diagnostic");
    registry
        .register_blocking("A", "Periodic Exam", |_| {
            Ok(ActivationOutcome::from(
                "CODE: D0150\nEXPLANATION: routine exam\nDOUBT: none",
            ))
        })
        .unwrap();
    registry
        .register_async("A", "Adult Prophylaxis", |_| async {
            Ok(ActivationOutcome::Structured(
                json!({"code": "D1110", "explanation": "cleaning"}),
            ))
        })
        .unwrap();

    let aggregate = registry.activate_all("patient visit", "A").await;

    assert_eq!(aggregate.topic_result.len(), 2);
    let code_of = |topic: &str| {
        aggregate
            .topic_result
            .iter()
            .find(|r| r.topic == topic)
            .and_then(|r| r.code.clone())
    };
    assert_eq!(code_of("Periodic Exam").as_deref(), Some("D0150"));
    assert_eq!(code_of("Adult Prophylaxis").as_deref(), Some("D1110"));
    assert_eq!(
        aggregate.activated_subtopics,
        vec!["Adult Prophylaxis", "Periodic Exam"]
    );
}

#[tokio::test]
async fn test_failing_entry_yields_error_record() {
    let mut registry = SubtopicRegistry::new("Diagnostic");
    registry
        .register_blocking("B", "Broken", |_| Err(anyhow::anyhow!("boom")))
        .unwrap();

    let aggregate = registry.activate_all("x", "B").await;

    assert_eq!(aggregate.topic_result.len(), 1);
    let record = &aggregate.topic_result[0];
    assert!(record.error.as_deref().unwrap().contains("boom"));
    assert_eq!(record.topic, "Broken");
    assert_eq!(record.code_range.as_deref(), Some("B"));
    assert!(aggregate.activated_subtopics.is_empty());
}

#[tokio::test]
async fn test_empty_outcome_is_dropped() {
    let mut registry = SubtopicRegistry::new("Diagnostic");
    registry
        .register_blocking("C", "Silent", |_| Ok(ActivationOutcome::from(None::<String>)))
        .unwrap();

    let aggregate = registry.activate_all("x", "C").await;

    assert!(aggregate.topic_result.is_empty());
    assert!(aggregate.activated_subtopics.is_empty());
}

#[tokio::test]
async fn test_codes_list_elevates_first_code() {
    let mut registry = SubtopicRegistry::new("Diagnostic");
    registry
        .register_async("D", "Intraoral Images", |_| async {
            Ok(ActivationOutcome::from(
                json!({"codes": [{"code": "D0220"}, {"code": "D0230"}]}),
            ))
        })
        .unwrap();

    let aggregate = registry.activate_all("x", "D").await;

    let record = &aggregate.topic_result[0];
    assert_eq!(record.code.as_deref(), Some("D0220"));
    let codes: Vec<_> = record.codes.iter().map(|c| c.code.as_deref()).collect();
    assert_eq!(codes, vec![Some("D0220"), Some("D0230")]);
}

#[tokio::test]
async fn test_empty_selection_runs_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = SubtopicRegistry::new("Diagnostic");
    let counter = Arc::clone(&calls);
    registry
        .register_blocking("A", "Exam", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ActivationOutcome::from("CODE: D0150"))
        })
        .unwrap();

    let aggregate = registry.activate_all("x", "").await;

    assert!(aggregate.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_slow_entry_times_out_promptly() {
    let mut registry = registry_with_timeout(Duration::from_millis(200));
    registry
        .register_blocking("E", "Slow Sync", |_| {
            std::thread::sleep(Duration::from_secs(3));
            Ok(ActivationOutcome::from("CODE: D0999"))
        })
        .unwrap();
    registry
        .register_async("E", "Slow Async", |_| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok(ActivationOutcome::from("CODE: D0999"))
        })
        .unwrap();
    registry
        .register_async("E", "Fast", |_| async { Ok(ActivationOutcome::from("CODE: D0140")) })
        .unwrap();

    let started = Instant::now();
    let aggregate = registry.activate_all("x", "E").await;
    let elapsed = started.elapsed();

    // Bounded by the per-entry timeout, not by the slow jobs
    assert!(elapsed < Duration::from_secs(2), "took {:?}", elapsed);
    assert_eq!(aggregate.topic_result.len(), 3);
    for topic in ["Slow Sync", "Slow Async"] {
        let record = aggregate
            .topic_result
            .iter()
            .find(|r| r.topic == topic)
            .unwrap();
        assert!(
            record.error.as_deref().unwrap().contains("timed out"),
            "{topic}: {:?}",
            record.error
        );
    }
    assert_eq!(aggregate.activated_subtopics, vec!["Fast"]);
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_panics_and_errors_never_escape() {
    let mut registry = registry_with_timeout(Duration::from_millis(500));
    registry
        .register_blocking("A", "Sync Panic", |_| -> anyhow::Result<ActivationOutcome> {
            panic!("sync exploded")
        })
        .unwrap();
    registry
        .register_async("A", "Async Error", |_| async {
            Err(anyhow::anyhow!("async failed"))
        })
        .unwrap();
    registry
        .register_blocking("A", "Healthy", |_| Ok(ActivationOutcome::from("CODE: D0120")))
        .unwrap();

    let aggregate = registry.activate_all("x", "A").await;

    assert_eq!(aggregate.topic_result.len(), 3);
    let errors = aggregate
        .topic_result
        .iter()
        .filter(|r| r.error.is_some())
        .count();
    assert_eq!(errors, 2);
    assert_eq!(aggregate.activated_subtopics, vec!["Healthy"]);
}

#[tokio::test]
async fn test_explicit_none_is_distinguishable() {
    let mut registry = SubtopicRegistry::new("Diagnostic");
    registry
        .register_blocking("A", "Text None", |_| {
            Ok(ActivationOutcome::from(
                "CODE: none\nEXPLANATION: no imaging was taken",
            ))
        })
        .unwrap();
    registry
        .register_async("A", "Null Code", |_| async {
            Ok(ActivationOutcome::from(
                json!({"code": null, "explanation": "no evaluation documented"}),
            ))
        })
        .unwrap();
    registry
        .register_blocking("B", "Never Selected", |_| Ok(ActivationOutcome::from("CODE: D0150")))
        .unwrap();

    let aggregate = registry.activate_all("x", "A").await;

    assert_eq!(aggregate.topic_result.len(), 2);
    for record in &aggregate.topic_result {
        assert_eq!(record.code_range, None, "{}", record.topic);
        assert_eq!(record.code, None);
    }
    assert!(!aggregate
        .topic_result
        .iter()
        .any(|r| r.topic == "Never Selected"));
}

#[tokio::test]
async fn test_selection_invokes_exactly_the_intersection() {
    let invoked = Arc::new(Mutex::new(Vec::new()));
    let mut registry = SubtopicRegistry::new("Restorative");

    for disc in ["D2140-D2161", "D2330-D2394", "D2710-D2799", "D2910-D2999"] {
        let invoked = Arc::clone(&invoked);
        registry
            .register_blocking(disc, disc, move |_| {
                invoked.lock().unwrap().push(disc.to_string());
                Ok(ActivationOutcome::Empty)
            })
            .unwrap();
    }

    registry
        .activate_all("x", "D2910-D2999, UNKNOWN ,D2140-D2161")
        .await;

    let mut seen = invoked.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec!["D2140-D2161", "D2910-D2999"]);
}

#[tokio::test]
async fn test_activated_subtopics_sorted_and_unique() {
    let mut registry = registry_with_timeout(Duration::from_secs(5));

    // Same display name under two discriminators, finishing in reverse order
    for (disc, name, delay_ms) in [
        ("A", "Zeta", 5u64),
        ("A", "Alpha", 60),
        ("B", "Mu", 30),
        ("B", "Alpha", 1),
    ] {
        registry
            .register_async(disc, name, move |_| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(ActivationOutcome::from(format!("CODE: X{delay_ms}")))
            })
            .unwrap();
    }

    let aggregate = registry.activate_all("x", "A,B").await;

    assert_eq!(aggregate.topic_result.len(), 4);
    assert_eq!(aggregate.activated_subtopics, vec!["Alpha", "Mu", "Zeta"]);
}

#[tokio::test]
async fn test_abandoned_blocking_job_does_not_hold_the_call() {
    let finished = Arc::new(AtomicUsize::new(0));
    let mut registry = registry_with_timeout(Duration::from_millis(100));
    let flag = Arc::clone(&finished);
    registry
        .register_blocking("A", "Stuck", move |_| {
            std::thread::sleep(Duration::from_millis(800));
            flag.fetch_add(1, Ordering::SeqCst);
            Ok(ActivationOutcome::Empty)
        })
        .unwrap();

    let started = Instant::now();
    let aggregate = registry.activate_all("x", "A").await;

    // Pool dropped on return without waiting for the stuck worker
    assert!(started.elapsed() < Duration::from_millis(700));
    assert_eq!(finished.load(Ordering::SeqCst), 0);
    assert!(aggregate.topic_result[0].error.is_some());

    // The abandoned job still runs to completion on its own thread
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_registry_is_reusable_across_calls() {
    let mut registry = SubtopicRegistry::new("Preventive");
    registry
        .register_blocking("D1110-D1120", "Dental Prophylaxis", |scenario| {
            let code = if scenario.contains("child") { "D1120" } else { "D1110" };
            Ok(ActivationOutcome::from(format!("CODE: {code}")))
        })
        .unwrap();

    let adult = registry.activate_all("adult cleaning", "D1110-D1120").await;
    let child = registry.activate_all("child cleaning", "D1110-D1120").await;

    assert_eq!(adult.topic_result[0].code.as_deref(), Some("D1110"));
    assert_eq!(child.topic_result[0].code.as_deref(), Some("D1120"));
}
