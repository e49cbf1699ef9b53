//! Claiming protocol and memoization against the in-process backend.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use lidex::memory::MemoryStore;
use lidex::{Error, Payload, Status, Workflow, WorkflowStore};
use serde_json::{Value, json};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
}

fn ms(n: i64) -> Duration {
    Duration::milliseconds(n)
}

// ---------------------------------------------------------------------------
// Insert
// ---------------------------------------------------------------------------

#[tokio::test]
async fn insert_is_idempotent_and_keeps_first_data() {
    let store = MemoryStore::new();

    assert!(store.insert_value("w1", "h1", &json!({"a": 1})).await.unwrap());
    assert!(!store.insert_value("w1", "h2", &json!({"a": 2})).await.unwrap());

    let wf = store.get_workflow("w1").await.unwrap().unwrap();
    assert_eq!(wf.handler, "h1");
    assert_eq!(wf.input.decode::<Value>().unwrap(), json!({"a": 1}));
    assert_eq!(wf.status, Status::Idle);
    assert_eq!(wf.timeout_at, None);
}

#[tokio::test]
async fn insert_rejects_empty_id() {
    let store = MemoryStore::new();
    let err = store.insert_value("", "h1", &Value::Null).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn concurrent_duplicate_inserts_have_one_winner() {
    let store = Arc::new(MemoryStore::new());
    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.insert_value("dup", "h", &i).await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

// ---------------------------------------------------------------------------
// Claim
// ---------------------------------------------------------------------------

#[tokio::test]
async fn claim_on_empty_store_returns_none() {
    let store = MemoryStore::new();
    for offset in [-1_000_000, 0, 1_000_000] {
        let now = t0() + ms(offset);
        assert_eq!(store.claim(now, now + ms(1000)).await.unwrap(), None);
    }
}

#[tokio::test]
async fn terminal_workflows_are_never_claimed() {
    let store = MemoryStore::new();
    for (id, status) in [("done", Status::Finished), ("gone", Status::Aborted)] {
        let mut wf = Workflow::new(id, "h", Payload::encode(&Value::Null).unwrap());
        wf.status = status;
        wf.timeout_at = Some(t0() - Duration::days(1));
        store.put_workflow(wf).await.unwrap();
    }

    let later = t0() + Duration::days(30);
    assert_eq!(store.claim(later, later + ms(1000)).await.unwrap(), None);
}

#[tokio::test]
async fn lease_scenario_claims_blocks_and_reclaims() {
    let store = MemoryStore::new();
    let t = t0();

    assert!(store.insert_value("w1", "h1", &json!({"a": 1})).await.unwrap());
    assert_eq!(
        store.claim(t, t + ms(1000)).await.unwrap().as_deref(),
        Some("w1")
    );

    let wf = store.get_workflow("w1").await.unwrap().unwrap();
    assert_eq!(wf.status, Status::Running);
    assert_eq!(wf.timeout_at, Some(t + ms(1000)));

    assert_eq!(store.claim(t + ms(500), t + ms(1500)).await.unwrap(), None);
    assert_eq!(
        store.claim(t + ms(1001), t + ms(2000)).await.unwrap().as_deref(),
        Some("w1")
    );

    let wf = store.get_workflow("w1").await.unwrap().unwrap();
    assert_eq!(wf.timeout_at, Some(t + ms(2000)));
}

#[tokio::test]
async fn lease_expires_exactly_at_timeout() {
    let store = MemoryStore::new();
    let t = t0();
    store.insert_value("w1", "h1", &Value::Null).await.unwrap();
    store.claim(t, t + ms(1000)).await.unwrap();

    assert_eq!(store.claim(t + ms(999), t + ms(5000)).await.unwrap(), None);
    assert_eq!(
        store.claim(t + ms(1000), t + ms(5000)).await.unwrap().as_deref(),
        Some("w1")
    );
}

#[tokio::test]
async fn lease_is_compared_at_microsecond_precision() {
    let store = MemoryStore::new();
    let t = t0();
    store.insert_value("w1", "h1", &Value::Null).await.unwrap();

    // Postgres keeps microseconds; the 500ns tail of the lease is dropped.
    let lease = t + ms(1000) + Duration::nanoseconds(500);
    store.claim(t, lease).await.unwrap();
    let wf = store.get_workflow("w1").await.unwrap().unwrap();
    assert_eq!(wf.timeout_at, Some(t + ms(1000)));

    let within_same_micro = t + ms(1000) + Duration::nanoseconds(100);
    assert_eq!(
        store
            .claim(within_same_micro, t + ms(5000))
            .await
            .unwrap()
            .as_deref(),
        Some("w1")
    );
}

#[tokio::test]
async fn failed_workflow_is_reclaimed_after_its_lease() {
    let store = MemoryStore::new();
    let t1 = t0();
    let mut wf = Workflow::new("w1", "h1", Payload::encode(&Value::Null).unwrap());
    wf.status = Status::Failed;
    wf.timeout_at = Some(t1);
    wf.failures = Some(2);
    wf.last_error = Some("boom".to_string());
    store.put_workflow(wf).await.unwrap();

    assert_eq!(store.claim(t1 - ms(1), t1 + ms(1000)).await.unwrap(), None);
    assert_eq!(
        store.claim(t1, t1 + ms(1000)).await.unwrap().as_deref(),
        Some("w1")
    );

    let wf = store.get_workflow("w1").await.unwrap().unwrap();
    assert_eq!(wf.status, Status::Running);
    assert_eq!(wf.failures, Some(2));
    assert_eq!(wf.last_error.as_deref(), Some("boom"));
}

#[tokio::test]
async fn each_claim_takes_a_different_idle_workflow() {
    let store = MemoryStore::new();
    for id in ["a", "b", "c"] {
        store.insert_value(id, "h", &Value::Null).await.unwrap();
    }

    let t = t0();
    let mut claimed = Vec::new();
    while let Some(id) = store.claim(t, t + ms(1000)).await.unwrap() {
        claimed.push(id);
    }
    claimed.sort();
    assert_eq!(claimed, vec!["a", "b", "c"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_have_a_single_winner() {
    let store = Arc::new(MemoryStore::new());
    store.insert_value("only", "h", &Value::Null).await.unwrap();

    let now = t0();
    let mut handles = Vec::new();
    for _ in 0..32 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.claim(now, now + ms(1000)).await.unwrap()
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        if let Some(id) = handle.await.unwrap() {
            winners.push(id);
        }
    }
    assert_eq!(winners, vec!["only".to_string()]);
}

// ---------------------------------------------------------------------------
// Step outputs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn output_lookup_misses_then_hits() {
    let store = MemoryStore::new();
    let value = json!({"charged": true, "amount": 12.5, "tags": ["x", null]});

    assert_eq!(
        store.find_output_value::<Value>("w1", "charge").await.unwrap(),
        None
    );
    assert!(store.save_output_value("w1", "charge", &value).await.unwrap());
    assert_eq!(
        store.find_output_value::<Value>("w1", "charge").await.unwrap(),
        Some(value)
    );
    // A different step of the same workflow is still a miss.
    assert_eq!(store.find_output("w1", "ship").await.unwrap(), None);
}

#[tokio::test]
async fn saved_outputs_are_immutable() {
    let store = MemoryStore::new();
    assert!(store.save_output_value("w1", "s1", &1).await.unwrap());
    assert!(!store.save_output_value("w1", "s1", &2).await.unwrap());
    assert_eq!(
        store.find_output_value::<i32>("w1", "s1").await.unwrap(),
        Some(1)
    );
}

#[tokio::test]
async fn null_output_is_a_hit_not_a_miss() {
    let store = MemoryStore::new();
    store.save_output_value("w1", "s1", &Value::Null).await.unwrap();
    let found = store.find_output("w1", "s1").await.unwrap();
    assert_eq!(found.map(Payload::into_string).as_deref(), Some("null"));
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn terminate_is_idempotent_and_closes_the_store() {
    let store = MemoryStore::new();
    store.insert_value("w1", "h1", &Value::Null).await.unwrap();

    store.terminate().await.unwrap();
    store.terminate().await.unwrap();

    let t = t0();
    assert!(matches!(
        store.claim(t, t + ms(1)).await,
        Err(Error::Terminated)
    ));
    assert!(matches!(
        store.find_output("w1", "s1").await,
        Err(Error::Terminated)
    ));
}

#[tokio::test]
async fn store_is_usable_through_a_trait_object() {
    let store: Box<dyn WorkflowStore> = Box::new(MemoryStore::new());
    let input = Payload::encode(&json!([1, 2, 3])).unwrap();
    assert!(store.insert("w1", "h1", input).await.unwrap());
    let t = t0();
    assert_eq!(
        store.claim(t, t + ms(10)).await.unwrap().as_deref(),
        Some("w1")
    );
    store.terminate().await.unwrap();
}
