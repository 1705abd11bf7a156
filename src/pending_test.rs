use super::*;
use serde_json::json;
use tokio::time::{Duration, timeout};

#[tokio::test]
async fn response_resolves_matching_request() {
    let mut table = PendingTable::new();
    let handle = table.register("fooRequest");

    assert!(table.resolve("fooResponse", json!({"y": 2})));
    assert!(table.is_empty());
    assert_eq!(handle.await.expect("resolved"), json!({"y": 2}));
}

#[tokio::test]
async fn error_field_rejects_request() {
    let mut table = PendingTable::new();
    let handle = table.register("fooRequest");

    assert!(table.resolve("fooResponse", json!({"error": "bad"})));
    let err = handle.await.expect_err("should reject");
    assert!(matches!(&err, MuxError::Remote(value) if value == &json!("bad")));
    assert_eq!(err.remote_message(), Some("bad"));
}

#[tokio::test]
async fn structured_error_exposes_message() {
    let mut table = PendingTable::new();
    let handle = table.register("submitTransactionRequest");

    table.resolve("submitTransactionResponse", json!({"error": {"message": "rejected"}}));
    let err = handle.await.expect_err("should reject");
    assert_eq!(err.remote_message(), Some("rejected"));
}

#[tokio::test]
async fn unset_error_field_is_stripped_from_success() {
    let mut table = PendingTable::new();
    let handle = table.register("getInfoRequest");

    table.resolve("getInfoResponse", json!({"error": null, "version": "0.12"}));
    assert_eq!(handle.await.expect("resolved"), json!({"version": "0.12"}));
}

#[test]
fn zero_error_code_counts_as_unset() {
    assert_eq!(settle(json!({"error": 0, "n": 1})).expect("success"), json!({"n": 1}));
    assert_eq!(settle(json!({"error": 0.0})).expect("success"), json!({}));
    assert!(matches!(settle(json!({"error": -3})), Err(MuxError::Remote(code)) if code == json!(-3)));
    assert!(settle(json!({"error": []})).is_err());
}

#[tokio::test]
async fn same_name_requests_resolve_fifo() {
    let mut table = PendingTable::new();
    let first = table.register("fooRequest");
    let second = table.register("fooRequest");

    table.resolve("fooResponse", json!({"n": 1}));
    table.resolve("fooResponse", json!({"n": 2}));

    assert_eq!(first.await.expect("first"), json!({"n": 1}));
    assert_eq!(second.await.expect("second"), json!({"n": 2}));
}

#[tokio::test]
async fn different_names_do_not_interfere() {
    let mut table = PendingTable::new();
    let foo = table.register("fooRequest");
    let bar = table.register("barRequest");

    table.resolve("barResponse", json!({"bar": true}));
    assert_eq!(table.len(), 1);
    assert_eq!(bar.await.expect("bar"), json!({"bar": true}));

    table.resolve("fooResponse", json!({"foo": true}));
    assert_eq!(foo.await.expect("foo"), json!({"foo": true}));
}

#[test]
fn unmatched_frames_are_dropped() {
    let mut table = PendingTable::new();
    let _handle = table.register("fooRequest");

    assert!(!table.resolve("barResponse", json!({})));
    assert!(!table.resolve("blockAddedNotification", json!({})));
    assert_eq!(table.len(), 1);
}

#[tokio::test]
async fn abandoned_handles_do_not_steal_responses() {
    let mut table = PendingTable::new();
    let abandoned = table.register("fooRequest");
    let live = table.register("fooRequest");
    drop(abandoned);

    assert!(table.resolve("fooResponse", json!({"n": 1})));
    assert_eq!(live.await.expect("live"), json!({"n": 1}));
}

#[tokio::test]
async fn fail_all_rejects_everything() {
    let mut table = PendingTable::new();
    let a = table.register("fooRequest");
    let b = table.register("barRequest");

    assert_eq!(table.fail_all(|| MuxError::Disconnected), 2);
    assert!(table.is_empty());
    assert!(matches!(a.await, Err(MuxError::Disconnected)));
    assert!(matches!(b.await, Err(MuxError::Disconnected)));
}

#[tokio::test]
async fn dropped_table_reports_shutdown() {
    let mut table = PendingTable::new();
    let handle = table.register("fooRequest");
    drop(table);

    let settled = timeout(Duration::from_millis(100), handle)
        .await
        .expect("handle should settle once the table is gone");
    assert!(matches!(settled, Err(MuxError::Shutdown)));
}
