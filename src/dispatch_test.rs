use super::*;
use serde_json::{Value, json};
use tokio::sync::mpsc;

fn subscribe(registry: &mut SubscriptionRegistry, method: &str) -> mpsc::UnboundedReceiver<Value> {
    let (tx, rx) = mpsc::unbounded_channel();
    registry.add(method, json!({}), tx).expect("valid method");
    rx
}

#[tokio::test]
async fn response_frame_settles_request() {
    let mut pending = PendingTable::new();
    let registry = SubscriptionRegistry::new();
    let handle = pending.register("fooRequest");

    let outcome = dispatch_frame(Frame::new("fooResponse", json!({"y": 2})), &mut pending, &registry);
    assert_eq!(outcome, DispatchOutcome { delivered: 0, resolved: true });
    assert_eq!(handle.await.expect("resolved"), json!({"y": 2}));
}

#[test]
fn notification_reaches_subscribers() {
    let mut pending = PendingTable::new();
    let mut registry = SubscriptionRegistry::new();
    let mut rx = subscribe(&mut registry, "notifyBarRequest");

    let outcome = dispatch_frame(Frame::new("barNotification", json!({"v": 5})), &mut pending, &registry);
    assert_eq!(outcome, DispatchOutcome { delivered: 1, resolved: false });
    assert_eq!(rx.try_recv().expect("push"), json!({"v": 5}));
    assert!(rx.try_recv().is_err(), "delivered exactly once");
}

#[test]
fn subscribe_echo_is_routed_to_subscribers() {
    let mut pending = PendingTable::new();
    let mut registry = SubscriptionRegistry::new();
    let mut rx = subscribe(&mut registry, "notifyBlockAddedRequest");

    dispatch_frame(Frame::new("notifyBlockAddedRequest", json!({"echo": true})), &mut pending, &registry);
    assert_eq!(rx.try_recv().expect("echo"), json!({"echo": true}));
}

#[tokio::test]
async fn lookups_run_independently() {
    let mut pending = PendingTable::new();
    let mut registry = SubscriptionRegistry::new();
    let mut rx = subscribe(&mut registry, "notifyBlockAddedRequest");
    let handle = pending.register("getBlockRequest");

    let outcome = dispatch_frame(Frame::new("blockAddedNotification", json!({"n": 1})), &mut pending, &registry);
    assert_eq!(outcome, DispatchOutcome { delivered: 1, resolved: false });
    assert_eq!(pending.len(), 1);

    let outcome = dispatch_frame(Frame::new("getBlockResponse", json!({"n": 2})), &mut pending, &registry);
    assert_eq!(outcome, DispatchOutcome { delivered: 0, resolved: true });
    assert_eq!(handle.await.expect("resolved"), json!({"n": 2}));
    assert_eq!(rx.try_recv().expect("push"), json!({"n": 1}));
    assert!(rx.try_recv().is_err());
}

#[test]
fn unmatched_frame_is_dropped() {
    let mut pending = PendingTable::new();
    let registry = SubscriptionRegistry::new();
    let outcome = dispatch_frame(Frame::new("orphanResponse", json!({})), &mut pending, &registry);
    assert!(outcome.is_unmatched());
}

#[tokio::test]
async fn error_response_does_not_touch_subscribers() {
    let mut pending = PendingTable::new();
    let mut registry = SubscriptionRegistry::new();
    let mut rx = subscribe(&mut registry, "notifyBarRequest");
    let handle = pending.register("fooRequest");

    dispatch_frame(Frame::new("fooResponse", json!({"error": "bad"})), &mut pending, &registry);
    assert!(handle.await.is_err());
    assert!(rx.try_recv().is_err());
}
