use super::*;

#[test]
fn response_name_swaps_suffix() {
    assert_eq!(response_name("getInfoRequest").expect("valid"), "getInfoResponse");
    assert_eq!(response_name("fooRequest").expect("valid"), "fooResponse");
}

#[test]
fn response_name_rejects_bad_methods() {
    assert_eq!(
        response_name("getInfo"),
        Err(NameError::MissingRequestSuffix("getInfo".to_owned()))
    );
    assert_eq!(response_name("Request"), Err(NameError::EmptyStem("Request".to_owned())));
}

#[test]
fn request_response_transform_is_invertible() {
    for name in ["fooRequest", "getInfoRequest", "submitTransactionRequest", "notifyBlockAddedRequest"] {
        let response = response_name(name).expect("valid request");
        assert_eq!(request_name(&response).as_deref(), Some(name));
    }
}

#[test]
fn request_name_only_reverses_responses() {
    assert_eq!(request_name("blockAddedNotification"), None);
    assert_eq!(request_name("getInfoRequest"), None);
}

#[test]
fn event_name_follows_subscribe_convention() {
    assert_eq!(
        event_name("notifyBlockAddedRequest").expect("valid"),
        "blockAddedNotification"
    );
    assert_eq!(event_name("notifyBarRequest").expect("valid"), "barNotification");
}

#[test]
fn event_name_rejects_bad_methods() {
    assert!(matches!(event_name("blockAddedRequest"), Err(NameError::MissingNotifyPrefix(_))));
    assert!(matches!(event_name("notifyBlockAdded"), Err(NameError::MissingRequestSuffix(_))));
    assert!(matches!(event_name("notifyRequest"), Err(NameError::EmptyStem(_))));
    assert!(matches!(event_name("notifyblockRequest"), Err(NameError::LowercaseEvent(_))));
}

#[test]
fn subscribe_transform_round_trips() {
    for method in [
        "notifyBlockAddedRequest",
        "notifyBarRequest",
        "notifyVirtualSelectedParentChainChangedRequest",
        "notifyUtxosChangedRequest",
    ] {
        let event = event_name(method).expect("valid method");
        let rebuilt = notify_method(&event).expect("valid event");
        assert_eq!(rebuilt, method);
        assert_eq!(event_name(&rebuilt).expect("valid method"), event);
    }
}

#[test]
fn event_key_folds_echo_and_push_onto_same_key() {
    assert_eq!(event_key("notifyBlockAddedRequest"), "blockAddedNotification");
    assert_eq!(event_key("blockAddedNotification"), "blockAddedNotification");
}

#[test]
fn event_key_leaves_responses_unmatched() {
    assert_eq!(event_key("getInfoResponse"), "getInfoResponse");
    assert_eq!(event_key(""), "");
}

#[test]
fn notify_method_rejects_non_events() {
    assert!(matches!(notify_method("getInfoResponse"), Err(NameError::MissingNotificationSuffix(_))));
    assert!(matches!(notify_method("Notification"), Err(NameError::EmptyStem(_))));
}

#[test]
fn classify_distinguishes_families() {
    assert_eq!(classify("getInfoRequest"), FieldKind::Request);
    assert_eq!(classify("getInfoResponse"), FieldKind::Response);
    assert_eq!(classify("notifyBlockAddedRequest"), FieldKind::Subscribe);
    assert_eq!(classify("blockAddedNotification"), FieldKind::Notification);
    assert_eq!(classify("ping"), FieldKind::Unknown);
}
