use super::{Route, Specification};

#[test]
fn test_plain_token_is_queue() {
    let spec = Specification::parse(["my-queue"]);
    assert_eq!(spec.queues, vec!["my-queue".to_string()]);
    assert!(spec.bindings.is_empty());
}

#[test]
fn test_binding_token_expands_per_route() {
    let spec = Specification::parse(["amq.topic/a/b"]);
    assert!(spec.queues.is_empty());
    assert_eq!(
        spec.bindings,
        vec![Route::new("amq.topic", "a"), Route::new("amq.topic", "b")]
    );
}

#[test]
fn test_mixed_tokens_keep_order() {
    let spec = Specification::parse(["q1", "logs/#", "q2", "events/user.*/order.*"]);
    assert_eq!(spec.queues, vec!["q1", "q2"]);
    assert_eq!(
        spec.bindings,
        vec![
            Route::new("logs", "#"),
            Route::new("events", "user.*"),
            Route::new("events", "order.*"),
        ]
    );
}

#[test]
fn test_empty_segments_are_kept() {
    let spec = Specification::parse(["amq.fanout/", "/direct-key"]);
    assert_eq!(
        spec.bindings,
        vec![Route::new("amq.fanout", ""), Route::new("", "direct-key")]
    );
}

#[test]
fn test_routes_send_queues_through_default_exchange() {
    let spec = Specification::parse(["jobs", "amq.direct/x"]);
    assert_eq!(
        spec.routes(),
        vec![Route::new("", "jobs"), Route::new("amq.direct", "x")]
    );
}

#[test]
fn test_empty_input() {
    let spec = Specification::parse(Vec::<String>::new());
    assert!(spec.is_empty());
    assert!(spec.routes().is_empty());
}
