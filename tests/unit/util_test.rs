//! Tests for utility functions

use std::cmp::Ordering;

use prometheus_parallel::core::{EventSink, InMemoryEventSink, PoolEvent};
use prometheus_parallel::util::{compare_values, group_key, is_truthy};
use serde_json::json;

#[test]
fn test_truthiness() {
    for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!("")] {
        assert!(!is_truthy(&falsy), "{falsy} should be falsy");
    }
    for truthy in [json!(true), json!(-1), json!("0"), json!([]), json!({})] {
        assert!(is_truthy(&truthy), "{truthy} should be truthy");
    }
}

#[test]
fn test_value_ordering() {
    assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
    assert_eq!(compare_values(&json!(1.5), &json!(1)), Ordering::Greater);
    assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
    assert_eq!(compare_values(&json!(false), &json!(true)), Ordering::Less);
    assert_eq!(compare_values(&json!(null), &json!(0)), Ordering::Less);
    assert_eq!(compare_values(&json!(99), &json!("1")), Ordering::Less);
}

#[test]
fn test_group_keys() {
    assert_eq!(group_key(&json!("even")), "even");
    assert_eq!(group_key(&json!(3)), "3");
    assert_eq!(group_key(&json!(true)), "true");
    assert_eq!(group_key(&json!([1, "a"])), r#"[1,"a"]"#);
}

#[test]
fn test_in_memory_sink_keeps_latest() {
    let sink = InMemoryEventSink::new(2);
    for size in 1..=3 {
        sink.record(PoolEvent::PoolResize {
            old_size: size - 1,
            new_size: size,
        });
    }
    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[1],
        PoolEvent::PoolResize {
            old_size: 2,
            new_size: 3
        }
    );
}
