//! Tests for error types

use prometheus_parallel::core::PoolError;

#[test]
fn test_queue_full_error() {
    let err = PoolError::QueueFull { limit: 2 };
    assert_eq!(format!("{err}"), "task queue is full (limit 2)");
}

#[test]
fn test_timeout_error() {
    assert_eq!(PoolError::Timeout(40).to_string(), "task timed out after 40 ms");
}

#[test]
fn test_terminating_and_aborted() {
    assert_eq!(PoolError::PoolTerminating.to_string(), "pool is terminating");
    assert_eq!(PoolError::Aborted.to_string(), "task aborted");
}

#[test]
fn test_execution_error() {
    let err = PoolError::Execution("division by zero".into());
    assert_eq!(err.to_string(), "task execution failed: division by zero");
}

#[test]
fn test_aggregate_error() {
    let err = PoolError::Aggregate {
        total: 4,
        failures: vec!["task aborted".into()],
    };
    assert_eq!(err.to_string(), "1 of 4 tasks failed: task aborted");
}

#[test]
fn test_from_serde_error() {
    let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: PoolError = parse.into();
    assert!(matches!(err, PoolError::Serialization(_)));
    assert!(!err.is_retryable());
}
