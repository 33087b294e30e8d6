//! Tests for the function registry and payload validation

use prometheus_parallel::core::{
    arg, validate_payload, FunctionRegistry, PoolError, TaskRequest, MAX_PAYLOAD_DEPTH,
};
use serde_json::{json, Value};

#[test]
fn test_register_and_call() {
    let registry = FunctionRegistry::new();
    registry
        .register_unary("square", |x: i64| x * x)
        .register_binary("add", |a: i64, b: i64| a + b)
        .register("echo", |args| Ok(Value::Array(args.to_vec())));

    assert_eq!(registry.names(), vec!["add", "echo", "square"]);
    let square = registry.get("square").unwrap();
    assert_eq!(square(&[json!(7)]).unwrap(), json!(49));
    let add = registry.get("add").unwrap();
    assert_eq!(add(&[json!(2), json!(3)]).unwrap(), json!(5));
    let echo = registry.get("echo").unwrap();
    assert_eq!(echo(&[json!("a"), json!(1)]).unwrap(), json!(["a", 1]));
    assert!(registry.get("missing").is_none());
}

#[test]
fn test_reregistration_replaces() {
    let registry = FunctionRegistry::new();
    registry.register_unary("f", |x: i64| x);
    registry.register_unary("f", |x: i64| -x);
    let f = registry.get("f").unwrap();
    assert_eq!(f(&[json!(3)]).unwrap(), json!(-3));
    assert_eq!(registry.names().len(), 1);
}

#[test]
fn test_fallible_unary_reports_error() {
    let registry = FunctionRegistry::new();
    registry.register_fallible_unary("checked_div", |x: i64| {
        if x == 0 {
            anyhow::bail!("division by zero");
        }
        Ok(100 / x)
    });
    let f = registry.get("checked_div").unwrap();
    assert_eq!(f(&[json!(4)]).unwrap(), json!(25));
    assert_eq!(f(&[json!(0)]).unwrap_err().to_string(), "division by zero");
}

#[test]
fn test_arg_decoding() {
    let args = vec![json!("text"), json!([1, 2])];
    assert_eq!(arg::<String>(&args, 0).unwrap(), "text");
    assert_eq!(arg::<Vec<u8>>(&args, 1).unwrap(), vec![1, 2]);
    assert_eq!(arg::<Option<i64>>(&args, 5).unwrap(), None);
    assert!(arg::<i64>(&args, 0).is_err());
}

#[test]
fn test_payload_validation() {
    assert!(validate_payload(&[json!({"a": [1, 2, {"b": null}]})]).is_ok());

    let mut deep = json!(0);
    for _ in 0..=MAX_PAYLOAD_DEPTH {
        deep = json!([deep]);
    }
    assert!(matches!(
        validate_payload(&[deep]),
        Err(PoolError::Serialization(_))
    ));
}

#[test]
fn test_request_builder() {
    let request = TaskRequest::new("add").arg(&1).arg("two");
    assert_eq!(request.function(), "add");
}
