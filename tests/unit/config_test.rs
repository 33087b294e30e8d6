//! Tests for configuration validation and loading

use prometheus_parallel::config::{PoolConfig, RuntimeConfig, SchedulerConfig};
use prometheus_parallel::core::PoolError;

#[test]
fn test_pool_config_validation() {
    assert!(PoolConfig::new().with_max_workers(4).validate().is_ok());
    assert!(PoolConfig::new().with_max_workers(0).validate().is_err());
    assert!(PoolConfig::new()
        .with_max_workers(2)
        .with_min_workers(3)
        .validate()
        .is_err());
    assert!(PoolConfig::new().with_queue_size_limit(0).validate().is_err());
    assert!(PoolConfig::new().with_idle_timeout_ms(0).validate().is_err());
    assert!(PoolConfig::new().with_default_timeout_ms(0).validate().is_err());
    assert!(PoolConfig::new().with_thread_stack_size(1024).validate().is_err());
}

#[test]
fn test_pool_config_durations() {
    let cfg = PoolConfig::new()
        .with_idle_timeout_ms(250)
        .with_terminate_grace_ms(40)
        .with_default_timeout_ms(15);
    assert_eq!(cfg.idle_timeout().as_millis(), 250);
    assert_eq!(cfg.terminate_grace().as_millis(), 40);
    assert_eq!(cfg.default_timeout().map(|d| d.as_millis()), Some(15));
    assert_eq!(PoolConfig::new().default_timeout(), None);
}

#[test]
fn test_scheduler_config_from_json() {
    let input = r#"{
        "pools": {
            "cpu": { "max_workers": 4, "runtime": "thread" },
            "light": { "max_workers": 2, "min_workers": 1, "runtime": "task" }
        }
    }"#;
    let cfg = SchedulerConfig::from_json_str(input).unwrap();
    assert_eq!(cfg.pools.len(), 2);
    assert_eq!(cfg.pools["cpu"].max_workers, 4);
    assert_eq!(cfg.pools["light"].runtime, RuntimeConfig::Task);
    assert_eq!(cfg.pools["light"].min_workers, 1);
}

#[test]
fn test_scheduler_config_errors() {
    let err = SchedulerConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"));

    let err = SchedulerConfig::from_json_str(r#"{"pools": {}}"#).unwrap_err();
    assert_eq!(err, "at least one pool must be defined");

    let err = SchedulerConfig::from_json_str(r#"{"pools": {"bad": {"max_workers": 0}}}"#)
        .unwrap_err();
    assert!(err.contains("pool `bad` invalid"));
}

#[test]
fn test_scheduler_config_from_path() {
    let path = std::env::temp_dir().join(format!("prometheus-parallel-{}.json", std::process::id()));
    std::fs::write(&path, r#"{"pools": {"main": {"max_workers": 3}}}"#).unwrap();
    let cfg = SchedulerConfig::from_path(&path).unwrap();
    assert_eq!(cfg.pools["main"].max_workers, 3);
    std::fs::remove_file(&path).unwrap();

    let err = SchedulerConfig::from_path(&path).unwrap_err();
    assert!(err.to_string().contains("reading scheduler config"));
}

// The only test in this binary that touches the process environment.
#[test]
fn test_pool_config_from_env() {
    std::env::set_var("PROMETHEUS_PARALLEL_MAX_WORKERS", "5");
    std::env::set_var("PROMETHEUS_PARALLEL_RUNTIME", "task");
    std::env::set_var("PROMETHEUS_PARALLEL_DEFAULT_TIMEOUT_MS", "750");
    let cfg = PoolConfig::from_env().unwrap();
    assert_eq!(cfg.max_workers, 5);
    assert_eq!(cfg.runtime, RuntimeConfig::Task);
    assert_eq!(cfg.default_timeout_ms, Some(750));

    std::env::set_var("PROMETHEUS_PARALLEL_MAX_WORKERS", "many");
    let err = PoolConfig::from_env().unwrap_err();
    assert!(matches!(err, PoolError::InvalidConfig(ref msg) if msg.contains("MAX_WORKERS")));

    std::env::set_var("PROMETHEUS_PARALLEL_MAX_WORKERS", "0");
    assert!(PoolConfig::from_env().is_err());

    for name in ["MAX_WORKERS", "RUNTIME", "DEFAULT_TIMEOUT_MS"] {
        std::env::remove_var(format!("PROMETHEUS_PARALLEL_{name}"));
    }
}
