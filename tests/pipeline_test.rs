//! Integration tests for lazy pipelines
//!
//! Covers pipeline laws against locally computed results, terminal
//! operations through the scheduler, and empty-input identities.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use prometheus_parallel::config::{PoolConfig, RuntimeConfig};
use prometheus_parallel::core::{FunctionRegistry, PoolError, Scheduler};
use prometheus_parallel::ops::BatchOptions;
use prometheus_parallel::pipeline::Terminal;
use serde_json::{json, Value};

fn pool() -> Scheduler {
    let registry = FunctionRegistry::new();
    registry
        .register_unary("double", |x: i64| x * 2)
        .register_unary("gt4", |x: i64| x > 4)
        .register_unary("is_even", |x: i64| x % 2 == 0)
        .register_unary("parity", |x: i64| if x % 2 == 0 { "even" } else { "odd" })
        .register_binary("add", |acc: i64, x: i64| acc + x)
        .register("noop", |_| Ok(Value::Null));
    let config = PoolConfig::new()
        .with_runtime(RuntimeConfig::Task)
        .with_max_workers(3);
    Scheduler::new(config, registry).unwrap()
}

#[tokio::test]
async fn test_map_filter_reduce() {
    let pool = pool();
    let total = pool
        .pipe(&[1, 2, 3, 4, 5])
        .map("double")
        .filter("gt4")
        .reduce("add", 0)
        .execute()
        .await
        .unwrap();
    assert_eq!(total, json!(24));
    pool.terminate().await;
}

#[tokio::test]
async fn test_pipeline_matches_local_computation() {
    let pool = pool();
    let input: Vec<i64> = (-6..=9).collect();
    let expected: Vec<i64> = input.iter().map(|x| x * 2).filter(|x| *x > 4).collect();
    for batch_size in [1, 4, 32] {
        let out: Vec<i64> = pool
            .pipe(&input)
            .with_options(BatchOptions::new().with_batch_size(batch_size))
            .map("double")
            .filter("gt4")
            .collect()
            .await
            .unwrap();
        assert_eq!(out, expected);
    }
    pool.terminate().await;
}

#[tokio::test]
async fn test_empty_identities() {
    let pool = pool();
    let empty: [i64; 0] = [];

    assert_eq!(pool.pipe(&empty).reduce("add", 7).await.unwrap(), json!(7));
    assert!(pool.pipe(&empty).every("is_even").await.unwrap());
    assert!(!pool.pipe(&empty).some("is_even").await.unwrap());
    assert_eq!(pool.pipe(&empty).find("is_even").await.unwrap(), None);
    assert!(pool.pipe(&empty).sum().await.unwrap().abs() < f64::EPSILON);
    assert!(pool.pipe(&empty).average().await.unwrap().is_nan());
    assert_eq!(pool.pipe(&empty).min().await.unwrap(), None);
    assert_eq!(pool.pipe(&empty).max().await.unwrap(), None);
    assert!(pool.pipe(&empty).is_empty().await.unwrap());
    assert_eq!(pool.pipe(&empty).count().await.unwrap(), 0);
    assert_eq!(pool.stats().completed_tasks, 0);
}

#[tokio::test]
async fn test_scheduler_terminals() {
    let pool = pool();
    let input = [5, 2, 8, 3, 6];

    assert_eq!(pool.pipe(&input).find("is_even").await.unwrap(), Some(json!(2)));
    assert!(pool.pipe(&input).some("gt4").await.unwrap());
    assert!(!pool.pipe(&input).every("gt4").await.unwrap());
    assert_eq!(pool.pipe(&input).count_by("is_even").await.unwrap(), 3);

    let groups = pool.pipe(&input).group_by("parity").await.unwrap();
    assert_eq!(groups["odd"], vec![json!(5), json!(3)]);
    assert_eq!(groups["even"], vec![json!(2), json!(8), json!(6)]);

    let (big, small) = pool.pipe(&input).partition("gt4").await.unwrap();
    assert_eq!(big, vec![json!(5), json!(8), json!(6)]);
    assert_eq!(small, vec![json!(2), json!(3)]);
    pool.terminate().await;
}

#[tokio::test]
async fn test_for_each_runs_every_element() {
    let pool = pool();
    pool.pipe(&[1, 2, 3, 4]).for_each("noop").await.unwrap();
    assert_eq!(pool.stats().completed_tasks, 4);
    pool.terminate().await;
}

#[tokio::test]
async fn test_local_terminals() {
    let pool = pool();
    let input = [4, 1, 3, 1, 5];

    assert!((pool.pipe(&input).sum().await.unwrap() - 14.0).abs() < f64::EPSILON);
    assert!((pool.pipe(&input).average().await.unwrap() - 2.8).abs() < 1e-9);
    assert_eq!(pool.pipe(&input).min().await.unwrap(), Some(json!(1)));
    assert_eq!(pool.pipe(&input).max().await.unwrap(), Some(json!(5)));
    assert_eq!(pool.pipe(&input).join(",").await.unwrap(), "4,1,3,1,5");
    assert!(pool.pipe(&input).includes(&3).await.unwrap());
    assert!(!pool.pipe(&input).includes(&9).await.unwrap());
    assert_eq!(pool.pipe(&input).first().await.unwrap(), Some(json!(4)));
    assert_eq!(pool.pipe(&input).last().await.unwrap(), Some(json!(5)));
    assert!(!pool.pipe(&input).is_empty().await.unwrap());

    let err = pool.pipe(&["a"]).sum().await.unwrap_err();
    assert!(matches!(err, PoolError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_structural_operations() {
    let pool = pool();
    let rotated: Vec<i64> = pool.pipe(&[1, 2, 3, 4, 5]).rotate(2).collect().await.unwrap();
    assert_eq!(rotated, vec![4, 5, 1, 2, 3]);
    let rotated: Vec<i64> = pool.pipe(&[1, 2, 3, 4, 5]).rotate(-2).collect().await.unwrap();
    assert_eq!(rotated, vec![3, 4, 5, 1, 2]);

    let windows = pool.pipe(&[1, 2, 3, 4]).window(2).await.unwrap();
    assert_eq!(windows, vec![json!([1, 2]), json!([2, 3]), json!([3, 4])]);

    let out: Vec<i64> = pool
        .pipe(&[0, 3, 0, 1, 2, 7, 1])
        .compact()
        .drop_while(|v| v.as_i64().is_some_and(|x| x > 2))
        .take_while(|v| v.as_i64().is_some_and(|x| x < 5))
        .collect()
        .await
        .unwrap();
    assert_eq!(out, vec![1, 2]);

    let zipped = pool.pipe(&[1, 2, 3]).zip(&["a", "b"]).await.unwrap();
    assert_eq!(zipped, vec![json!([1, "a"]), json!([2, "b"])]);

    let sorted: Vec<i64> = pool
        .pipe(&[3, 1, 2])
        .sort_by(|a, b| b.as_i64().cmp(&a.as_i64()))
        .collect()
        .await
        .unwrap();
    assert_eq!(sorted, vec![3, 2, 1]);

    let a: Vec<i64> = pool.pipe(&[1, 2, 3, 4, 5, 6]).shuffle(Some(9)).collect().await.unwrap();
    let b: Vec<i64> = pool.pipe(&[1, 2, 3, 4, 5, 6]).shuffle(Some(9)).collect().await.unwrap();
    assert_eq!(a, b);
    assert_eq!(pool.pipe(&[1, 2, 3, 4, 5, 6]).sample(2, None).count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_tap_observes_without_changing() {
    let pool = pool();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let out = pool
        .pipe(&[1, 2, 3])
        .tap(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .skip(1)
        .await
        .unwrap();
    assert_eq!(out, vec![json!(2), json!(3)]);
    assert_eq!(seen.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_terminal_records_chain() {
    let pool = pool();
    let terminal = pool.pipe(&[1, 2]).map("double").unique().sum();
    assert_eq!(terminal.terminal(), &Terminal::Sum);
    let names: Vec<&str> = terminal
        .pipeline()
        .operations()
        .iter()
        .map(|op| op.name())
        .collect();
    assert_eq!(names, vec!["map", "unique"]);
    assert!((terminal.await.unwrap() - 6.0).abs() < f64::EPSILON);
    pool.terminate().await;
}

#[tokio::test]
async fn test_unknown_function_fails_execution() {
    let pool = pool();
    let err = pool.pipe(&[1]).map("missing").execute().await.unwrap_err();
    assert!(matches!(err, PoolError::InvalidArgument(_)));
}
