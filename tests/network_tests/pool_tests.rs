//! Pool Tests
//!
//! Tests for fanning named calls across worker sessions.

#[path = "../support/mod.rs"]
mod support;

use ignite_thin::binary::{BinaryType, Value, ValueMap};
use ignite_thin::network::flatten_results;
use ignite_thin::{ExecutionPool, PoolTask, Reply, ThinError};
use support::TestServer;

fn put(cache: &str, key: i64, value: &str) -> PoolTask {
    PoolTask::new("cache_put", vec![Value::from(cache), Value::Long(key), Value::from(value)])
}

#[test]
fn test_one_session_per_busy_worker() {
    let server = TestServer::start();
    let pool = ExecutionPool::new(4, server.config()).unwrap();

    let tasks: Vec<(String, PoolTask)> = (0..10)
        .map(|n| (format!("put-{:02}", n), put("pool", n, &format!("value {}", n))))
        .collect();
    let results = pool.execute(tasks).unwrap();

    assert_eq!(results.len(), 10);
    assert!(results.values().all(|outcome| outcome.result == Reply::Done));
    assert_eq!(server.connection_count(), 4);
    assert_eq!(server.entry_count("pool"), 10);
}

#[test]
fn test_idle_workers_open_no_session() {
    let server = TestServer::start();
    let pool = ExecutionPool::new(8, server.config()).unwrap();

    let results = pool
        .execute(vec![
            ("a".to_string(), put("idle", 1, "one")),
            ("b".to_string(), put("idle", 2, "two")),
        ])
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(server.connection_count(), 2);
}

#[test]
fn test_outcomes_echo_inputs() {
    let server = TestServer::start();
    let pool = ExecutionPool::new(1, server.config()).unwrap();

    let results = pool
        .execute(vec![
            ("1-put".to_string(), put("echo", 7, "seven")),
            (
                "2-get".to_string(),
                PoolTask::new("cache_get", vec![Value::from("echo"), Value::Long(7)]),
            ),
            ("3-size".to_string(), PoolTask::new("cache_get_size", vec![Value::from("echo")])),
        ])
        .unwrap();

    let get = &results["2-get"];
    assert_eq!(get.method, "cache_get");
    assert_eq!(get.args, vec![Value::from("echo"), Value::Long(7)]);
    assert_eq!(get.result, Reply::Value(Value::from("seven")));

    assert_eq!(
        flatten_results(&results),
        vec![Value::Null, Value::from("seven"), Value::Long(1)]
    );
}

#[test]
fn test_typed_keys_reach_the_server() {
    let server = TestServer::start();
    let pool = ExecutionPool::new(1, server.config()).unwrap();

    let results = pool
        .execute(vec![
            ("1".to_string(), put("typed", 3, "three").with_key_type(BinaryType::Int)),
            (
                "2".to_string(),
                PoolTask::new("cache_get", vec![Value::from("typed"), Value::Int(3)]),
            ),
        ])
        .unwrap();

    assert_eq!(results["2"].result, Reply::Value(Value::from("three")));
}

#[test]
fn test_batch_calls() {
    let server = TestServer::start();
    let pool = ExecutionPool::new(1, server.config()).unwrap();
    let entries: ValueMap = vec![(1i64, "a"), (2i64, "b")].into_iter().collect();

    let results = pool
        .execute(vec![
            (
                "1".to_string(),
                PoolTask::new("cache_put_all", vec![Value::from("batch"), Value::Map(entries.clone())]),
            ),
            (
                "2".to_string(),
                PoolTask::new(
                    "cache_get_all",
                    vec![Value::from("batch"), Value::List(vec![Value::Long(1), Value::Long(2)])],
                ),
            ),
        ])
        .unwrap();

    assert_eq!(results["2"].result, Reply::Entries(entries));
}

#[test]
fn test_remote_failure_fails_the_run() {
    let server = TestServer::start();
    let pool = ExecutionPool::new(2, server.config()).unwrap();

    let result = pool.execute(vec![
        ("ok".to_string(), put("fail", 1, "one")),
        (
            "missing".to_string(),
            PoolTask::new("cache_get", vec![Value::from("fail"), Value::Long(999)]),
        ),
    ]);
    assert!(matches!(result, Err(ThinError::RemoteOperation { .. })));
}

#[test]
fn test_unreachable_server() {
    let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let config = ignite_thin::ClientConfig::builder().port(port).build();
    let pool = ExecutionPool::new(2, config).unwrap();

    let result = pool.execute(vec![("a".to_string(), PoolTask::new("cache_get_names", vec![]))]);
    assert!(matches!(result, Err(ThinError::Io(_))));
}
