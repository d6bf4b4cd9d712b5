//! Concurrent access to the registry and to a single pool.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use schema_pool::Registry;
use schema_pool_testing::{Health, MockDriver, TestPartition};
use tokio::time::Instant;

#[test]
fn test_concurrent_get_pool_creates_one_pool_per_key() {
    let registry = Registry::new(MockDriver::healthy());

    let pools: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = &registry;
                scope.spawn(move || {
                    let schema = if i % 2 == 0 { "even" } else { "odd" };
                    (schema, registry.get_pool(&TestPartition::new(schema)).unwrap())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(registry.len(), 2);
    for (schema, pool) in &pools {
        let canonical = registry.pool(schema).unwrap();
        assert!(Arc::ptr_eq(pool, &canonical));
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_first_requests_share_one_connect() {
    let registry = Arc::new(Registry::new(
        MockDriver::builder()
            .connect_latency(Duration::from_millis(100))
            .build(),
    ));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .get_connection(&TestPartition::new("sales"))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut conns = Vec::new();
    for task in tasks {
        conns.push(task.await.unwrap());
    }

    assert_eq!(registry.driver().connect_count(), 1);
    assert!(conns.iter().all(|c| Arc::ptr_eq(c, &conns[0])));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_renewals_collapse_into_one() {
    let registry = Arc::new(Registry::new(
        MockDriver::builder()
            .connect_latency(Duration::from_millis(100))
            .build(),
    ));
    let settings = TestPartition::new("sales");

    let stale = registry.get_connection(&settings).await.unwrap();
    stale.set_health(Health::Unhealthy);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let settings = settings.clone();
            tokio::spawn(async move { registry.get_connection(&settings).await.unwrap() })
        })
        .collect();

    let mut conns = Vec::new();
    for task in tasks {
        conns.push(task.await.unwrap());
    }

    // one initial connect plus exactly one renewal
    assert_eq!(registry.driver().connect_count(), 2);
    assert!(conns.iter().all(|c| Arc::ptr_eq(c, &conns[0])));
    assert!(!Arc::ptr_eq(&conns[0], &stale));
    assert!(stale.is_closed());
    assert_eq!(stale.ping_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_connect_does_not_block_other_partitions() {
    let registry = Arc::new(Registry::new(
        MockDriver::builder()
            .connect_latency_for("slow", Duration::from_secs(30))
            .build(),
    ));

    let slow = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            registry
                .get_connection(&TestPartition::new("slow"))
                .await
                .unwrap()
        })
    };
    // let the slow connect start and park on its latency
    tokio::task::yield_now().await;
    assert_eq!(registry.driver().connect_count(), 1);

    let start = Instant::now();
    let fast = registry
        .get_connection(&TestPartition::new("fast"))
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!slow.is_finished());
    assert_eq!(fast.options().schema(), "fast");

    let slow = slow.await.unwrap();
    assert_eq!(slow.options().schema(), "slow");
    assert!(start.elapsed() >= Duration::from_secs(29));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_partitions_each_establish_once() {
    let registry = Arc::new(Registry::new(MockDriver::healthy()));

    let tasks: Vec<_> = ["a", "b", "c", "d"]
        .into_iter()
        .map(|schema| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for _ in 0..20 {
                    registry
                        .get_connection(&TestPartition::new(schema))
                        .await
                        .unwrap();
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(registry.len(), 4);
    assert_eq!(registry.driver().connect_count(), 4);
    for schema in registry.partitions() {
        let status = registry.pool(&schema).unwrap().status();
        assert_eq!(status.established, 1);
        assert_eq!(status.current.unwrap().checkout_count, 20);
    }
}
