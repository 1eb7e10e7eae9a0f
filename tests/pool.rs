//! Connection pool leasing, recycling, keep-alive and teardown.

mod common;

use std::{sync::Arc, time::Duration};

use common::TestResult;
use connector_testing::{MockFactory, acquire_expect, echo, scripted};
use rstest::{fixture, rstest};
use service_connector::{
    ConnectionError,
    ConnectionPool,
    IdleOutcome,
    Message,
    PoolConfig,
    PoolError,
    pool::ConnectionState,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[fixture]
fn factory() -> MockFactory { MockFactory::new(echo()) }

fn config(max: usize) -> PoolConfig { PoolConfig::default().max_connections(max) }

#[rstest]
#[tokio::test]
async fn acquire_fails_fast_at_capacity(factory: MockFactory) {
    let pool = factory.pool(config(2));
    let a = acquire_expect!(pool);
    let b = acquire_expect!(pool);

    let err = pool.acquire().await.expect_err("pool should be exhausted");
    assert!(matches!(err, PoolError::Exhausted { max: 2 }));
    assert_eq!(pool.stats().total(), 2);

    pool.release(a).await;
    pool.release(b).await;
    assert_eq!(pool.stats().free, 2);
    assert_eq!(factory.created(), 2);
}

#[rstest]
#[tokio::test]
async fn most_recently_freed_is_reused_first(factory: MockFactory) {
    let pool = factory.pool(config(2));
    let a = acquire_expect!(pool);
    let b = acquire_expect!(pool);
    let (a_id, b_id) = (a.id(), b.id());

    pool.release(a).await;
    pool.release(b).await;

    let first = acquire_expect!(pool);
    let second = acquire_expect!(pool);
    assert_eq!(first.id(), b_id);
    assert_eq!(second.id(), a_id);
    assert_eq!(first.state(), ConnectionState::Used);
    pool.release(first).await;
    pool.release(second).await;
}

#[rstest]
#[tokio::test]
async fn capacity_holds_across_mixed_operations(factory: MockFactory) -> TestResult {
    let pool = factory.pool(config(3));
    for round in 0..5 {
        let mut leased = Vec::new();
        while let Ok(conn) = pool.acquire().await {
            leased.push(conn);
            assert!(pool.stats().total() <= 3);
        }
        assert_eq!(leased.len(), 3);
        let doomed = leased.remove(round % 3);
        pool.force_close(doomed).await;
        for conn in leased {
            pool.release(conn).await;
        }
        assert!(pool.stats().total() <= 3);
    }
    assert_eq!(factory.disconnects(), 5);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn dead_free_connections_are_replaced(factory: MockFactory) {
    let pool = factory.pool(config(1));
    let conn = acquire_expect!(pool);
    pool.release(conn).await;
    factory.sever(1);

    let conn = acquire_expect!(pool);
    assert_eq!(factory.created(), 2);
    assert_eq!(pool.stats().used, 1);
    pool.release(conn).await;
}

#[rstest]
#[tokio::test]
async fn close_on_free_keeps_only_the_floor(factory: MockFactory) {
    let pool = factory.pool(config(3).min_connections(1).close_on_free(true));
    let a = acquire_expect!(pool);
    let b = acquire_expect!(pool);

    pool.release(a).await;
    assert_eq!(factory.disconnects(), 1, "pool still holds b at the floor");
    pool.release(b).await;
    assert_eq!(factory.disconnects(), 1);
    assert_eq!(pool.stats().free, 1);
}

#[rstest]
#[tokio::test]
async fn connect_failures_surface_and_free_the_slot(factory: MockFactory) {
    let pool = factory.pool(config(1));
    factory.fail_connects(true);
    let err = pool.acquire().await.expect_err("connect should fail");
    assert!(matches!(err, PoolError::Connect(_)));
    assert_eq!(pool.stats().total(), 0);

    factory.fail_connects(false);
    let conn = acquire_expect!(pool);
    pool.release(conn).await;
}

#[rstest]
#[tokio::test]
async fn destroy_disconnects_everything_and_is_idempotent(factory: MockFactory) {
    let pool = factory.pool(config(3));
    let a = acquire_expect!(pool);
    let b = acquire_expect!(pool);
    pool.release(a).await;

    pool.destroy().await;
    pool.destroy().await;
    assert_eq!(factory.disconnects(), 2, "leased connection closed too");
    assert!(matches!(pool.acquire().await, Err(PoolError::Destroyed)));

    pool.release(b).await;
    assert_eq!(factory.disconnects(), 2, "no second disconnect on release");
    assert_eq!(pool.stats().total(), 0);
}

#[rstest]
#[tokio::test]
async fn destroyed_lease_fails_its_next_frame(factory: MockFactory) {
    let pool = factory.pool(config(1));
    let mut conn = acquire_expect!(pool);
    pool.destroy().await;

    let err = conn
        .send_and_receive(Message::keep_alive())
        .await
        .expect_err("lease was torn down");
    assert!(matches!(err, ConnectionError::Closed));
    pool.force_close(conn).await;
    assert_eq!(factory.disconnects(), 1);
}

#[rstest]
#[tokio::test]
async fn warm_up_opens_the_whole_pool(factory: MockFactory) -> TestResult {
    let pool = factory.pool(config(4));
    pool.warm_up().await?;
    let stats = pool.stats();
    assert_eq!(stats.free, 4);
    assert_eq!(stats.min_connections, 1);
    assert_eq!(factory.connects(), 4);
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn idle_tick_probes_then_retires(factory: MockFactory) -> TestResult {
    let pool = factory.pool(
        config(2)
            .min_connections(1)
            .max_idles_in_sequence(2)
            .keep_alive_interval(Duration::from_secs(60)),
    );
    pool.warm_up().await?;
    let ids: Vec<_> = {
        let a = acquire_expect!(pool);
        let b = acquire_expect!(pool);
        let ids = vec![a.id(), b.id()];
        pool.release(a).await;
        pool.release(b).await;
        ids
    };

    assert!(pool.expired_idle(Instant::now()).is_empty());
    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(pool.expired_idle(Instant::now()).len(), 2);

    assert_eq!(pool.idle_tick(ids[0]).await, IdleOutcome::Probed);
    assert_eq!(pool.idle_tick(ids[0]).await, IdleOutcome::Probed);
    assert_eq!(factory.probes(), 2);
    assert_eq!(pool.idle_tick(ids[0]).await, IdleOutcome::Retired);
    assert_eq!(pool.stats().total(), 1);

    for _ in 0..3 {
        assert_eq!(pool.idle_tick(ids[1]).await, IdleOutcome::Probed);
    }
    assert_eq!(pool.stats().free, 1, "the floor connection is never retired");
    Ok(())
}

#[tokio::test]
async fn failed_probe_closes_the_connection() -> TestResult {
    let factory = MockFactory::new(scripted(|frame| Ok(Message::reply_to(&frame))));
    let pool = factory.pool(config(1));
    let conn = acquire_expect!(pool);
    let id = conn.id();
    pool.release(conn).await;

    assert_eq!(pool.idle_tick(id).await, IdleOutcome::Closed);
    assert_eq!(pool.stats().total(), 0);
    assert_eq!(factory.disconnects(), 1);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn idle_tick_ignores_leased_connections(factory: MockFactory) {
    let pool = factory.pool(config(1));
    let conn = acquire_expect!(pool);
    assert_eq!(pool.idle_tick(conn.id()).await, IdleOutcome::NotIdle);
    pool.release(conn).await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn keep_alive_task_probes_idle_connections(factory: MockFactory) -> TestResult {
    let pool: Arc<ConnectionPool> =
        factory.pool(config(1).keep_alive_interval(Duration::from_secs(10)));
    let conn = acquire_expect!(pool);
    pool.release(conn).await;

    let shutdown = CancellationToken::new();
    let task = pool.spawn_keep_alive(shutdown.clone());
    tokio::time::sleep(Duration::from_secs(16)).await;
    assert!(factory.probes() >= 1);

    shutdown.cancel();
    task.await?;
    Ok(())
}

#[rstest]
#[tokio::test]
async fn dropped_lease_frees_its_slot(factory: MockFactory) {
    let pool = factory.pool(config(1));
    let conn = acquire_expect!(pool);
    drop(conn);
    assert_eq!(pool.stats().total(), 0);
    let conn = acquire_expect!(pool);
    pool.release(conn).await;
}
