//! Dispatcher locking, fairness and tick-accounting integration tests.

mod factories;

use sqlx::PgPool;

use factories::DispatcherFactory;
use stepflow_core::config::{DeadlockRetryConfig, DispatcherConfig};
use stepflow_core::events::EventPublisher;
use stepflow_core::models::{StepsDispatcher, StepsDispatcherTick};
use stepflow_core::orchestration::{DispatchError, Dispatcher};

fn dispatcher(pool: &PgPool) -> Dispatcher {
    Dispatcher::new(
        pool.clone(),
        DispatcherConfig::default(),
        DeadlockRetryConfig::default(),
        EventPublisher::default(),
    )
}

#[sqlx::test]
async fn scenario_b_exactly_one_concurrent_claim_wins(pool: PgPool) {
    DispatcherFactory::new().for_group("fast").create(&pool).await;

    let left = dispatcher(&pool);
    let right = dispatcher(&pool);
    let (a, b) = tokio::join!(
        left.start_dispatch(Some("fast")),
        right.start_dispatch(Some("fast"))
    );

    let a = a.unwrap();
    let b = b.unwrap();
    assert!(a ^ b, "exactly one concurrent claim must win (a={a}, b={b})");

    let row = StepsDispatcher::find_by_group(&pool, Some("fast"))
        .await
        .unwrap()
        .unwrap();
    assert!(!row.can_dispatch);
    assert!(row.current_tick_id.is_some());
}

#[sqlx::test]
async fn start_dispatch_creates_missing_lock_row(pool: PgPool) {
    let dispatcher = dispatcher(&pool);

    assert!(dispatcher.start_dispatch(Some("fresh")).await.unwrap());

    let row = StepsDispatcher::find_by_group(&pool, Some("fresh"))
        .await
        .unwrap()
        .unwrap();
    assert!(!row.can_dispatch);
}

#[sqlx::test]
async fn fairness_offers_the_stalest_group(pool: PgPool) {
    DispatcherFactory::new()
        .for_group("fast")
        .aged_seconds(10.0)
        .create(&pool)
        .await;
    DispatcherFactory::new()
        .for_group("slow")
        .aged_seconds(120.0)
        .create(&pool)
        .await;
    DispatcherFactory::new()
        .for_group("claimed")
        .claimed()
        .aged_seconds(600.0)
        .create(&pool)
        .await;

    let offered = dispatcher(&pool).get_dispatch_group().await.unwrap().unwrap();
    // The oldest claimable row wins; the even-staler claimed row is skipped.
    assert_eq!(offered.group_name.as_deref(), Some("slow"));
}

#[sqlx::test]
async fn get_dispatch_group_returns_none_when_all_claimed(pool: PgPool) {
    DispatcherFactory::new().for_group("fast").claimed().create(&pool).await;

    assert!(dispatcher(&pool).get_dispatch_group().await.unwrap().is_none());
}

#[sqlx::test]
async fn scenario_c_stuck_lock_is_reclaimed(pool: PgPool) {
    DispatcherFactory::new()
        .for_group("slow")
        .claimed()
        .aged_seconds(25.0)
        .create(&pool)
        .await;

    assert!(dispatcher(&pool).start_dispatch(Some("slow")).await.unwrap());
}

#[sqlx::test]
async fn fresh_lock_is_not_stolen(pool: PgPool) {
    DispatcherFactory::new()
        .for_group("slow")
        .claimed()
        .aged_seconds(5.0)
        .create(&pool)
        .await;

    assert!(!dispatcher(&pool).start_dispatch(Some("slow")).await.unwrap());
}

#[sqlx::test]
async fn tick_accounting_lifecycle(pool: PgPool) {
    let dispatcher = dispatcher(&pool);

    assert!(dispatcher.start_dispatch(Some("fast")).await.unwrap());

    let claimed = StepsDispatcher::find_by_group(&pool, Some("fast"))
        .await
        .unwrap()
        .unwrap();
    let tick_id = claimed.current_tick_id.expect("tick linked on claim");
    let open_tick = StepsDispatcherTick::find_by_id(&pool, tick_id)
        .await
        .unwrap()
        .unwrap();
    assert!(open_tick.completed_at.is_none());
    assert_eq!(open_tick.group_name.as_deref(), Some("fast"));

    dispatcher.end_dispatch(4, Some("fast")).await.unwrap();

    let released = StepsDispatcher::find_by_group(&pool, Some("fast"))
        .await
        .unwrap()
        .unwrap();
    assert!(released.can_dispatch);
    assert!(released.current_tick_id.is_none());
    assert!(released.last_tick_completed.is_some());

    let closed_tick = StepsDispatcherTick::find_by_id(&pool, tick_id)
        .await
        .unwrap()
        .unwrap();
    assert!(closed_tick.completed_at.is_some());
    assert_eq!(closed_tick.progress, Some(4));
    assert!(closed_tick.duration.unwrap() >= 0.0);
}

#[sqlx::test]
async fn end_dispatch_without_open_tick_errors(pool: PgPool) {
    DispatcherFactory::new().for_group("fast").create(&pool).await;

    let result = dispatcher(&pool).end_dispatch(0, Some("fast")).await;
    assert!(matches!(result, Err(DispatchError::TickNotOpen { .. })));
}

#[sqlx::test]
async fn end_dispatch_without_lock_row_errors(pool: PgPool) {
    let result = dispatcher(&pool).end_dispatch(0, Some("ghost")).await;
    assert!(matches!(result, Err(DispatchError::LockRowMissing { .. })));
}

#[sqlx::test]
async fn global_group_uses_the_null_row(pool: PgPool) {
    let dispatcher = dispatcher(&pool);

    assert!(dispatcher.start_dispatch(None).await.unwrap());
    assert!(!dispatcher.start_dispatch(None).await.unwrap());

    dispatcher.end_dispatch(0, None).await.unwrap();

    let row = StepsDispatcher::find_by_group(&pool, None).await.unwrap().unwrap();
    assert!(row.group_name.is_none());
    assert!(row.can_dispatch);
}

#[sqlx::test]
async fn released_group_can_be_claimed_again(pool: PgPool) {
    let dispatcher = dispatcher(&pool);

    assert!(dispatcher.start_dispatch(Some("fast")).await.unwrap());
    dispatcher.end_dispatch(1, Some("fast")).await.unwrap();
    assert!(dispatcher.start_dispatch(Some("fast")).await.unwrap());

    let ticks = StepsDispatcherTick::recent_for_group(&pool, Some("fast"), 10)
        .await
        .unwrap();
    assert_eq!(ticks.len(), 2);
}
