mod common;

use common::*;
use gen_gateway::{
    error::GatewayError,
    models::{BatchOutcome, BuybackContribution, ContributionStatus},
    services::{BatchExecutor, BuybackQueue, MemoryStore, Store, SwapExecutor},
};
use std::sync::Arc;

fn sig(n: u8) -> String {
    format!("0x{:064x}", n)
}

async fn queue_payments(store: &Arc<dyn Store>, payments: &[f64]) {
    let queue = BuybackQueue::new(store.clone(), 10.0);
    for (i, usd) in payments.iter().enumerate() {
        queue
            .contribute(&sig(i as u8 + 1), &format!("gen-{}", i), *usd)
            .await
            .unwrap();
    }
}

fn executor(store: &Arc<dyn Store>, swap: &Arc<FakeSwap>, native_price: f64) -> BatchExecutor {
    let swap: Arc<dyn SwapExecutor> = swap.clone();
    BatchExecutor::new(store.clone(), prices(native_price, None), Some(swap), 0.001)
}

#[tokio::test]
async fn contribution_is_idempotent_per_payment() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let queue = BuybackQueue::new(store.clone(), 10.0);

    assert!(queue.contribute(&sig(1), "gen-1", 0.03).await.unwrap().is_some());
    assert!(queue.contribute(&sig(1), "gen-1", 0.03).await.unwrap().is_none());

    let pending = store.contributions(ContributionStatus::Pending).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].amount_usd, 0.003);
}

#[tokio::test]
async fn non_positive_contribution_is_a_queue_error() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let queue = BuybackQueue::new(store.clone(), 10.0);

    assert!(matches!(
        queue.contribute(&sig(1), "gen-1", 0.0).await,
        Err(GatewayError::QueueWrite(_))
    ));
    assert!(matches!(
        queue.contribute(&sig(2), "gen-2", f64::NAN).await,
        Err(GatewayError::QueueWrite(_))
    ));
}

#[tokio::test]
async fn nothing_pending_is_a_no_op() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let swap = Arc::new(FakeSwap::default());

    let outcome = executor(&store, &swap, 4000.0).run().await.unwrap();
    assert!(matches!(outcome, BatchOutcome::NothingPending));
    assert!(swap.amounts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn dust_batch_makes_no_onchain_call() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let swap = Arc::new(FakeSwap::default());
    // $0.04 + $0.06 of payments: $0.004 + $0.006 owed, 2.5e-6 native at $4000.
    queue_payments(&store, &[0.04, 0.06]).await;

    let outcome = executor(&store, &swap, 4000.0).run().await.unwrap();

    let BatchOutcome::BelowDustFloor { total_usd, contributions, .. } = outcome else {
        panic!("expected dust outcome, got {:?}", outcome);
    };
    assert!((total_usd - 0.01).abs() < 1e-12);
    assert_eq!(contributions, 2);
    assert!(swap.amounts.lock().unwrap().is_empty());
    assert_eq!(store.contributions(ContributionStatus::Pending).await.unwrap().len(), 2);
    assert!(store.contributions(ContributionStatus::Claimed).await.unwrap().is_empty());
}

#[tokio::test]
async fn executed_batch_settles_every_row_with_one_signature() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let swap = Arc::new(FakeSwap::default());
    // $20 owed at a $1000 native price clears the floor.
    queue_payments(&store, &[100.0, 100.0]).await;

    let outcome = executor(&store, &swap, 1000.0).run().await.unwrap();
    let BatchOutcome::Executed(batch) = outcome else {
        panic!("expected an executed batch, got {:?}", outcome);
    };

    assert_eq!(batch.tx_signature, "0xbatch");
    assert_eq!(batch.contribution_ids.len(), 2);
    assert_eq!(swap.amounts.lock().unwrap().as_slice(), &[20_000_000_000_000_000u128]);

    let processed = store.contributions(ContributionStatus::Processed).await.unwrap();
    assert_eq!(processed.len(), 2);
    assert!(processed
        .iter()
        .all(|c| c.batch_signature.as_deref() == Some("0xbatch") && c.processed_at.is_some()));
    assert!(store.contributions(ContributionStatus::Pending).await.unwrap().is_empty());
    assert_eq!(store.buybacks().await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_swap_returns_every_row_to_pending() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let swap = Arc::new(FakeSwap { fail: true, ..Default::default() });
    queue_payments(&store, &[100.0, 50.0, 25.0]).await;

    let err = executor(&store, &swap, 1000.0).run().await.unwrap_err();
    assert!(matches!(err, GatewayError::BatchExecution(_)));

    assert_eq!(swap.amounts.lock().unwrap().len(), 1);
    let pending = store.contributions(ContributionStatus::Pending).await.unwrap();
    assert_eq!(pending.len(), 3);
    assert!(pending.iter().all(|c| c.batch_signature.is_none()));
    assert!(store.contributions(ContributionStatus::Processed).await.unwrap().is_empty());
    assert!(store.buybacks().await.unwrap().is_empty());
}

#[tokio::test]
async fn zero_native_price_never_reaches_the_router() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let swap = Arc::new(FakeSwap::default());
    queue_payments(&store, &[100.0]).await;

    let err = executor(&store, &swap, 0.0).run().await.unwrap_err();
    assert!(matches!(err, GatewayError::PriceUnavailable(_)));

    assert!(swap.amounts.lock().unwrap().is_empty());
    assert_eq!(store.contributions(ContributionStatus::Pending).await.unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_rows_are_failed_alongside_a_successful_batch() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let swap = Arc::new(FakeSwap::default());
    queue_payments(&store, &[100.0]).await;
    let bad = BuybackContribution::new(&sig(9), "gen-bad", f64::NAN);
    store.enqueue_contribution(&bad).await.unwrap();

    let outcome = executor(&store, &swap, 1000.0).run().await.unwrap();
    assert!(matches!(outcome, BatchOutcome::Executed(_)));

    let failed = store.contributions(ContributionStatus::Failed).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, bad.id);
    assert_eq!(store.contributions(ContributionStatus::Processed).await.unwrap().len(), 1);
}

#[tokio::test]
async fn missing_swap_executor_leaves_rows_pending() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    queue_payments(&store, &[100.0]).await;

    let executor = BatchExecutor::new(store.clone(), prices(1000.0, None), None, 0.001);
    assert!(matches!(executor.run().await, Err(GatewayError::Configuration(_))));
    assert_eq!(store.contributions(ContributionStatus::Pending).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_runs_swap_once() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let swap = Arc::new(FakeSwap::default());
    queue_payments(&store, &[100.0, 100.0]).await;
    let executor = Arc::new(executor(&store, &swap, 1000.0));

    let (a, b) = tokio::join!(executor.run(), executor.run());
    let executed = [a.unwrap(), b.unwrap()]
        .into_iter()
        .filter(|o| matches!(o, BatchOutcome::Executed(_)))
        .count();

    assert_eq!(executed, 1);
    assert_eq!(swap.amounts.lock().unwrap().len(), 1);
}
