use anyhow::Result;
use gen_gateway::{
    config::{Config, Environment},
    contracts::signer_client,
    handlers::{router, AppState},
    middleware::AdminGuard,
    providers::ProviderRegistry,
    services::*,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const TRACKING_SWEEP_INTERVAL: Duration = Duration::from_secs(600);
const ONCHAIN_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting generation gateway v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);

    let store = connect_store(&config).await?;

    let prices: Arc<dyn PriceFeed> = Arc::new(HttpPriceFeed::new(
        config.price_feed.clone(),
        config.upstream_timeout,
    )?);
    let verifier: Arc<dyn PaymentVerifier> = Arc::new(EthereumPaymentVerifier::new(
        config.chain.clone(),
        prices.clone(),
        config.upstream_timeout,
    )?);

    let media: Option<Arc<dyn MediaStore>> = match config.storage.clone() {
        Some(storage) => Some(Arc::new(HttpObjectStore::new(storage, config.upstream_timeout)?)),
        None => {
            tracing::warn!("STORAGE_URL unset: provider media URLs are returned as-is");
            None
        }
    };
    let rehoster = Arc::new(MediaRehoster::new(media, config.upstream_timeout)?);
    let normalizer = Arc::new(TaskNormalizer::new(rehoster));
    let providers = Arc::new(ProviderRegistry::from_config(
        &config.providers,
        config.upstream_timeout,
    )?);

    let queue = Arc::new(BuybackQueue::new(store.clone(), config.buyback.percentage));
    let gateway = Arc::new(GenerationGateway::new(
        store.clone(),
        providers,
        verifier.clone(),
        normalizer,
        queue,
        config.chain.network.clone(),
        config.payment_tracking_ttl,
    ));

    let swap = build_swap_executor(&config)?;
    let executor = Arc::new(BatchExecutor::new(
        store.clone(),
        prices.clone(),
        swap,
        config.buyback.dust_floor_native,
    ));

    let refund_chain: Option<Arc<dyn RefundChain>> = match config.refund_wallet_private_key.as_deref() {
        Some(key) => {
            let client = signer_client(&config.chain.rpc_url, key, config.chain.chain_id)?;
            tracing::info!("Refund wallet: {:?}", client.address());
            Some(Arc::new(EthereumRefundChain::new(client, &config.chain, ONCHAIN_TIMEOUT)))
        }
        None => {
            tracing::warn!("REFUND_WALLET_PRIVATE_KEY unset: refunds are disabled");
            None
        }
    };
    let refunds = Arc::new(RefundEngine::new(
        store.clone(),
        prices.clone(),
        refund_chain,
        config.chain.reward_token_decimals,
    ));
    let refund_worker = Arc::new(RefundWorker::new(store.clone(), refunds.clone()));

    // Background jobs
    let shutdown = CancellationToken::new();
    let mut jobs = Vec::new();

    {
        let store = store.clone();
        jobs.push(spawn_periodic("tracking sweep", TRACKING_SWEEP_INTERVAL, shutdown.clone(), move || {
            let store = store.clone();
            async move {
                match store.sweep_expired_tracking(chrono::Utc::now()).await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!("Swept {} expired payment tracking rows", n),
                    Err(e) => tracing::warn!("Payment tracking sweep failed: {}", e),
                }
            }
        }));
    }

    if refunds.is_configured() {
        let worker = refund_worker.clone();
        jobs.push(spawn_periodic("refund worker", config.refund_worker_interval, shutdown.clone(), move || {
            let worker = worker.clone();
            async move {
                if let Err(e) = worker.drain().await {
                    tracing::warn!("Refund outbox drain failed: {}", e);
                }
            }
        }));
    }

    if let Some(interval) = config.buyback.interval {
        let executor = executor.clone();
        jobs.push(spawn_periodic("buyback batch", interval, shutdown.clone(), move || {
            let executor = executor.clone();
            async move {
                match executor.run().await {
                    Ok(outcome) => tracing::debug!("Scheduled buyback: {:?}", outcome),
                    Err(e) => tracing::warn!("Scheduled buyback failed: {}", e),
                }
            }
        }));
    }

    let state = AppState {
        gateway,
        executor,
        refunds,
        refund_worker,
        store,
        verifier,
        admin: Arc::new(AdminGuard::new(config.admin_token.clone())),
    };

    let app = router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    for job in jobs {
        if let Err(e) = job.await {
            tracing::warn!("Background job ended abnormally: {}", e);
        }
    }

    Ok(())
}

async fn connect_store(config: &Config) -> Result<Arc<dyn Store>> {
    match RedisStore::connect(&config.redis_url).await {
        Ok(store) => {
            tracing::info!("Connected to Redis at {}", config.redis_url);
            Ok(Arc::new(store))
        }
        Err(e) if config.environment == Environment::Development => {
            tracing::warn!("Redis unavailable ({}), using in-memory store", e);
            Ok(Arc::new(MemoryStore::new()))
        }
        Err(e) => Err(anyhow::anyhow!("Redis connection failed: {}", e)),
    }
}

fn build_swap_executor(config: &Config) -> Result<Option<Arc<dyn SwapExecutor>>> {
    let buyback = &config.buyback;
    let (Some(key), Some(router), Some(wrapped)) = (
        buyback.wallet_private_key.as_deref(),
        buyback.router_address,
        buyback.wrapped_native_address,
    ) else {
        tracing::warn!("Buyback wallet or router not configured: batches will not execute");
        return Ok(None);
    };

    let client = signer_client(&config.chain.rpc_url, key, config.chain.chain_id)?;
    tracing::info!("Buyback wallet: {:?}", client.address());

    Ok(Some(Arc::new(UniswapSwapExecutor::new(
        client,
        router,
        wrapped,
        config.chain.reward_token_address,
        config.chain.recipient_address,
        buyback.slippage_bps,
        ONCHAIN_TIMEOUT,
    ))))
}

fn spawn_periodic<F, Fut>(
    name: &'static str,
    every: Duration,
    shutdown: CancellationToken,
    mut job: F,
) -> tokio::task::JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!("Started {} every {:?}", name, every);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => job().await,
            }
        }
        tracing::info!("Stopped {}", name);
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl+c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down gracefully...");
}
