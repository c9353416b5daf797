use std::sync::Arc;

use alloy::providers::{DynProvider, ProviderBuilder};
use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;
use url::Url;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use ekubo_quoter::{
    AlloyMulticall, EkuboPool, MulticallExecutor, PoolRegistry, Settings, SyncWorker,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let settings = Arc::new(
        Settings::new().context("Failed to load config. Please ensure it exists and is valid")?,
    );

    let level = settings
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);
    SimpleLogger::new()
        .with_level(level)
        .init()
        .context("Failed to install logger")?;

    let url = Url::parse(&settings.rpc.url).context("Invalid RPC URL")?;
    let provider = DynProvider::new(ProviderBuilder::new().connect_http(url));

    let mut multicall = AlloyMulticall::new(provider.clone())
        .with_timeout(settings.rpc.call_timeout())
        .with_max_retries(settings.rpc.max_retries);
    if let Some(address) = settings.rpc.multicall_address {
        multicall = multicall.with_address(address);
    }
    let executor: Arc<dyn MulticallExecutor> = Arc::new(multicall);

    let deployment = settings.ekubo.deployment();
    let mut registry = PoolRegistry::new(&deployment, settings.sync.regeneration_cooldown());
    for pool in &settings.pools {
        let pool = EkuboPool::new(
            pool.key(),
            &deployment,
            executor.clone(),
            settings.cache.retention_blocks,
        );
        info!("Tracking {:?} pool {}", pool.kind(), pool.key().id());
        registry.add_pool(pool);
    }
    let registry = Arc::new(registry);

    let cancellation_token = CancellationToken::new();

    run_quoter(settings, provider, registry, cancellation_token).await
}

async fn run_quoter(
    settings: Arc<Settings>,
    provider: DynProvider,
    registry: Arc<PoolRegistry>,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    let worker = SyncWorker::new(
        provider,
        registry.clone(),
        &settings.sync,
        settings.cache.retention_blocks,
    );

    let worker_token = cancellation_token.child_token();
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = worker.run(worker_token).await {
            error!("Sync worker failed: {:#}", e);
        }
    });

    info!("Sync worker started for {} pools", registry.len());

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Quoter running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    cancellation_token.cancel();

    info!("Waiting for sync worker to stop...");
    let _ = worker_handle.await;

    info!("Quoter stopped");
    Ok(())
}
