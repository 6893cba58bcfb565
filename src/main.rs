use std::{future::IntoFuture, process, sync::Arc};

use placecache::{
    api::{self, ApiState},
    cache::{CacheBackend, CacheClient, CacheConfig, Invalidator, MemoryBackend, ResponseCacheState},
    config::{self, CacheBackendKind, CacheSettings},
    error::AppError,
    infra::{error::InfraError, store::MemoryStore, telemetry},
};
use tokio::{sync::oneshot, task::JoinError};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::CheckConfig(_) => {
            println!("{settings:#?}");
            Ok(())
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let backend = build_backend(&settings.cache).await?;
    let client = CacheClient::new(backend, cache_config.clone());

    let state = ApiState::new(Arc::new(MemoryStore::new()), Invalidator::new(&cache_config));
    let router = api::build_router(state, ResponseCacheState {
        client: client.clone(),
    });

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "placecache::serve",
        addr = %settings.server.addr,
        backend = client.backend_name(),
        cache_enabled = cache_config.enabled,
        api_root = %cache_config.api_root,
        legacy_api_root = cache_config.legacy_api_root.as_deref().unwrap_or(""),
        "Serving API"
    );

    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let shutdown = async move {
        wait_for_ctrl_c().await;
        let _ = signalled_tx.send(());
    };
    let mut server = tokio::spawn(
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .into_future(),
    );

    tokio::select! {
        result = &mut server => return server_outcome(result),
        _ = signalled_rx => {}
    }

    let grace = settings.server.graceful_shutdown;
    info!(
        target = "placecache::serve",
        grace_seconds = grace.as_secs(),
        "Shutdown requested, draining connections"
    );
    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => server_outcome(result),
        Err(_) => {
            warn!(
                target = "placecache::serve",
                grace_seconds = grace.as_secs(),
                "Graceful shutdown timed out, aborting open connections"
            );
            server.abort();
            Ok(())
        }
    }
}

fn server_outcome(result: Result<std::io::Result<()>, JoinError>) -> Result<(), AppError> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::from(InfraError::from(err))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn wait_for_ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c; shutdown must be forced");
        std::future::pending::<()>().await;
    }
}

async fn build_backend(settings: &CacheSettings) -> Result<Arc<dyn CacheBackend>, InfraError> {
    match settings.backend {
        CacheBackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
        CacheBackendKind::Redis => connect_redis(settings).await,
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(settings: &CacheSettings) -> Result<Arc<dyn CacheBackend>, InfraError> {
    let url = settings
        .redis_url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("cache.redis_url is required for redis"))?;
    let timeout = std::time::Duration::from_millis(settings.redis_timeout_ms.get());
    let backend =
        placecache::cache::RedisBackend::connect(url, settings.redis_prefix.clone(), timeout)
            .await?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_settings: &CacheSettings) -> Result<Arc<dyn CacheBackend>, InfraError> {
    Err(InfraError::configuration(
        "cache.backend = \"redis\" requires building with the `redis` feature",
    ))
}
