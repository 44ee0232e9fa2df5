// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `celld` — the daemon binary. Wires every component (spec.md §9) behind
//! one `Orchestrator`, exposes it over `cellrun_http::router`, and runs the
//! background loops (pool replenisher, health checker, state archiver,
//! session cleaner, orphan sweeper) as cancellable tasks.

mod env;
mod lifecycle;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cellrun_adapters::{AnyBackend, DockerBackend, KubernetesBackend};
use cellrun_core::{Clock, Config, Event, Language, SandboxBackendKind, SystemClock};
use cellrun_engine::{Orchestrator, RemoteExecutor, SandboxManager, SandboxPool};
use cellrun_http::AppState;
use cellrun_storage::{Archivable, MokaSessionRegistry, ObjectFileStore, S3ObjectStore, TieredStateStore};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Docker sandbox port allocation starts here (spec.md §4.3); arbitrary but
/// kept well clear of common service ports.
const DOCKER_BASE_PORT: u16 = 23_000;

/// Cap request bodies well above the largest allowed state/file upload so
/// the limit never shadows a legitimate `StateTooLarge`/`TooLarge` error
/// with a generic body-too-large response.
const MAX_BODY_BYTES: usize = 512 * 1024 * 1024;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("celld: fatal: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let state_dir = env::state_dir()?;
    let paths = lifecycle::Paths::resolve(state_dir);
    std::fs::create_dir_all(&paths.state_dir)?;
    let _tracing_guard = init_tracing(&config, &paths);

    let _lock = lifecycle::acquire_lock(&paths)?;
    info!(bind_addr = %config.ambient.bind_addr, state_dir = %paths.state_dir.display(), "starting celld");

    let clock = SystemClock;
    let (events_tx, events_rx) = broadcast::channel::<Event>(1024);
    spawn_event_logger(events_rx);

    let object_store =
        Arc::new(S3ObjectStore::from_config(config.ambient.s3_bucket.clone(), config.ambient.s3_endpoint.as_deref()).await);

    let sessions = Arc::new(MokaSessionRegistry::new(clock.clone(), config.session.ttl()));
    let files = Arc::new(ObjectFileStore::new(object_store.clone(), config.files));
    let state_store = Arc::new(TieredStateStore::new(
        object_store,
        Duration::from_secs(config.state.ttl_s),
        Duration::from_secs(config.state.restore_grace_s),
        config.state.max_size_bytes(),
    ));

    let backend = Arc::new(build_backend(&config).await?);
    let pool = Arc::new(SandboxPool::new(backend.clone(), clock.clone(), config.pool.clone(), events_tx.clone()));
    let manager = Arc::new(SandboxManager::new(
        backend.clone(),
        Duration::from_secs(config.pool.startup_deadline_s.max(1)),
    ));
    let executor = Arc::new(RemoteExecutor::new());

    let orchestrator = Arc::new(Orchestrator::new(
        backend.clone(),
        pool.clone(),
        manager.clone(),
        executor,
        sessions.clone(),
        files.clone(),
        state_store.clone(),
        clock.clone(),
        config.execution,
        config.pool.clone(),
        events_tx,
    ));

    let shutdown = CancellationToken::new();
    spawn_background_loops(
        shutdown.clone(),
        pool.clone(),
        manager.clone(),
        sessions.clone(),
        files.clone(),
        state_store.clone(),
        config.clone(),
    );

    let app_state = Arc::new(AppState {
        orchestrator,
        files,
        state_store,
        clock,
        execution: config.execution,
        state_config: config.state,
    });

    let app = cellrun_http::router(app_state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.ambient.bind_addr).await?;
    info!(addr = %config.ambient.bind_addr, "listening");

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            serve_shutdown.cancel();
        })
        .await?;

    info!("draining background loops");
    pool.shutdown().await;
    info!("celld shutdown complete");
    Ok(())
}

fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    let path = env::config_path();
    Ok(Config::load(path.as_deref())?)
}

/// Logs to stdout and to `celld.log` under the state directory at once, so
/// an operator tailing the log file sees the same stream `journalctl`/the
/// foreground terminal does. Returns the `WorkerGuard` for the file
/// appender's background writer thread — it must stay alive for the
/// process lifetime or buffered lines are dropped on exit.
fn init_tracing(config: &Config, paths: &lifecycle::Paths) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_appender = tracing_appender::rolling::never(&paths.state_dir, "celld.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = tracing_subscriber::fmt::layer();
    let file_layer = tracing_subscriber::fmt::layer().with_writer(file_writer).with_ansi(false);

    match config.ambient.log_format {
        cellrun_core::LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer.json())
                .with(file_layer.json())
                .init();
        }
        cellrun_core::LogFormat::Pretty => {
            tracing_subscriber::registry().with(filter).with(stdout_layer).with(file_layer).init();
        }
    }
    guard
}

async fn build_backend(config: &Config) -> Result<AnyBackend, Box<dyn std::error::Error>> {
    Ok(match config.ambient.sandbox_backend {
        SandboxBackendKind::Docker => {
            AnyBackend::Docker(DockerBackend::new(config.ambient.docker_image_prefix.clone(), DOCKER_BASE_PORT))
        }
        SandboxBackendKind::Kubernetes => AnyBackend::Kubernetes(
            KubernetesBackend::new(config.ambient.k8s_namespace.clone(), config.ambient.k8s_image.clone()).await?,
        ),
    })
}

#[allow(clippy::too_many_arguments)]
fn spawn_background_loops<O>(
    shutdown: CancellationToken,
    pool: Arc<SandboxPool<AnyBackend, SystemClock>>,
    manager: Arc<SandboxManager<AnyBackend>>,
    sessions: Arc<MokaSessionRegistry<SystemClock>>,
    files: Arc<dyn cellrun_storage::FileStore>,
    state_store: Arc<TieredStateStore<O>>,
    config: Config,
) where
    O: cellrun_storage::ObjectStore,
{
    let languages: Vec<Language> =
        Language::ALL.into_iter().filter(|lang| !config.pool.is_pool_disabled(*lang)).collect();

    if config.pool.warmup_on_startup {
        for language in languages.clone() {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.warmup(language).await;
            });
        }
    }

    for language in languages.clone() {
        let pool = pool.clone();
        let shutdown = shutdown.clone();
        let interval = Duration::from_secs(config.pool.replenish_interval_s.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => pool.replenish_once(language).await,
                }
            }
        });
    }

    for language in languages {
        let pool = pool.clone();
        let shutdown = shutdown.clone();
        let interval = Duration::from_secs(config.pool.health_interval_s.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut failures = HashMap::new();
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => pool.health_check_once(language, &mut failures).await,
                }
            }
        });
    }

    {
        let manager = manager.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let n = manager.sweep_orphans().await;
                        if n > 0 {
                            info!(count = n, "swept orphaned sandboxes");
                        }
                    }
                }
            }
        });
    }

    if config.state.archive_enabled {
        let state_store = state_store.clone();
        let shutdown = shutdown.clone();
        let interval = Duration::from_secs(config.state.archive_check_interval_s.max(1));
        let archive_after = Duration::from_secs(config.state.archive_after_s);
        let clock = SystemClock;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let n = state_store.archive_idle(clock.epoch_ms(), archive_after).await;
                        if n > 0 {
                            info!(count = n, "archived idle state blobs to cold storage");
                        }
                    }
                }
            }
        });
    }

    {
        let shutdown = shutdown.clone();
        let interval = Duration::from_secs(config.session.cleanup_interval_minutes.max(1) * 60);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let expired = sessions.sweep_expired().await;
                        for id in &expired {
                            files.delete_session(*id).await;
                            if let Err(e) = state_store.delete(*id).await {
                                warn!(session_id = %id, error = %e, "failed to delete state during session sweep");
                            }
                        }
                        if !expired.is_empty() {
                            info!(count = expired.len(), "swept expired sessions");
                        }
                    }
                }
            }
        });
    }
}

/// Drains the event bus for observability (spec.md §5, §7). Lagging is
/// expected under load and logged at `debug`, not an operational concern —
/// the bus is a side-channel, never load-bearing for request handling.
fn spawn_event_logger(mut rx: broadcast::Receiver<Event>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => info!(?event, "event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn wait_for_shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }
}
