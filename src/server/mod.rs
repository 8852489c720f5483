//! Top-level daemon wiring (spec.md §10): builds every core component, starts
//! the background sweep/flush tasks and the gateway, then drains on shutdown.
//!
//! Grounded on the teacher's `daemon::run` shape — a `Vec<JoinHandle<()>>`
//! collected up front, `tokio::signal::ctrl_c()` awaited, then cancellation
//! propagated to every subsystem before the process exits.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::alerts::AlertManager;
use crate::buffer::BufferEngine;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::emitter::Emitter;
use crate::endpoints::EndpointTracker;
use crate::gateway::{self, AppState};
use crate::hubs::HubManager;
use crate::ingestion::IngestionHandler;
use crate::meta_tracker::MetaTracker;
use crate::metric_index::MetricIndex;
use crate::observability::{create_observer, Observer};
use crate::rules::RuleEvaluator;
use crate::stores::memory::{
    FileRouteStore, InMemoryAlertStore, InMemoryDataStore, InMemoryEventStore, InMemoryLogStore,
    InMemoryMetricStore, InMemoryProcessStore, InMemorySessionAuth,
};
use crate::stores::traits::{RouteStore, SessionAuth};

/// Runs the daemon until `SIGINT`/Ctrl-C, then drains every subsystem.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let observer: Arc<dyn Observer> = create_observer(&config.observability).into();
    let shutdown = CancellationToken::new();

    let meta_tracker = Arc::new(MetaTracker::new());
    let endpoints = Arc::new(EndpointTracker::new(Arc::new(InMemoryDataStore::new())));
    let metric_index = Arc::new(MetricIndex::new());
    let hubs = Arc::new(HubManager::with_observer(&config.hubs, observer.clone()));

    let dispatcher = Arc::new(Dispatcher::with_observer(&config.dispatcher, observer.clone()));
    if !config.dispatcher.routes_path.is_empty() {
        let route_store = FileRouteStore::new(config.dispatcher.routes_path.clone());
        match route_store.load_routes().await {
            Ok(routes) => {
                tracing::info!(count = routes.len(), "loaded action routes");
                dispatcher.set_routes(routes);
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to load action routes, starting with none");
            }
        }
    }

    let emitter = Arc::new(Emitter::new(
        Arc::new(InMemoryEventStore::new()),
        hubs.clone(),
        dispatcher,
    ));

    let alerts = Arc::new(AlertManager::with_observer(
        Arc::new(InMemoryAlertStore::new()),
        hubs.clone(),
        emitter.clone(),
        observer.clone(),
    ));
    // No `rules_path` config key exists (spec.md is silent on one); rule
    // installation is a future control-plane concern, see DESIGN.md.
    let rules = Arc::new(RuleEvaluator::new(alerts));

    let buffer = Arc::new(BufferEngine::with_observer(
        &config.buffer_engine,
        Arc::new(InMemoryMetricStore::new()),
        Arc::new(InMemoryLogStore::new()),
        Arc::new(InMemoryProcessStore::new()),
        observer.clone(),
    ));
    buffer.start();
    crate::health::mark_component_ok("buffer_engine");

    let ingestion = Arc::new(IngestionHandler::with_observer(
        meta_tracker,
        endpoints.clone(),
        metric_index,
        buffer.clone(),
        hubs.clone(),
        rules,
        emitter.clone(),
        observer.clone(),
    ));

    let session_auth: Arc<dyn SessionAuth> = Arc::new(InMemorySessionAuth::new());
    let state = AppState::new(ingestion, hubs.clone(), session_auth, &config);

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    tasks.push(spawn_sync_task(
        endpoints.clone(),
        config.server.sync_interval_secs,
        shutdown.clone(),
    ));
    tasks.push(spawn_sweep_task(
        endpoints.clone(),
        emitter,
        config.server.status_sweep_interval_secs,
        shutdown.clone(),
    ));
    tasks.push(spawn_gateway_supervisor(
        config.server.host.clone(),
        config.server.port,
        state,
        shutdown.clone(),
    ));

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown signal received, draining");
    shutdown.cancel();
    hubs.shutdown();
    buffer.stop().await;

    for task in tasks {
        task.abort();
    }
    observer.flush();
    Ok(())
}

fn spawn_sync_task(
    endpoints: Arc<EndpointTracker>,
    interval_secs: u64,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    endpoints.sync_to_store().await;
                    crate::health::mark_component_ok("endpoint_sync");
                }
            }
        }
    })
}

fn spawn_sweep_task(
    endpoints: Arc<EndpointTracker>,
    emitter: Arc<Emitter>,
    interval_secs: u64,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let agent_events = endpoints.check_agent_statuses_and_emit_events();
                    let container_events = endpoints.check_container_statuses_and_emit();
                    for event in agent_events.0.into_iter().chain(container_events.0) {
                        emitter.emit(event).await;
                    }
                    crate::health::mark_component_ok("status_sweep");
                }
            }
        }
    })
}

/// Runs the gateway under [`spawn_component_supervisor`], restarting it with
/// jittered backoff if `axum::serve` ever returns an error (bind failure,
/// listener I/O error). A clean return (the shutdown token fired) ends the
/// supervisor loop without restarting.
fn spawn_gateway_supervisor(
    host: String,
    port: u16,
    state: AppState,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    spawn_component_supervisor(
        "gateway",
        Duration::from_secs(1),
        Duration::from_secs(30),
        shutdown.clone(),
        move || {
            let host = host.clone();
            let state = state.clone();
            let shutdown = shutdown.clone();
            async move { gateway::run_gateway(&host, port, state, shutdown).await }
        },
    )
}

/// Runs `make_attempt` in a loop, restarting with exponential, jittered
/// backoff on error up to `max_backoff`. Exits cleanly (no restart) once
/// `shutdown` has fired or an attempt returns `Ok`.
fn spawn_component_supervisor<F, Fut>(
    name: &'static str,
    initial_backoff: Duration,
    max_backoff: Duration,
    shutdown: CancellationToken,
    mut make_attempt: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut backoff = initial_backoff;
        loop {
            match make_attempt().await {
                Ok(()) => break,
                Err(err) => {
                    if shutdown.is_cancelled() {
                        break;
                    }
                    crate::health::mark_component_error(name, err.to_string());
                    crate::health::bump_component_restart(name);
                    let jitter_ms = rand::rng().random_range(0..250);
                    tracing::warn!(component = name, error = %err, backoff_ms = backoff.as_millis(), "component failed, restarting after backoff");
                    tokio::time::sleep(backoff + Duration::from_millis(jitter_ms)).await;
                    backoff = (backoff * 2).min(max_backoff);
                }
            }
        }
    })
}
