//! End-to-end coverage of spec.md §8's testable scenarios (S1, S2, S4, S5,
//! S6), assembled the same way `pulsegrid::server::run` wires components but
//! against the in-memory stores so every scenario runs without touching a
//! socket or the filesystem.
//!
//! S3 (offline detection after 125s of real elapsed time) is not exercised
//! here as a live sweep: `EndpointTracker::check_agent_statuses_and_emit_events`
//! reads the wall clock internally with no injectable `now`, so driving it
//! end-to-end would mean a slow real-time sleep. Its status-derivation logic
//! is exhaustively covered by the `derive_heartbeat` unit tests in
//! `src/endpoints/mod.rs`, which take `now` as an explicit argument and
//! assert the exact Online/Idle/Offline boundaries S3 relies on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pulsegrid::alerts::AlertManager;
use pulsegrid::buffer::BufferEngine;
use pulsegrid::config::{BufferEngineConfig, BufferedStoreConfig, DispatcherConfig, HubsConfig};
use pulsegrid::dispatcher::Dispatcher;
use pulsegrid::emitter::Emitter;
use pulsegrid::endpoints::EndpointTracker;
use pulsegrid::hubs::predicates::SubscriberFilter;
use pulsegrid::hubs::HubManager;
use pulsegrid::ingestion::IngestionHandler;
use pulsegrid::meta_tracker::MetaTracker;
use pulsegrid::metric_index::MetricIndex;
use pulsegrid::model::{
    ContainerStatus, DataPoint, EventLevel, EventScope, HeartbeatStatus, Meta, Metric,
    MetricPayload, Rule,
};
use pulsegrid::rules::RuleEvaluator;
use pulsegrid::stores::memory::{
    InMemoryAlertStore, InMemoryDataStore, InMemoryEventStore, InMemoryLogStore,
    InMemoryMetricStore, InMemoryProcessStore,
};

/// Every component `server::run` wires, built against in-memory stores and
/// kept alive for the duration of a scenario.
struct Pipeline {
    ingestion: Arc<IngestionHandler>,
    endpoints: Arc<EndpointTracker>,
    hubs: Arc<HubManager>,
    rules: Arc<RuleEvaluator>,
    buffer: Arc<BufferEngine>,
    metric_store: Arc<InMemoryMetricStore>,
    event_store: Arc<InMemoryEventStore>,
}

fn assemble(buffer_config: BufferEngineConfig) -> Pipeline {
    let meta_tracker = Arc::new(MetaTracker::new());
    let endpoints = Arc::new(EndpointTracker::new(Arc::new(InMemoryDataStore::new())));
    let metric_index = Arc::new(MetricIndex::new());
    let hubs = Arc::new(HubManager::new(&HubsConfig::default()));

    let dispatcher = Arc::new(Dispatcher::new(&DispatcherConfig::default()));
    let event_store = Arc::new(InMemoryEventStore::new());
    let emitter = Arc::new(Emitter::new(event_store.clone(), hubs.clone(), dispatcher));

    let alerts = Arc::new(AlertManager::new(
        Arc::new(InMemoryAlertStore::new()),
        hubs.clone(),
        emitter.clone(),
    ));
    let rules = Arc::new(RuleEvaluator::new(alerts));

    let metric_store = Arc::new(InMemoryMetricStore::new());
    let buffer = Arc::new(BufferEngine::new(
        &buffer_config,
        metric_store.clone(),
        Arc::new(InMemoryLogStore::new()),
        Arc::new(InMemoryProcessStore::new()),
    ));

    let ingestion = Arc::new(IngestionHandler::new(
        meta_tracker,
        endpoints.clone(),
        metric_index,
        buffer.clone(),
        hubs.clone(),
        rules.clone(),
        emitter,
    ));

    Pipeline {
        ingestion,
        endpoints,
        hubs,
        rules,
        buffer,
        metric_store,
        event_store,
    }
}

fn metric_payload(
    endpoint_id: &str,
    agent_id: &str,
    hostname: &str,
    value: f64,
    at: chrono::DateTime<Utc>,
) -> MetricPayload {
    MetricPayload {
        meta: Meta {
            agent_id: agent_id.into(),
            endpoint_id: endpoint_id.into(),
            hostname: hostname.into(),
            labels: [("agent_start_time".to_string(), "1700000000".to_string())]
                .into_iter()
                .collect(),
            ..Default::default()
        },
        timestamp: at,
        metrics: vec![Metric {
            name: "cpu.usage".into(),
            data_points: vec![DataPoint {
                timestamp: at,
                value,
                attributes: HashMap::new(),
            }],
        }],
    }
}

fn container_payload(container_id: &str, status: ContainerStatus) -> MetricPayload {
    MetricPayload {
        meta: Meta {
            container_id: container_id.into(),
            endpoint_id: format!("ctr-{container_id}"),
            container_name: "web".into(),
            labels: [("status".to_string(), format!("{status:?}").to_lowercase())]
                .into_iter()
                .collect(),
            ..Default::default()
        },
        timestamp: Utc::now(),
        metrics: vec![],
    }
}

/// S1 — agent registration: one metric payload registers the endpoint,
/// marks the agent Online, and emits a "registered" event.
#[tokio::test]
async fn scenario_s1_agent_registration() {
    let pipeline = assemble(BufferEngineConfig::default());

    pipeline
        .ingestion
        .ingest_metrics(metric_payload("host-h1", "ag1", "h1", 17.5, Utc::now()))
        .await;

    assert!(pipeline.endpoints.list_endpoints().contains(&"host-h1".to_string()));
    let agents = pipeline.endpoints.get_agent_map();
    let agent = agents.get("host-h1").expect("agent tracked");
    assert_eq!(agent.status, HeartbeatStatus::Online);

    let events = pipeline.event_store.events.lock().clone();
    assert!(events
        .iter()
        .any(|e| e.category == "system" && e.message.contains("registered")));
}

/// S2 — container status change: Running then Exited emits "started" (info)
/// then a "changed engine status" (warning) event.
#[tokio::test]
async fn scenario_s2_container_status_change() {
    let pipeline = assemble(BufferEngineConfig::default());

    pipeline
        .ingestion
        .ingest_metrics(container_payload("ctr-X", ContainerStatus::Running))
        .await;
    pipeline
        .ingestion
        .ingest_metrics(container_payload("ctr-X", ContainerStatus::Exited))
        .await;

    let events = pipeline.event_store.events.lock().clone();
    let container_events: Vec<_> = events
        .iter()
        .filter(|e| e.target == "ctr-ctr-X" || e.endpoint_id == "ctr-ctr-X")
        .collect();

    assert!(container_events
        .iter()
        .any(|e| e.level == EventLevel::Info && e.message.to_lowercase().contains("started")));
    assert!(container_events
        .iter()
        .any(|e| e.level == EventLevel::Warning && e.message.contains("Exited")));
}

/// S4 — alert firing and resolution: ten samples of 90 at 5s steps cross the
/// `for: 30s` threshold exactly once, then a value=10 sample resolves it.
#[tokio::test]
async fn scenario_s4_alert_fires_then_resolves() {
    let pipeline = assemble(BufferEngineConfig::default());
    pipeline.rules.set_rules(vec![Rule {
        id: "r1".into(),
        expression: "cpu.usage > 80".into(),
        level: EventLevel::Critical,
        scope: EventScope::Endpoint,
        match_labels: HashMap::new(),
        for_duration_secs: 30,
        annotations: HashMap::new(),
    }]);

    let base = Utc::now();
    for i in 0..10u32 {
        let at = base + chrono::Duration::seconds(i64::from(i) * 5);
        pipeline
            .ingestion
            .ingest_metrics(metric_payload("host-h1", "ag1", "h1", 90.0, at))
            .await;
    }
    let resolved_at = base + chrono::Duration::seconds(50);
    pipeline
        .ingestion
        .ingest_metrics(metric_payload("host-h1", "ag1", "h1", 10.0, resolved_at))
        .await;

    let events = pipeline.event_store.events.lock().clone();
    let alert_events: Vec<_> = events.iter().filter(|e| e.category == "alert").collect();
    assert_eq!(
        alert_events.iter().filter(|e| e.message.contains("firing")).count(),
        1,
        "exactly one pending->firing transition"
    );
    assert_eq!(
        alert_events.iter().filter(|e| e.message.contains("resolved")).count(),
        1,
        "exactly one firing->resolved transition"
    );
}

/// S5 — fan-out: three subscribers (host-scoped, container-scoped,
/// unfiltered) receive exactly the payloads their filter matches.
#[tokio::test]
async fn scenario_s5_fan_out() {
    let pipeline = assemble(BufferEngineConfig::default());
    let metrics = pipeline.hubs.metrics();

    let (_, mut a) = metrics.join(SubscriberFilter {
        endpoint_id: "host-h1".into(),
        agent_id: String::new(),
        host_id: String::new(),
    });
    let (_, mut b) = metrics.join(SubscriberFilter {
        endpoint_id: "ctr-X".into(),
        agent_id: "ag1".into(),
        host_id: String::new(),
    });
    let (_, mut c) = metrics.join(SubscriberFilter::unfiltered());

    pipeline
        .ingestion
        .ingest_metrics(metric_payload("host-h1", "", "h1", 1.0, Utc::now()))
        .await;
    pipeline
        .ingestion
        .ingest_metrics(metric_payload("ctr-X", "ag1", "", 1.0, Utc::now()))
        .await;

    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(a.try_recv().is_ok());
    assert!(a.try_recv().is_err());

    assert!(b.try_recv().is_ok());
    assert!(b.try_recv().is_err());

    assert!(c.try_recv().is_ok());
    assert!(c.try_recv().is_ok());
}

/// S6 — buffer drain at shutdown: 37 items written to a buffer configured
/// with `buffer_size=100` flush exactly once, as a single batch, once the
/// engine is stopped.
#[tokio::test]
async fn scenario_s6_buffer_drains_on_shutdown() {
    let config = BufferEngineConfig {
        metrics: BufferedStoreConfig {
            enabled: true,
            buffer_size: 100,
            flush_interval_secs: 10,
            drop_on_overflow: false,
            retry_failed_flush: false,
            flush_on_disconnect: false,
        },
        ..BufferEngineConfig::default()
    };
    let pipeline = assemble(config);

    for i in 0..37 {
        pipeline
            .ingestion
            .ingest_metrics(metric_payload("host-h1", "ag1", "h1", f64::from(i), Utc::now()))
            .await;
    }

    assert_eq!(pipeline.buffer.metrics.pending_len(), 37);
    assert_eq!(pipeline.metric_store.flush_count(), 0, "nothing flushed below threshold");

    pipeline.buffer.stop().await;

    assert_eq!(pipeline.metric_store.flush_count(), 37, "exactly one flush of 37 items");
}
