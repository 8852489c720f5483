//! Glue between the wire payloads and every core component (spec.md §5,
//! data-flow pseudocode). One `IngestionHandler` instance is shared across
//! every inbound connection/request.

use std::sync::Arc;

use crate::buffer::BufferEngine;
use crate::emitter::Emitter;
use crate::endpoints::EndpointTracker;
use crate::hubs::HubManager;
use crate::meta_tracker::MetaTracker;
use crate::metric_index::MetricIndex;
use crate::model::{LogPayload, MetricPayload, ProcessPayload};
use crate::observability::traits::{Observer, ObserverEvent};
use crate::rules::RuleEvaluator;

/// Splits a dotted metric name into `(namespace, sub, name)` per spec.md
/// §4.2's `ns.sub.name` convention. Two segments collapse `sub` to empty;
/// a bare name has an empty namespace and sub too.
fn split_metric_name(full: &str) -> (String, String, String) {
    let parts: Vec<&str> = full.split('.').collect();
    match parts.len() {
        0 => (String::new(), String::new(), String::new()),
        1 => (String::new(), String::new(), parts[0].to_string()),
        2 => (parts[0].to_string(), String::new(), parts[1].to_string()),
        _ => (
            parts[0].to_string(),
            parts[1..parts.len() - 1].join("."),
            parts[parts.len() - 1].to_string(),
        ),
    }
}

pub struct IngestionHandler {
    meta_tracker: Arc<MetaTracker>,
    endpoints: Arc<EndpointTracker>,
    metric_index: Arc<MetricIndex>,
    buffer: Arc<BufferEngine>,
    hubs: Arc<HubManager>,
    rules: Arc<RuleEvaluator>,
    emitter: Arc<Emitter>,
    observer: Arc<dyn Observer>,
}

impl IngestionHandler {
    pub fn new(
        meta_tracker: Arc<MetaTracker>,
        endpoints: Arc<EndpointTracker>,
        metric_index: Arc<MetricIndex>,
        buffer: Arc<BufferEngine>,
        hubs: Arc<HubManager>,
        rules: Arc<RuleEvaluator>,
        emitter: Arc<Emitter>,
    ) -> Self {
        Self::with_observer(
            meta_tracker,
            endpoints,
            metric_index,
            buffer,
            hubs,
            rules,
            emitter,
            Arc::new(crate::observability::noop::NoopObserver),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_observer(
        meta_tracker: Arc<MetaTracker>,
        endpoints: Arc<EndpointTracker>,
        metric_index: Arc<MetricIndex>,
        buffer: Arc<BufferEngine>,
        hubs: Arc<HubManager>,
        rules: Arc<RuleEvaluator>,
        emitter: Arc<Emitter>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            meta_tracker,
            endpoints,
            metric_index,
            buffer,
            hubs,
            rules,
            emitter,
            observer,
        }
    }

    /// Looks up the most recently observed `Meta` for an endpoint, used by
    /// the gateway to bind a subscriber's `AgentID`/`HostID` at connect time.
    pub fn resolve_meta(&self, endpoint_id: &str) -> Option<crate::model::Meta> {
        self.meta_tracker.get(endpoint_id)
    }

    async fn track_endpoint(&self, meta: &crate::model::Meta) {
        self.meta_tracker.set(&meta.endpoint_id, meta.clone());

        let agent_events = self.endpoints.update_agent(meta).await;
        let container_events = self.endpoints.update_container(meta).await;
        for event in agent_events.0.into_iter().chain(container_events.0) {
            self.emitter.emit(event).await;
        }
    }

    /// Step 2 of spec.md §5: `MetricIndex.Add` per point, `BufferEngine`
    /// write, hub broadcast, then rule evaluation. Never blocks on broadcast;
    /// buffer write failures are non-fatal (handled inside `BufferedStore`).
    pub async fn ingest_metrics(&self, payload: MetricPayload) {
        self.track_endpoint(&payload.meta).await;

        for metric in &payload.metrics {
            let (namespace, sub, name) = split_metric_name(&metric.name);
            for point in &metric.data_points {
                self.metric_index.add(&namespace, &sub, &name, &point.attributes);
            }
        }

        self.observer.record_event(&ObserverEvent::Ingested {
            kind: "metrics",
            endpoint_id: payload.meta.endpoint_id.clone(),
            item_count: payload.metrics.len(),
        });

        self.buffer.metrics.write_any(payload.clone());
        self.hubs.metrics().broadcast(payload.clone());
        self.rules.evaluate(&payload).await;
    }

    /// Step 3 of spec.md §5: logs take the same shape without `MetricIndex`
    /// or rule evaluation.
    pub async fn ingest_logs(&self, payload: LogPayload) {
        self.track_endpoint(&payload.meta).await;
        self.observer.record_event(&ObserverEvent::Ingested {
            kind: "logs",
            endpoint_id: payload.meta.endpoint_id.clone(),
            item_count: payload.entries.len(),
        });
        self.buffer.logs.write_any(payload.clone());
        self.hubs.logs().broadcast(payload);
    }

    pub async fn ingest_process(&self, payload: ProcessPayload) {
        self.track_endpoint(&payload.meta).await;
        self.observer.record_event(&ObserverEvent::Ingested {
            kind: "process",
            endpoint_id: payload.meta.endpoint_id.clone(),
            item_count: payload.entries.len(),
        });
        self.buffer.process.write_any(payload.clone());
        self.hubs.process().broadcast(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertManager;
    use crate::config::{BufferEngineConfig, DispatcherConfig, HubsConfig};
    use crate::dispatcher::Dispatcher;
    use crate::model::{DataPoint, LogEntry, Meta, Metric, Rule};
    use crate::stores::memory::{
        InMemoryAlertStore, InMemoryDataStore, InMemoryEventStore, InMemoryLogStore,
        InMemoryMetricStore, InMemoryProcessStore,
    };
    use std::collections::HashMap;

    #[test]
    fn split_metric_name_handles_every_segment_count() {
        assert_eq!(split_metric_name("uptime"), (String::new(), String::new(), "uptime".into()));
        assert_eq!(
            split_metric_name("cpu.usage"),
            ("cpu".into(), String::new(), "usage".into())
        );
        assert_eq!(
            split_metric_name("docker.container.cpu"),
            ("docker".into(), "container".into(), "cpu".into())
        );
    }

    fn handler() -> (IngestionHandler, Arc<InMemoryMetricStore>) {
        let data_store = Arc::new(InMemoryDataStore::new());
        let meta_tracker = Arc::new(MetaTracker::new());
        let endpoints = Arc::new(EndpointTracker::new(data_store));
        let metric_index = Arc::new(MetricIndex::new());
        let metric_store = Arc::new(InMemoryMetricStore::new());
        let log_store = Arc::new(InMemoryLogStore::new());
        let process_store = Arc::new(InMemoryProcessStore::new());
        let buffer = Arc::new(BufferEngine::new(
            &BufferEngineConfig::default(),
            metric_store.clone(),
            log_store,
            process_store,
        ));
        let hubs = Arc::new(HubManager::new(&HubsConfig::default()));
        let event_store = Arc::new(InMemoryEventStore::new());
        let dispatcher = Arc::new(Dispatcher::new(&DispatcherConfig::default()));
        let emitter = Arc::new(Emitter::new(event_store, hubs.clone(), dispatcher));
        let alert_store = Arc::new(InMemoryAlertStore::new());
        let alerts = Arc::new(AlertManager::new(alert_store, hubs.clone(), emitter.clone()));
        let rules = Arc::new(RuleEvaluator::new(alerts));

        (
            IngestionHandler::new(meta_tracker, endpoints, metric_index, buffer, hubs, rules, emitter),
            metric_store,
        )
    }

    fn metric_payload() -> MetricPayload {
        MetricPayload {
            meta: Meta {
                endpoint_id: "host-h1".into(),
                hostname: "h1".into(),
                ..Default::default()
            },
            timestamp: chrono::Utc::now(),
            metrics: vec![Metric {
                name: "cpu.usage".into(),
                data_points: vec![DataPoint {
                    timestamp: chrono::Utc::now(),
                    value: 42.0,
                    attributes: HashMap::new(),
                }],
            }],
        }
    }

    #[tokio::test]
    async fn ingest_metrics_updates_index_buffer_and_hub() {
        let (handler, metric_store) = handler();
        let mut metrics_rx = handler.hubs.metrics().subscribe_raw();

        handler.ingest_metrics(metric_payload()).await;

        assert_eq!(handler.metric_index.get_namespaces(), vec!["cpu".to_string()]);
        assert!(metrics_rx.try_recv().is_ok());

        handler.buffer.metrics.flush().await;
        assert_eq!(metric_store.flush_count(), 1);
    }

    #[tokio::test]
    async fn ingest_logs_reaches_log_buffer_and_hub() {
        let (handler, _metric_store) = handler();
        let mut logs_rx = handler.hubs.logs().subscribe_raw();

        handler
            .ingest_logs(LogPayload {
                meta: Meta {
                    endpoint_id: "host-h1".into(),
                    hostname: "h1".into(),
                    ..Default::default()
                },
                timestamp: chrono::Utc::now(),
                entries: vec![LogEntry {
                    timestamp: chrono::Utc::now(),
                    level: "info".into(),
                    message: "hello".into(),
                    attributes: HashMap::new(),
                }],
            })
            .await;

        assert!(logs_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn ingest_metrics_with_matching_rule_does_not_panic() {
        let (handler, _) = handler();
        handler.rules.set_rules(vec![Rule {
            id: "r1".into(),
            expression: "cpu.usage > 10".into(),
            level: crate::model::EventLevel::Warning,
            scope: crate::model::EventScope::Endpoint,
            match_labels: HashMap::new(),
            for_duration_secs: 30,
            annotations: HashMap::new(),
        }]);

        handler.ingest_metrics(metric_payload()).await;
    }
}
