use super::traits::{Observer, ObserverEvent, ObserverMetric};
use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounterVec, Registry, TextEncoder,
};

/// Prometheus-backed observer — exposes metrics for scraping via `/metrics`.
pub struct PrometheusObserver {
    registry: Registry,

    // Counters
    ingested_items: IntCounterVec,
    flushes: IntCounterVec,
    fan_outs: IntCounterVec,
    subscriber_changes: IntCounterVec,
    alert_transitions: IntCounterVec,
    actions_dispatched: IntCounterVec,
    errors: IntCounterVec,

    // Histograms
    flush_item_count: HistogramVec,
    ingest_latency: Histogram,

    // Gauges
    dropped_items: prometheus::IntGauge,
    active_subscribers: GaugeVec,
    queue_depth: GaugeVec,
}

impl PrometheusObserver {
    pub fn new() -> Self {
        let registry = Registry::new();

        let ingested_items = IntCounterVec::new(
            prometheus::Opts::new("pulsegrid_ingested_items_total", "Total items ingested"),
            &["kind"],
        )
        .expect("valid metric");

        let flushes = IntCounterVec::new(
            prometheus::Opts::new("pulsegrid_flushes_total", "Total buffer flushes"),
            &["store", "success"],
        )
        .expect("valid metric");

        let fan_outs = IntCounterVec::new(
            prometheus::Opts::new("pulsegrid_fan_outs_total", "Total hub broadcasts"),
            &["hub"],
        )
        .expect("valid metric");

        let subscriber_changes = IntCounterVec::new(
            prometheus::Opts::new(
                "pulsegrid_subscriber_changes_total",
                "Total subscriber join/leave events",
            ),
            &["hub", "joined"],
        )
        .expect("valid metric");

        let alert_transitions = IntCounterVec::new(
            prometheus::Opts::new(
                "pulsegrid_alert_transitions_total",
                "Total alert state transitions",
            ),
            &["rule_id", "to"],
        )
        .expect("valid metric");

        let actions_dispatched = IntCounterVec::new(
            prometheus::Opts::new(
                "pulsegrid_actions_dispatched_total",
                "Total dispatcher actions run",
            ),
            &["action_kind", "success"],
        )
        .expect("valid metric");

        let errors = IntCounterVec::new(
            prometheus::Opts::new("pulsegrid_errors_total", "Total errors by component"),
            &["component"],
        )
        .expect("valid metric");

        let flush_item_count = HistogramVec::new(
            HistogramOpts::new(
                "pulsegrid_flush_item_count",
                "Number of items per buffer flush",
            )
            .buckets(vec![1.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]),
            &["store"],
        )
        .expect("valid metric");

        let ingest_latency = Histogram::with_opts(
            HistogramOpts::new(
                "pulsegrid_ingest_latency_seconds",
                "Ingestion handler latency in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )
        .expect("valid metric");

        let dropped_items = prometheus::IntGauge::new(
            "pulsegrid_dropped_items_last",
            "Items dropped in the most recent failed flush",
        )
        .expect("valid metric");

        let active_subscribers = GaugeVec::new(
            prometheus::Opts::new(
                "pulsegrid_active_subscribers",
                "Number of active hub subscribers",
            ),
            &[],
        )
        .expect("valid metric");

        let queue_depth = GaugeVec::new(
            prometheus::Opts::new("pulsegrid_queue_depth", "Buffered store pending depth"),
            &[],
        )
        .expect("valid metric");

        registry.register(Box::new(ingested_items.clone())).ok();
        registry.register(Box::new(flushes.clone())).ok();
        registry.register(Box::new(fan_outs.clone())).ok();
        registry.register(Box::new(subscriber_changes.clone())).ok();
        registry.register(Box::new(alert_transitions.clone())).ok();
        registry.register(Box::new(actions_dispatched.clone())).ok();
        registry.register(Box::new(errors.clone())).ok();
        registry.register(Box::new(flush_item_count.clone())).ok();
        registry.register(Box::new(ingest_latency.clone())).ok();
        registry.register(Box::new(dropped_items.clone())).ok();
        registry.register(Box::new(active_subscribers.clone())).ok();
        registry.register(Box::new(queue_depth.clone())).ok();

        Self {
            registry,
            ingested_items,
            flushes,
            fan_outs,
            subscriber_changes,
            alert_transitions,
            actions_dispatched,
            errors,
            flush_item_count,
            ingest_latency,
            dropped_items,
            active_subscribers,
            queue_depth,
        }
    }

    /// Encode all registered metrics into Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&families, &mut buf).unwrap_or_default();
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Observer for PrometheusObserver {
    fn record_event(&self, event: &ObserverEvent) {
        match event {
            ObserverEvent::Ingested {
                kind, item_count, ..
            } => {
                self.ingested_items
                    .with_label_values(&[kind])
                    .inc_by(*item_count as u64);
            }
            ObserverEvent::Flushed {
                store,
                item_count,
                success,
            } => {
                let success_str = if *success { "true" } else { "false" };
                self.flushes.with_label_values(&[store, success_str]).inc();
                self.flush_item_count
                    .with_label_values(&[store])
                    .observe(*item_count as f64);
            }
            ObserverEvent::FanOut { hub, .. } => {
                self.fan_outs.with_label_values(&[hub]).inc();
            }
            ObserverEvent::SubscriberChanged { hub, joined } => {
                let joined_str = if *joined { "true" } else { "false" };
                self.subscriber_changes
                    .with_label_values(&[hub, joined_str])
                    .inc();
            }
            ObserverEvent::AlertTransition { rule_id, to, .. } => {
                self.alert_transitions
                    .with_label_values(&[rule_id.as_str(), to])
                    .inc();
            }
            ObserverEvent::ActionDispatched {
                action_kind,
                success,
                ..
            } => {
                let success_str = if *success { "true" } else { "false" };
                self.actions_dispatched
                    .with_label_values(&[action_kind, success_str])
                    .inc();
            }
            ObserverEvent::Error { component, .. } => {
                self.errors.with_label_values(&[component]).inc();
            }
        }
    }

    fn record_metric(&self, metric: &ObserverMetric) {
        match metric {
            ObserverMetric::IngestLatency(d) => {
                self.ingest_latency.observe(d.as_secs_f64());
            }
            ObserverMetric::DroppedItems(n) => {
                self.dropped_items.set(i64::try_from(*n).unwrap_or(i64::MAX));
            }
            ObserverMetric::ActiveSubscribers(n) => {
                self.active_subscribers
                    .with_label_values(&[] as &[&str])
                    .set(*n as f64);
            }
            ObserverMetric::QueueDepth(d) => {
                self.queue_depth
                    .with_label_values(&[] as &[&str])
                    .set(*d as f64);
            }
        }
    }

    fn name(&self) -> &str {
        "prometheus"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
