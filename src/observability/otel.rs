use super::traits::{Observer, ObserverEvent, ObserverMetric};
use opentelemetry::metrics::{Counter, Gauge, Histogram};
use opentelemetry::trace::{Span, SpanKind, Status, Tracer};
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;

/// OpenTelemetry-backed observer — exports traces and metrics via OTLP.
pub struct OtelObserver {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,

    // Metrics instruments
    ingested_items: Counter<u64>,
    flushes: Counter<u64>,
    flush_item_count: Histogram<f64>,
    fan_outs: Counter<u64>,
    subscriber_changes: Counter<u64>,
    alert_transitions: Counter<u64>,
    actions_dispatched: Counter<u64>,
    errors: Counter<u64>,
    ingest_latency: Histogram<f64>,
    dropped_items: Counter<u64>,
    active_subscribers: Gauge<u64>,
    queue_depth: Gauge<u64>,
}

impl OtelObserver {
    /// Create a new OTel observer exporting to the given OTLP endpoint.
    ///
    /// Uses HTTP/protobuf transport (port 4318 by default).
    /// Falls back to `http://localhost:4318` if no endpoint is provided.
    pub fn new(endpoint: Option<&str>, service_name: Option<&str>) -> Result<Self, String> {
        let endpoint = endpoint.unwrap_or("http://localhost:4318");
        let service_name = service_name.unwrap_or("pulsegrid");

        let span_exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| format!("Failed to create OTLP span exporter: {e}"))?;

        let tracer_provider = SdkTracerProvider::builder()
            .with_batch_exporter(span_exporter)
            .with_resource(
                opentelemetry_sdk::Resource::builder()
                    .with_service_name(service_name.to_string())
                    .build(),
            )
            .build();

        global::set_tracer_provider(tracer_provider.clone());

        let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| format!("Failed to create OTLP metric exporter: {e}"))?;

        let metric_reader =
            opentelemetry_sdk::metrics::PeriodicReader::builder(metric_exporter).build();

        let meter_provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(metric_reader)
            .with_resource(
                opentelemetry_sdk::Resource::builder()
                    .with_service_name(service_name.to_string())
                    .build(),
            )
            .build();

        let meter_provider_clone = meter_provider.clone();
        global::set_meter_provider(meter_provider);

        let meter = global::meter("pulsegrid");

        let ingested_items = meter
            .u64_counter("pulsegrid.ingested.items")
            .with_description("Total items ingested")
            .build();

        let flushes = meter
            .u64_counter("pulsegrid.flushes")
            .with_description("Total buffer flushes")
            .build();

        let flush_item_count = meter
            .f64_histogram("pulsegrid.flush.item_count")
            .with_description("Number of items per buffer flush")
            .build();

        let fan_outs = meter
            .u64_counter("pulsegrid.fan_outs")
            .with_description("Total hub broadcasts")
            .build();

        let subscriber_changes = meter
            .u64_counter("pulsegrid.subscriber.changes")
            .with_description("Total subscriber join/leave events")
            .build();

        let alert_transitions = meter
            .u64_counter("pulsegrid.alert.transitions")
            .with_description("Total alert state transitions")
            .build();

        let actions_dispatched = meter
            .u64_counter("pulsegrid.actions.dispatched")
            .with_description("Total dispatcher actions run")
            .build();

        let errors = meter
            .u64_counter("pulsegrid.errors")
            .with_description("Total errors by component")
            .build();

        let ingest_latency = meter
            .f64_histogram("pulsegrid.ingest.latency")
            .with_description("Ingestion handler latency in seconds")
            .with_unit("s")
            .build();

        let dropped_items = meter
            .u64_counter("pulsegrid.dropped.items")
            .with_description("Items dropped after failed flush retry")
            .build();

        let active_subscribers = meter
            .u64_gauge("pulsegrid.subscribers.active")
            .with_description("Current number of active hub subscribers")
            .build();

        let queue_depth = meter
            .u64_gauge("pulsegrid.queue.depth")
            .with_description("Current buffered store pending depth")
            .build();

        Ok(Self {
            tracer_provider,
            meter_provider: meter_provider_clone,
            ingested_items,
            flushes,
            flush_item_count,
            fan_outs,
            subscriber_changes,
            alert_transitions,
            actions_dispatched,
            errors,
            ingest_latency,
            dropped_items,
            active_subscribers,
            queue_depth,
        })
    }
}

impl Observer for OtelObserver {
    fn record_event(&self, event: &ObserverEvent) {
        let tracer = global::tracer("pulsegrid");

        match event {
            ObserverEvent::Ingested {
                kind,
                endpoint_id,
                item_count,
            } => {
                self.ingested_items.add(
                    *item_count as u64,
                    &[KeyValue::new("kind", kind.to_string())],
                );
                let mut span = tracer.build(
                    opentelemetry::trace::SpanBuilder::from_name("ingest")
                        .with_kind(SpanKind::Internal)
                        .with_attributes(vec![
                            KeyValue::new("kind", kind.to_string()),
                            KeyValue::new("endpoint_id", endpoint_id.clone()),
                            KeyValue::new("item_count", *item_count as i64),
                        ]),
                );
                span.end();
            }
            ObserverEvent::Flushed {
                store,
                item_count,
                success,
            } => {
                let attrs = [
                    KeyValue::new("store", store.to_string()),
                    KeyValue::new("success", *success),
                ];
                self.flushes.add(1, &attrs);
                self.flush_item_count
                    .record(*item_count as f64, &[KeyValue::new("store", store.to_string())]);
            }
            ObserverEvent::FanOut {
                hub,
                subscriber_count,
            } => {
                self.fan_outs.add(
                    1,
                    &[
                        KeyValue::new("hub", hub.to_string()),
                        KeyValue::new("subscriber_count", *subscriber_count as i64),
                    ],
                );
            }
            ObserverEvent::SubscriberChanged { hub, joined } => {
                self.subscriber_changes.add(
                    1,
                    &[
                        KeyValue::new("hub", hub.to_string()),
                        KeyValue::new("joined", *joined),
                    ],
                );
            }
            ObserverEvent::AlertTransition {
                rule_id,
                target,
                from,
                to,
            } => {
                let mut span = tracer.build(
                    opentelemetry::trace::SpanBuilder::from_name("alert.transition")
                        .with_kind(SpanKind::Internal)
                        .with_attributes(vec![
                            KeyValue::new("rule_id", rule_id.clone()),
                            KeyValue::new("target", target.clone()),
                            KeyValue::new("from", from.unwrap_or("absent").to_string()),
                            KeyValue::new("to", to.to_string()),
                        ]),
                );
                span.end();
                self.alert_transitions.add(
                    1,
                    &[
                        KeyValue::new("rule_id", rule_id.clone()),
                        KeyValue::new("to", to.to_string()),
                    ],
                );
            }
            ObserverEvent::ActionDispatched {
                route_id,
                action_kind,
                success,
            } => {
                let status = if *success {
                    Status::Ok
                } else {
                    Status::error("")
                };
                let mut span = tracer.build(
                    opentelemetry::trace::SpanBuilder::from_name("dispatcher.action")
                        .with_kind(SpanKind::Internal)
                        .with_attributes(vec![
                            KeyValue::new("route_id", route_id.clone()),
                            KeyValue::new("action_kind", action_kind.to_string()),
                            KeyValue::new("success", *success),
                        ]),
                );
                span.set_status(status);
                span.end();

                self.actions_dispatched.add(
                    1,
                    &[
                        KeyValue::new("action_kind", action_kind.to_string()),
                        KeyValue::new("success", *success),
                    ],
                );
            }
            ObserverEvent::Error { component, message } => {
                let mut span = tracer.build(
                    opentelemetry::trace::SpanBuilder::from_name("error")
                        .with_kind(SpanKind::Internal)
                        .with_attributes(vec![
                            KeyValue::new("component", component.clone()),
                            KeyValue::new("error.message", message.clone()),
                        ]),
                );
                span.set_status(Status::error(message.clone()));
                span.end();

                self.errors
                    .add(1, &[KeyValue::new("component", component.clone())]);
            }
        }
    }

    fn record_metric(&self, metric: &ObserverMetric) {
        match metric {
            ObserverMetric::IngestLatency(d) => {
                self.ingest_latency.record(d.as_secs_f64(), &[]);
            }
            ObserverMetric::DroppedItems(n) => {
                self.dropped_items.add(*n, &[]);
            }
            ObserverMetric::ActiveSubscribers(n) => {
                self.active_subscribers.record(*n, &[]);
            }
            ObserverMetric::QueueDepth(d) => {
                self.queue_depth.record(*d, &[]);
            }
        }
    }

    fn flush(&self) {
        if let Err(e) = self.tracer_provider.force_flush() {
            tracing::warn!("OTel trace flush failed: {e}");
        }
        if let Err(e) = self.meter_provider.force_flush() {
            tracing::warn!("OTel metric flush failed: {e}");
        }
    }

    fn name(&self) -> &str {
        "otel"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
