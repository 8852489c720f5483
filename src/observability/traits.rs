use std::time::Duration;

/// Discrete events emitted by the telemetry pipeline for observability.
///
/// Each variant represents a lifecycle event that observers can record,
/// aggregate, or forward to external monitoring systems. Events carry just
/// enough context for tracing and diagnostics without the payload body.
#[derive(Debug, Clone)]
pub enum ObserverEvent {
    /// A batch of metrics, logs, or process snapshots was accepted.
    Ingested {
        kind: &'static str,
        endpoint_id: String,
        item_count: usize,
    },
    /// A buffered store flushed its pending items to the underlying sink.
    Flushed {
        store: &'static str,
        item_count: usize,
        success: bool,
    },
    /// A payload was broadcast on a hub.
    FanOut {
        hub: &'static str,
        subscriber_count: usize,
    },
    /// A subscriber joined or was removed from a hub.
    SubscriberChanged {
        hub: &'static str,
        joined: bool,
    },
    /// An alert instance transitioned state.
    AlertTransition {
        rule_id: String,
        target: String,
        from: Option<&'static str>,
        to: &'static str,
    },
    /// A dispatcher action ran.
    ActionDispatched {
        route_id: String,
        action_kind: &'static str,
        success: bool,
    },
    /// An error occurred in a named component.
    Error {
        /// Subsystem where the error originated (e.g., `"buffer"`, `"gateway"`).
        component: String,
        /// Human-readable error description. Must not contain secrets or tokens.
        message: String,
    },
}

/// Numeric metrics emitted by the telemetry pipeline.
///
/// Observers can aggregate these into dashboards, alerts, or structured logs.
/// Each variant carries a single scalar value with implicit units.
#[derive(Debug, Clone)]
pub enum ObserverMetric {
    /// Time elapsed handling a single ingestion request.
    IngestLatency(Duration),
    /// Number of items dropped because a hub or subscriber queue was full.
    DroppedItems(u64),
    /// Current number of connected subscribers across all hubs.
    ActiveSubscribers(u64),
    /// Current pending-item depth of a buffered store.
    QueueDepth(u64),
}

/// Core observability trait for recording pipeline telemetry.
///
/// Implement this trait to integrate with any monitoring backend (structured
/// logging, Prometheus, OpenTelemetry, etc.). The core holds one or more
/// `Observer` instances and calls [`record_event`](Observer::record_event)
/// and [`record_metric`](Observer::record_metric) at key lifecycle points.
///
/// Implementations must be `Send + Sync + 'static` because the observer is
/// shared across async tasks via `Arc`.
pub trait Observer: Send + Sync + 'static {
    /// Record a discrete lifecycle event.
    ///
    /// Called synchronously on the hot path; implementations should avoid
    /// blocking I/O. Buffer events internally and flush asynchronously
    /// when possible.
    fn record_event(&self, event: &ObserverEvent);

    /// Record a numeric metric sample.
    ///
    /// Called synchronously; same non-blocking guidance as
    /// [`record_event`](Observer::record_event).
    fn record_metric(&self, metric: &ObserverMetric);

    /// Flush any buffered telemetry data to the backend.
    ///
    /// The runtime calls this during graceful shutdown. The default
    /// implementation is a no-op, which is appropriate for backends
    /// that write synchronously.
    fn flush(&self) {}

    /// Return the human-readable name of this observer backend.
    ///
    /// Used in logs and diagnostics (e.g., `"log"`, `"prometheus"`,
    /// `"opentelemetry"`).
    fn name(&self) -> &str;

    /// Downcast to `Any` for backend-specific operations.
    ///
    /// Enables callers to access concrete observer types when needed
    /// (e.g., retrieving a Prometheus registry handle for custom metrics).
    fn as_any(&self) -> &dyn std::any::Any;
}
