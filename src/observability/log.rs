use super::traits::{Observer, ObserverEvent, ObserverMetric};
use std::any::Any;
use tracing::info;

/// Log-based observer — uses tracing, zero external deps
pub struct LogObserver;

impl LogObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Observer for LogObserver {
    fn record_event(&self, event: &ObserverEvent) {
        match event {
            ObserverEvent::Ingested {
                kind,
                endpoint_id,
                item_count,
            } => {
                info!(kind = %kind, endpoint_id = %endpoint_id, item_count = item_count, "ingest");
            }
            ObserverEvent::Flushed {
                store,
                item_count,
                success,
            } => {
                info!(store = %store, item_count = item_count, success = success, "buffer.flush");
            }
            ObserverEvent::FanOut {
                hub,
                subscriber_count,
            } => {
                info!(hub = %hub, subscribers = subscriber_count, "hub.fan_out");
            }
            ObserverEvent::SubscriberChanged { hub, joined } => {
                info!(hub = %hub, joined = joined, "hub.subscriber_changed");
            }
            ObserverEvent::AlertTransition {
                rule_id,
                target,
                from,
                to,
            } => {
                info!(rule_id = %rule_id, target = %target, from = ?from, to = %to, "alert.transition");
            }
            ObserverEvent::ActionDispatched {
                route_id,
                action_kind,
                success,
            } => {
                info!(route_id = %route_id, action_kind = %action_kind, success = success, "dispatcher.action");
            }
            ObserverEvent::Error { component, message } => {
                info!(component = %component, error = %message, "error");
            }
        }
    }

    fn record_metric(&self, metric: &ObserverMetric) {
        match metric {
            ObserverMetric::IngestLatency(d) => {
                let ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
                info!(latency_ms = ms, "metric.ingest_latency");
            }
            ObserverMetric::DroppedItems(n) => {
                info!(dropped = n, "metric.dropped_items");
            }
            ObserverMetric::ActiveSubscribers(n) => {
                info!(subscribers = n, "metric.active_subscribers");
            }
            ObserverMetric::QueueDepth(d) => {
                info!(depth = d, "metric.queue_depth");
            }
        }
    }

    fn name(&self) -> &str {
        "log"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
