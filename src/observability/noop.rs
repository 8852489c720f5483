use super::traits::{Observer, ObserverEvent, ObserverMetric};

/// Zero-overhead observer — all methods compile to nothing
pub struct NoopObserver;

impl Observer for NoopObserver {
    #[inline(always)]
    fn record_event(&self, _event: &ObserverEvent) {}

    #[inline(always)]
    fn record_metric(&self, _metric: &ObserverMetric) {}

    fn name(&self) -> &str {
        "noop"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn noop_name() {
        assert_eq!(NoopObserver.name(), "noop");
    }

    #[test]
    fn noop_record_event_does_not_panic() {
        let obs = NoopObserver;
        obs.record_event(&ObserverEvent::Ingested {
            kind: "metrics",
            endpoint_id: "host-a".into(),
            item_count: 1,
        });
        obs.record_event(&ObserverEvent::Flushed {
            store: "metrics",
            item_count: 1,
            success: true,
        });
        obs.record_event(&ObserverEvent::FanOut {
            hub: "logs",
            subscriber_count: 0,
        });
        obs.record_event(&ObserverEvent::SubscriberChanged {
            hub: "logs",
            joined: false,
        });
        obs.record_event(&ObserverEvent::AlertTransition {
            rule_id: "r1".into(),
            target: "host-a".into(),
            from: None,
            to: "pending",
        });
        obs.record_event(&ObserverEvent::ActionDispatched {
            route_id: "route-1".into(),
            action_kind: "script",
            success: true,
        });
        obs.record_event(&ObserverEvent::Error {
            component: "test".into(),
            message: "boom".into(),
        });
    }

    #[test]
    fn noop_record_metric_does_not_panic() {
        let obs = NoopObserver;
        obs.record_metric(&ObserverMetric::IngestLatency(Duration::from_millis(50)));
        obs.record_metric(&ObserverMetric::DroppedItems(1000));
        obs.record_metric(&ObserverMetric::ActiveSubscribers(5));
        obs.record_metric(&ObserverMetric::QueueDepth(0));
    }

    #[test]
    fn noop_flush_does_not_panic() {
        NoopObserver.flush();
    }
}
