use super::traits::{Observer, ObserverEvent, ObserverMetric};

/// Human-readable progress observer for interactive/foreground runs.
///
/// Prints compact `>` / `<` lines for ingestion and alert activity without
/// dumping full payload bodies. Intended to be opt-in (e.g. `--verbose`).
pub struct VerboseObserver;

impl VerboseObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Observer for VerboseObserver {
    fn record_event(&self, event: &ObserverEvent) {
        match event {
            ObserverEvent::Ingested {
                kind,
                endpoint_id,
                item_count,
            } => {
                eprintln!("> ingest {kind} endpoint={endpoint_id} items={item_count}");
            }
            ObserverEvent::Flushed {
                store,
                item_count,
                success,
            } => {
                eprintln!("< flush {store} items={item_count} success={success}");
            }
            ObserverEvent::AlertTransition {
                rule_id,
                target,
                from,
                to,
            } => {
                eprintln!(
                    "! alert {rule_id} target={target} {}->{to}",
                    from.unwrap_or("absent")
                );
            }
            ObserverEvent::ActionDispatched {
                route_id,
                action_kind,
                success,
            } => {
                eprintln!("> dispatch {route_id} kind={action_kind} success={success}");
            }
            ObserverEvent::Error { component, message } => {
                eprintln!("! error component={component} {message}");
            }
            ObserverEvent::FanOut { .. } | ObserverEvent::SubscriberChanged { .. } => {}
        }
    }

    #[inline(always)]
    fn record_metric(&self, _metric: &ObserverMetric) {}

    fn name(&self) -> &str {
        "verbose"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
