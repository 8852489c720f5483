//! Matches events against declarative action routes and fires webhook/script
//! side effects (spec.md §4.5). Dispatch is fire-and-forget: every matching
//! route's actions run concurrently, and neither matching nor execution ever
//! blocks or fails the caller.

pub mod actions;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::Client;

use crate::config::DispatcherConfig;
use crate::model::{ActionRoute, ActionSpec, EventEntry};
use crate::observability::traits::{Observer, ObserverEvent};

pub struct Dispatcher {
    client: Client,
    webhook_timeout: Duration,
    routes: RwLock<HashMap<String, Arc<ActionRoute>>>,
    observer: Arc<dyn Observer>,
}

impl Dispatcher {
    pub fn new(config: &DispatcherConfig) -> Self {
        Self::with_observer(config, Arc::new(crate::observability::noop::NoopObserver))
    }

    pub fn with_observer(config: &DispatcherConfig, observer: Arc<dyn Observer>) -> Self {
        Self {
            client: Client::new(),
            webhook_timeout: Duration::from_secs(config.webhook_timeout_secs.max(1)),
            routes: RwLock::new(HashMap::new()),
            observer,
        }
    }

    pub fn set_routes(&self, routes: Vec<ActionRoute>) {
        let mut guard = self.routes.write();
        guard.clear();
        for route in routes {
            guard.insert(route.id.clone(), Arc::new(route));
        }
    }

    pub fn upsert_route(&self, route: ActionRoute) {
        self.routes.write().insert(route.id.clone(), Arc::new(route));
    }

    pub fn remove_route(&self, id: &str) {
        self.routes.write().remove(id);
    }

    pub fn route_count(&self) -> usize {
        self.routes.read().len()
    }

    /// Matches `event` against every route and schedules the matching
    /// routes' actions concurrently. Returns immediately.
    pub fn dispatch(self: &Arc<Self>, event: EventEntry) {
        let matching: Vec<Arc<ActionRoute>> = self
            .routes
            .read()
            .values()
            .filter(|route| route.match_filter.matches(&event))
            .cloned()
            .collect();

        for route in matching {
            self.spawn_route(route, event.clone());
        }
    }

    /// Runs a specific route's actions regardless of its match filter.
    pub fn trigger_action_by_id(self: &Arc<Self>, id: &str, event: EventEntry) -> bool {
        let Some(route) = self.routes.read().get(id).cloned() else {
            return false;
        };
        self.spawn_route(route, event);
        true
    }

    fn spawn_route(self: &Arc<Self>, route: Arc<ActionRoute>, event: EventEntry) {
        let this = self.clone();
        tokio::spawn(async move {
            let route_id = route.id.clone();
            let futures = route.actions.iter().map(|spec| {
                let this = this.clone();
                let event = event.clone();
                let route_id = route_id.clone();
                async move {
                    let success = actions::execute(&this.client, spec, &event, this.webhook_timeout).await;
                    this.observer.record_event(&ObserverEvent::ActionDispatched {
                        route_id,
                        action_kind: action_kind(spec),
                        success,
                    });
                }
            });
            futures_util::future::join_all(futures).await;
        });
    }
}

fn action_kind(spec: &ActionSpec) -> &'static str {
    match spec {
        ActionSpec::Webhook { .. } => "webhook",
        ActionSpec::Script { .. } => "script",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionMatchFilter, ActionSpec, EventLevel, EventScope};
    use std::collections::HashMap as Map;

    fn event(level: EventLevel) -> EventEntry {
        EventEntry {
            id: "e1".into(),
            timestamp: chrono::Utc::now(),
            level,
            kind: "alert_firing".into(),
            category: "alert".into(),
            message: "cpu hot".into(),
            source: "test".into(),
            scope: EventScope::Endpoint,
            target: "host-a".into(),
            endpoint_id: "host-a".into(),
            meta: Map::new(),
        }
    }

    #[test]
    fn route_matching_honors_level_filter() {
        let dispatcher = Arc::new(Dispatcher::new(&DispatcherConfig::default()));
        dispatcher.upsert_route(ActionRoute {
            id: "r1".into(),
            match_filter: ActionMatchFilter {
                level: Some(EventLevel::Critical),
                rule_id: None,
                tags: Map::new(),
            },
            actions: vec![ActionSpec::Script {
                command: "/bin/true".into(),
                args: vec![],
            }],
        });

        assert!(!dispatcher
            .routes
            .read()
            .values()
            .any(|r| r.match_filter.matches(&event(EventLevel::Info))));
        assert!(dispatcher
            .routes
            .read()
            .values()
            .any(|r| r.match_filter.matches(&event(EventLevel::Critical))));
    }

    #[tokio::test]
    async fn dispatch_runs_matching_route_action_without_blocking() {
        let dispatcher = Arc::new(Dispatcher::new(&DispatcherConfig::default()));
        dispatcher.upsert_route(ActionRoute {
            id: "r1".into(),
            match_filter: ActionMatchFilter::default(),
            actions: vec![ActionSpec::Script {
                command: "/bin/true".into(),
                args: vec![],
            }],
        });

        dispatcher.dispatch(event(EventLevel::Info));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn trigger_action_by_id_bypasses_match_filter() {
        let dispatcher = Arc::new(Dispatcher::new(&DispatcherConfig::default()));
        dispatcher.upsert_route(ActionRoute {
            id: "never-matches".into(),
            match_filter: ActionMatchFilter {
                level: Some(EventLevel::Critical),
                rule_id: Some("nonexistent".into()),
                tags: Map::new(),
            },
            actions: vec![ActionSpec::Script {
                command: "/bin/true".into(),
                args: vec![],
            }],
        });

        assert!(dispatcher.trigger_action_by_id("never-matches", event(EventLevel::Info)));
        assert!(!dispatcher.trigger_action_by_id("missing", event(EventLevel::Info)));
    }
}
