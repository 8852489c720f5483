//! Topic-scoped subscriber fan-out with per-subscriber filtering and
//! backpressure-safe, non-blocking send (spec.md §4.8).
//!
//! Each hub owns an ingress queue (bounded `mpsc`) and a subscriber registry
//! (one outbound queue per subscriber). A dedicated run-loop task drains the
//! ingress queue and delivers to every matching subscriber; a subscriber
//! whose outbound queue is full is considered dead and removed.

pub mod predicates;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use predicates::SubscriberFilter;

use crate::config::HubsConfig;
use crate::model::{AlertInstance, CommandResult, EventEntry, LogPayload, MetricPayload, ProcessPayload};
use crate::observability::traits::{Observer, ObserverEvent};

const INGRESS_CAPACITY: usize = 1024;

struct Subscriber<T> {
    filter: SubscriberFilter,
    outbound: mpsc::Sender<T>,
}

/// A single topic hub carrying payloads of type `T`.
pub struct Hub<T: Clone + Send + Sync + 'static> {
    name: &'static str,
    queue_capacity: usize,
    should_deliver: Arc<dyn Fn(&T, &SubscriberFilter) -> bool + Send + Sync>,
    ingress_tx: mpsc::Sender<T>,
    subscribers: Arc<RwLock<HashMap<u64, Subscriber<T>>>>,
    next_subscriber_id: AtomicU64,
    dropped_ingress: AtomicU64,
    observer: Arc<dyn Observer>,
}

impl<T: Clone + Send + Sync + 'static> Hub<T> {
    fn new(
        name: &'static str,
        queue_capacity: usize,
        should_deliver: impl Fn(&T, &SubscriberFilter) -> bool + Send + Sync + 'static,
        shutdown: CancellationToken,
        observer: Arc<dyn Observer>,
    ) -> Arc<Self> {
        let (ingress_tx, mut ingress_rx) = mpsc::channel::<T>(INGRESS_CAPACITY);
        let hub = Arc::new(Self {
            name,
            queue_capacity,
            should_deliver: Arc::new(should_deliver),
            ingress_tx,
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            next_subscriber_id: AtomicU64::new(1),
            dropped_ingress: AtomicU64::new(0),
            observer,
        });

        let run_hub = hub.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => {
                        run_hub.close_all_subscribers();
                        break;
                    }
                    maybe_payload = ingress_rx.recv() => {
                        match maybe_payload {
                            Some(payload) => run_hub.deliver(&payload),
                            None => break,
                        }
                    }
                }
            }
        });

        hub
    }

    /// Non-blocking send into the hub's ingress queue; drops the payload if
    /// the queue is full (the hub prioritizes liveness over completeness).
    pub fn broadcast(&self, payload: T) {
        if self.ingress_tx.try_send(payload).is_err() {
            self.dropped_ingress.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(hub = self.name, "ingress queue full, dropping payload");
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_ingress.load(Ordering::Relaxed)
    }

    /// Registers a new subscriber with a bounded outbound queue at the hub's
    /// configured capacity.
    pub fn join(&self, filter: SubscriberFilter) -> (u64, mpsc::Receiver<T>) {
        self.join_with_capacity(filter, self.queue_capacity)
    }

    fn join_with_capacity(&self, filter: SubscriberFilter, capacity: usize) -> (u64, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .write()
            .insert(id, Subscriber { filter, outbound: tx });
        self.observer.record_event(&ObserverEvent::SubscriberChanged {
            hub: self.name,
            joined: true,
        });
        (id, rx)
    }

    /// Convenience join with a large, unfiltered capacity — used by internal
    /// instrumentation and tests that want every broadcasted payload.
    pub fn subscribe_raw(&self) -> mpsc::Receiver<T> {
        self.join_with_capacity(SubscriberFilter::unfiltered(), 1024).1
    }

    pub fn remove(&self, id: u64) {
        if self.subscribers.write().remove(&id).is_some() {
            self.observer.record_event(&ObserverEvent::SubscriberChanged {
                hub: self.name,
                joined: false,
            });
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    fn deliver(&self, payload: &T) {
        let mut dead = Vec::new();
        let mut delivered = 0usize;
        {
            let subscribers = self.subscribers.read();
            for (id, sub) in subscribers.iter() {
                if !(self.should_deliver)(payload, &sub.filter) {
                    continue;
                }
                if sub.outbound.try_send(payload.clone()).is_err() {
                    dead.push(*id);
                } else {
                    delivered += 1;
                }
            }
        }
        self.observer.record_event(&ObserverEvent::FanOut {
            hub: self.name,
            subscriber_count: delivered,
        });
        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in dead {
                subscribers.remove(&id);
                tracing::debug!(hub = self.name, subscriber = id, "removed dead subscriber");
            }
        }
    }

    fn close_all_subscribers(&self) {
        self.subscribers.write().clear();
    }
}

/// All six topic hubs (spec.md §4.8): Metrics, Logs, Events, Alerts, Process,
/// and Command (command-result echo).
pub struct HubManager {
    metrics: Arc<Hub<MetricPayload>>,
    logs: Arc<Hub<LogPayload>>,
    events: Arc<Hub<EventEntry>>,
    alerts: Arc<Hub<AlertInstance>>,
    process: Arc<Hub<ProcessPayload>>,
    command: Arc<Hub<CommandResult>>,
    shutdown: CancellationToken,
}

impl HubManager {
    pub fn new(config: &HubsConfig) -> Self {
        Self::with_observer(config, Arc::new(crate::observability::noop::NoopObserver))
    }

    pub fn with_observer(config: &HubsConfig, observer: Arc<dyn Observer>) -> Self {
        let shutdown = CancellationToken::new();
        Self {
            metrics: Hub::new(
                "metrics",
                config.metrics_queue,
                predicates::should_deliver_metric,
                shutdown.clone(),
                observer.clone(),
            ),
            logs: Hub::new(
                "logs",
                config.logs_queue,
                predicates::should_deliver_log,
                shutdown.clone(),
                observer.clone(),
            ),
            events: Hub::new(
                "events",
                config.events_queue,
                predicates::should_deliver_event,
                shutdown.clone(),
                observer.clone(),
            ),
            alerts: Hub::new(
                "alerts",
                config.alerts_queue,
                predicates::should_deliver_alert,
                shutdown.clone(),
                observer.clone(),
            ),
            process: Hub::new(
                "process",
                config.process_queue,
                predicates::should_deliver_process,
                shutdown.clone(),
                observer.clone(),
            ),
            command: Hub::new(
                "command",
                config.command_queue,
                predicates::should_deliver_command,
                shutdown.clone(),
                observer,
            ),
            shutdown,
        }
    }

    pub fn metrics(&self) -> &Hub<MetricPayload> {
        &self.metrics
    }

    pub fn logs(&self) -> &Hub<LogPayload> {
        &self.logs
    }

    pub fn events(&self) -> &Hub<EventEntry> {
        &self.events
    }

    pub fn alerts(&self) -> &Hub<AlertInstance> {
        &self.alerts
    }

    pub fn process(&self) -> &Hub<ProcessPayload> {
        &self.process
    }

    pub fn command(&self) -> &Hub<CommandResult> {
        &self.command
    }

    /// Cancels every hub's run loop, which closes all subscriber sockets.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Meta;
    use std::time::Duration;

    fn metric(endpoint_id: &str, agent_id: &str) -> MetricPayload {
        MetricPayload {
            meta: Meta {
                endpoint_id: endpoint_id.into(),
                agent_id: agent_id.into(),
                ..Default::default()
            },
            timestamp: chrono::Utc::now(),
            metrics: vec![],
        }
    }

    #[tokio::test]
    async fn fan_out_scenario_s5() {
        let manager = HubManager::new(&HubsConfig::default());
        let hub = manager.metrics();

        let (_, mut a) = hub.join(SubscriberFilter {
            endpoint_id: "host-h1".into(),
            agent_id: String::new(),
            host_id: String::new(),
        });
        let (_, mut b) = hub.join(SubscriberFilter {
            endpoint_id: "ctr-X".into(),
            agent_id: "ag1".into(),
            host_id: String::new(),
        });
        let (_, mut c) = hub.join(SubscriberFilter::unfiltered());

        hub.broadcast(metric("host-h1", ""));
        hub.broadcast(metric("ctr-X", "ag1"));

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(a.try_recv().is_ok());
        assert!(a.try_recv().is_err());

        assert!(b.try_recv().is_ok());
        assert!(b.try_recv().is_err());

        assert!(c.try_recv().is_ok());
        assert!(c.try_recv().is_ok());
    }

    #[tokio::test]
    async fn drop_on_full_removes_subscriber_without_stalling() {
        let manager = HubManager::new(&HubsConfig::default());
        let hub = manager.command();
        let (id, mut rx) = hub.join_with_capacity(
            SubscriberFilter {
                endpoint_id: "host-a".into(),
                ..Default::default()
            },
            1,
        );

        hub.broadcast(CommandResult {
            request_id: 1,
            endpoint_id: "host-a".into(),
            success: true,
            output: String::new(),
        });
        hub.broadcast(CommandResult {
            request_id: 2,
            endpoint_id: "host-a".into(),
            success: true,
            output: String::new(),
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hub.subscriber_count(), 0);

        // The surviving message (if any) should still be readable; the hub
        // must not have stalled processing subsequent broadcasts.
        let _ = rx.try_recv();
        let _ = id;
    }

    #[tokio::test]
    async fn shutdown_closes_every_subscriber() {
        let manager = HubManager::new(&HubsConfig::default());
        let hub = manager.events();
        let (_, _rx) = hub.join(SubscriberFilter::unfiltered());
        assert_eq!(hub.subscriber_count(), 1);

        manager.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hub.subscriber_count(), 0);
    }
}
