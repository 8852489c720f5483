//! Per-(RuleID,Target) alert state machine (spec.md §4.6). A sharded map of
//! mutexes serializes transitions per key without a single global lock,
//! generalizing the teacher's per-connection correlation map shape.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::emitter::Emitter;
use crate::hubs::HubManager;
use crate::model::{AlertInstance, AlertState, EventEntry, EventLevel, EventScope, Rule};
use crate::observability::traits::{Observer, ObserverEvent};
use crate::stores::traits::AlertStore;

const SHARD_COUNT: usize = 16;

type AlertKey = (String, String);

#[derive(Debug, Clone)]
struct AlertEntry {
    state: AlertState,
    first_fired: DateTime<Utc>,
    last_fired: DateTime<Utc>,
    last_ok: Option<DateTime<Utc>>,
    last_value: f64,
}

pub struct AlertManager {
    shards: Vec<Mutex<HashMap<AlertKey, AlertEntry>>>,
    store: Arc<dyn AlertStore>,
    hubs: Arc<HubManager>,
    emitter: Arc<Emitter>,
    observer: Arc<dyn Observer>,
}

fn shard_index(key: &AlertKey) -> usize {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % SHARD_COUNT
}

impl AlertManager {
    pub fn new(store: Arc<dyn AlertStore>, hubs: Arc<HubManager>, emitter: Arc<Emitter>) -> Self {
        Self::with_observer(store, hubs, emitter, Arc::new(crate::observability::noop::NoopObserver))
    }

    pub fn with_observer(
        store: Arc<dyn AlertStore>,
        hubs: Arc<HubManager>,
        emitter: Arc<Emitter>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
            store,
            hubs,
            emitter,
            observer,
        }
    }

    /// Advances the state machine for `(rule.id, target)` given whether the
    /// sample satisfied the rule's predicate. Persists, broadcasts, and emits
    /// a derived event only on pending→firing and firing→resolved.
    pub async fn transition(
        &self,
        rule: &Rule,
        target: &str,
        scope: EventScope,
        predicate: bool,
        value: f64,
        now: DateTime<Utc>,
    ) {
        let key: AlertKey = (rule.id.clone(), target.to_string());
        let shard = &self.shards[shard_index(&key)];

        let outcome = {
            let mut shard = shard.lock();
            let previous = shard.get(&key).cloned();

            match (previous, predicate) {
                (None, true) => {
                    shard.insert(
                        key.clone(),
                        AlertEntry {
                            state: AlertState::Pending,
                            first_fired: now,
                            last_fired: now,
                            last_ok: None,
                            last_value: value,
                        },
                    );
                    None
                }
                (None, false) => None,
                (Some(entry), true) if entry.state == AlertState::Pending => {
                    let elapsed = (now - entry.first_fired).num_seconds().max(0) as u64;
                    if elapsed >= rule.for_duration_secs {
                        let updated = AlertEntry {
                            state: AlertState::Firing,
                            first_fired: entry.first_fired,
                            last_fired: now,
                            last_ok: entry.last_ok,
                            last_value: value,
                        };
                        shard.insert(key.clone(), updated.clone());
                        Some((AlertState::Pending, updated))
                    } else {
                        shard.insert(
                            key.clone(),
                            AlertEntry {
                                last_fired: now,
                                last_value: value,
                                ..entry
                            },
                        );
                        None
                    }
                }
                (Some(_), false) if shard.get(&key).map(|e| e.state) == Some(AlertState::Pending) => {
                    shard.remove(&key);
                    None
                }
                (Some(entry), true) => {
                    shard.insert(
                        key.clone(),
                        AlertEntry {
                            last_fired: now,
                            last_value: value,
                            ..entry
                        },
                    );
                    None
                }
                (Some(entry), false) => {
                    shard.remove(&key);
                    Some((
                        AlertState::Firing,
                        AlertEntry {
                            state: AlertState::Resolved,
                            last_ok: Some(now),
                            last_value: value,
                            ..entry
                        },
                    ))
                }
            }
        };

        let Some((previous_state, entry)) = outcome else {
            return;
        };

        let instance = AlertInstance {
            id: uuid::Uuid::new_v4().to_string(),
            rule_id: rule.id.clone(),
            state: entry.state,
            previous_state: Some(previous_state),
            scope,
            target: target.to_string(),
            first_fired: entry.first_fired,
            last_fired: entry.last_fired,
            last_ok: entry.last_ok,
            resolved_at: if entry.state == AlertState::Resolved { Some(now) } else { None },
            last_value: entry.last_value,
            level: rule.level,
            message: format!("rule {} {} on {}", rule.id, describe(entry.state), target),
            labels: rule.match_labels.clone(),
        };

        if entry.state == AlertState::Resolved {
            if let Err(err) = self.store.resolve_alert(&rule.id, target, now).await {
                tracing::warn!(rule_id = %rule.id, target, error = %err, "alert store resolve failed");
            }
        } else if let Err(err) = self.store.upsert_alert(instance.clone()).await {
            tracing::warn!(rule_id = %rule.id, target, error = %err, "alert store upsert failed");
        }

        self.observer.record_event(&ObserverEvent::AlertTransition {
            rule_id: rule.id.clone(),
            target: target.to_string(),
            from: Some(describe(previous_state)),
            to: describe(instance.state),
        });

        self.hubs.alerts().broadcast(instance.clone());
        self.emitter.emit(derived_event(&instance)).await;
    }
}

fn describe(state: AlertState) -> &'static str {
    match state {
        AlertState::Pending => "pending",
        AlertState::Firing => "firing",
        AlertState::Resolved => "resolved",
    }
}

fn derived_event(instance: &AlertInstance) -> EventEntry {
    EventEntry {
        id: String::new(),
        timestamp: instance.last_fired,
        level: instance.level,
        kind: format!("alert_{}", describe(instance.state)),
        category: "alert".into(),
        message: instance.message.clone(),
        source: "alert_manager".into(),
        scope: instance.scope,
        target: instance.target.clone(),
        endpoint_id: instance.target.clone(),
        meta: {
            let mut meta = HashMap::new();
            meta.insert("rule_id".to_string(), instance.rule_id.clone());
            meta
        },
    }
}
