//! Authoritative in-memory state of agents and containers: derives heartbeat
//! status, emits lifecycle events, and write-throughs dirty records to a
//! `DataStore`.
//!
//! State machine (per agent):
//! ```text
//! Unknown ──first payload──► Registered
//! Registered ⇄ Online ⇄ Idle ⇄ Offline    (by heartbeat sweep)
//! ```
//! Containers additionally carry an `Inactive` overlay set by the sweep when
//! `last_seen` exceeds two minutes while the stored status was not already
//! `Inactive`; the next inbound payload clears it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::oneshot;

use crate::model::{
    Agent, CommandRequest, Container, ContainerStatus, EventEntry, EventLevel, EventScope,
    HeartbeatStatus, Meta,
};
use crate::stores::traits::DataStore;

/// `now − last_seen` thresholds used to derive heartbeat status.
const ONLINE_THRESHOLD_SECS: i64 = 10;
const IDLE_THRESHOLD_SECS: i64 = 60;
/// Containers silent longer than this are overlaid with `Inactive` by the sweep.
const CONTAINER_INACTIVE_THRESHOLD_SECS: i64 = 120;

pub fn derive_heartbeat(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> HeartbeatStatus {
    let elapsed = (now - last_seen).num_seconds();
    if elapsed < ONLINE_THRESHOLD_SECS {
        HeartbeatStatus::Online
    } else if elapsed < IDLE_THRESHOLD_SECS {
        HeartbeatStatus::Idle
    } else {
        HeartbeatStatus::Offline
    }
}

struct LiveSession {
    #[allow(dead_code)]
    connected_at: DateTime<Utc>,
}

struct State {
    agents: HashMap<String, Agent>,
    containers: HashMap<String, Container>,
    sessions: HashMap<String, LiveSession>,
    command_queues: HashMap<String, VecDeque<CommandRequest>>,
}

/// Emitted by `EndpointTracker` operations; the caller (typically
/// `IngestionHandler` or the sweep tasks) hands these to `Emitter`.
pub struct TrackerEvents(pub Vec<EventEntry>);

pub struct EndpointTracker {
    state: RwLock<State>,
    data_store: Arc<dyn DataStore>,
    next_request_id: AtomicU64,
}

fn lifecycle_event(
    kind: &str,
    category: &str,
    message: impl Into<String>,
    level: EventLevel,
    scope: EventScope,
    target: &str,
    endpoint_id: &str,
) -> EventEntry {
    EventEntry {
        id: String::new(),
        timestamp: Utc::now(),
        level,
        kind: kind.to_string(),
        category: category.to_string(),
        message: message.into(),
        source: "endpoint_tracker".into(),
        scope,
        target: target.to_string(),
        endpoint_id: endpoint_id.to_string(),
        meta: HashMap::new(),
    }
    .finalize()
}

impl EndpointTracker {
    pub fn new(data_store: Arc<dyn DataStore>) -> Self {
        Self {
            state: RwLock::new(State {
                agents: HashMap::new(),
                containers: HashMap::new(),
                sessions: HashMap::new(),
                command_queues: HashMap::new(),
            }),
            data_store,
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Updates (or creates) an agent record from an inbound payload's `Meta`.
    /// Skipped if `hostname` is empty or `container_id` is set (container
    /// payloads go through `update_container`).
    pub async fn update_agent(&self, meta: &Meta) -> TrackerEvents {
        if meta.hostname.is_empty() || !meta.container_id.is_empty() {
            return TrackerEvents(vec![]);
        }

        let now = Utc::now();
        let mut events = Vec::new();
        let start_label = meta
            .label("agent_start_time")
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        let mut state = self.state.write();
        let is_new = !state.agents.contains_key(&meta.endpoint_id);

        if is_new {
            if let Some(loaded) = self.data_store.get_agent_by_id(&meta.agent_id).await {
                state.agents.insert(meta.endpoint_id.clone(), loaded);
            }
        }

        let still_new = !state.agents.contains_key(&meta.endpoint_id);
        let entry = state
            .agents
            .entry(meta.endpoint_id.clone())
            .or_insert_with(|| Agent {
                agent_id: meta.agent_id.clone(),
                host_id: meta.host_id.clone(),
                endpoint_id: meta.endpoint_id.clone(),
                hostname: meta.hostname.clone(),
                ip_address: meta.ip_address.clone(),
                os: meta.os.clone(),
                arch: meta.arch.clone(),
                platform: meta.platform.clone(),
                labels: meta.labels.clone(),
                start_time: None,
                last_seen: now,
                status: HeartbeatStatus::Online,
                uptime_seconds: 0,
                dirty: false,
            });

        if still_new {
            events.push(lifecycle_event(
                "registered",
                "system",
                format!("agent {} registered", meta.hostname),
                EventLevel::Info,
                EventScope::Endpoint,
                &meta.endpoint_id,
                &meta.endpoint_id,
            ));
        }

        if entry.start_time.is_none() {
            entry.start_time = start_label.or(Some(now));
        }
        entry.hostname = meta.hostname.clone();
        entry.ip_address = meta.ip_address.clone();
        entry.os = meta.os.clone();
        entry.arch = meta.arch.clone();
        entry.platform = meta.platform.clone();
        entry.labels = meta.labels.clone();
        entry.last_seen = now;
        entry.uptime_seconds = entry
            .start_time
            .map(|t| (now - t).num_seconds().max(0) as u64)
            .unwrap_or(0);
        entry.status = derive_heartbeat(entry.last_seen, now);
        entry.dirty = true;

        TrackerEvents(events)
    }

    /// Updates (or creates) a container record. Skipped if `container_id` is
    /// empty. Detects restarts (changed `agent_start_time` label), engine
    /// status changes, and recovery from `Inactive`.
    pub async fn update_container(&self, meta: &Meta) -> TrackerEvents {
        if meta.container_id.is_empty() {
            return TrackerEvents(vec![]);
        }

        let now = Utc::now();
        let mut events = Vec::new();
        let raw_status = meta.label("status").unwrap_or("unknown");
        let normalized_status = ContainerStatus::normalize(raw_status);
        let new_start_label = meta.label("agent_start_time").map(str::to_string);

        let mut state = self.state.write();
        let is_new = !state.containers.contains_key(&meta.container_id);

        let previous_status;
        let previous_start_label;
        let was_inactive;

        if is_new {
            previous_status = None;
            previous_start_label = None;
            was_inactive = false;
        } else {
            let existing = &state.containers[&meta.container_id];
            previous_status = Some(existing.status);
            previous_start_label = existing.labels.get("agent_start_time").cloned();
            was_inactive = existing.status == ContainerStatus::Inactive;
        }

        let entry = state
            .containers
            .entry(meta.container_id.clone())
            .or_insert_with(|| Container {
                agent_id: meta.agent_id.clone(),
                host_id: meta.host_id.clone(),
                endpoint_id: meta.endpoint_id.clone(),
                container_id: meta.container_id.clone(),
                container_name: meta.container_name.clone(),
                image_name: meta.label("image_name").unwrap_or_default().to_string(),
                image_id: meta.label("image_id").unwrap_or_default().to_string(),
                runtime: meta.label("runtime").unwrap_or_default().to_string(),
                labels: meta.labels.clone(),
                last_seen: now,
                heartbeat: HeartbeatStatus::Online,
                status: normalized_status,
                dirty: false,
            });

        // Normalize status before the restart-detection path (spec.md §9 decision).
        entry.status = normalized_status;

        if is_new {
            events.push(lifecycle_event(
                "container_started",
                "system",
                format!("container {} started", meta.container_name),
                EventLevel::Info,
                EventScope::Container,
                &meta.container_id,
                &meta.endpoint_id,
            ));
        } else {
            if let (Some(prev), Some(new)) = (&previous_start_label, &new_start_label) {
                if prev != new {
                    events.push(lifecycle_event(
                        "restarted",
                        "system",
                        format!("container {} restarted", meta.container_name),
                        EventLevel::Warning,
                        EventScope::Container,
                        &meta.container_id,
                        &meta.endpoint_id,
                    ));
                }
            }

            if let Some(prev) = previous_status {
                if prev != normalized_status {
                    let level = if normalized_status.transition_level() == "warning" {
                        EventLevel::Warning
                    } else {
                        EventLevel::Info
                    };
                    events.push(lifecycle_event(
                        "status_changed",
                        "system",
                        format!(
                            "container {} changed engine status to {:?}",
                            meta.container_name, normalized_status
                        ),
                        level,
                        EventScope::Container,
                        &meta.container_id,
                        &meta.endpoint_id,
                    ));
                }
            }

            if was_inactive {
                events.push(lifecycle_event(
                    "recovered",
                    "system",
                    format!("container {} recovered from inactive", meta.container_name),
                    EventLevel::Info,
                    EventScope::Container,
                    &meta.container_id,
                    &meta.endpoint_id,
                ));
            }
        }

        entry.container_name = meta.container_name.clone();
        entry.labels = meta.labels.clone();
        entry.agent_id = meta.agent_id.clone();
        entry.host_id = meta.host_id.clone();
        entry.endpoint_id = meta.endpoint_id.clone();
        entry.last_seen = now;
        entry.heartbeat = derive_heartbeat(now, now);
        entry.dirty = true;

        TrackerEvents(events)
    }

    /// Write-through: for every dirty record, recompute status and upsert to
    /// the `DataStore`, clearing the dirty flag on success. Continues past
    /// individual failures.
    pub async fn sync_to_store(&self) {
        let now = Utc::now();
        let dirty_agents: Vec<Agent> = {
            let mut state = self.state.write();
            state
                .agents
                .values_mut()
                .filter(|a| a.dirty)
                .map(|a| {
                    a.status = derive_heartbeat(a.last_seen, now);
                    a.clone()
                })
                .collect()
        };

        for agent in dirty_agents {
            let endpoint_id = agent.endpoint_id.clone();
            if self.data_store.upsert_agent(agent).await.is_ok() {
                if let Some(entry) = self.state.write().agents.get_mut(&endpoint_id) {
                    entry.dirty = false;
                }
            }
        }

        let dirty_containers: Vec<Container> = {
            let state = self.state.read();
            state
                .containers
                .values()
                .filter(|c| c.dirty)
                .cloned()
                .collect()
        };

        for container in dirty_containers {
            let container_id = container.container_id.clone();
            if self.data_store.upsert_container(container).await.is_ok() {
                if let Some(entry) = self.state.write().containers.get_mut(&container_id) {
                    entry.dirty = false;
                }
            }
        }
    }

    /// Recomputes heartbeat status for every agent; on transition, emits a
    /// lifecycle event and marks the record dirty.
    pub fn check_agent_statuses_and_emit_events(&self) -> TrackerEvents {
        let now = Utc::now();
        let mut events = Vec::new();
        let mut state = self.state.write();

        for agent in state.agents.values_mut() {
            let derived = derive_heartbeat(agent.last_seen, now);
            if derived != agent.status {
                if derived == HeartbeatStatus::Offline {
                    events.push(lifecycle_event(
                        "went_offline",
                        "system",
                        format!("agent {} went offline", agent.hostname),
                        EventLevel::Warning,
                        EventScope::Endpoint,
                        &agent.endpoint_id,
                        &agent.endpoint_id,
                    ));
                } else {
                    events.push(lifecycle_event(
                        "status_changed",
                        "system",
                        format!("agent {} is now {:?}", agent.hostname, derived),
                        EventLevel::Info,
                        EventScope::Endpoint,
                        &agent.endpoint_id,
                        &agent.endpoint_id,
                    ));
                }
                agent.status = derived;
                agent.dirty = true;
            }
        }

        TrackerEvents(events)
    }

    /// Same as the agent sweep, plus the `Inactive` overlay for containers
    /// silent longer than `CONTAINER_INACTIVE_THRESHOLD_SECS`.
    pub fn check_container_statuses_and_emit(&self) -> TrackerEvents {
        let now = Utc::now();
        let mut events = Vec::new();
        let mut state = self.state.write();

        for container in state.containers.values_mut() {
            let derived_heartbeat = derive_heartbeat(container.last_seen, now);
            if derived_heartbeat != container.heartbeat {
                container.heartbeat = derived_heartbeat;
                container.dirty = true;
            }

            let elapsed = (now - container.last_seen).num_seconds();
            if elapsed > CONTAINER_INACTIVE_THRESHOLD_SECS
                && container.status != ContainerStatus::Inactive
            {
                events.push(lifecycle_event(
                    "went_inactive",
                    "system",
                    format!("container {} went inactive", container.container_name),
                    EventLevel::Warning,
                    EventScope::Container,
                    &container.container_id,
                    &container.endpoint_id,
                ));
                container.status = ContainerStatus::Inactive;
                container.dirty = true;
            }
        }

        TrackerEvents(events)
    }

    pub fn list_endpoints(&self) -> Vec<String> {
        let state = self.state.read();
        let mut out: Vec<String> = state.agents.keys().cloned().collect();
        out.extend(state.containers.values().map(|c| c.endpoint_id.clone()));
        out.sort();
        out.dedup();
        out
    }

    pub fn get_agents(&self) -> Vec<Agent> {
        self.state.read().agents.values().cloned().collect()
    }

    pub fn get_agent_map(&self) -> HashMap<String, Agent> {
        self.state.read().agents.clone()
    }

    pub fn is_agent_live(&self, endpoint_id: &str) -> bool {
        self.state
            .read()
            .agents
            .get(endpoint_id)
            .is_some_and(|a| a.status != HeartbeatStatus::Offline)
    }

    pub fn get_endpoint_id_by_agent_id(&self, agent_id: &str) -> Option<String> {
        self.state
            .read()
            .agents
            .values()
            .find(|a| a.agent_id == agent_id)
            .map(|a| a.endpoint_id.clone())
    }

    pub fn register_agent_session(&self, agent_id: &str) {
        self.state.write().sessions.insert(
            agent_id.to_string(),
            LiveSession {
                connected_at: Utc::now(),
            },
        );
    }

    pub fn remove_agent_session(&self, agent_id: &str) {
        self.state.write().sessions.remove(agent_id);
    }

    /// Enqueues a command for `agent_id`. Rejects empty agent IDs and empty
    /// commands.
    pub fn enqueue_command(&self, agent_id: &str, command: String, args: Vec<String>) -> Option<u64> {
        if agent_id.is_empty() || command.is_empty() {
            return None;
        }

        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let request = CommandRequest {
            id,
            agent_id: agent_id.to_string(),
            command,
            args,
        };
        self.state
            .write()
            .command_queues
            .entry(agent_id.to_string())
            .or_default()
            .push_back(request);
        Some(id)
    }

    pub fn dequeue_command(&self, agent_id: &str) -> Option<CommandRequest> {
        self.state
            .write()
            .command_queues
            .get_mut(agent_id)
            .and_then(VecDeque::pop_front)
    }
}

/// Result channel for a command dispatched through `run_command`-style flows
/// built atop `enqueue_command`/`dequeue_command`.
pub type CommandReplyTx = oneshot::Sender<crate::model::CommandResult>;
