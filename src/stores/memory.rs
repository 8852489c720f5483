//! Reference in-memory implementations of the store traits. Good enough for
//! the bundled binary and the test suite; not meant for production
//! persistence (concrete storage drivers are out of scope per spec.md §1).

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::traits::{
    AlertStore, DataStore, EventFilter, EventStore, LogStore, MetricStore, ProcessStore, RouteStore,
    RuleStore,
};
use crate::model::{
    Agent, ActionRoute, AlertInstance, Container, EventEntry, LogPayload, MetricPayload,
    ProcessPayload, Rule,
};

#[derive(Default)]
pub struct InMemoryMetricStore {
    pub written: Mutex<Vec<MetricPayload>>,
}

impl InMemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flush_count(&self) -> usize {
        self.written.lock().len()
    }
}

#[async_trait]
impl MetricStore for InMemoryMetricStore {
    async fn write(&self, mut batch: Vec<MetricPayload>) -> anyhow::Result<()> {
        self.written.lock().append(&mut batch);
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryLogStore {
    pub written: Mutex<Vec<LogPayload>>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn write(&self, mut batch: Vec<LogPayload>) -> anyhow::Result<()> {
        self.written.lock().append(&mut batch);
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryProcessStore {
    pub written: Mutex<Vec<ProcessPayload>>,
}

impl InMemoryProcessStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessStore for InMemoryProcessStore {
    async fn write(&self, mut batch: Vec<ProcessPayload>) -> anyhow::Result<()> {
        self.written.lock().append(&mut batch);
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryEventStore {
    pub events: Mutex<Vec<EventEntry>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn add_event(&self, event: EventEntry) -> anyhow::Result<()> {
        self.events.lock().push(event);
        Ok(())
    }

    async fn query_events(&self, filter: EventFilter) -> anyhow::Result<Vec<EventEntry>> {
        let events = self.events.lock();
        Ok(events
            .iter()
            .filter(|e| {
                filter
                    .endpoint_id
                    .as_ref()
                    .is_none_or(|id| &e.endpoint_id == id)
            })
            .filter(|e| filter.since.is_none_or(|since| e.timestamp >= since))
            .cloned()
            .collect())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAlertStore {
    pub active: Mutex<HashMap<(String, String), AlertInstance>>,
    pub history: Mutex<Vec<AlertInstance>>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn upsert_alert(&self, instance: AlertInstance) -> anyhow::Result<()> {
        let key = (instance.rule_id.clone(), instance.target.clone());
        self.active.lock().insert(key, instance.clone());
        self.history.lock().push(instance);
        Ok(())
    }

    async fn resolve_alert(
        &self,
        rule_id: &str,
        target: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) -> anyhow::Result<()> {
        let key = (rule_id.to_string(), target.to_string());
        if let Some(mut instance) = self.active.lock().remove(&key) {
            instance.resolved_at = Some(at);
            self.history.lock().push(instance);
        }
        Ok(())
    }

    async fn list_active_alerts(&self) -> anyhow::Result<Vec<AlertInstance>> {
        Ok(self.active.lock().values().cloned().collect())
    }

    async fn list_alert_history(
        &self,
        since: chrono::DateTime<chrono::Utc>,
    ) -> anyhow::Result<Vec<AlertInstance>> {
        Ok(self
            .history
            .lock()
            .iter()
            .filter(|a| a.last_fired >= since)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryDataStore {
    pub agents: Mutex<HashMap<String, Agent>>,
    pub containers: Mutex<HashMap<String, Container>>,
    pub tags: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn upsert_agent(&self, agent: Agent) -> anyhow::Result<()> {
        self.agents.lock().insert(agent.agent_id.clone(), agent);
        Ok(())
    }

    async fn get_agent_by_id(&self, agent_id: &str) -> Option<Agent> {
        self.agents.lock().get(agent_id).cloned()
    }

    async fn list_agents(&self) -> anyhow::Result<Vec<Agent>> {
        Ok(self.agents.lock().values().cloned().collect())
    }

    async fn upsert_container(&self, container: Container) -> anyhow::Result<()> {
        self.containers
            .lock()
            .insert(container.container_id.clone(), container);
        Ok(())
    }

    async fn list_containers(&self) -> anyhow::Result<Vec<Container>> {
        Ok(self.containers.lock().values().cloned().collect())
    }

    async fn set_tag(&self, endpoint_id: &str, key: &str, value: &str) -> anyhow::Result<()> {
        self.tags
            .lock()
            .entry(endpoint_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_tags(
        &self,
        endpoint_id: &str,
    ) -> anyhow::Result<HashMap<String, String>> {
        Ok(self
            .tags
            .lock()
            .get(endpoint_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_tag(&self, endpoint_id: &str, key: &str) -> anyhow::Result<()> {
        if let Some(tags) = self.tags.lock().get_mut(endpoint_id) {
            tags.remove(key);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRuleStore {
    pub rules: Mutex<Vec<Rule>>,
}

impl InMemoryRuleStore {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules: Mutex::new(rules),
        }
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn load_rules(&self) -> anyhow::Result<Vec<Rule>> {
        Ok(self.rules.lock().clone())
    }
}

/// Loads action routes from a TOML file shaped as `[[routes]] id = "..." ...`
/// (spec.md §6's `DispatcherConfig.routes_path`). Missing file or parse
/// failure surfaces as an error to the caller rather than silently falling
/// back to an empty route set.
pub struct FileRouteStore {
    path: std::path::PathBuf,
}

impl FileRouteStore {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Default, serde::Deserialize)]
struct RoutesFile {
    #[serde(default)]
    routes: Vec<ActionRoute>,
}

#[async_trait]
impl RouteStore for FileRouteStore {
    async fn load_routes(&self) -> anyhow::Result<Vec<ActionRoute>> {
        let raw = std::fs::read_to_string(&self.path).map_err(|err| {
            anyhow::anyhow!("reading routes file at {}: {err}", self.path.display())
        })?;
        let parsed: RoutesFile = toml::from_str(&raw).map_err(|err| {
            anyhow::anyhow!("parsing routes file at {}: {err}", self.path.display())
        })?;
        Ok(parsed.routes)
    }
}

#[derive(Default)]
pub struct InMemoryRouteStore {
    pub routes: Mutex<Vec<ActionRoute>>,
}

impl InMemoryRouteStore {
    pub fn new(routes: Vec<ActionRoute>) -> Self {
        Self {
            routes: Mutex::new(routes),
        }
    }
}

#[async_trait]
impl RouteStore for InMemoryRouteStore {
    async fn load_routes(&self) -> anyhow::Result<Vec<ActionRoute>> {
        Ok(self.routes.lock().clone())
    }
}

/// Default `SessionAuth` for the bundled binary: accepts any non-empty
/// token as the subject. Real authentication/SSO providers are an external
/// collaborator per spec.md §1 and are not implemented here.
#[derive(Default)]
pub struct InMemorySessionAuth;

impl InMemorySessionAuth {
    pub fn new() -> Self {
        Self
    }
}

impl super::traits::SessionAuth for InMemorySessionAuth {
    fn get_session_claims(&self, token: &str) -> Option<super::traits::SessionClaims> {
        if token.is_empty() {
            None
        } else {
            Some(super::traits::SessionClaims {
                subject: token.to_string(),
            })
        }
    }
}
