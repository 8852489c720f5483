//! External store contracts the core consumes (spec.md §6). Concrete storage
//! drivers (time-series DB, relational DB, file-backed JSON) are out of
//! scope; the core only relies on these interfaces.

use async_trait::async_trait;

use crate::model::{
    Agent, AlertInstance, Container, EventEntry, LogPayload, MetricPayload, ProcessPayload, Rule,
};

#[async_trait]
pub trait MetricStore: Send + Sync {
    async fn write(&self, batch: Vec<MetricPayload>) -> anyhow::Result<()>;
    async fn close(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn write(&self, batch: Vec<LogPayload>) -> anyhow::Result<()>;
    async fn close(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ProcessStore: Send + Sync {
    async fn write(&self, batch: Vec<ProcessPayload>) -> anyhow::Result<()>;
    async fn close(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub endpoint_id: Option<String>,
    pub since: Option<chrono::DateTime<chrono::Utc>>,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn add_event(&self, event: EventEntry) -> anyhow::Result<()>;
    async fn query_events(&self, filter: EventFilter) -> anyhow::Result<Vec<EventEntry>>;
    async fn close(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn upsert_alert(&self, instance: AlertInstance) -> anyhow::Result<()>;
    async fn resolve_alert(
        &self,
        rule_id: &str,
        target: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) -> anyhow::Result<()>;
    async fn list_active_alerts(&self) -> anyhow::Result<Vec<AlertInstance>>;
    async fn list_alert_history(
        &self,
        since: chrono::DateTime<chrono::Utc>,
    ) -> anyhow::Result<Vec<AlertInstance>>;
}

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn upsert_agent(&self, agent: Agent) -> anyhow::Result<()>;
    async fn get_agent_by_id(&self, agent_id: &str) -> Option<Agent>;
    async fn list_agents(&self) -> anyhow::Result<Vec<Agent>>;
    async fn upsert_container(&self, container: Container) -> anyhow::Result<()>;
    async fn list_containers(&self) -> anyhow::Result<Vec<Container>>;
    async fn set_tag(&self, endpoint_id: &str, key: &str, value: &str) -> anyhow::Result<()>;
    async fn get_tags(&self, endpoint_id: &str) -> anyhow::Result<std::collections::HashMap<String, String>>;
    async fn delete_tag(&self, endpoint_id: &str, key: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn load_rules(&self) -> anyhow::Result<Vec<Rule>>;
}

#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn load_routes(&self) -> anyhow::Result<Vec<crate::model::ActionRoute>>;
}

/// Claims resolved from an inbound subscriber's session, consumed by hubs
/// before upgrading a connection.
#[derive(Debug, Clone)]
pub struct SessionClaims {
    pub subject: String,
}

pub trait SessionAuth: Send + Sync {
    /// Returns the session claims for `token`, or `None` if unauthorized.
    fn get_session_claims(&self, token: &str) -> Option<SessionClaims>;
}
