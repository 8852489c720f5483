//! Wire and in-memory data types shared by every component.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity and labels for a telemetry source.
///
/// `EndpointID` is present on every telemetry payload the core accepts; a
/// non-empty `container_id` implies an `endpoint_id` prefixed `ctr-`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub host_id: String,
    pub endpoint_id: String,
    #[serde(default)]
    pub container_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub container_name: String,
    #[serde(default)]
    pub agent_version: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Meta {
    pub fn is_container(&self) -> bool {
        !self.container_id.is_empty() || self.endpoint_id.starts_with("ctr-")
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Derived liveness for an agent or the connectivity of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatStatus {
    Online,
    Idle,
    Offline,
}

/// Engine-reported container lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Stopped,
    Unknown,
    Inactive,
}

impl ContainerStatus {
    /// Normalizes a free-form engine status string into the canonical enum.
    ///
    /// Unrecognized strings map to `Unknown` rather than being rejected.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" | "up" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            "stopped" => Self::Stopped,
            "inactive" => Self::Inactive,
            _ => Self::Unknown,
        }
    }

    /// Alert level appropriate for a status-change event involving this status.
    pub fn transition_level(self) -> &'static str {
        match self {
            Self::Exited | Self::Stopped | Self::Dead => "warning",
            _ => "info",
        }
    }
}

/// A tracked host endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub host_id: String,
    pub endpoint_id: String,
    pub hostname: String,
    pub ip_address: String,
    pub os: String,
    pub arch: String,
    pub platform: String,
    pub labels: HashMap<String, String>,
    pub start_time: Option<DateTime<Utc>>,
    pub last_seen: DateTime<Utc>,
    pub status: HeartbeatStatus,
    pub uptime_seconds: u64,
    #[serde(skip)]
    pub dirty: bool,
}

/// A tracked container endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub agent_id: String,
    pub host_id: String,
    pub endpoint_id: String,
    pub container_id: String,
    pub container_name: String,
    pub image_name: String,
    pub image_id: String,
    pub runtime: String,
    pub labels: HashMap<String, String>,
    pub last_seen: DateTime<Utc>,
    pub heartbeat: HeartbeatStatus,
    pub status: ContainerStatus,
    #[serde(skip)]
    pub dirty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub data_points: Vec<DataPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPayload {
    pub meta: Meta,
    pub timestamp: DateTime<Utc>,
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPayload {
    pub meta: Meta,
    pub timestamp: DateTime<Utc>,
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessEntry {
    pub pid: u32,
    pub ppid: u32,
    pub user: String,
    pub exe: String,
    pub cmdline: String,
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub threads: u32,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessPayload {
    pub meta: Meta,
    pub timestamp: DateTime<Utc>,
    pub entries: Vec<ProcessEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventScope {
    Endpoint,
    Container,
    Global,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    #[serde(rename = "type")]
    pub kind: String,
    pub category: String,
    pub message: String,
    pub source: String,
    pub scope: EventScope,
    pub target: String,
    #[serde(default)]
    pub endpoint_id: String,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

impl EventEntry {
    /// Assigns an ID and timestamp if either is unset, per spec invariant.
    pub fn finalize(mut self) -> Self {
        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub expression: String,
    pub level: EventLevel,
    pub scope: EventScope,
    #[serde(default)]
    pub match_labels: HashMap<String, String>,
    pub for_duration_secs: u64,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Pending,
    Firing,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertInstance {
    pub id: String,
    pub rule_id: String,
    pub state: AlertState,
    pub previous_state: Option<AlertState>,
    pub scope: EventScope,
    pub target: String,
    pub first_fired: DateTime<Utc>,
    pub last_fired: DateTime<Utc>,
    pub last_ok: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub last_value: f64,
    pub level: EventLevel,
    pub message: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionMatchFilter {
    #[serde(default)]
    pub level: Option<EventLevel>,
    #[serde(default)]
    pub rule_id: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl ActionMatchFilter {
    pub fn matches(&self, event: &EventEntry) -> bool {
        if let Some(level) = self.level {
            if level != event.level {
                return false;
            }
        }
        if let Some(rule_id) = &self.rule_id {
            if event.meta.get("rule_id") != Some(rule_id) {
                return false;
            }
        }
        self.tags
            .iter()
            .all(|(k, v)| event.meta.get(k) == Some(v))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSpec {
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Script {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRoute {
    pub id: String,
    pub match_filter: ActionMatchFilter,
    pub actions: Vec<ActionSpec>,
}

/// A command queued for delivery to a specific agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub id: u64,
    pub agent_id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Result of a command previously enqueued via `EndpointTracker`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub request_id: u64,
    pub endpoint_id: String,
    pub success: bool,
    pub output: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_is_container_detects_via_container_id_or_prefix() {
        let mut meta = Meta {
            endpoint_id: "host-h1".into(),
            ..Default::default()
        };
        assert!(!meta.is_container());

        meta.container_id = "abc123".into();
        assert!(meta.is_container());

        let mut other = Meta::default();
        other.endpoint_id = "ctr-abc123".into();
        assert!(other.is_container());
    }

    #[test]
    fn container_status_normalizes_case_insensitively() {
        assert_eq!(ContainerStatus::normalize("Running"), ContainerStatus::Running);
        assert_eq!(ContainerStatus::normalize("EXITED"), ContainerStatus::Exited);
        assert_eq!(ContainerStatus::normalize("bogus"), ContainerStatus::Unknown);
    }

    #[test]
    fn container_status_transition_level_flags_exit_states_as_warning() {
        assert_eq!(ContainerStatus::Exited.transition_level(), "warning");
        assert_eq!(ContainerStatus::Running.transition_level(), "info");
    }

    #[test]
    fn event_entry_finalize_assigns_id_when_absent() {
        let event = EventEntry {
            id: String::new(),
            timestamp: Utc::now(),
            level: EventLevel::Info,
            kind: "lifecycle".into(),
            category: "system".into(),
            message: "registered".into(),
            source: "endpoint_tracker".into(),
            scope: EventScope::Endpoint,
            target: "host-h1".into(),
            endpoint_id: "host-h1".into(),
            meta: HashMap::new(),
        }
        .finalize();

        assert!(!event.id.is_empty());
    }

    #[test]
    fn action_match_filter_requires_all_tags_to_match() {
        let mut meta = HashMap::new();
        meta.insert("rule_id".to_string(), "r1".to_string());
        meta.insert("env".to_string(), "prod".to_string());

        let event = EventEntry {
            id: "e1".into(),
            timestamp: Utc::now(),
            level: EventLevel::Critical,
            kind: "alert".into(),
            category: "alerts".into(),
            message: "firing".into(),
            source: "alert_manager".into(),
            scope: EventScope::Endpoint,
            target: "host-h1".into(),
            endpoint_id: "host-h1".into(),
            meta,
        };

        let mut tags = HashMap::new();
        tags.insert("env".to_string(), "prod".to_string());
        let matching = ActionMatchFilter {
            level: Some(EventLevel::Critical),
            rule_id: Some("r1".into()),
            tags,
        };
        assert!(matching.matches(&event));

        let mut wrong_tags = HashMap::new();
        wrong_tags.insert("env".to_string(), "staging".to_string());
        let non_matching = ActionMatchFilter {
            level: None,
            rule_id: None,
            tags: wrong_tags,
        };
        assert!(!non_matching.matches(&event));
    }
}
