//! Per-topic delivery predicates (spec.md §4.8, exact rules).

use crate::model::{AlertInstance, CommandResult, EventEntry, EventScope};

/// A connected subscriber's filter tuple. An empty `endpoint_id` means
/// unfiltered: deliver everything.
#[derive(Debug, Clone, Default)]
pub struct SubscriberFilter {
    pub endpoint_id: String,
    pub agent_id: String,
    pub host_id: String,
}

impl SubscriberFilter {
    pub fn unfiltered() -> Self {
        Self::default()
    }
}

fn metric_like(endpoint_id: &str, meta_agent_id: &str, filter: &SubscriberFilter) -> bool {
    if filter.endpoint_id.is_empty() {
        return true;
    }
    endpoint_id == filter.endpoint_id
        || (endpoint_id.starts_with("ctr-") && meta_agent_id == filter.agent_id)
}

pub fn should_deliver_metric(payload: &crate::model::MetricPayload, filter: &SubscriberFilter) -> bool {
    metric_like(&payload.meta.endpoint_id, &payload.meta.agent_id, filter)
}

pub fn should_deliver_log(payload: &crate::model::LogPayload, filter: &SubscriberFilter) -> bool {
    metric_like(&payload.meta.endpoint_id, &payload.meta.agent_id, filter)
}

pub fn should_deliver_process(
    payload: &crate::model::ProcessPayload,
    filter: &SubscriberFilter,
) -> bool {
    metric_like(&payload.meta.endpoint_id, &payload.meta.agent_id, filter)
}

pub fn should_deliver_event(payload: &EventEntry, filter: &SubscriberFilter) -> bool {
    if filter.endpoint_id.is_empty() {
        return true;
    }
    payload.endpoint_id == filter.endpoint_id
        || payload.meta.get("endpoint_id").map(String::as_str) == Some(filter.endpoint_id.as_str())
        || payload.meta.get("agent_id").map(String::as_str) == Some(filter.agent_id.as_str())
        || payload.meta.get("host_id").map(String::as_str) == Some(filter.host_id.as_str())
        || payload.target == filter.endpoint_id
        || (payload.target.starts_with("ctr-")
            && payload.meta.get("agent_id").map(String::as_str) == Some(filter.agent_id.as_str()))
}

pub fn should_deliver_alert(payload: &AlertInstance, filter: &SubscriberFilter) -> bool {
    if filter.endpoint_id.is_empty() {
        return true;
    }
    if payload.scope == EventScope::Global {
        return true;
    }
    payload.target == filter.endpoint_id
        || (payload.target.starts_with("ctr-")
            && payload.labels.get("agent_id").map(String::as_str) == Some(filter.agent_id.as_str()))
}

pub fn should_deliver_command(result: &CommandResult, filter: &SubscriberFilter) -> bool {
    result.endpoint_id == filter.endpoint_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AlertState, EventLevel, Meta, MetricPayload};
    use std::collections::HashMap;

    fn filter(endpoint_id: &str, agent_id: &str) -> SubscriberFilter {
        SubscriberFilter {
            endpoint_id: endpoint_id.into(),
            agent_id: agent_id.into(),
            host_id: String::new(),
        }
    }

    fn metric_payload(endpoint_id: &str, agent_id: &str) -> MetricPayload {
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

    #[test]
    fn delivery_filtering_scenario_s3() {
        let sub = filter("host-A", "ag1");

        assert!(should_deliver_metric(&metric_payload("host-A", ""), &sub));
        assert!(should_deliver_metric(&metric_payload("ctr-X", "ag1"), &sub));
        assert!(!should_deliver_metric(&metric_payload("host-B", ""), &sub));
        assert!(!should_deliver_metric(&metric_payload("ctr-Y", "ag2"), &sub));
    }

    #[test]
    fn unfiltered_subscriber_receives_everything() {
        let sub = SubscriberFilter::unfiltered();
        assert!(should_deliver_metric(&metric_payload("host-anything", ""), &sub));
    }

    #[test]
    fn event_delivery_matches_on_any_identity_field() {
        let sub = filter("host-A", "ag1");
        let mut meta = HashMap::new();
        meta.insert("host_id".to_string(), "h-irrelevant".to_string());

        let event = EventEntry {
            id: "1".into(),
            timestamp: chrono::Utc::now(),
            level: EventLevel::Info,
            kind: "registered".into(),
            category: "system".into(),
            message: "hi".into(),
            source: "test".into(),
            scope: crate::model::EventScope::Endpoint,
            target: "host-A".into(),
            endpoint_id: String::new(),
            meta,
        };
        assert!(should_deliver_event(&event, &sub));
    }

    #[test]
    fn alert_delivery_global_scope_always_matches() {
        let sub = filter("host-A", "ag1");
        let alert = AlertInstance {
            id: "a1".into(),
            rule_id: "r1".into(),
            state: AlertState::Firing,
            previous_state: None,
            scope: crate::model::EventScope::Global,
            target: "irrelevant".into(),
            first_fired: chrono::Utc::now(),
            last_fired: chrono::Utc::now(),
            last_ok: None,
            resolved_at: None,
            last_value: 1.0,
            level: EventLevel::Critical,
            message: String::new(),
            labels: HashMap::new(),
        };
        assert!(should_deliver_alert(&alert, &sub));
    }

    #[test]
    fn command_delivery_requires_exact_endpoint_match() {
        let sub = filter("host-A", "");
        let result = CommandResult {
            request_id: 1,
            endpoint_id: "host-A".into(),
            success: true,
            output: String::new(),
        };
        assert!(should_deliver_command(&result, &sub));

        let other = CommandResult {
            request_id: 2,
            endpoint_id: "host-B".into(),
            success: true,
            output: String::new(),
        };
        assert!(!should_deliver_command(&other, &sub));
    }
}
