//! In-memory mapping from `EndpointID` to the latest observed `Meta`.
//!
//! Safe under concurrent readers and a single-writer-per-key discipline; no
//! ordering is guaranteed across keys.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::model::Meta;

#[derive(Default)]
pub struct MetaTracker {
    inner: RwLock<HashMap<String, Meta>>,
}

impl MetaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current `Meta` for `endpoint_id`.
    pub fn set(&self, endpoint_id: &str, meta: Meta) {
        self.inner.write().insert(endpoint_id.to_string(), meta);
    }

    pub fn get(&self, endpoint_id: &str) -> Option<Meta> {
        self.inner.read().get(endpoint_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(endpoint_id: &str) -> Meta {
        Meta {
            endpoint_id: endpoint_id.into(),
            hostname: "h1".into(),
            ..Default::default()
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let tracker = MetaTracker::new();
        tracker.set("host-h1", meta("host-h1"));

        let (found, _) = (tracker.get("host-h1").is_some(), ());
        assert!(found);
        assert_eq!(tracker.get("host-h1").unwrap().hostname, "h1");
    }

    #[test]
    fn get_unknown_endpoint_returns_none() {
        let tracker = MetaTracker::new();
        assert!(tracker.get("host-unknown").is_none());
    }

    #[test]
    fn set_replaces_previous_value_for_same_key() {
        let tracker = MetaTracker::new();
        tracker.set("host-h1", meta("host-h1"));

        let mut updated = meta("host-h1");
        updated.hostname = "h1-renamed".into();
        tracker.set("host-h1", updated);

        assert_eq!(tracker.get("host-h1").unwrap().hostname, "h1-renamed");
        assert_eq!(tracker.len(), 1);
    }
}
