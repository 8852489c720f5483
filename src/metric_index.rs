//! In-memory catalog of observed metric names and their dimension keys/values.
//!
//! Full metric name = `namespace.sub.name`, lowercased, with `/` replaced by
//! `.`. `Add` is idempotent: repeated calls with identical arguments leave
//! the catalog unchanged.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

#[derive(Default)]
struct Catalog {
    /// namespace -> set of sub-namespaces
    namespaces: HashMap<String, HashSet<String>>,
    /// (namespace, sub) -> set of metric names (full path suffix)
    names: HashMap<(String, String), HashSet<String>>,
    /// full metric name -> dimension key -> observed values
    dimensions: HashMap<String, HashMap<String, HashSet<String>>>,
}

#[derive(Default)]
pub struct MetricIndex {
    inner: RwLock<Catalog>,
}

fn canonicalize(segment: &str) -> String {
    segment.to_ascii_lowercase().replace('/', ".")
}

fn full_name(namespace: &str, sub: &str, name: &str) -> String {
    format!(
        "{}.{}.{}",
        canonicalize(namespace),
        canonicalize(sub),
        canonicalize(name)
    )
}

impl MetricIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a metric observation. Idempotent and case-insensitive on
    /// namespace/sub/name.
    pub fn add(&self, namespace: &str, sub: &str, name: &str, dims: &HashMap<String, String>) {
        let namespace = canonicalize(namespace);
        let sub_ns = canonicalize(sub);
        let full = full_name(&namespace, &sub_ns, name);

        let mut catalog = self.inner.write();
        catalog
            .namespaces
            .entry(namespace.clone())
            .or_default()
            .insert(sub_ns.clone());
        catalog
            .names
            .entry((namespace, sub_ns))
            .or_default()
            .insert(full.clone());

        let dim_entry = catalog.dimensions.entry(full).or_default();
        for (key, value) in dims {
            dim_entry
                .entry(key.clone())
                .or_default()
                .insert(value.clone());
        }
    }

    pub fn get_namespaces(&self) -> Vec<String> {
        let mut out: Vec<String> = self.inner.read().namespaces.keys().cloned().collect();
        out.sort();
        out
    }

    pub fn get_sub_namespaces(&self, namespace: &str) -> Vec<String> {
        let catalog = self.inner.read();
        let mut out: Vec<String> = catalog
            .namespaces
            .get(&canonicalize(namespace))
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();
        out.sort();
        out
    }

    pub fn get_metric_names(&self, namespace: &str, sub: &str) -> Vec<String> {
        let catalog = self.inner.read();
        let mut out: Vec<String> = catalog
            .names
            .get(&(canonicalize(namespace), canonicalize(sub)))
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();
        out.sort();
        out
    }

    pub fn get_dimensions(&self) -> HashMap<String, HashMap<String, HashSet<String>>> {
        self.inner.read().dimensions.clone()
    }

    /// Returns the dimension keys recorded for a full metric name, or `None`
    /// if the metric has never been observed.
    pub fn get_dimensions_for_metric(&self, full_name: &str) -> Option<Vec<String>> {
        let catalog = self.inner.read();
        catalog.dimensions.get(full_name).map(|dims| {
            let mut keys: Vec<String> = dims.keys().cloned().collect();
            keys.sort();
            keys
        })
    }

    /// Returns metric names whose recorded dimension values match every
    /// `(key, value)` pair in `label_filters`.
    pub fn filter_metric_names(&self, label_filters: &HashMap<String, String>) -> Vec<String> {
        let catalog = self.inner.read();
        let mut out: Vec<String> = catalog
            .dimensions
            .iter()
            .filter(|(_, dims)| {
                label_filters.iter().all(|(key, value)| {
                    dims.get(key)
                        .is_some_and(|values| values.contains(value))
                })
            })
            .map(|(name, _)| name.clone())
            .collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_builds_lowercased_dot_joined_name() {
        let index = MetricIndex::new();
        index.add("Host", "CPU", "Usage", &HashMap::new());

        assert_eq!(index.get_namespaces(), vec!["host".to_string()]);
        assert_eq!(index.get_sub_namespaces("host"), vec!["cpu".to_string()]);
        assert_eq!(
            index.get_metric_names("host", "cpu"),
            vec!["host.cpu.usage".to_string()]
        );
    }

    #[test]
    fn add_replaces_slashes_with_dots() {
        let index = MetricIndex::new();
        index.add("net/eth0", "rx", "bytes", &HashMap::new());
        assert_eq!(
            index.get_metric_names("net/eth0", "rx"),
            vec!["net.eth0.rx.bytes".to_string()]
        );
    }

    #[test]
    fn add_is_idempotent() {
        let index = MetricIndex::new();
        let mut dims = HashMap::new();
        dims.insert("host_id".to_string(), "h1".to_string());

        index.add("host", "cpu", "usage", &dims);
        let names_before = index.get_metric_names("host", "cpu");
        let dims_before = index.get_dimensions_for_metric("host.cpu.usage");

        index.add("host", "cpu", "usage", &dims);
        let names_after = index.get_metric_names("host", "cpu");
        let dims_after = index.get_dimensions_for_metric("host.cpu.usage");

        assert_eq!(names_before, names_after);
        assert_eq!(dims_before, dims_after);
    }

    #[test]
    fn get_dimensions_for_metric_returns_none_when_unknown() {
        let index = MetricIndex::new();
        assert!(index.get_dimensions_for_metric("nope.nope.nope").is_none());
    }

    #[test]
    fn filter_metric_names_requires_every_filter_to_match() {
        let index = MetricIndex::new();

        let mut dims_a = HashMap::new();
        dims_a.insert("host_id".to_string(), "h1".to_string());
        index.add("host", "cpu", "usage", &dims_a);

        let mut dims_b = HashMap::new();
        dims_b.insert("host_id".to_string(), "h2".to_string());
        index.add("host", "mem", "usage", &dims_b);

        let mut filters = HashMap::new();
        filters.insert("host_id".to_string(), "h1".to_string());

        let matched = index.filter_metric_names(&filters);
        assert_eq!(matched, vec!["host.cpu.usage".to_string()]);
    }
}
