//! Evaluates incoming metric samples against configured rules and forwards
//! predicate outcomes to the `AlertManager` (spec.md §4.6).

pub mod expr;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::alerts::AlertManager;
use crate::model::{EventScope, MetricPayload, Rule};

struct CompiledRule {
    rule: Rule,
    expr: expr::ParsedExpr,
}

pub struct RuleEvaluator {
    rules: RwLock<Vec<Arc<CompiledRule>>>,
    alert_manager: Arc<AlertManager>,
}

impl RuleEvaluator {
    pub fn new(alert_manager: Arc<AlertManager>) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            alert_manager,
        }
    }

    /// Compiles and installs the rule set, skipping (and logging) any rule
    /// whose expression fails to parse.
    pub fn set_rules(&self, rules: Vec<Rule>) {
        let compiled = rules
            .into_iter()
            .filter_map(|rule| match expr::parse(&rule.expression) {
                Ok(parsed) => Some(Arc::new(CompiledRule { rule, expr: parsed })),
                Err(err) => {
                    tracing::warn!(rule_id = %rule.id, error = %err, "skipping rule with unparsable expression");
                    None
                }
            })
            .collect();
        *self.rules.write() = compiled;
    }

    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    /// Evaluates every data point in `payload` against every rule whose
    /// `match_labels` are satisfied by the sample's meta labels.
    pub async fn evaluate(&self, payload: &MetricPayload) {
        let rules: Vec<Arc<CompiledRule>> = self.rules.read().clone();
        if rules.is_empty() {
            return;
        }

        let target = payload.meta.endpoint_id.clone();
        for metric in &payload.metrics {
            for point in &metric.data_points {
                for compiled in &rules {
                    if !labels_match(&compiled.rule, &payload.meta.labels, &point.attributes) {
                        continue;
                    }
                    let predicate = compiled.expr.evaluate(&metric.name, point.value);
                    self.alert_manager
                        .transition(
                            &compiled.rule,
                            &target,
                            scope_for(&compiled.rule),
                            predicate,
                            point.value,
                            point.timestamp,
                        )
                        .await;
                }
            }
        }
    }
}

fn scope_for(rule: &Rule) -> EventScope {
    rule.scope
}

fn labels_match(
    rule: &Rule,
    meta_labels: &std::collections::HashMap<String, String>,
    point_attributes: &std::collections::HashMap<String, String>,
) -> bool {
    rule.match_labels.iter().all(|(k, v)| {
        meta_labels.get(k) == Some(v) || point_attributes.get(k) == Some(v)
    })
}
