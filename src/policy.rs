use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{Error, Result};
use crate::kpi::{Aggregation, KpiAggregator, KpiKey, Metric, Reading, Scope};
use crate::models::PolicyRule;
use crate::network::NetworkModel;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Le,
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Ge,
}

impl Comparison {
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Threshold {
    pub metric: Metric,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub aggregate: Aggregation,
    pub op: Comparison,
    pub value: f64,
}

impl Threshold {
    pub fn key(&self) -> KpiKey {
        KpiKey::new(self.metric, self.target.as_deref())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Threshold(Threshold),
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

/// Outcome of evaluating a condition. Missing data is its own answer and is
/// never coerced to `False`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    True,
    False,
    InsufficientData,
}

impl Condition {
    pub fn evaluate(&self, kpis: &KpiAggregator) -> Verdict {
        match self {
            Condition::Threshold(threshold) => {
                match kpis.reading(&threshold.key(), threshold.aggregate) {
                    Reading::Value(value) if threshold.op.holds(value, threshold.value) => {
                        Verdict::True
                    }
                    Reading::Value(_) => Verdict::False,
                    Reading::InsufficientData => Verdict::InsufficientData,
                }
            }
            // Kleene logic: a definite False (All) or True (Any) wins over
            // missing data in a sibling.
            Condition::All(parts) => {
                let mut verdict = Verdict::True;
                for part in parts {
                    match part.evaluate(kpis) {
                        Verdict::False => return Verdict::False,
                        Verdict::InsufficientData => verdict = Verdict::InsufficientData,
                        Verdict::True => {}
                    }
                }
                verdict
            }
            Condition::Any(parts) => {
                let mut verdict = Verdict::False;
                for part in parts {
                    match part.evaluate(kpis) {
                        Verdict::True => return Verdict::True,
                        Verdict::InsufficientData => verdict = Verdict::InsufficientData,
                        Verdict::False => {}
                    }
                }
                verdict
            }
        }
    }

    fn thresholds(&self) -> Vec<&Threshold> {
        match self {
            Condition::Threshold(threshold) => vec![threshold],
            Condition::All(parts) | Condition::Any(parts) => {
                parts.iter().flat_map(Condition::thresholds).collect()
            }
        }
    }

    fn has_empty_group(&self) -> bool {
        match self {
            Condition::Threshold(_) => false,
            Condition::All(parts) | Condition::Any(parts) => {
                parts.is_empty() || parts.iter().any(Condition::has_empty_group)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTemplate {
    Restart { element: String },
    Reroute { link: String, via: Vec<String> },
    Throttle { link: String, limit: f64 },
    Escalate { element: String },
}

impl ActionTemplate {
    pub fn target(&self) -> &str {
        match self {
            ActionTemplate::Restart { element } | ActionTemplate::Escalate { element } => element,
            ActionTemplate::Reroute { link, .. } | ActionTemplate::Throttle { link, .. } => link,
        }
    }
}

pub fn validate_policies(rules: &[PolicyRule], model: &NetworkModel) -> Result<()> {
    let mut names = HashSet::new();
    for rule in rules {
        if !names.insert(rule.name.as_str()) {
            return Err(Error::DuplicatePolicy(rule.name.clone()));
        }
        validate_rule(rule, model)?;
    }
    Ok(())
}

fn validate_rule(rule: &PolicyRule, model: &NetworkModel) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidPolicy {
        policy: rule.name.clone(),
        reason: reason.to_string(),
    };
    let unknown = |target: &str| Error::UnknownPolicyTarget {
        policy: rule.name.clone(),
        target: target.to_string(),
    };

    if rule.condition.has_empty_group() {
        return Err(invalid("condition groups must not be empty"));
    }
    for threshold in rule.condition.thresholds() {
        if !threshold.value.is_finite() {
            return Err(invalid("threshold value must be finite"));
        }
        match (threshold.metric.scope(), threshold.target.as_deref()) {
            (Scope::Network, None) => {}
            (Scope::Network, Some(_)) => {
                return Err(invalid("network_health takes no target"));
            }
            (_, None) => {
                return Err(invalid(&format!(
                    "{} threshold needs a target",
                    threshold.metric
                )));
            }
            (Scope::Element, Some(target)) if !model.contains(target) => {
                return Err(unknown(target));
            }
            (Scope::Link, Some(target)) if !model.is_link(target) => {
                return Err(unknown(target));
            }
            _ => {}
        }
    }

    match &rule.action {
        ActionTemplate::Restart { element } | ActionTemplate::Escalate { element } => {
            if !model.contains(element) {
                return Err(unknown(element));
            }
        }
        ActionTemplate::Reroute { link, via } => {
            if !model.is_link(link) {
                return Err(unknown(link));
            }
            if via.is_empty() {
                return Err(invalid("reroute needs at least one alternate link"));
            }
            for hop in via {
                if hop == link {
                    return Err(invalid("reroute cannot use the congested link itself"));
                }
                if !model.is_link(hop) {
                    return Err(unknown(hop));
                }
            }
        }
        ActionTemplate::Throttle { link, limit } => {
            if !model.is_link(link) {
                return Err(unknown(link));
            }
            if !(*limit > 0.0) || !limit.is_finite() {
                return Err(invalid("throttle limit must be > 0"));
            }
        }
    }
    Ok(())
}
