use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::models::{NodeKind, Tick};
use crate::network::{ElementKind, NetworkModel};

/// Named multi-step fault sequence. When a scenario starts, every step rolls
/// its own probability and picks one matching target.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub steps: Vec<ScenarioStep>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ScenarioStep {
    pub event: StepEvent,
    pub target: StepTarget,
    #[serde(default = "certain")]
    pub probability: f64,
    /// Ticks after the scenario start.
    #[serde(default)]
    pub delay: Tick,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepEvent {
    Degrade { severity: u8 },
    Fail,
    Recover,
    TrafficSpike { magnitude: f64 },
    Custom { payload: String },
}

impl StepEvent {
    pub fn at(&self, target: String) -> EventKind {
        match self {
            StepEvent::Degrade { severity } => EventKind::Degrade {
                element: target,
                severity: *severity,
            },
            StepEvent::Fail => EventKind::Fail { element: target },
            StepEvent::Recover => EventKind::Recover { element: target },
            StepEvent::TrafficSpike { magnitude } => EventKind::TrafficSpike {
                link: target,
                magnitude: *magnitude,
            },
            StepEvent::Custom { payload } => EventKind::Custom {
                payload: format!("{} {}", payload, target),
            },
        }
    }
}

/// Which elements a step may land on. `Any` covers nodes only.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepTarget {
    Id(String),
    Prefix(String),
    Kind(NodeKind),
    Link,
    Any,
}

impl StepTarget {
    pub fn matches(&self, id: &str, kind: ElementKind) -> bool {
        match self {
            StepTarget::Id(target) => id == target,
            StepTarget::Prefix(prefix) => id.starts_with(prefix.as_str()),
            StepTarget::Kind(node) => ElementKind::from(*node) == kind,
            StepTarget::Link => kind == ElementKind::Link,
            StepTarget::Any => kind != ElementKind::Link,
        }
    }
}

fn certain() -> f64 {
    1.0
}

pub fn targets(model: &NetworkModel) -> Vec<(String, ElementKind)> {
    model
        .elements()
        .map(|element| (element.id.clone(), element.kind))
        .collect()
}

pub fn validate_scenarios(scenarios: &[Scenario], model: &NetworkModel) -> Result<()> {
    let targets = targets(model);
    let mut names = HashSet::new();
    for scenario in scenarios {
        let invalid = |reason: String| Error::InvalidScenario {
            scenario: scenario.name.clone(),
            reason,
        };
        if scenario.name.is_empty() {
            return Err(invalid("name must not be empty".to_string()));
        }
        if !names.insert(scenario.name.as_str()) {
            return Err(invalid("name is used twice".to_string()));
        }
        if scenario.steps.is_empty() {
            return Err(invalid("needs at least one step".to_string()));
        }
        for (index, step) in scenario.steps.iter().enumerate() {
            if !(0.0..=1.0).contains(&step.probability) {
                return Err(invalid(format!(
                    "step {} probability must be within [0, 1]",
                    index + 1
                )));
            }
            if let StepTarget::Id(id) = &step.target {
                if !model.contains(id) {
                    return Err(Error::UnknownScenarioTarget {
                        scenario: scenario.name.clone(),
                        target: id.clone(),
                    });
                }
            }
            if let StepEvent::TrafficSpike { magnitude } = step.event {
                if !(magnitude >= 0.0) || !magnitude.is_finite() {
                    return Err(invalid(format!(
                        "step {} magnitude must be >= 0",
                        index + 1
                    )));
                }
                let lands_on_node = targets
                    .iter()
                    .any(|(id, kind)| *kind != ElementKind::Link && step.target.matches(id, *kind));
                if lands_on_node || matches!(step.target, StepTarget::Kind(_) | StepTarget::Any) {
                    return Err(invalid(format!(
                        "step {} traffic_spike must target links",
                        index + 1
                    )));
                }
            }
        }
    }
    Ok(())
}

fn step(event: StepEvent, target: StepTarget, probability: f64, delay: Tick) -> ScenarioStep {
    ScenarioStep {
        event,
        target,
        probability,
        delay,
    }
}

fn scenario(name: &str, description: &str, steps: Vec<ScenarioStep>) -> Scenario {
    Scenario {
        name: name.to_string(),
        description: description.to_string(),
        steps,
    }
}

fn prefix(value: &str) -> StepTarget {
    StepTarget::Prefix(value.to_string())
}

fn custom(payload: &str) -> StepEvent {
    StepEvent::Custom {
        payload: payload.to_string(),
    }
}

pub fn reference_scenarios() -> Vec<Scenario> {
    let radio = || StepTarget::Kind(NodeKind::RadioNode);
    vec![
        scenario(
            "amf-failover",
            "AMF goes down, traffic fails over, AMF comes back",
            vec![
                step(StepEvent::Fail, prefix("amf"), 1.0, 0),
                step(custom("failover"), prefix("amf"), 0.9, 2),
                step(StepEvent::Recover, prefix("amf"), 0.8, 6),
            ],
        ),
        scenario(
            "network-congestion",
            "Backhaul spike that drags the user plane down",
            vec![
                step(
                    StepEvent::TrafficSpike { magnitude: 300.0 },
                    StepTarget::Link,
                    1.0,
                    0,
                ),
                step(StepEvent::Degrade { severity: 40 }, prefix("upf"), 0.7, 1),
                step(StepEvent::Recover, prefix("upf"), 0.9, 10),
            ],
        ),
        scenario(
            "resource-exhaustion",
            "Session management runs out of resources",
            vec![
                step(StepEvent::Degrade { severity: 50 }, prefix("smf"), 1.0, 0),
                step(StepEvent::Degrade { severity: 30 }, prefix("smf"), 0.8, 2),
                step(StepEvent::Recover, prefix("smf"), 0.9, 8),
            ],
        ),
        scenario(
            "security-incident",
            "Policy function compromised and reconfigured",
            vec![
                step(StepEvent::Degrade { severity: 70 }, prefix("pcf"), 1.0, 0),
                step(custom("config-change"), prefix("pcf"), 0.9, 1),
                step(StepEvent::Recover, prefix("pcf"), 0.95, 5),
            ],
        ),
        scenario(
            "multiple-node-failure",
            "A radio node and the user plane fail together",
            vec![
                step(StepEvent::Fail, radio(), 1.0, 0),
                step(StepEvent::Fail, prefix("upf"), 0.8, 0),
                step(custom("failover"), radio(), 0.9, 2),
                step(custom("failover"), prefix("upf"), 0.7, 2),
                step(StepEvent::Recover, radio(), 0.95, 8),
                step(StepEvent::Recover, prefix("upf"), 0.9, 8),
            ],
        ),
    ]
}
