use serde::{Deserialize, Serialize};
use std::fmt;

use crate::events::EventKind;
use crate::kpi::{AlarmDirection, Metric};
use crate::policy::{ActionTemplate, Comparison, Condition, Threshold};
use crate::scenario::{reference_scenarios, Scenario};

/// Simulated clock value. Never derived from wall-clock time.
pub type Tick = u64;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SimConfig {
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub traffic: TrafficConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub elements: Vec<ElementConfig>,
    #[serde(default)]
    pub links: Vec<LinkConfig>,
    #[serde(default)]
    pub kpi: KpiConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub events: Vec<ScriptedEvent>,
    #[serde(default)]
    pub policies: Vec<PolicyRule>,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClockConfig {
    #[serde(default = "default_ticks")]
    pub ticks: Tick,
    #[serde(default = "default_kpi_interval")]
    pub kpi_interval: Tick,
    #[serde(default = "default_decision_interval")]
    pub decision_interval: Tick,
    /// Real-time pacing for the runner; the core ignores it.
    #[serde(default)]
    pub tick_rate_hz: Option<f64>,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            ticks: default_ticks(),
            kpi_interval: default_kpi_interval(),
            decision_interval: default_decision_interval(),
            tick_rate_hz: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ModelConfig {
    #[serde(default = "default_down_health")]
    pub down_health: u8,
    #[serde(default = "default_fault_history")]
    pub fault_history: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            down_health: default_down_health(),
            fault_history: default_fault_history(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    RadioNode,
    CoreNode,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ElementConfig {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub weight: Option<f64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LinkConfig {
    pub id: String,
    pub endpoints: [String; 2],
    pub capacity: f64,
    #[serde(default = "default_latency_ms")]
    pub latency_ms: f64,
    #[serde(default)]
    pub base_utilization: f64,
    #[serde(default)]
    pub base_loss: f64,
    #[serde(default)]
    pub weight: Option<f64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct KpiConfig {
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default)]
    pub weights: KindWeights,
    #[serde(default)]
    pub alarms: Vec<KpiAlarm>,
}

impl Default for KpiConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            weights: KindWeights::default(),
            alarms: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct KindWeights {
    #[serde(default = "default_weight")]
    pub radio: f64,
    #[serde(default = "default_weight")]
    pub core: f64,
    #[serde(default = "default_weight")]
    pub link: f64,
}

impl Default for KindWeights {
    fn default() -> Self {
        Self {
            radio: default_weight(),
            core: default_weight(),
            link: default_weight(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct KpiAlarm {
    pub metric: Metric,
    pub warning: f64,
    pub critical: f64,
    pub direction: AlarmDirection,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AutomationConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base: Tick,
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap: Tick,
    #[serde(default = "default_grace_ticks")]
    pub grace_ticks: Tick,
    #[serde(default = "default_restart_delay")]
    pub restart_delay: Tick,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base: default_backoff_base(),
            backoff_cap: default_backoff_cap(),
            grace_ticks: default_grace_ticks(),
            restart_delay: default_restart_delay(),
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SimulatorConfig {
    /// Probability per tick of generating one random event.
    #[serde(default)]
    pub fault_rate: f64,
    #[serde(default = "default_hard_failure_rate")]
    pub hard_failure_rate: f64,
    #[serde(default = "default_spike_rate")]
    pub spike_rate: f64,
    #[serde(default = "default_severity_min")]
    pub severity_min: u8,
    #[serde(default = "default_severity_max")]
    pub severity_max: u8,
    #[serde(default = "default_spike_min")]
    pub spike_min: f64,
    #[serde(default = "default_spike_max")]
    pub spike_max: f64,
    #[serde(default = "default_recover_after_min")]
    pub recover_after_min: Tick,
    #[serde(default = "default_recover_after_max")]
    pub recover_after_max: Tick,
    #[serde(default = "default_event_log")]
    pub event_log: usize,
    /// Probability per tick of starting one configured scenario.
    #[serde(default)]
    pub scenario_rate: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            fault_rate: 0.0,
            hard_failure_rate: default_hard_failure_rate(),
            spike_rate: default_spike_rate(),
            severity_min: default_severity_min(),
            severity_max: default_severity_max(),
            spike_min: default_spike_min(),
            spike_max: default_spike_max(),
            recover_after_min: default_recover_after_min(),
            recover_after_max: default_recover_after_max(),
            event_log: default_event_log(),
            scenario_rate: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrafficConfig {
    #[default]
    Synthetic,
    Silent,
}

impl fmt::Display for TrafficConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrafficConfig::Synthetic => "synthetic",
            TrafficConfig::Silent => "silent",
        };
        write!(f, "{}", label)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ScriptedEvent {
    pub tick: Tick,
    pub event: EventKind,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PolicyRule {
    pub name: String,
    #[serde(default)]
    pub cooldown: Tick,
    pub condition: Condition,
    pub action: ActionTemplate,
}

impl SimConfig {
    /// Built-in 5G core/RAN topology used when no config file is given.
    pub fn reference_network() -> Self {
        let node = |id: &str, kind| ElementConfig {
            id: id.to_string(),
            kind,
            weight: None,
        };
        let link = |id: &str, a: &str, b: &str, capacity: f64, base: f64| LinkConfig {
            id: id.to_string(),
            endpoints: [a.to_string(), b.to_string()],
            capacity,
            latency_ms: default_latency_ms(),
            base_utilization: base,
            base_loss: 0.001,
            weight: None,
        };
        let threshold = |metric, target: &str, op, value| {
            Condition::Threshold(Threshold {
                metric,
                target: Some(target.to_string()),
                aggregate: Default::default(),
                op,
                value,
            })
        };

        let mut policies = Vec::new();
        for gnb in ["gnb-001", "gnb-002"] {
            policies.push(PolicyRule {
                name: format!("restart-{}", gnb),
                cooldown: 30,
                condition: threshold(Metric::Availability, gnb, Comparison::Lt, 0.5),
                action: ActionTemplate::Restart {
                    element: gnb.to_string(),
                },
            });
        }
        for core in ["amf-001", "smf-001", "upf-001", "pcf-001"] {
            policies.push(PolicyRule {
                name: format!("restart-{}", core),
                cooldown: 30,
                condition: Condition::Any(vec![
                    threshold(Metric::Availability, core, Comparison::Lt, 0.5),
                    threshold(Metric::Health, core, Comparison::Lt, 30.0),
                ]),
                action: ActionTemplate::Restart {
                    element: core.to_string(),
                },
            });
        }
        policies.push(PolicyRule {
            name: "relieve-n3".to_string(),
            cooldown: 20,
            condition: threshold(Metric::Utilization, "n3-upf", Comparison::Gt, 1.0),
            action: ActionTemplate::Reroute {
                link: "n3-upf".to_string(),
                via: vec!["n3-upf-b".to_string()],
            },
        });
        policies.push(PolicyRule {
            name: "shape-backhaul-1".to_string(),
            cooldown: 20,
            condition: threshold(Metric::PacketLoss, "bh-gnb-001", Comparison::Gt, 0.05),
            action: ActionTemplate::Throttle {
                link: "bh-gnb-001".to_string(),
                limit: 900.0,
            },
        });

        Self {
            seed: 42,
            traffic: TrafficConfig::Synthetic,
            clock: ClockConfig::default(),
            model: ModelConfig::default(),
            elements: vec![
                node("gnb-001", NodeKind::RadioNode),
                node("gnb-002", NodeKind::RadioNode),
                node("amf-001", NodeKind::CoreNode),
                node("smf-001", NodeKind::CoreNode),
                node("upf-001", NodeKind::CoreNode),
                node("pcf-001", NodeKind::CoreNode),
            ],
            links: vec![
                link("bh-gnb-001", "gnb-001", "upf-001", 1000.0, 400.0),
                link("bh-gnb-002", "gnb-002", "upf-001", 1000.0, 350.0),
                link("n2-amf", "gnb-001", "amf-001", 100.0, 20.0),
                link("n4-smf", "smf-001", "upf-001", 100.0, 15.0),
                link("n7-pcf", "smf-001", "pcf-001", 100.0, 10.0),
                link("n3-upf", "gnb-002", "upf-001", 500.0, 250.0),
                link("n3-upf-b", "gnb-002", "upf-001", 500.0, 50.0),
            ],
            kpi: KpiConfig {
                weights: KindWeights {
                    radio: 1.0,
                    core: 2.0,
                    link: 0.5,
                },
                alarms: vec![
                    KpiAlarm {
                        metric: Metric::Availability,
                        warning: 0.999,
                        critical: 0.995,
                        direction: AlarmDirection::Below,
                    },
                    KpiAlarm {
                        metric: Metric::Latency,
                        warning: 100.0,
                        critical: 200.0,
                        direction: AlarmDirection::Above,
                    },
                ],
                ..KpiConfig::default()
            },
            automation: AutomationConfig::default(),
            simulator: SimulatorConfig {
                fault_rate: 0.05,
                scenario_rate: 0.01,
                ..SimulatorConfig::default()
            },
            events: Vec::new(),
            policies,
            scenarios: reference_scenarios(),
        }
    }
}

fn default_ticks() -> Tick {
    200
}

fn default_kpi_interval() -> Tick {
    1
}

fn default_decision_interval() -> Tick {
    2
}

fn default_down_health() -> u8 {
    10
}

fn default_fault_history() -> usize {
    32
}

fn default_latency_ms() -> f64 {
    10.0
}

fn default_window() -> usize {
    8
}

fn default_weight() -> f64 {
    1.0
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> Tick {
    2
}

fn default_backoff_cap() -> Tick {
    32
}

fn default_grace_ticks() -> Tick {
    6
}

fn default_restart_delay() -> Tick {
    2
}

fn default_history_limit() -> usize {
    256
}

fn default_hard_failure_rate() -> f64 {
    0.1
}

fn default_spike_rate() -> f64 {
    0.3
}

fn default_severity_min() -> u8 {
    20
}

fn default_severity_max() -> u8 {
    60
}

fn default_spike_min() -> f64 {
    50.0
}

fn default_spike_max() -> f64 {
    400.0
}

fn default_recover_after_min() -> Tick {
    20
}

fn default_recover_after_max() -> Tick {
    60
}

fn default_event_log() -> usize {
    512
}
