use serde::Serialize;

use crate::automation::{AutomationStats, RemediationAction};
use crate::kpi::Reading;
use crate::models::Tick;
use crate::publisher::PublishedState;
use crate::simulator::{EventCounts, EventRecord, ScenarioRun};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunMetadata {
    pub seed: u64,
    pub ticks: Tick,
    pub kpi_interval: Tick,
    pub decision_interval: Tick,
    pub traffic: String,
    pub stopped_early: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub events: EventCounts,
    pub automation: AutomationStats,
    pub alarms_raised: u64,
    pub alarms_cleared: u64,
    pub network_health: Reading,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub summary: RunSummary,
    pub events: Vec<EventRecord>,
    pub scenarios: Vec<ScenarioRun>,
    pub actions: Vec<RemediationAction>,
    pub final_state: PublishedState,
}
