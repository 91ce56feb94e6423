use serde::Serialize;

use crate::automation::{AutomationEngine, AutomationStats, RemediationAction};
use crate::kpi::{Aggregation, Alarm, KpiAggregator, KpiKey, KpiSummary, Reading};
use crate::models::Tick;
use crate::network::{NetworkModel, NetworkSnapshot};

pub const RECENT_ACTIONS: usize = 16;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Incident {
    pub element: String,
    pub incident: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PublishedState {
    pub tick: Tick,
    pub network: NetworkSnapshot,
    pub network_health: Reading,
    pub kpis: Vec<KpiSummary>,
    pub alarms: Vec<Alarm>,
    pub active_actions: Vec<RemediationAction>,
    pub recent_actions: Vec<RemediationAction>,
    pub incidents: Vec<Incident>,
    pub counters: AutomationStats,
}

pub fn publish(
    tick: Tick,
    model: &NetworkModel,
    kpis: &KpiAggregator,
    automation: &AutomationEngine,
) -> PublishedState {
    let network = model.snapshot();
    let incidents = network
        .elements
        .iter()
        .flat_map(|element| {
            element.incidents.iter().map(|incident| Incident {
                element: element.id.clone(),
                incident: incident.clone(),
            })
        })
        .collect();
    let archived: Vec<&RemediationAction> = automation.archive().collect();
    let recent_actions = archived[archived.len().saturating_sub(RECENT_ACTIONS)..]
        .iter()
        .map(|action| (*action).clone())
        .collect();

    PublishedState {
        tick,
        network,
        network_health: kpis.reading(&KpiKey::network(), Aggregation::Latest),
        kpis: kpis.summaries(),
        alarms: kpis.active_alarms().cloned().collect(),
        active_actions: automation.live().cloned().collect(),
        recent_actions,
        incidents,
        counters: automation.stats().clone(),
    }
}
