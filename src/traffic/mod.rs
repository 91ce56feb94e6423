mod scripted;
mod silent;
mod synthetic;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{Tick, TrafficConfig};
use crate::network::LinkView;

pub use scripted::ScriptedTraffic;
pub use silent::SilentTraffic;
pub use synthetic::SyntheticTraffic;

/// Per-link measurements delivered for one KPI cycle.
pub type TrafficFeed = BTreeMap<String, TrafficMetrics>;

/// Source of the traffic-derived KPIs (loss, jitter, error rate).
///
/// A link missing from the returned feed has no fresh data this cycle and its
/// traffic KPIs read as insufficient data.
pub trait TrafficSource {
    fn sample(&mut self, ctx: &TrafficContext) -> TrafficFeed;

    fn name(&self) -> &'static str;
}

pub struct TrafficContext<'a> {
    pub tick: Tick,
    pub links: &'a [LinkView],
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TrafficMetrics {
    pub utilization: f64,
    pub loss: f64,
    pub jitter_ms: f64,
}

pub fn build_traffic_source(traffic: TrafficConfig, seed: u64) -> Box<dyn TrafficSource + Send> {
    match traffic {
        TrafficConfig::Synthetic => Box::new(SyntheticTraffic::new(seed)),
        TrafficConfig::Silent => Box::new(SilentTraffic),
    }
}
