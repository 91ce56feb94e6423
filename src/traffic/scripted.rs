use std::collections::BTreeMap;

use crate::models::Tick;
use crate::traffic::{TrafficContext, TrafficFeed, TrafficMetrics, TrafficSource};

/// Replays fixed per-link measurements, optionally only from a given tick on.
#[derive(Debug, Default)]
pub struct ScriptedTraffic {
    entries: Vec<(Tick, String, TrafficMetrics)>,
}

impl ScriptedTraffic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports `metrics` for `link` on every cycle at or after `from`. Later
    /// entries for the same link take precedence once active.
    pub fn with(mut self, from: Tick, link: &str, metrics: TrafficMetrics) -> Self {
        self.entries.push((from, link.to_string(), metrics));
        self
    }
}

impl TrafficSource for ScriptedTraffic {
    fn sample(&mut self, ctx: &TrafficContext) -> TrafficFeed {
        let mut feed = BTreeMap::new();
        for (from, link, metrics) in &self.entries {
            if *from <= ctx.tick && ctx.links.iter().any(|view| &view.id == link) {
                feed.insert(link.clone(), *metrics);
            }
        }
        feed
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
