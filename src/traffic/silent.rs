use crate::traffic::{TrafficContext, TrafficFeed, TrafficSource};

/// Delivers nothing; every traffic-derived KPI stays insufficient.
#[derive(Debug, Default)]
pub struct SilentTraffic;

impl TrafficSource for SilentTraffic {
    fn sample(&mut self, _ctx: &TrafficContext) -> TrafficFeed {
        TrafficFeed::new()
    }

    fn name(&self) -> &'static str {
        "silent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_feed_is_empty() {
        let mut source = SilentTraffic;
        let ctx = TrafficContext { tick: 3, links: &[] };
        assert!(source.sample(&ctx).is_empty());
    }
}
