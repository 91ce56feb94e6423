use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::network::OperationalState;
use crate::traffic::{TrafficContext, TrafficFeed, TrafficMetrics, TrafficSource};

/// Keeps the traffic stream independent of the event generator's stream.
const STREAM_SALT: u64 = 0x7472_6166_6669_6300;

/// Seeded model: measurements follow each link's modelled load with a
/// small amount of noise.
#[derive(Debug)]
pub struct SyntheticTraffic {
    rng: StdRng,
}

impl SyntheticTraffic {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed ^ STREAM_SALT),
        }
    }
}

impl TrafficSource for SyntheticTraffic {
    fn sample(&mut self, ctx: &TrafficContext) -> TrafficFeed {
        let mut feed = TrafficFeed::new();
        for link in ctx.links {
            let ratio = link.utilization / link.capacity;
            let metrics = if link.state == OperationalState::Down {
                TrafficMetrics {
                    utilization: 0.0,
                    loss: 1.0,
                    jitter_ms: 0.0,
                }
            } else {
                let noise = self.rng.gen_range(0.0..0.002);
                let spread = self.rng.gen_range(0.8..1.2);
                TrafficMetrics {
                    utilization: ratio,
                    loss: (link.packet_loss + noise).min(1.0),
                    jitter_ms: link.latency_ms * (0.05 + 0.1 * ratio) * spread,
                }
            };
            feed.insert(link.id.clone(), metrics);
        }
        feed
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}
