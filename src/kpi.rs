use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use tracing::{debug, info, warn};

use crate::models::{KindWeights, KpiAlarm, KpiConfig, Tick};
use crate::network::{ElementKind, NetworkSnapshot, OperationalState};
use crate::traffic::TrafficFeed;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Availability,
    Health,
    Latency,
    Throughput,
    Utilization,
    PacketLoss,
    Jitter,
    ErrorRate,
    NetworkHealth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Element,
    Link,
    Network,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::Availability,
        Metric::Health,
        Metric::Latency,
        Metric::Throughput,
        Metric::Utilization,
        Metric::PacketLoss,
        Metric::Jitter,
        Metric::ErrorRate,
        Metric::NetworkHealth,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::Availability => "availability",
            Metric::Health => "health",
            Metric::Latency => "latency",
            Metric::Throughput => "throughput",
            Metric::Utilization => "utilization",
            Metric::PacketLoss => "packet_loss",
            Metric::Jitter => "jitter",
            Metric::ErrorRate => "error_rate",
            Metric::NetworkHealth => "network_health",
        }
    }

    pub fn scope(self) -> Scope {
        match self {
            Metric::Availability | Metric::Health => Scope::Element,
            Metric::NetworkHealth => Scope::Network,
            _ => Scope::Link,
        }
    }

    /// Metrics fed by the traffic module go stale when a cycle brings no data.
    pub fn traffic_derived(self) -> bool {
        matches!(self, Metric::PacketLoss | Metric::Jitter | Metric::ErrorRate)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct KpiKey {
    pub metric: Metric,
    pub target: Option<String>,
}

impl KpiKey {
    pub fn new(metric: Metric, target: Option<&str>) -> Self {
        Self {
            metric,
            target: target.map(str::to_string),
        }
    }

    pub fn of(metric: Metric, target: &str) -> Self {
        Self::new(metric, Some(target))
    }

    pub fn network() -> Self {
        Self::new(Metric::NetworkHealth, None)
    }
}

impl fmt::Display for KpiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{}({})", self.metric, target),
            None => write!(f, "{}", self.metric),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reading {
    Value(f64),
    InsufficientData,
}

impl Reading {
    pub fn value(self) -> Option<f64> {
        match self {
            Reading::Value(value) => Some(value),
            Reading::InsufficientData => None,
        }
    }

    pub fn is_insufficient(self) -> bool {
        matches!(self, Reading::InsufficientData)
    }
}

impl From<Option<f64>> for Reading {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Reading::InsufficientData, Reading::Value)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Value(value) => write!(f, "{:.3}", value),
            Reading::InsufficientData => write!(f, "insufficient data"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    Mean,
    P95,
    Latest,
    Min,
    Max,
    RateOfChange,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Sample {
    pub tick: Tick,
    pub value: f64,
}

#[derive(Clone, Debug)]
pub struct KpiWindow {
    retention: usize,
    samples: VecDeque<Sample>,
}

impl KpiWindow {
    pub fn new(retention: usize) -> Self {
        let retention = retention.max(1);
        Self {
            retention,
            samples: VecDeque::with_capacity(retention),
        }
    }

    pub fn push(&mut self, tick: Tick, value: f64) {
        if self.samples.len() == self.retention {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { tick, value });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Reading {
        self.samples.back().map(|sample| sample.value).into()
    }

    pub fn mean(&self) -> Reading {
        if self.samples.is_empty() {
            return Reading::InsufficientData;
        }
        let sum: f64 = self.samples.iter().map(|sample| sample.value).sum();
        Reading::Value(sum / self.samples.len() as f64)
    }

    pub fn p95(&self) -> Reading {
        let mut values: Vec<f64> = self.samples.iter().map(|sample| sample.value).collect();
        values.sort_by(f64::total_cmp);
        nearest_rank_percentile(&values, 95.0).into()
    }

    pub fn min(&self) -> Reading {
        self.samples
            .iter()
            .map(|sample| sample.value)
            .min_by(f64::total_cmp)
            .into()
    }

    pub fn max(&self) -> Reading {
        self.samples
            .iter()
            .map(|sample| sample.value)
            .max_by(f64::total_cmp)
            .into()
    }

    /// Change per tick between the oldest and newest live samples.
    pub fn rate_of_change(&self) -> Reading {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) if last.tick > first.tick => {
                Reading::Value((last.value - first.value) / (last.tick - first.tick) as f64)
            }
            _ => Reading::InsufficientData,
        }
    }

    pub fn aggregate(&self, aggregation: Aggregation) -> Reading {
        match aggregation {
            Aggregation::Mean => self.mean(),
            Aggregation::P95 => self.p95(),
            Aggregation::Latest => self.latest(),
            Aggregation::Min => self.min(),
            Aggregation::Max => self.max(),
            Aggregation::RateOfChange => self.rate_of_change(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmDirection {
    Above,
    Below,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmSeverity {
    Warning,
    Critical,
}

impl fmt::Display for AlarmSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmSeverity::Warning => write!(f, "WARNING"),
            AlarmSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmStatus {
    Active,
    Cleared,
}

pub const CLEARED_ALARMS: usize = 64;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Alarm {
    pub id: String,
    pub kpi: String,
    pub severity: AlarmSeverity,
    pub status: AlarmStatus,
    pub value: f64,
    pub raised_at: Tick,
    pub cleared_at: Option<Tick>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KpiSummary {
    pub kpi: String,
    pub metric: Metric,
    pub target: Option<String>,
    pub count: usize,
    pub fresh: bool,
    pub latest: Reading,
    pub mean: Reading,
    pub p95: Reading,
    pub min: Reading,
    pub max: Reading,
}

#[derive(Clone, Debug)]
struct Series {
    window: KpiWindow,
    last_sample: Tick,
}

#[derive(Clone, Debug)]
pub struct KpiAggregator {
    retention: usize,
    weights: KindWeights,
    overrides: BTreeMap<String, f64>,
    alarms: Vec<KpiAlarm>,
    series: BTreeMap<KpiKey, Series>,
    last_cycle: Option<Tick>,
    active_alarms: BTreeMap<(KpiKey, AlarmSeverity), Alarm>,
    cleared_alarms: VecDeque<Alarm>,
    next_alarm: u64,
    alarms_raised: u64,
    alarms_cleared: u64,
}

impl KpiAggregator {
    pub fn new(config: &KpiConfig, overrides: BTreeMap<String, f64>) -> Self {
        Self {
            retention: config.window,
            weights: config.weights.clone(),
            overrides,
            alarms: config.alarms.clone(),
            series: BTreeMap::new(),
            last_cycle: None,
            active_alarms: BTreeMap::new(),
            cleared_alarms: VecDeque::new(),
            next_alarm: 1,
            alarms_raised: 0,
            alarms_cleared: 0,
        }
    }
    pub fn sample(&mut self, tick: Tick, snapshot: &NetworkSnapshot, traffic: &TrafficFeed) {
        for element in &snapshot.elements {
            let up = if element.state == OperationalState::Up {
                1.0
            } else {
                0.0
            };
            self.record(KpiKey::of(Metric::Availability, &element.id), tick, up);
            self.record(
                KpiKey::of(Metric::Health, &element.id),
                tick,
                f64::from(element.health),
            );
        }

        for link in &snapshot.links {
            self.record(KpiKey::of(Metric::Latency, &link.id), tick, link.latency_ms);
            self.record(KpiKey::of(Metric::Throughput, &link.id), tick, link.throughput);
            self.record(
                KpiKey::of(Metric::Utilization, &link.id),
                tick,
                link.utilization / link.capacity,
            );

            let fresh = traffic.get(&link.id);
            if let Some(metrics) = fresh {
                self.record(KpiKey::of(Metric::PacketLoss, &link.id), tick, metrics.loss);
                self.record(KpiKey::of(Metric::Jitter, &link.id), tick, metrics.jitter_ms);
            }
            let error_rate = if link.state == OperationalState::Down {
                Some(1.0)
            } else {
                fresh.map(|metrics| metrics.loss)
            };
            if let Some(rate) = error_rate {
                self.record(KpiKey::of(Metric::ErrorRate, &link.id), tick, rate);
            }
        }

        if let Some(health) = self.network_health(snapshot) {
            self.record(KpiKey::network(), tick, health);
        }

        self.last_cycle = Some(tick);
        self.update_alarms(tick);
        debug!(tick, series = self.series.len(), "KPI cycle complete");
    }

    fn record(&mut self, key: KpiKey, tick: Tick, value: f64) {
        let retention = self.retention;
        let series = self.series.entry(key).or_insert_with(|| Series {
            window: KpiWindow::new(retention),
            last_sample: tick,
        });
        series.window.push(tick, value);
        series.last_sample = tick;
    }

    fn network_health(&self, snapshot: &NetworkSnapshot) -> Option<f64> {
        let mut weighted = 0.0;
        let mut total = 0.0;
        for element in &snapshot.elements {
            let weight = self
                .overrides
                .get(&element.id)
                .copied()
                .unwrap_or(match element.kind {
                    ElementKind::RadioNode => self.weights.radio,
                    ElementKind::CoreNode => self.weights.core,
                    ElementKind::Link => self.weights.link,
                });
            weighted += weight * f64::from(element.health);
            total += weight;
        }
        (total > 0.0).then(|| weighted / total)
    }

    fn is_fresh(&self, key: &KpiKey, series: &Series) -> bool {
        !key.metric.traffic_derived() || Some(series.last_sample) == self.last_cycle
    }

    pub fn reading(&self, key: &KpiKey, aggregation: Aggregation) -> Reading {
        match self.series.get(key) {
            Some(series) if self.is_fresh(key, series) => series.window.aggregate(aggregation),
            _ => Reading::InsufficientData,
        }
    }

    pub fn window(&self, key: &KpiKey) -> Option<&KpiWindow> {
        self.series.get(key).map(|series| &series.window)
    }

    pub fn last_cycle(&self) -> Option<Tick> {
        self.last_cycle
    }

    pub fn active_alarms(&self) -> impl Iterator<Item = &Alarm> {
        self.active_alarms.values()
    }

    pub fn cleared_alarms(&self) -> impl Iterator<Item = &Alarm> {
        self.cleared_alarms.iter()
    }

    pub fn alarms_raised(&self) -> u64 {
        self.alarms_raised
    }

    pub fn alarms_cleared(&self) -> u64 {
        self.alarms_cleared
    }

    pub fn summaries(&self) -> Vec<KpiSummary> {
        self.series
            .iter()
            .map(|(key, series)| {
                let fresh = self.is_fresh(key, series);
                let window = &series.window;
                let gate = |reading: Reading| {
                    if fresh {
                        reading
                    } else {
                        Reading::InsufficientData
                    }
                };
                KpiSummary {
                    kpi: key.to_string(),
                    metric: key.metric,
                    target: key.target.clone(),
                    count: window.len(),
                    fresh,
                    latest: gate(window.latest()),
                    mean: gate(window.mean()),
                    p95: gate(window.p95()),
                    min: gate(window.min()),
                    max: gate(window.max()),
                }
            })
            .collect()
    }

    /// An alarm is raised once per (KPI, severity) breach and stays active
    /// until a reading for that KPI no longer breaches at that severity.
    /// Insufficient data neither raises nor clears.
    fn update_alarms(&mut self, tick: Tick) {
        let mut observed = BTreeSet::new();
        let mut breaches = BTreeMap::new();
        for alarm in &self.alarms {
            for key in self.series.keys().filter(|key| key.metric == alarm.metric) {
                let Some(value) = self.reading(key, Aggregation::Mean).value() else {
                    continue;
                };
                observed.insert(key.clone());
                let breached = |limit: f64| match alarm.direction {
                    AlarmDirection::Above => value > limit,
                    AlarmDirection::Below => value < limit,
                };
                let severity = if breached(alarm.critical) {
                    AlarmSeverity::Critical
                } else if breached(alarm.warning) {
                    AlarmSeverity::Warning
                } else {
                    continue;
                };
                breaches.insert((key.clone(), severity), value);
            }
        }

        let ended: Vec<(KpiKey, AlarmSeverity)> = self
            .active_alarms
            .keys()
            .filter(|entry| observed.contains(&entry.0) && !breaches.contains_key(*entry))
            .cloned()
            .collect();
        for entry in ended {
            let Some(mut alarm) = self.active_alarms.remove(&entry) else {
                continue;
            };
            alarm.status = AlarmStatus::Cleared;
            alarm.cleared_at = Some(tick);
            info!(tick, alarm = %alarm.id, kpi = %alarm.kpi, "KPI alarm cleared");
            self.alarms_cleared += 1;
            if self.cleared_alarms.len() == CLEARED_ALARMS {
                self.cleared_alarms.pop_front();
            }
            self.cleared_alarms.push_back(alarm);
        }

        for (entry, value) in breaches {
            if let Some(alarm) = self.active_alarms.get_mut(&entry) {
                alarm.value = value;
                continue;
            }
            let id = format!("ALM-{:04}", self.next_alarm);
            self.next_alarm += 1;
            self.alarms_raised += 1;
            let (key, severity) = &entry;
            warn!(tick, alarm = %id, kpi = %key, %severity, value, "KPI alarm raised");
            let alarm = Alarm {
                id,
                kpi: key.to_string(),
                severity: *severity,
                status: AlarmStatus::Active,
                value,
                raised_at: tick,
                cleared_at: None,
            };
            self.active_alarms.insert(entry, alarm);
        }
    }
}

fn nearest_rank_percentile(sorted: &[f64], percentile: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(sorted.len() - 1);
    Some(sorted[idx])
}
