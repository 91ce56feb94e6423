use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

use crate::automation::AutomationEngine;
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::kpi::{Aggregation, KpiAggregator, KpiKey};
use crate::models::{SimConfig, Tick};
use crate::network::NetworkModel;
use crate::policy::validate_policies;
use crate::publisher::{publish, PublishedState};
use crate::scenario::validate_scenarios;
use crate::simulator::EventSimulator;
use crate::state::{RunMetadata, RunReport, RunSummary};
use crate::traffic::{build_traffic_source, TrafficContext, TrafficSource};

/// Cooperative stop signal, observed at the next tick boundary.
#[derive(Clone, Debug)]
pub struct StopHandle {
    tx: Sender<()>,
}

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.tx.try_send(());
    }
}

pub struct SimulationHandle {
    thread: JoinHandle<RunReport>,
    stop: StopHandle,
    snapshots: Option<Receiver<Arc<PublishedState>>>,
}

impl SimulationHandle {
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn snapshots(&mut self) -> Option<Receiver<Arc<PublishedState>>> {
        self.snapshots.take()
    }
    pub fn stop(self) -> Result<RunReport> {
        self.stop.stop();
        self.join()
    }

    pub fn join(self) -> Result<RunReport> {
        drop(self.snapshots);
        self.thread
            .join()
            .map_err(|_| Error::Thread("simulation thread panicked".to_string()))
    }
}

enum Delivery {
    Sent,
    ConsumerGone,
    StopRequested,
    StopDetached,
}

/// Owns the model and steps Simulator -> KPI Aggregator -> Automation once
/// per tick. The model is only ever mutated through `&mut` handed to one stage
/// at a time.
pub struct SimulationEngine {
    pub config: SimConfig,
    clock: Tick,
    ticks_run: Tick,
    model: NetworkModel,
    simulator: EventSimulator,
    kpis: KpiAggregator,
    automation: AutomationEngine,
    traffic: Box<dyn TrafficSource + Send>,
    feed: Option<Sender<Arc<PublishedState>>>,
    stop: Option<Receiver<()>>,
    stop_requested: bool,
    stopped_early: bool,
}

impl SimulationEngine {
    pub fn new(config: SimConfig) -> Result<Self> {
        let model = NetworkModel::from_config(&config)?;
        validate_config(&config)?;
        validate_policies(&config.policies, &model)?;
        validate_scenarios(&config.scenarios, &model)?;

        let overrides: BTreeMap<String, f64> = config
            .elements
            .iter()
            .filter_map(|element| element.weight.map(|weight| (element.id.clone(), weight)))
            .chain(
                config
                    .links
                    .iter()
                    .filter_map(|link| link.weight.map(|weight| (link.id.clone(), weight))),
            )
            .collect();

        let simulator = EventSimulator::new(
            &config.simulator,
            config.seed,
            &model,
            &config.events,
            &config.scenarios,
        );
        let kpis = KpiAggregator::new(&config.kpi, overrides);
        let automation = AutomationEngine::new(&config.automation, config.policies.clone());
        let traffic = build_traffic_source(config.traffic, config.seed);

        info!(
            seed = config.seed,
            ticks = config.clock.ticks,
            policies = config.policies.len(),
            traffic = %config.traffic,
            "Simulation engine ready"
        );

        Ok(Self {
            config,
            clock: 0,
            ticks_run: 0,
            model,
            simulator,
            kpis,
            automation,
            traffic,
            feed: None,
            stop: None,
            stop_requested: false,
            stopped_early: false,
        })
    }

    pub fn with_traffic_source(mut self, traffic: Box<dyn TrafficSource + Send>) -> Self {
        self.traffic = traffic;
        self
    }

    /// Opens the snapshot feed. A full channel blocks the loop until the
    /// consumer catches up or a stop is requested.
    pub fn subscribe(&mut self, capacity: usize) -> Receiver<Arc<PublishedState>> {
        let (tx, rx) = channel::bounded(capacity);
        self.feed = Some(tx);
        rx
    }

    pub fn stop_handle(&mut self) -> StopHandle {
        let (tx, rx) = channel::bounded(1);
        self.stop = Some(rx);
        StopHandle { tx }
    }

    pub fn schedule_event(&mut self, tick: Tick, event: EventKind) -> u64 {
        self.simulator.schedule(tick, event)
    }

    pub fn now(&self) -> Tick {
        self.clock
    }

    pub fn model(&self) -> &NetworkModel {
        &self.model
    }

    pub fn kpis(&self) -> &KpiAggregator {
        &self.kpis
    }

    pub fn automation(&self) -> &AutomationEngine {
        &self.automation
    }

    pub fn simulator(&self) -> &EventSimulator {
        &self.simulator
    }
    pub fn step(&mut self) {
        let now = self.clock;
        self.simulator.advance(now, &mut self.model);

        if now % self.config.clock.kpi_interval == 0 {
            let snapshot = self.model.snapshot();
            let feed = self.traffic.sample(&TrafficContext {
                tick: now,
                links: &snapshot.links,
            });
            self.kpis.sample(now, &snapshot, &feed);
        }

        if now % self.config.clock.decision_interval == 0 {
            self.automation.run_cycle(now, &self.kpis, &mut self.model);
            self.deliver();
        }

        self.clock += 1;
        self.ticks_run += 1;
    }

    pub fn publish(&self) -> PublishedState {
        publish(self.clock, &self.model, &self.kpis, &self.automation)
    }

    pub fn run(&mut self) -> RunReport {
        self.run_with(|_| {})
    }

    /// Runs the configured number of ticks, calling `between_ticks` after each
    /// one. Pacing against wall-clock time belongs in that callback.
    pub fn run_with<F: FnMut(Tick)>(&mut self, mut between_ticks: F) -> RunReport {
        let end = self.clock + self.config.clock.ticks;
        info!(from = self.clock, to = end, "Simulation started");
        while self.clock < end {
            if self.stop_requested || self.poll_stop() {
                info!(tick = self.clock, "Stop requested");
                self.stopped_early = true;
                break;
            }
            self.step();
            between_ticks(self.clock);
        }
        self.shutdown();
        info!(tick = self.clock, ticks = self.ticks_run, "Simulation finished");
        self.report()
    }
    pub fn shutdown(&mut self) {
        self.automation.shutdown(self.clock);
    }

    pub fn report(&self) -> RunReport {
        let stats = self.automation.stats().clone();
        let mut actions: Vec<_> = self
            .automation
            .archive()
            .chain(self.automation.live())
            .cloned()
            .collect();
        actions.sort_by_key(|action| action.id);

        RunReport {
            metadata: RunMetadata {
                seed: self.config.seed,
                ticks: self.ticks_run,
                kpi_interval: self.config.clock.kpi_interval,
                decision_interval: self.config.clock.decision_interval,
                traffic: self.traffic.name().to_string(),
                stopped_early: self.stopped_early,
            },
            summary: RunSummary {
                events: self.simulator.counts(),
                automation: stats,
                alarms_raised: self.kpis.alarms_raised(),
                alarms_cleared: self.kpis.alarms_cleared(),
                network_health: self.kpis.reading(&KpiKey::network(), Aggregation::Latest),
            },
            events: self.simulator.records().cloned().collect(),
            scenarios: self.simulator.scenario_runs().cloned().collect(),
            actions,
            final_state: self.publish(),
        }
    }
    pub fn spawn(mut self) -> Result<SimulationHandle> {
        let stop = self.stop_handle();
        thread::Builder::new()
            .name("oam-sim-loop".to_string())
            .spawn(move || self.run())
            .map(|thread| SimulationHandle {
                thread,
                stop,
                snapshots: None,
            })
            .map_err(|err| Error::Thread(format!("failed to spawn: {}", err)))
    }
    pub fn spawn_with_feed(mut self, capacity: usize) -> Result<SimulationHandle> {
        let snapshots = self.subscribe(capacity);
        let mut handle = self.spawn()?;
        handle.snapshots = Some(snapshots);
        Ok(handle)
    }

    fn poll_stop(&mut self) -> bool {
        let Some(stop) = self.stop.as_ref() else {
            return false;
        };
        match stop.try_recv() {
            Ok(()) => true,
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.stop = None;
                false
            }
        }
    }

    fn deliver(&mut self) {
        if self.feed.is_none() {
            return;
        }
        let state = Arc::new(self.publish());
        let Some(tx) = self.feed.as_ref() else {
            return;
        };
        let outcome = match self.stop.as_ref() {
            Some(stop) => crossbeam::channel::select! {
                send(tx, Arc::clone(&state)) -> res => {
                    if res.is_ok() { Delivery::Sent } else { Delivery::ConsumerGone }
                }
                recv(stop) -> msg => {
                    if msg.is_ok() { Delivery::StopRequested } else { Delivery::StopDetached }
                }
            },
            None => {
                if tx.send(Arc::clone(&state)).is_ok() {
                    Delivery::Sent
                } else {
                    Delivery::ConsumerGone
                }
            }
        };

        match outcome {
            Delivery::Sent => {}
            Delivery::ConsumerGone => {
                debug!(tick = self.clock, "Snapshot consumer disconnected");
                self.feed = None;
            }
            Delivery::StopRequested => self.stop_requested = true,
            Delivery::StopDetached => {
                self.stop = None;
                let delivered = self
                    .feed
                    .as_ref()
                    .is_some_and(|tx| tx.send(state).is_ok());
                if !delivered {
                    self.feed = None;
                }
            }
        }
    }
}

pub fn run_simulation(config: &SimConfig) -> Result<RunReport> {
    let mut engine = SimulationEngine::new(config.clone())?;
    Ok(engine.run())
}

/// Wall-clock interval between ticks when pacing at `rate` Hz.
pub fn tick_period(rate: f64) -> Result<Duration> {
    if !(rate > 0.0) || !rate.is_finite() {
        return Err(Error::InvalidClock("tick_rate_hz must be > 0".to_string()));
    }
    Duration::try_from_secs_f64(1.0 / rate).map_err(|_| {
        Error::InvalidClock(format!("tick_rate_hz {} is too small to pace", rate))
    })
}

pub fn validate_config(config: &SimConfig) -> Result<()> {
    let clock = &config.clock;
    if clock.kpi_interval == 0 {
        return Err(Error::InvalidClock("kpi_interval must be >= 1".to_string()));
    }
    if clock.decision_interval < clock.kpi_interval
        || clock.decision_interval % clock.kpi_interval != 0
    {
        return Err(Error::InvalidClock(
            "decision_interval must be a multiple of kpi_interval".to_string(),
        ));
    }
    if let Some(rate) = clock.tick_rate_hz {
        tick_period(rate)?;
    }

    if config.kpi.window == 0 {
        return Err(Error::InvalidWindow);
    }
    let weights = &config.kpi.weights;
    for (kind, weight) in [
        ("radio", weights.radio),
        ("core", weights.core),
        ("link", weights.link),
    ] {
        if !(weight >= 0.0) || !weight.is_finite() {
            return Err(Error::InvalidWeight(kind.to_string()));
        }
    }

    let automation = &config.automation;
    if automation.max_attempts == 0 {
        return Err(Error::InvalidAutomation(
            "max_attempts must be >= 1".to_string(),
        ));
    }
    if automation.backoff_cap < automation.backoff_base {
        return Err(Error::InvalidAutomation(
            "backoff_cap must be >= backoff_base".to_string(),
        ));
    }
    if automation.history_limit == 0 {
        return Err(Error::InvalidAutomation(
            "history_limit must be >= 1".to_string(),
        ));
    }

    let sim = &config.simulator;
    for (name, probability) in [
        ("fault_rate", sim.fault_rate),
        ("hard_failure_rate", sim.hard_failure_rate),
        ("spike_rate", sim.spike_rate),
        ("scenario_rate", sim.scenario_rate),
    ] {
        if !(0.0..=1.0).contains(&probability) {
            return Err(Error::InvalidSimulator(format!(
                "{} must be within [0, 1]",
                name
            )));
        }
    }
    if sim.severity_min > sim.severity_max {
        return Err(Error::InvalidSimulator(
            "severity_min must be <= severity_max".to_string(),
        ));
    }
    if !(sim.spike_min >= 0.0) || !(sim.spike_min <= sim.spike_max) || !sim.spike_max.is_finite()
    {
        return Err(Error::InvalidSimulator(
            "spike range must satisfy 0 <= spike_min <= spike_max".to_string(),
        ));
    }
    if sim.recover_after_min > sim.recover_after_max {
        return Err(Error::InvalidSimulator(
            "recover_after_min must be <= recover_after_max".to_string(),
        ));
    }

    Ok(())
}
