use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use crate::events::{EventKind, EventQueue, ScheduledEvent};
use crate::models::{ScriptedEvent, SimulatorConfig, Tick};
use crate::network::{ElementKind, EventOutcome, NetworkModel};
use crate::scenario::{self, Scenario};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status", content = "reason")]
pub enum RecordOutcome {
    Applied,
    Ignored,
    Dropped(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EventRecord {
    pub seq: u64,
    pub tick: Tick,
    pub event: EventKind,
    pub outcome: RecordOutcome,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EventCounts {
    pub applied: u64,
    pub ignored: u64,
    pub dropped: u64,
    pub generated: u64,
    pub scenarios: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScenarioRun {
    pub tick: Tick,
    pub scenario: String,
    /// `(due tick, event)` for every step whose roll passed.
    pub scheduled: Vec<(Tick, EventKind)>,
}

#[derive(Debug)]
pub struct EventSimulator {
    queue: EventQueue,
    rng: StdRng,
    config: SimulatorConfig,
    element_ids: Vec<String>,
    link_ids: Vec<String>,
    targets: Vec<(String, ElementKind)>,
    scenarios: Vec<Scenario>,
    runs: VecDeque<ScenarioRun>,
    log: VecDeque<EventRecord>,
    counts: EventCounts,
}

impl EventSimulator {
    pub fn new(
        config: &SimulatorConfig,
        seed: u64,
        model: &NetworkModel,
        scripted: &[ScriptedEvent],
        scenarios: &[Scenario],
    ) -> Self {
        let mut queue = EventQueue::new();
        for entry in scripted {
            queue.schedule(entry.tick, entry.event.clone());
        }
        Self {
            queue,
            rng: StdRng::seed_from_u64(seed),
            config: config.clone(),
            element_ids: model.element_ids(),
            link_ids: model.link_ids(),
            targets: scenario::targets(model),
            scenarios: scenarios.to_vec(),
            runs: VecDeque::new(),
            log: VecDeque::new(),
            counts: EventCounts::default(),
        }
    }

    pub fn schedule(&mut self, tick: Tick, event: EventKind) -> u64 {
        self.queue.schedule(tick, event)
    }

    /// Rolls scenarios and random faults for this tick, then applies every
    /// event due at or before `now` in `(tick, seq)` order.
    pub fn advance(&mut self, now: Tick, model: &mut NetworkModel) {
        self.start_scenario(now);
        self.generate(now);
        while let Some(scheduled) = self.queue.pop_due(now) {
            let outcome = match model.apply_event(&scheduled) {
                Ok(EventOutcome::Applied) => {
                    self.counts.applied += 1;
                    self.schedule_recovery(now, &scheduled);
                    RecordOutcome::Applied
                }
                Ok(EventOutcome::Ignored) => {
                    self.counts.ignored += 1;
                    RecordOutcome::Ignored
                }
                Err(err) => {
                    self.counts.dropped += 1;
                    warn!(tick = now, seq = scheduled.seq, event = %scheduled.event, %err, "Dropping event");
                    RecordOutcome::Dropped(err.to_string())
                }
            };
            debug!(tick = now, seq = scheduled.seq, event = %scheduled.event, ?outcome, "Event processed");
            self.log(scheduled, outcome);
        }
    }

    fn generate(&mut self, now: Tick) {
        let rate = self.config.fault_rate.clamp(0.0, 1.0);
        if rate == 0.0 || self.element_ids.is_empty() || !self.rng.gen_bool(rate) {
            return;
        }

        let roll: f64 = self.rng.gen();
        let event = if roll < self.config.hard_failure_rate {
            EventKind::Fail {
                element: self.pick_element(),
            }
        } else if roll < self.config.hard_failure_rate + self.config.spike_rate
            && !self.link_ids.is_empty()
        {
            let idx = self.rng.gen_range(0..self.link_ids.len());
            EventKind::TrafficSpike {
                link: self.link_ids[idx].clone(),
                magnitude: self
                    .rng
                    .gen_range(self.config.spike_min..=self.config.spike_max),
            }
        } else {
            EventKind::Degrade {
                element: self.pick_element(),
                severity: self
                    .rng
                    .gen_range(self.config.severity_min..=self.config.severity_max),
            }
        };
        self.counts.generated += 1;
        debug!(tick = now, event = %event, "Generated random event");
        self.queue.schedule(now, event);
    }

    fn start_scenario(&mut self, now: Tick) {
        let rate = self.config.scenario_rate.clamp(0.0, 1.0);
        if rate == 0.0 || self.scenarios.is_empty() || !self.rng.gen_bool(rate) {
            return;
        }
        let index = self.rng.gen_range(0..self.scenarios.len());
        let chosen = self.scenarios[index].clone();
        self.run_scenario(now, &chosen);
    }
    pub fn run_scenario(&mut self, now: Tick, scenario: &Scenario) {
        info!(tick = now, scenario = %scenario.name, "Scenario started");
        self.counts.scenarios += 1;
        let mut scheduled = Vec::new();
        for step in &scenario.steps {
            if self.rng.gen::<f64>() >= step.probability {
                debug!(tick = now, scenario = %scenario.name, event = ?step.event, "Scenario step skipped");
                continue;
            }
            let candidates: Vec<&String> = self
                .targets
                .iter()
                .filter(|(id, kind)| step.target.matches(id, *kind))
                .map(|(id, _)| id)
                .collect();
            if candidates.is_empty() {
                warn!(tick = now, scenario = %scenario.name, target = ?step.target, "No element matches scenario step");
                continue;
            }
            let target = candidates[self.rng.gen_range(0..candidates.len())].clone();
            let event = step.event.at(target);
            let due = now + step.delay;
            self.queue.schedule(due, event.clone());
            self.counts.generated += 1;
            scheduled.push((due, event));
        }

        if self.config.event_log == 0 {
            return;
        }
        if self.runs.len() == self.config.event_log {
            self.runs.pop_front();
        }
        self.runs.push_back(ScenarioRun {
            tick: now,
            scenario: scenario.name.clone(),
            scheduled,
        });
    }

    pub fn scenario_runs(&self) -> impl Iterator<Item = &ScenarioRun> {
        self.runs.iter()
    }

    fn pick_element(&mut self) -> String {
        let idx = self.rng.gen_range(0..self.element_ids.len());
        self.element_ids[idx].clone()
    }

    fn schedule_recovery(&mut self, now: Tick, scheduled: &ScheduledEvent) {
        let target = match &scheduled.event {
            EventKind::Degrade { element, .. } | EventKind::Fail { element } => element,
            EventKind::TrafficSpike { link, .. } => link,
            EventKind::Recover { .. } | EventKind::Custom { .. } => return,
        };
        let delay = self
            .rng
            .gen_range(self.config.recover_after_min..=self.config.recover_after_max)
            .max(1);
        self.queue.schedule(
            now + delay,
            EventKind::Recover {
                element: target.clone(),
            },
        );
    }

    fn log(&mut self, scheduled: ScheduledEvent, outcome: RecordOutcome) {
        if self.config.event_log == 0 {
            return;
        }
        if self.log.len() == self.config.event_log {
            self.log.pop_front();
        }
        self.log.push_back(EventRecord {
            seq: scheduled.seq,
            tick: scheduled.tick,
            event: scheduled.event,
            outcome,
        });
    }

    pub fn records(&self) -> impl Iterator<Item = &EventRecord> {
        self.log.iter()
    }
    pub fn filter<'a>(
        &'a self,
        element: Option<&'a str>,
        kind: Option<&'a str>,
    ) -> impl Iterator<Item = &'a EventRecord> + 'a {
        self.log.iter().filter(move |record| {
            element.map_or(true, |id| record.event.target() == Some(id))
                && kind.map_or(true, |label| record.event.label() == label)
        })
    }

    pub fn counts(&self) -> EventCounts {
        self.counts
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn next_due(&self) -> Option<Tick> {
        self.queue.peek_tick()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ElementConfig, LinkConfig, NodeKind, SimConfig};
    use crate::network::OperationalState;
    use crate::scenario::{ScenarioStep, StepEvent, StepTarget};

    fn config() -> SimConfig {
        SimConfig {
            elements: vec![
                ElementConfig {
                    id: "R1".to_string(),
                    kind: NodeKind::RadioNode,
                    weight: None,
                },
                ElementConfig {
                    id: "C1".to_string(),
                    kind: NodeKind::CoreNode,
                    weight: None,
                },
            ],
            links: vec![LinkConfig {
                id: "L1".to_string(),
                endpoints: ["R1".to_string(), "C1".to_string()],
                capacity: 100.0,
                latency_ms: 5.0,
                base_utilization: 30.0,
                base_loss: 0.0,
                weight: None,
            }],
            ..SimConfig::default()
        }
    }

    fn scripted(tick: Tick, event: EventKind) -> ScriptedEvent {
        ScriptedEvent { tick, event }
    }

    fn fixed_recovery(after: Tick) -> SimulatorConfig {
        SimulatorConfig {
            recover_after_min: after,
            recover_after_max: after,
            ..SimulatorConfig::default()
        }
    }

    #[test]
    fn scripted_fault_recovers_after_delay() {
        let config = config();
        let mut model = NetworkModel::from_config(&config).expect("valid");
        let mut sim = EventSimulator::new(
            &fixed_recovery(5),
            1,
            &model,
            &[scripted(
                2,
                EventKind::Degrade {
                    element: "R1".to_string(),
                    severity: 30,
                },
            )],
            &[],
        );

        for tick in 0..7 {
            sim.advance(tick, &mut model);
        }
        assert_eq!(model.state_of("R1"), Some(OperationalState::Degraded));
        sim.advance(7, &mut model);
        assert_eq!(model.state_of("R1"), Some(OperationalState::Up));

        let labels: Vec<&str> = sim.records().map(|r| r.event.label()).collect();
        assert_eq!(labels, vec!["degrade", "recover"]);
        assert_eq!(sim.counts().applied, 2);
    }

    #[test]
    fn unknown_targets_are_dropped_not_fatal() {
        let config = config();
        let mut model = NetworkModel::from_config(&config).expect("valid");
        let mut sim = EventSimulator::new(&fixed_recovery(5), 1, &model, &[], &[]);
        sim.schedule(
            0,
            EventKind::Fail {
                element: "ghost".to_string(),
            },
        );
        sim.schedule(
            0,
            EventKind::Custom {
                payload: "audit".to_string(),
            },
        );
        sim.advance(0, &mut model);

        let counts = sim.counts();
        assert_eq!(counts.dropped, 1);
        assert_eq!(counts.ignored, 1);
        let first = sim.records().next().expect("logged");
        assert!(matches!(&first.outcome, RecordOutcome::Dropped(reason) if reason.contains("ghost")));
        assert_eq!(sim.pending(), 0);
    }

    #[test]
    fn same_seed_generates_identical_streams() {
        let config = config();
        let sim_config = SimulatorConfig {
            fault_rate: 0.5,
            ..SimulatorConfig::default()
        };
        let run = || {
            let mut model = NetworkModel::from_config(&config).expect("valid");
            let mut sim = EventSimulator::new(&sim_config, 99, &model, &[], &[]);
            for tick in 0..200 {
                sim.advance(tick, &mut model);
            }
            sim.records().cloned().collect::<Vec<_>>()
        };
        let first = run();
        assert!(!first.is_empty());
        assert_eq!(first, run());
    }

    #[test]
    fn event_log_is_bounded_and_filterable() {
        let config = config();
        let mut model = NetworkModel::from_config(&config).expect("valid");
        let sim_config = SimulatorConfig {
            event_log: 3,
            ..fixed_recovery(100)
        };
        let mut sim = EventSimulator::new(&sim_config, 1, &model, &[], &[]);
        for tick in 0..5 {
            sim.schedule(
                tick,
                EventKind::TrafficSpike {
                    link: "L1".to_string(),
                    magnitude: 1.0,
                },
            );
        }
        sim.schedule(
            5,
            EventKind::Degrade {
                element: "R1".to_string(),
                severity: 10,
            },
        );
        for tick in 0..6 {
            sim.advance(tick, &mut model);
        }

        assert_eq!(sim.records().count(), 3);
        assert_eq!(sim.filter(Some("L1"), None).count(), 2);
        assert_eq!(sim.filter(None, Some("degrade")).count(), 1);
        assert_eq!(sim.filter(Some("R1"), Some("traffic-spike")).count(), 0);
        assert_eq!(sim.next_due(), Some(100));
    }

    fn step(event: StepEvent, target: StepTarget, probability: f64, delay: Tick) -> ScenarioStep {
        ScenarioStep {
            event,
            target,
            probability,
            delay,
        }
    }

    fn flapping() -> Scenario {
        Scenario {
            name: "flap".to_string(),
            description: String::new(),
            steps: vec![
                step(StepEvent::Degrade { severity: 40 }, StepTarget::Any, 0.5, 0),
                step(
                    StepEvent::TrafficSpike { magnitude: 20.0 },
                    StepTarget::Link,
                    0.7,
                    1,
                ),
                step(StepEvent::Recover, StepTarget::Any, 1.0, 3),
            ],
        }
    }

    #[test]
    fn seeded_scenarios_replay_identically() {
        let config = config();
        let sim_config = SimulatorConfig {
            scenario_rate: 0.3,
            ..fixed_recovery(5)
        };
        let run = |seed: u64| {
            let mut model = NetworkModel::from_config(&config).expect("valid");
            let mut sim = EventSimulator::new(&sim_config, seed, &model, &[], &[flapping()]);
            for tick in 0..200 {
                sim.advance(tick, &mut model);
            }
            assert_eq!(sim.counts().scenarios, sim.scenario_runs().count() as u64);
            (
                sim.scenario_runs().cloned().collect::<Vec<_>>(),
                sim.records().cloned().collect::<Vec<_>>(),
            )
        };

        let first = run(5);
        assert!(!first.0.is_empty());
        assert!(first.0.iter().all(|run| run.scenario == "flap"));
        assert_eq!(first, run(5));
        assert_ne!(first.0, run(6).0);
    }

    #[test]
    fn scenario_steps_honour_probability_and_delay() {
        let config = config();
        let mut model = NetworkModel::from_config(&config).expect("valid");
        let mut sim = EventSimulator::new(&fixed_recovery(50), 1, &model, &[], &[]);
        let scenario = Scenario {
            name: "r1-outage".to_string(),
            description: String::new(),
            steps: vec![
                step(StepEvent::Fail, StepTarget::Id("R1".to_string()), 1.0, 2),
                step(
                    StepEvent::Degrade { severity: 20 },
                    StepTarget::Id("C1".to_string()),
                    0.0,
                    0,
                ),
                step(StepEvent::Fail, StepTarget::Prefix("X".to_string()), 1.0, 0),
            ],
        };

        sim.run_scenario(4, &scenario);
        let run = sim.scenario_runs().next().expect("run logged");
        assert_eq!(
            run.scheduled,
            vec![(
                6,
                EventKind::Fail {
                    element: "R1".to_string()
                }
            )]
        );
        assert_eq!(sim.counts().scenarios, 1);
        assert_eq!(sim.counts().generated, 1);

        sim.advance(4, &mut model);
        sim.advance(5, &mut model);
        assert_eq!(model.state_of("R1"), Some(OperationalState::Up));
        sim.advance(6, &mut model);
        assert_eq!(model.state_of("R1"), Some(OperationalState::Down));
        assert_eq!(model.state_of("C1"), Some(OperationalState::Up));
    }

    #[test]
    fn zero_scenario_rate_leaves_the_fault_stream_untouched() {
        let config = config();
        let with_rate = |scenario_rate: f64, scenarios: &[Scenario]| {
            let sim_config = SimulatorConfig {
                fault_rate: 0.5,
                scenario_rate,
                ..SimulatorConfig::default()
            };
            let mut model = NetworkModel::from_config(&config).expect("valid");
            let mut sim = EventSimulator::new(&sim_config, 99, &model, &[], scenarios);
            for tick in 0..100 {
                sim.advance(tick, &mut model);
            }
            sim.records().cloned().collect::<Vec<_>>()
        };
        assert_eq!(with_rate(0.0, &[flapping()]), with_rate(0.0, &[]));
        assert_eq!(with_rate(0.4, &[]), with_rate(0.0, &[]));
    }
}
