use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::events::{EventKind, ScheduledEvent};
use crate::models::{LinkConfig, ModelConfig, NodeKind, SimConfig, Tick};

pub const MAX_HEALTH: u8 = 100;

/// Utilization ratio above which latency starts to climb.
const LATENCY_KNEE: f64 = 0.8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementKind {
    RadioNode,
    CoreNode,
    Link,
}

impl From<NodeKind> for ElementKind {
    fn from(value: NodeKind) -> Self {
        match value {
            NodeKind::RadioNode => ElementKind::RadioNode,
            NodeKind::CoreNode => ElementKind::CoreNode,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ElementKind::RadioNode => "radio-node",
            ElementKind::CoreNode => "core-node",
            ElementKind::Link => "link",
        };
        write!(f, "{}", label)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationalState {
    Up,
    Degraded,
    Down,
}

impl OperationalState {
    fn rank(self) -> u8 {
        match self {
            OperationalState::Up => 0,
            OperationalState::Degraded => 1,
            OperationalState::Down => 2,
        }
    }

    pub fn is_adjacent(self, other: OperationalState) -> bool {
        self.rank().abs_diff(other.rank()) <= 1
    }

    /// Next state on the way back to `Up`.
    fn toward_up(self) -> Option<OperationalState> {
        match self {
            OperationalState::Up => None,
            OperationalState::Degraded => Some(OperationalState::Up),
            OperationalState::Down => Some(OperationalState::Degraded),
        }
    }
}

impl fmt::Display for OperationalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OperationalState::Up => "up",
            OperationalState::Degraded => "degraded",
            OperationalState::Down => "down",
        };
        write!(f, "{}", label)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cause {
    Degradation,
    HardFailure,
    Recovery,
    Remediation,
    Congestion,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Transition {
    pub tick: Tick,
    pub from: OperationalState,
    pub to: OperationalState,
    pub cause: Cause,
}

#[derive(Clone, Debug)]
pub struct NetworkElement {
    pub id: String,
    pub kind: ElementKind,
    pub state: OperationalState,
    pub health: u8,
    pub last_transition: Tick,
    pub active_faults: BTreeSet<String>,
    pub incidents: BTreeSet<String>,
    pub weight: Option<f64>,
    history: VecDeque<Transition>,
}

impl NetworkElement {
    fn new(id: String, kind: ElementKind, weight: Option<f64>) -> Self {
        Self {
            id,
            kind,
            state: OperationalState::Up,
            health: MAX_HEALTH,
            last_transition: 0,
            active_faults: BTreeSet::new(),
            incidents: BTreeSet::new(),
            weight,
            history: VecDeque::new(),
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &Transition> {
        self.history.iter()
    }

    fn last_cause(&self) -> Option<Cause> {
        self.history.back().map(|transition| transition.cause)
    }
}

#[derive(Clone, Debug)]
pub struct Link {
    pub id: String,
    pub endpoints: [String; 2],
    pub capacity: f64,
    pub base_utilization: f64,
    pub utilization: f64,
    pub base_latency_ms: f64,
    pub latency_ms: f64,
    pub base_loss: f64,
    pub packet_loss: f64,
    pub throttle: Option<f64>,
}

impl Link {
    fn from_config(config: &LinkConfig) -> Self {
        let mut link = Self {
            id: config.id.clone(),
            endpoints: config.endpoints.clone(),
            capacity: config.capacity,
            base_utilization: config.base_utilization,
            utilization: config.base_utilization,
            base_latency_ms: config.latency_ms,
            latency_ms: config.latency_ms,
            base_loss: config.base_loss,
            packet_loss: config.base_loss,
            throttle: None,
        };
        link.recompute(OperationalState::Up);
        link
    }

    pub fn load_ratio(&self) -> f64 {
        self.utilization / self.capacity
    }

    fn admit(&mut self, extra: f64) {
        let mut next = (self.utilization + extra).max(0.0);
        if let Some(limit) = self.throttle {
            next = next.min(limit);
        }
        self.utilization = next;
    }

    fn recompute(&mut self, state: OperationalState) {
        let ratio = self.load_ratio();
        self.latency_ms = self.base_latency_ms * (1.0 + 4.0 * (ratio - LATENCY_KNEE).max(0.0));
        self.packet_loss = if state == OperationalState::Down {
            1.0
        } else {
            (self.base_loss + 0.5 * (ratio - 1.0).max(0.0)).min(1.0)
        };
    }

    fn reset(&mut self, state: OperationalState) {
        self.utilization = self.base_utilization;
        self.throttle = None;
        self.recompute(state);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventOutcome {
    Applied,
    Ignored,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ElementView {
    pub id: String,
    pub kind: ElementKind,
    pub state: OperationalState,
    pub health: u8,
    pub last_transition: Tick,
    pub active_faults: Vec<String>,
    pub incidents: Vec<String>,
    pub recent_transitions: Vec<Transition>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinkView {
    pub id: String,
    pub endpoints: [String; 2],
    pub state: OperationalState,
    pub capacity: f64,
    pub utilization: f64,
    pub throughput: f64,
    pub latency_ms: f64,
    pub packet_loss: f64,
    pub throttle: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NetworkSnapshot {
    pub elements: Vec<ElementView>,
    pub links: Vec<LinkView>,
}

impl NetworkSnapshot {
    pub fn element(&self, id: &str) -> Option<&ElementView> {
        self.elements.iter().find(|element| element.id == id)
    }

    pub fn link(&self, id: &str) -> Option<&LinkView> {
        self.links.iter().find(|link| link.id == id)
    }
}

#[derive(Clone, Debug)]
pub struct NetworkModel {
    elements: BTreeMap<String, NetworkElement>,
    links: BTreeMap<String, Link>,
    down_health: u8,
    history_limit: usize,
}

impl NetworkModel {
    pub fn from_config(config: &SimConfig) -> Result<Self> {
        validate_topology(config)?;

        let mut elements = BTreeMap::new();
        for element in &config.elements {
            elements.insert(
                element.id.clone(),
                NetworkElement::new(element.id.clone(), element.kind.into(), element.weight),
            );
        }
        let mut links = BTreeMap::new();
        for link in &config.links {
            elements.insert(
                link.id.clone(),
                NetworkElement::new(link.id.clone(), ElementKind::Link, link.weight),
            );
            links.insert(link.id.clone(), Link::from_config(link));
        }

        Ok(Self::with_parts(elements, links, &config.model))
    }

    fn with_parts(
        elements: BTreeMap<String, NetworkElement>,
        links: BTreeMap<String, Link>,
        model: &ModelConfig,
    ) -> Self {
        info!(
            elements = elements.len(),
            links = links.len(),
            "Network model initialized"
        );
        Self {
            elements,
            links,
            down_health: model.down_health,
            history_limit: model.fault_history,
        }
    }

    pub fn element(&self, id: &str) -> Option<&NetworkElement> {
        self.elements.get(id)
    }

    pub fn link(&self, id: &str) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn elements(&self) -> impl Iterator<Item = &NetworkElement> {
        self.elements.values()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    pub fn is_link(&self, id: &str) -> bool {
        self.links.contains_key(id)
    }

    pub fn element_ids(&self) -> Vec<String> {
        self.elements.keys().cloned().collect()
    }

    pub fn link_ids(&self) -> Vec<String> {
        self.links.keys().cloned().collect()
    }

    pub fn state_of(&self, id: &str) -> Option<OperationalState> {
        self.elements.get(id).map(|element| element.state)
    }

    /// Moves `id` to `target`, enforcing state adjacency unless the cause is a
    /// hard failure. A transition to the current state is a no-op.
    pub fn apply_transition(
        &mut self,
        id: &str,
        target: OperationalState,
        cause: Cause,
        tick: Tick,
    ) -> Result<()> {
        let history_limit = self.history_limit;
        let element = self
            .elements
            .get_mut(id)
            .ok_or_else(|| Error::UnknownTarget(id.to_string()))?;
        let from = element.state;
        if from == target {
            return Ok(());
        }
        if !from.is_adjacent(target) && cause != Cause::HardFailure {
            return Err(Error::InvalidTransition {
                element: id.to_string(),
                from,
                to: target,
            });
        }

        element.state = target;
        element.last_transition = tick;
        element.history.push_back(Transition {
            tick,
            from,
            to: target,
            cause,
        });
        while element.history.len() > history_limit {
            element.history.pop_front();
        }
        debug!(tick, element = id, %from, to = %target, ?cause, "State transition");

        if let Some(link) = self.links.get_mut(id) {
            link.recompute(target);
        }
        Ok(())
    }

    pub fn apply_event(&mut self, scheduled: &ScheduledEvent) -> Result<EventOutcome> {
        let tick = scheduled.tick;
        let fault_id = format!("F{}", scheduled.seq);
        match &scheduled.event {
            EventKind::Degrade { element, severity } => {
                self.degrade(element, *severity, fault_id, tick)
            }
            EventKind::Fail { element } => {
                let down_from = {
                    let target = self.element_mut(element)?;
                    target.health = 0;
                    target.active_faults.insert(fault_id);
                    target.state
                };
                if down_from == OperationalState::Down {
                    return Ok(EventOutcome::Applied);
                }
                self.apply_transition(element, OperationalState::Down, Cause::HardFailure, tick)?;
                Ok(EventOutcome::Applied)
            }
            EventKind::Recover { element } => {
                if self.is_nominal(element)? {
                    return Ok(EventOutcome::Ignored);
                }
                self.restore(element, Cause::Recovery, tick)?;
                Ok(EventOutcome::Applied)
            }
            EventKind::TrafficSpike { link, magnitude } => {
                self.spike(link, *magnitude, fault_id, tick)
            }
            EventKind::Custom { .. } => Ok(EventOutcome::Ignored),
        }
    }

    fn degrade(
        &mut self,
        id: &str,
        severity: u8,
        fault_id: String,
        tick: Tick,
    ) -> Result<EventOutcome> {
        let down_health = self.down_health;
        let next = {
            let element = self.element_mut(id)?;
            element.health = element.health.saturating_sub(severity.min(MAX_HEALTH));
            element.active_faults.insert(fault_id);
            match element.state {
                OperationalState::Up => Some(OperationalState::Degraded),
                OperationalState::Degraded if element.health <= down_health => {
                    Some(OperationalState::Down)
                }
                _ => None,
            }
        };
        if let Some(next) = next {
            self.apply_transition(id, next, Cause::Degradation, tick)?;
        }
        Ok(EventOutcome::Applied)
    }

    fn spike(
        &mut self,
        id: &str,
        magnitude: f64,
        fault_id: String,
        tick: Tick,
    ) -> Result<EventOutcome> {
        let state = self
            .state_of(id)
            .filter(|_| self.is_link(id))
            .ok_or_else(|| Error::UnknownTarget(id.to_string()))?;
        let congested = {
            let link = self.link_mut(id)?;
            link.admit(magnitude);
            link.recompute(state);
            link.load_ratio() > 1.0
        };
        self.element_mut(id)?.active_faults.insert(fault_id);
        if congested && state == OperationalState::Up {
            self.apply_transition(id, OperationalState::Degraded, Cause::Congestion, tick)?;
        }
        Ok(EventOutcome::Applied)
    }

    fn is_nominal(&self, id: &str) -> Result<bool> {
        let element = self
            .elements
            .get(id)
            .ok_or_else(|| Error::UnknownTarget(id.to_string()))?;
        let link_nominal = self.links.get(id).map_or(true, |link| {
            link.throttle.is_none() && link.utilization == link.base_utilization
        });
        Ok(element.state == OperationalState::Up
            && element.active_faults.is_empty()
            && element.health == MAX_HEALTH
            && link_nominal)
    }
    fn restore(&mut self, id: &str, cause: Cause, tick: Tick) -> Result<()> {
        {
            let element = self.element_mut(id)?;
            element.health = MAX_HEALTH;
            element.active_faults.clear();
        }
        while let Some(next) = self.state_of(id).and_then(OperationalState::toward_up) {
            self.apply_transition(id, next, cause, tick)?;
        }
        if let Some(link) = self.links.get_mut(id) {
            link.reset(OperationalState::Up);
        }
        Ok(())
    }

    pub fn restart(&mut self, id: &str, tick: Tick) -> Result<()> {
        if !self.contains(id) {
            return Err(Error::UnknownTarget(id.to_string()));
        }
        info!(tick, element = id, "Restarting element");
        self.restore(id, Cause::Remediation, tick)
    }

    /// Shifts the load above baseline from `id` evenly onto the `via` links.
    pub fn reroute(&mut self, id: &str, via: &[String], tick: Tick) -> Result<()> {
        if via.is_empty() {
            return Err(Error::UnknownTarget(format!("{} (empty reroute path)", id)));
        }
        for hop in via {
            if !self.is_link(hop) || hop == id {
                return Err(Error::UnknownTarget(hop.clone()));
            }
        }
        let state = self
            .state_of(id)
            .ok_or_else(|| Error::UnknownTarget(id.to_string()))?;
        let moved = {
            let link = self.link_mut(id)?;
            let moved = (link.utilization - link.base_utilization).max(0.0);
            link.utilization -= moved;
            link.recompute(state);
            moved
        };
        let share = moved / via.len() as f64;
        for hop in via {
            let hop_state = self.state_of(hop).unwrap_or(OperationalState::Up);
            let congested = {
                let link = self.link_mut(hop)?;
                link.admit(share);
                link.recompute(hop_state);
                link.load_ratio() > 1.0
            };
            if congested && hop_state == OperationalState::Up {
                self.apply_transition(hop, OperationalState::Degraded, Cause::Congestion, tick)?;
            }
        }
        info!(tick, link = id, moved, hops = via.len(), "Rerouted traffic");
        self.relieve(id, tick)
    }

    pub fn throttle(&mut self, id: &str, limit: f64, tick: Tick) -> Result<()> {
        let state = self
            .state_of(id)
            .ok_or_else(|| Error::UnknownTarget(id.to_string()))?;
        {
            let link = self.link_mut(id)?;
            link.throttle = Some(limit);
            link.utilization = link.utilization.min(limit);
            link.recompute(state);
        }
        info!(tick, link = id, limit, "Throttled link");
        self.relieve(id, tick)
    }

    pub fn open_incident(&mut self, id: &str, incident: &str) -> Result<()> {
        self.element_mut(id)?.incidents.insert(incident.to_string());
        Ok(())
    }

    /// Brings a link degraded purely by congestion back up once its load fits.
    fn relieve(&mut self, id: &str, tick: Tick) -> Result<()> {
        let fits = self.link(id).map_or(false, |link| link.load_ratio() <= 1.0);
        let congested = self.element(id).map_or(false, |element| {
            element.state == OperationalState::Degraded
                && element.last_cause() == Some(Cause::Congestion)
        });
        if fits && congested {
            self.apply_transition(id, OperationalState::Up, Cause::Remediation, tick)?;
            self.element_mut(id)?.active_faults.clear();
        }
        Ok(())
    }
    pub fn throughput(&self, link: &Link) -> f64 {
        let down = |id: &str| self.state_of(id) == Some(OperationalState::Down);
        if down(&link.id) || link.endpoints.iter().any(|endpoint| down(endpoint)) {
            0.0
        } else {
            link.utilization.min(link.capacity)
        }
    }

    pub fn snapshot(&self) -> NetworkSnapshot {
        let elements = self
            .elements
            .values()
            .map(|element| ElementView {
                id: element.id.clone(),
                kind: element.kind,
                state: element.state,
                health: element.health,
                last_transition: element.last_transition,
                active_faults: element.active_faults.iter().cloned().collect(),
                incidents: element.incidents.iter().cloned().collect(),
                recent_transitions: element.history.iter().cloned().collect(),
            })
            .collect();
        let links = self
            .links
            .values()
            .map(|link| LinkView {
                id: link.id.clone(),
                endpoints: link.endpoints.clone(),
                state: self.state_of(&link.id).unwrap_or(OperationalState::Up),
                capacity: link.capacity,
                utilization: link.utilization,
                throughput: self.throughput(link),
                latency_ms: link.latency_ms,
                packet_loss: link.packet_loss,
                throttle: link.throttle,
            })
            .collect();
        NetworkSnapshot { elements, links }
    }

    fn element_mut(&mut self, id: &str) -> Result<&mut NetworkElement> {
        self.elements
            .get_mut(id)
            .ok_or_else(|| Error::UnknownTarget(id.to_string()))
    }

    fn link_mut(&mut self, id: &str) -> Result<&mut Link> {
        self.links
            .get_mut(id)
            .ok_or_else(|| Error::UnknownTarget(id.to_string()))
    }
}

fn validate_topology(config: &SimConfig) -> Result<()> {
    if config.elements.is_empty() {
        return Err(Error::EmptyTopology);
    }

    let mut ids = HashSet::new();
    let mut nodes = HashSet::new();
    for element in &config.elements {
        if element.id.trim().is_empty() {
            return Err(Error::EmptyElementId);
        }
        if !ids.insert(element.id.as_str()) {
            return Err(Error::DuplicateElement(element.id.clone()));
        }
        if element.weight.is_some_and(|weight| !(weight >= 0.0)) {
            return Err(Error::InvalidWeight(element.id.clone()));
        }
        nodes.insert(element.id.as_str());
    }

    for link in &config.links {
        if link.id.trim().is_empty() {
            return Err(Error::EmptyElementId);
        }
        if !ids.insert(link.id.as_str()) {
            return Err(Error::DuplicateElement(link.id.clone()));
        }
        if !(link.capacity > 0.0) || !link.capacity.is_finite() {
            return Err(Error::InvalidCapacity(link.id.clone()));
        }
        if !(link.latency_ms >= 0.0)
            || !(link.base_utilization >= 0.0)
            || !(0.0..=1.0).contains(&link.base_loss)
        {
            return Err(Error::InvalidLinkAttribute(link.id.clone()));
        }
        if link.weight.is_some_and(|weight| !(weight >= 0.0)) {
            return Err(Error::InvalidWeight(link.id.clone()));
        }
        if link.endpoints[0] == link.endpoints[1] {
            return Err(Error::InvalidEndpoint {
                link: link.id.clone(),
                endpoint: link.endpoints[1].clone(),
            });
        }
    }

    // Endpoints are checked once every id is known so a link naming another
    // link reports InvalidEndpoint rather than a dangling reference.
    for link in &config.links {
        for endpoint in &link.endpoints {
            if nodes.contains(endpoint.as_str()) {
                continue;
            }
            if ids.contains(endpoint.as_str()) {
                return Err(Error::InvalidEndpoint {
                    link: link.id.clone(),
                    endpoint: endpoint.clone(),
                });
            }
            return Err(Error::DanglingEndpoint {
                link: link.id.clone(),
                endpoint: endpoint.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ElementConfig, LinkConfig};

    fn node(id: &str, kind: NodeKind) -> ElementConfig {
        ElementConfig {
            id: id.to_string(),
            kind,
            weight: None,
        }
    }

    fn link(id: &str, a: &str, b: &str, capacity: f64) -> LinkConfig {
        LinkConfig {
            id: id.to_string(),
            endpoints: [a.to_string(), b.to_string()],
            capacity,
            latency_ms: 10.0,
            base_utilization: 20.0,
            base_loss: 0.0,
            weight: None,
        }
    }

    fn topology() -> SimConfig {
        SimConfig {
            elements: vec![
                node("R1", NodeKind::RadioNode),
                node("C1", NodeKind::CoreNode),
            ],
            links: vec![
                link("L1", "R1", "C1", 100.0),
                link("L2", "R1", "C1", 100.0),
            ],
            ..SimConfig::default()
        }
    }

    fn model() -> NetworkModel {
        NetworkModel::from_config(&topology()).expect("topology should be valid")
    }

    fn event(tick: Tick, seq: u64, event: EventKind) -> ScheduledEvent {
        ScheduledEvent::new(tick, seq, event)
    }

    #[test]
    fn links_are_registered_as_elements() {
        let model = model();
        assert_eq!(model.element_ids(), vec!["C1", "L1", "L2", "R1"]);
        assert_eq!(model.element("L1").map(|e| e.kind), Some(ElementKind::Link));
        assert!(model.is_link("L2"));
        assert!(!model.is_link("R1"));
    }

    #[test]
    fn dangling_endpoint_is_fatal() {
        let mut config = topology();
        config.links.push(link("L3", "R1", "ghost", 10.0));
        let err = NetworkModel::from_config(&config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "link 'L3' references unknown element 'ghost'"
        );
    }

    #[test]
    fn link_to_link_and_self_loops_are_rejected() {
        let mut config = topology();
        config.links.push(link("L3", "R1", "L1", 10.0));
        assert!(matches!(
            NetworkModel::from_config(&config),
            Err(Error::InvalidEndpoint { .. })
        ));

        let mut config = topology();
        config.links.push(link("L3", "R1", "R1", 10.0));
        assert!(matches!(
            NetworkModel::from_config(&config),
            Err(Error::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn duplicate_ids_and_bad_capacity_are_rejected() {
        let mut config = topology();
        config.links.push(link("R1", "R1", "C1", 10.0));
        assert_eq!(
            NetworkModel::from_config(&config).unwrap_err(),
            Error::DuplicateElement("R1".to_string())
        );

        let mut config = topology();
        config.links[0].capacity = 0.0;
        assert_eq!(
            NetworkModel::from_config(&config).unwrap_err(),
            Error::InvalidCapacity("L1".to_string())
        );

        let config = SimConfig::default();
        assert_eq!(
            NetworkModel::from_config(&config).unwrap_err(),
            Error::EmptyTopology
        );
    }

    #[test]
    fn up_to_down_requires_hard_failure() {
        let mut model = model();
        let err = model
            .apply_transition("R1", OperationalState::Down, Cause::Degradation, 1)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(model.state_of("R1"), Some(OperationalState::Up));

        model
            .apply_transition("R1", OperationalState::Down, Cause::HardFailure, 2)
            .expect("hard failure may skip degraded");
        assert_eq!(model.state_of("R1"), Some(OperationalState::Down));
        assert_eq!(model.element("R1").map(|e| e.last_transition), Some(2));
    }

    #[test]
    fn adjacency_holds_for_every_pair() {
        use OperationalState::*;
        for from in [Up, Degraded, Down] {
            for to in [Up, Degraded, Down] {
                let mut model = model();
                if from != Up {
                    model
                        .apply_transition("R1", from, Cause::HardFailure, 0)
                        .expect("setup");
                }
                let result = model.apply_transition("R1", to, Cause::Degradation, 1);
                let expected_ok = from.is_adjacent(to);
                assert_eq!(result.is_ok(), expected_ok, "{} -> {}", from, to);
                let state = model.state_of("R1").expect("element exists");
                assert!(state == to || state == from);
            }
        }
    }

    #[test]
    fn unknown_targets_are_reported() {
        let mut model = model();
        let err = model
            .apply_event(&event(
                1,
                0,
                EventKind::Degrade {
                    element: "ghost".to_string(),
                    severity: 10,
                },
            ))
            .unwrap_err();
        assert_eq!(err, Error::UnknownTarget("ghost".to_string()));

        let err = model
            .apply_event(&event(
                1,
                1,
                EventKind::TrafficSpike {
                    link: "R1".to_string(),
                    magnitude: 10.0,
                },
            ))
            .unwrap_err();
        assert_eq!(err, Error::UnknownTarget("R1".to_string()));
    }

    #[test]
    fn degrade_steps_one_state_at_a_time() {
        let mut model = model();
        let degrade = |seq| {
            event(
                seq,
                seq,
                EventKind::Degrade {
                    element: "R1".to_string(),
                    severity: 60,
                },
            )
        };
        model.apply_event(&degrade(1)).expect("degrade");
        let r1 = model.element("R1").expect("R1");
        assert_eq!(r1.state, OperationalState::Degraded);
        assert_eq!(r1.health, 40);
        assert!(r1.active_faults.contains("F1"));

        model.apply_event(&degrade(2)).expect("degrade");
        let r1 = model.element("R1").expect("R1");
        assert_eq!(r1.state, OperationalState::Down);
        assert_eq!(r1.health, 0);
        assert_eq!(r1.history().count(), 2);
    }

    #[test]
    fn recover_walks_back_to_up_and_is_noop_when_nominal() {
        let mut model = model();
        model
            .apply_event(&event(
                1,
                0,
                EventKind::Fail {
                    element: "R1".to_string(),
                },
            ))
            .expect("fail");
        assert_eq!(model.state_of("R1"), Some(OperationalState::Down));

        let recover = event(
            5,
            1,
            EventKind::Recover {
                element: "R1".to_string(),
            },
        );
        assert_eq!(model.apply_event(&recover), Ok(EventOutcome::Applied));
        let r1 = model.element("R1").expect("R1");
        assert_eq!(r1.state, OperationalState::Up);
        assert_eq!(r1.health, MAX_HEALTH);
        assert!(r1.active_faults.is_empty());
        let path: Vec<_> = r1.history().map(|t| (t.from, t.to)).collect();
        assert_eq!(
            path,
            vec![
                (OperationalState::Up, OperationalState::Down),
                (OperationalState::Down, OperationalState::Degraded),
                (OperationalState::Degraded, OperationalState::Up),
            ]
        );

        assert_eq!(model.apply_event(&recover), Ok(EventOutcome::Ignored));
    }

    #[test]
    fn fault_history_is_bounded() {
        let mut config = topology();
        config.model.fault_history = 3;
        let mut model = NetworkModel::from_config(&config).expect("valid");
        for tick in 0..10 {
            let target = if tick % 2 == 0 {
                OperationalState::Degraded
            } else {
                OperationalState::Up
            };
            model
                .apply_transition("R1", target, Cause::Degradation, tick)
                .expect("adjacent");
        }
        let ticks: Vec<Tick> = model
            .element("R1")
            .expect("R1")
            .history()
            .map(|t| t.tick)
            .collect();
        assert_eq!(ticks, vec![7, 8, 9]);
    }

    #[test]
    fn congestion_degrades_link_and_throttle_relieves_it() {
        let mut model = model();
        model
            .apply_event(&event(
                1,
                0,
                EventKind::TrafficSpike {
                    link: "L1".to_string(),
                    magnitude: 100.0,
                },
            ))
            .expect("spike");
        let l1 = model.link("L1").expect("L1");
        assert_eq!(l1.utilization, 120.0);
        assert!((l1.packet_loss - 0.1).abs() < 1e-9);
        assert!((l1.latency_ms - 26.0).abs() < 1e-9);
        assert_eq!(model.state_of("L1"), Some(OperationalState::Degraded));

        model.throttle("L1", 90.0, 2).expect("throttle");
        assert_eq!(model.link("L1").map(|l| l.utilization), Some(90.0));
        assert_eq!(model.state_of("L1"), Some(OperationalState::Up));

        model
            .apply_event(&event(
                3,
                1,
                EventKind::TrafficSpike {
                    link: "L1".to_string(),
                    magnitude: 50.0,
                },
            ))
            .expect("spike");
        assert_eq!(model.link("L1").map(|l| l.utilization), Some(90.0));
    }

    #[test]
    fn reroute_moves_excess_load_onto_alternate_links() {
        let mut model = model();
        model
            .apply_event(&event(
                1,
                0,
                EventKind::TrafficSpike {
                    link: "L1".to_string(),
                    magnitude: 90.0,
                },
            ))
            .expect("spike");
        assert_eq!(model.state_of("L1"), Some(OperationalState::Degraded));

        model
            .reroute("L1", &["L2".to_string()], 2)
            .expect("reroute");
        assert_eq!(model.link("L1").map(|l| l.utilization), Some(20.0));
        assert_eq!(model.link("L2").map(|l| l.utilization), Some(110.0));
        assert_eq!(model.state_of("L1"), Some(OperationalState::Up));
        assert_eq!(model.state_of("L2"), Some(OperationalState::Degraded));

        assert!(model.reroute("L1", &["R1".to_string()], 3).is_err());
    }

    #[test]
    fn throughput_drops_when_endpoint_is_down() {
        let mut model = model();
        let before = model.snapshot();
        assert_eq!(before.link("L1").map(|l| l.throughput), Some(20.0));

        model
            .apply_transition("C1", OperationalState::Down, Cause::HardFailure, 1)
            .expect("fail");
        let after = model.snapshot();
        assert_eq!(after.link("L1").map(|l| l.throughput), Some(0.0));
        assert_eq!(before.link("L1").map(|l| l.throughput), Some(20.0));
    }

    #[test]
    fn restart_and_incidents() {
        let mut model = model();
        model
            .apply_transition("R1", OperationalState::Degraded, Cause::Degradation, 1)
            .expect("degrade");
        model.restart("R1", 3).expect("restart");
        assert_eq!(model.state_of("R1"), Some(OperationalState::Up));
        assert_eq!(
            model.element("R1").and_then(|e| e.history().last().map(|t| t.cause)),
            Some(Cause::Remediation)
        );

        model.open_incident("R1", "INC-1").expect("incident");
        let snapshot = model.snapshot();
        assert_eq!(
            snapshot.element("R1").map(|e| e.incidents.clone()),
            Some(vec!["INC-1".to_string()])
        );
        assert!(model.restart("ghost", 4).is_err());
    }
}
