use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::kpi::KpiAggregator;
use crate::models::{AutomationConfig, PolicyRule, Tick};
use crate::network::NetworkModel;
use crate::policy::{ActionTemplate, Verdict};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Restart { element: String },
    Reroute { link: String, via: Vec<String> },
    Throttle { link: String, limit: f64 },
    Escalate { element: String, incident: String },
}

impl ActionKind {
    pub fn target(&self) -> &str {
        match self {
            ActionKind::Restart { element } | ActionKind::Escalate { element, .. } => element,
            ActionKind::Reroute { link, .. } | ActionKind::Throttle { link, .. } => link,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Restart { .. } => "restart",
            ActionKind::Reroute { .. } => "reroute",
            ActionKind::Throttle { .. } => "throttle",
            ActionKind::Escalate { .. } => "escalate",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Restart { element } => write!(f, "restart({})", element),
            ActionKind::Reroute { link, via } => write!(f, "reroute({} via {})", link, via.join(",")),
            ActionKind::Throttle { link, limit } => write!(f, "throttle({}, limit={})", link, limit),
            ActionKind::Escalate { element, incident } => {
                write!(f, "escalate({}, {})", element, incident)
            }
        }
    }
}

fn template_label(template: &ActionTemplate) -> &'static str {
    match template {
        ActionTemplate::Restart { .. } => "restart",
        ActionTemplate::Reroute { .. } => "reroute",
        ActionTemplate::Throttle { .. } => "throttle",
        ActionTemplate::Escalate { .. } => "escalate",
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed,
    Abandoned,
}

impl ActionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionStatus::Succeeded | ActionStatus::Abandoned)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionStatus::Pending => "pending",
            ActionStatus::InFlight => "in-flight",
            ActionStatus::Succeeded => "succeeded",
            ActionStatus::Failed => "failed",
            ActionStatus::Abandoned => "abandoned",
        };
        write!(f, "{}", label)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusChange {
    pub tick: Tick,
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Stage {
    #[default]
    Waiting,
    Applying {
        due: Tick,
    },
    Verifying {
        deadline: Tick,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RemediationAction {
    pub id: u64,
    pub rule: Option<String>,
    pub kind: ActionKind,
    pub status: ActionStatus,
    pub attempts: u32,
    pub created_at: Tick,
    pub last_attempt: Option<Tick>,
    pub next_attempt_at: Tick,
    pub history: Vec<StatusChange>,
    /// Escalation raised when this action was abandoned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation: Option<u64>,
    /// Abandoned actions this escalation covers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub escalates: Vec<u64>,
    #[serde(skip)]
    stage: Stage,
}

impl RemediationAction {
    fn new(id: u64, rule: Option<String>, kind: ActionKind, tick: Tick) -> Self {
        Self {
            id,
            rule,
            kind,
            status: ActionStatus::Pending,
            attempts: 0,
            created_at: tick,
            last_attempt: None,
            next_attempt_at: tick,
            history: vec![StatusChange {
                tick,
                status: ActionStatus::Pending,
                note: None,
            }],
            escalation: None,
            escalates: Vec::new(),
            stage: Stage::Waiting,
        }
    }

    fn record(&mut self, tick: Tick, status: ActionStatus, note: Option<String>) {
        self.status = status;
        self.history.push(StatusChange { tick, status, note });
    }

    pub fn is_live(&self) -> bool {
        matches!(self.status, ActionStatus::Pending | ActionStatus::InFlight)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ActionKey {
    target: String,
    kind: &'static str,
}

impl ActionKey {
    fn of(kind: &ActionKind) -> Self {
        Self {
            target: kind.target().to_string(),
            kind: kind.label(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AutomationStats {
    pub created: u64,
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed_attempts: u64,
    pub abandoned: u64,
    pub escalations: u64,
    pub dispatch_conflicts: u64,
    pub cooldown_suppressed: u64,
}

/// Exponential backoff after the `attempts`-th failure, capped.
pub fn backoff_delay(config: &AutomationConfig, attempts: u32) -> Tick {
    let exponent = attempts.saturating_sub(1).min(32);
    config
        .backoff_base
        .saturating_mul(1u64 << exponent)
        .min(config.backoff_cap)
}

#[derive(Debug)]
pub struct AutomationEngine {
    config: AutomationConfig,
    rules: Vec<PolicyRule>,
    live: BTreeMap<u64, RemediationAction>,
    live_keys: HashMap<ActionKey, u64>,
    archive: VecDeque<RemediationAction>,
    cooldowns: HashMap<(String, String), Tick>,
    next_id: u64,
    next_incident: u64,
    stats: AutomationStats,
}

impl AutomationEngine {
    pub fn new(config: &AutomationConfig, rules: Vec<PolicyRule>) -> Self {
        Self {
            config: config.clone(),
            rules,
            live: BTreeMap::new(),
            live_keys: HashMap::new(),
            archive: VecDeque::new(),
            cooldowns: HashMap::new(),
            next_id: 1,
            next_incident: 1,
            stats: AutomationStats::default(),
        }
    }
    pub fn run_cycle(&mut self, tick: Tick, kpis: &KpiAggregator, model: &mut NetworkModel) {
        let in_flight: Vec<u64> = self
            .live
            .values()
            .filter(|action| action.status == ActionStatus::InFlight)
            .map(|action| action.id)
            .collect();
        for id in in_flight {
            self.progress(id, tick, kpis, model);
        }

        self.evaluate_rules(tick, kpis);

        let due: Vec<u64> = self
            .live
            .values()
            .filter(|action| {
                action.status == ActionStatus::Pending && action.next_attempt_at <= tick
            })
            .map(|action| action.id)
            .collect();
        for id in due {
            self.dispatch(id, tick, model);
        }
    }

    fn evaluate_rules(&mut self, tick: Tick, kpis: &KpiAggregator) {
        for index in 0..self.rules.len() {
            let rule = &self.rules[index];
            if rule.condition.evaluate(kpis) != Verdict::True {
                continue;
            }
            let name = rule.name.clone();
            let template = rule.action.clone();
            let target = template.target().to_string();

            let cooldown_key = (name.clone(), target.clone());
            if let Some(until) = self.cooldowns.get(&cooldown_key) {
                if tick < *until {
                    self.stats.cooldown_suppressed += 1;
                    debug!(tick, rule = %name, target = %target, until, "Rule in cooldown");
                    continue;
                }
            }

            let key = ActionKey {
                target: target.clone(),
                kind: template_label(&template),
            };
            if self.live_keys.contains_key(&key) {
                let err = Error::ActionDispatchConflict {
                    target,
                    kind: key.kind.to_string(),
                };
                self.stats.dispatch_conflicts += 1;
                debug!(tick, rule = %name, %err, "Rule fired while action is live");
                continue;
            }

            let kind = self.instantiate(template);
            if let Err(err) = self.create(kind, Some(name), tick) {
                self.stats.dispatch_conflicts += 1;
                debug!(tick, %err, "Rule fired while action is live");
            }
        }
    }

    fn instantiate(&mut self, template: ActionTemplate) -> ActionKind {
        match template {
            ActionTemplate::Restart { element } => ActionKind::Restart { element },
            ActionTemplate::Reroute { link, via } => ActionKind::Reroute { link, via },
            ActionTemplate::Throttle { link, limit } => ActionKind::Throttle { link, limit },
            ActionTemplate::Escalate { element } => ActionKind::Escalate {
                element,
                incident: self.allocate_incident(),
            },
        }
    }

    fn allocate_incident(&mut self) -> String {
        let incident = format!("INC-{:04}", self.next_incident);
        self.next_incident += 1;
        incident
    }
    pub fn submit(&mut self, kind: ActionKind, tick: Tick) -> Result<u64> {
        self.create(kind, None, tick)
    }

    fn create(&mut self, kind: ActionKind, rule: Option<String>, tick: Tick) -> Result<u64> {
        let key = ActionKey::of(&kind);
        if self.live_keys.contains_key(&key) {
            return Err(Error::ActionDispatchConflict {
                target: key.target,
                kind: key.kind.to_string(),
            });
        }
        Ok(self.insert(key, kind, rule, tick))
    }

    fn insert(&mut self, key: ActionKey, kind: ActionKind, rule: Option<String>, tick: Tick) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        info!(tick, action = id, kind = %kind, rule = rule.as_deref().unwrap_or("-"), "Action created");
        self.live_keys.insert(key, id);
        self.live
            .insert(id, RemediationAction::new(id, rule, kind, tick));
        self.stats.created += 1;
        id
    }

    fn dispatch(&mut self, id: u64, tick: Tick, model: &mut NetworkModel) {
        let restart_delay = self.config.restart_delay;
        let Some(action) = self.live.get_mut(&id) else {
            return;
        };
        let delay = match action.kind {
            ActionKind::Restart { .. } => restart_delay,
            _ => 0,
        };
        action.attempts += 1;
        action.last_attempt = Some(tick);
        action.stage = Stage::Applying { due: tick + delay };
        action.record(tick, ActionStatus::InFlight, None);
        self.stats.dispatched += 1;
        info!(tick, action = id, attempt = action.attempts, kind = %action.kind, "Action dispatched");

        if delay == 0 {
            self.apply(id, tick, model);
        }
    }

    fn progress(&mut self, id: u64, tick: Tick, kpis: &KpiAggregator, model: &mut NetworkModel) {
        let Some(stage) = self.live.get(&id).map(|action| action.stage) else {
            return;
        };
        match stage {
            Stage::Applying { due } if tick >= due => self.apply(id, tick, model),
            Stage::Verifying { deadline } => self.verify(id, deadline, tick, kpis),
            _ => {}
        }
    }

    fn apply(&mut self, id: u64, tick: Tick, model: &mut NetworkModel) {
        let grace = self.config.grace_ticks;
        let Some(action) = self.live.get_mut(&id) else {
            return;
        };
        match execute(&action.kind, model, tick) {
            Ok(()) => {
                let verified = action.rule.is_some()
                    && !matches!(action.kind, ActionKind::Escalate { .. });
                if verified {
                    action.stage = Stage::Verifying {
                        deadline: tick + grace,
                    };
                    debug!(tick, action = id, deadline = tick + grace, "Awaiting verification");
                } else {
                    self.finish(id, ActionStatus::Succeeded, tick, None);
                }
            }
            Err(err) => self.fail(id, tick, err.to_string()),
        }
    }

    fn verify(&mut self, id: u64, deadline: Tick, tick: Tick, kpis: &KpiAggregator) {
        let verdict = self
            .live
            .get(&id)
            .and_then(|action| action.rule.as_deref())
            .and_then(|name| self.rules.iter().find(|rule| rule.name == name))
            .map_or(Verdict::False, |rule| rule.condition.evaluate(kpis));
        match verdict {
            Verdict::False => self.finish(id, ActionStatus::Succeeded, tick, None),
            Verdict::True | Verdict::InsufficientData if tick >= deadline => {
                let note = match verdict {
                    Verdict::True => "condition still holds after grace period",
                    _ => "insufficient data to verify within grace period",
                };
                self.fail(id, tick, note.to_string());
            }
            _ => {}
        }
    }

    fn fail(&mut self, id: u64, tick: Tick, reason: String) {
        let max_attempts = self.config.max_attempts;
        let Some(action) = self.live.get_mut(&id) else {
            return;
        };
        warn!(tick, action = id, attempt = action.attempts, kind = %action.kind, %reason, "Action attempt failed");
        action.record(tick, ActionStatus::Failed, Some(reason.clone()));
        self.stats.failed_attempts += 1;

        if action.attempts < max_attempts {
            let delay = backoff_delay(&self.config, action.attempts);
            action.stage = Stage::Waiting;
            action.next_attempt_at = tick + delay;
            action.record(tick, ActionStatus::Pending, None);
            debug!(tick, action = id, retry_at = tick + delay, "Retry scheduled");
            return;
        }

        let err = Error::ActionExhausted {
            action: id,
            target: action.kind.target().to_string(),
            attempts: action.attempts,
        };
        error!(tick, %err, "Abandoning action");
        let escalate = match &action.kind {
            ActionKind::Escalate { .. } => None,
            kind => Some(kind.target().to_string()),
        };

        if let Some(element) = escalate {
            let escalation = self.escalate(id, element, tick);
            if let Some(action) = self.live.get_mut(&id) {
                action.escalation = Some(escalation);
            }
        }
        self.finish(id, ActionStatus::Abandoned, tick, Some(reason));
    }

    /// Every abandoned action is covered by an escalation: a live one for the
    /// same element absorbs it, otherwise a new incident is opened.
    fn escalate(&mut self, abandoned: u64, element: String, tick: Tick) -> u64 {
        self.stats.escalations += 1;
        let key = ActionKey {
            target: element.clone(),
            kind: "escalate",
        };
        let id = match self.live_keys.get(&key).copied() {
            Some(open) => {
                info!(tick, action = open, abandoned, element = %element, "Joining open escalation");
                open
            }
            None => {
                let incident = self.allocate_incident();
                self.insert(key, ActionKind::Escalate { element, incident }, None, tick)
            }
        };
        if let Some(escalation) = self.live.get_mut(&id) {
            escalation.escalates.push(abandoned);
        }
        id
    }

    fn finish(&mut self, id: u64, status: ActionStatus, tick: Tick, note: Option<String>) {
        let Some(mut action) = self.live.remove(&id) else {
            return;
        };
        self.live_keys.remove(&ActionKey::of(&action.kind));
        action.stage = Stage::Waiting;
        action.record(tick, status, note);
        match status {
            ActionStatus::Succeeded => self.stats.succeeded += 1,
            ActionStatus::Abandoned => self.stats.abandoned += 1,
            _ => {}
        }
        info!(tick, action = id, kind = %action.kind, %status, "Action finished");

        if let Some(rule) = action
            .rule
            .as_deref()
            .and_then(|name| self.rules.iter().find(|rule| rule.name == name))
        {
            self.cooldowns.insert(
                (rule.name.clone(), action.kind.target().to_string()),
                tick + rule.cooldown,
            );
        }

        self.archive.push_back(action);
        while self.archive.len() > self.config.history_limit {
            self.archive.pop_front();
        }
    }

    /// Marks every live action abandoned. No escalation is raised.
    pub fn shutdown(&mut self, tick: Tick) {
        let ids: Vec<u64> = self.live.keys().copied().collect();
        if !ids.is_empty() {
            info!(tick, live = ids.len(), "Abandoning live actions on shutdown");
        }
        for id in ids {
            self.finish(id, ActionStatus::Abandoned, tick, Some("shutdown".to_string()));
        }
    }

    pub fn live(&self) -> impl Iterator<Item = &RemediationAction> {
        self.live.values()
    }

    pub fn archive(&self) -> impl Iterator<Item = &RemediationAction> {
        self.archive.iter()
    }

    pub fn action(&self, id: u64) -> Option<&RemediationAction> {
        self.live
            .get(&id)
            .or_else(|| self.archive.iter().find(|action| action.id == id))
    }

    pub fn stats(&self) -> &AutomationStats {
        &self.stats
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn cooldown_until(&self, rule: &str, target: &str) -> Option<Tick> {
        self.cooldowns
            .get(&(rule.to_string(), target.to_string()))
            .copied()
    }
}

fn execute(kind: &ActionKind, model: &mut NetworkModel, tick: Tick) -> Result<()> {
    match kind {
        ActionKind::Restart { element } => model.restart(element, tick),
        ActionKind::Reroute { link, via } => model.reroute(link, via, tick),
        ActionKind::Throttle { link, limit } => model.throttle(link, *limit, tick),
        ActionKind::Escalate { element, incident } => {
            info!(tick, element = %element, incident = %incident, "Incident opened");
            model.open_incident(element, incident)
        }
    }
}
