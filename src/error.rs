use thiserror::Error;

use crate::network::OperationalState;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("topology must contain at least one element")]
    EmptyTopology,
    #[error("element id must not be empty")]
    EmptyElementId,
    #[error("duplicate element id '{0}'")]
    DuplicateElement(String),
    #[error("link '{link}' references unknown element '{endpoint}'")]
    DanglingEndpoint { link: String, endpoint: String },
    #[error("link '{link}' cannot terminate on '{endpoint}'")]
    InvalidEndpoint { link: String, endpoint: String },
    #[error("link capacity must be > 0 in '{0}'")]
    InvalidCapacity(String),
    #[error("invalid link attribute in '{0}'")]
    InvalidLinkAttribute(String),
    #[error("element weight must be >= 0 in '{0}'")]
    InvalidWeight(String),
    #[error("kpi window must be > 0")]
    InvalidWindow,
    #[error("invalid clock: {0}")]
    InvalidClock(String),
    #[error("invalid simulator settings: {0}")]
    InvalidSimulator(String),
    #[error("invalid automation settings: {0}")]
    InvalidAutomation(String),
    #[error("duplicate policy name '{0}'")]
    DuplicatePolicy(String),
    #[error("policy '{policy}' references unknown target '{target}'")]
    UnknownPolicyTarget { policy: String, target: String },
    #[error("policy '{policy}' is invalid: {reason}")]
    InvalidPolicy { policy: String, reason: String },
    #[error("scenario '{scenario}' is invalid: {reason}")]
    InvalidScenario { scenario: String, reason: String },
    #[error("scenario '{scenario}' references unknown target '{target}'")]
    UnknownScenarioTarget { scenario: String, target: String },
    #[error("invalid transition for '{element}': {from} -> {to}")]
    InvalidTransition {
        element: String,
        from: OperationalState,
        to: OperationalState,
    },
    #[error("unknown target '{0}'")]
    UnknownTarget(String),
    #[error("action {kind} already in flight for '{target}'")]
    ActionDispatchConflict { target: String, kind: String },
    #[error("action #{action} exhausted {attempts} attempts on '{target}'")]
    ActionExhausted {
        action: u64,
        target: String,
        attempts: u32,
    },
    #[error("{0}")]
    ConfigIo(String),
    #[error("{0}")]
    ConfigParse(String),
    #[error("unsupported config format '{0}'")]
    UnsupportedConfigFormat(String),
    #[error("{0}")]
    Export(String),
    #[error("{0}")]
    Cli(String),
    #[error("simulation thread: {0}")]
    Thread(String),
}

pub type Result<T> = std::result::Result<T, Error>;
