use clap::error::ErrorKind;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::{SimConfig, Tick, TrafficConfig};

#[derive(Parser, Debug)]
#[command(
    name = "oam-sim",
    version,
    about = "Closed-loop OA&M simulator for 5G/LTE networks",
    args_conflicts_with_subcommands = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,
    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the simulation (default)
    Run(RunArgs),
    /// Print the resolved configuration as TOML
    ShowConfig(SourceArgs),
    /// List the supported KPI metrics
    ListKpis,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct SourceArgs {
    #[arg(long, help = "TOML or JSON config; defaults to the built-in reference network")]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub ticks: Option<Tick>,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long, value_enum)]
    pub traffic: Option<TrafficArg>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[arg(long, value_enum, default_value_t = FormatArg::Summary)]
    pub format: FormatArg,
    #[arg(long, help = "Write the final published state as JSON")]
    pub export: Option<PathBuf>,
    #[arg(long, help = "Pace ticks at clock.tick_rate_hz")]
    pub realtime: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    Human,
    Summary,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrafficArg {
    Synthetic,
    Silent,
}

impl From<TrafficArg> for TrafficConfig {
    fn from(value: TrafficArg) -> Self {
        match value {
            TrafficArg::Synthetic => TrafficConfig::Synthetic,
            TrafficArg::Silent => TrafficConfig::Silent,
        }
    }
}

pub enum Invocation {
    Run {
        config: SimConfig,
        format: FormatArg,
        export: Option<PathBuf>,
        realtime: bool,
    },
    ShowConfig(SimConfig),
    ListKpis,
}

pub fn parse_args() -> Result<Args> {
    Args::try_parse().map_err(|err| match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
        _ => Error::Cli(err.to_string()),
    })
}

pub fn build_invocation(args: Args) -> Result<Invocation> {
    match args.command {
        Some(Command::ShowConfig(source)) => Ok(Invocation::ShowConfig(resolve_config(&source)?)),
        Some(Command::ListKpis) => Ok(Invocation::ListKpis),
        Some(Command::Run(run)) => build_run(run),
        None => build_run(args.run),
    }
}

fn build_run(run: RunArgs) -> Result<Invocation> {
    let config = resolve_config(&run.source)?;
    if run.realtime && config.clock.tick_rate_hz.is_none() {
        return Err(Error::Cli(
            "--realtime requires clock.tick_rate_hz in the config".to_string(),
        ));
    }
    Ok(Invocation::Run {
        config,
        format: run.format,
        export: run.export,
        realtime: run.realtime,
    })
}

pub fn resolve_config(source: &SourceArgs) -> Result<SimConfig> {
    let mut config = match &source.config {
        Some(path) => load_config(path)?,
        None => SimConfig::reference_network(),
    };
    if let Some(ticks) = source.ticks {
        config.clock.ticks = ticks;
    }
    if let Some(seed) = source.seed {
        config.seed = seed;
    }
    if let Some(traffic) = source.traffic {
        config.traffic = traffic.into();
    }
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<SimConfig> {
    let contents = fs::read_to_string(path).map_err(|err| {
        Error::ConfigIo(format!(
            "failed to read config '{}': {}",
            path.display(),
            err
        ))
    })?;
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .unwrap_or("");

    match ext {
        "toml" => toml::from_str(&contents)
            .map_err(|err| Error::ConfigParse(format!("failed to parse TOML: {}", err))),
        "json" => serde_json::from_str(&contents)
            .map_err(|err| Error::ConfigParse(format!("failed to parse JSON: {}", err))),
        "" => Err(Error::UnsupportedConfigFormat("unknown".to_string())),
        _ => Err(Error::UnsupportedConfigFormat(ext.to_string())),
    }
}

pub fn render_config(config: &SimConfig) -> Result<String> {
    toml::to_string_pretty(config)
        .map_err(|err| Error::ConfigParse(format!("failed to render TOML: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::policy::{ActionTemplate, Condition};
    use crate::scenario::reference_scenarios;
    use std::io::Write;

    fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    const TOPOLOGY: &str = r#"
        seed = 9
        traffic = "silent"

        [clock]
        ticks = 40
        decision_interval = 4

        [[elements]]
        id = "R1"
        kind = "radio-node"

        [[elements]]
        id = "C1"
        kind = "core-node"
        weight = 3.0

        [[links]]
        id = "L1"
        endpoints = ["R1", "C1"]
        capacity = 100.0

        [[events]]
        tick = 5
        event = { degrade = { element = "R1", severity = 80 } }

        [[policies]]
        name = "restart-r1"
        cooldown = 20
        condition = { threshold = { metric = "availability", target = "R1", op = "lt", value = 0.5 } }
        action = { restart = { element = "R1" } }
    "#;

    #[test]
    fn loads_toml_topology_with_defaults() {
        let file = write_config(".toml", TOPOLOGY);
        let config = load_config(file.path()).expect("config should parse");
        assert_eq!(config.seed, 9);
        assert_eq!(config.traffic, TrafficConfig::Silent);
        assert_eq!(config.clock.ticks, 40);
        assert_eq!(config.clock.kpi_interval, 1);
        assert_eq!(config.clock.decision_interval, 4);
        assert_eq!(config.links[0].latency_ms, 10.0);
        assert_eq!(config.elements[1].weight, Some(3.0));
        assert_eq!(
            config.events[0].event,
            EventKind::Degrade {
                element: "R1".to_string(),
                severity: 80,
            }
        );
        assert!(matches!(
            config.policies[0].condition,
            Condition::Threshold(_)
        ));
        assert_eq!(
            config.policies[0].action,
            ActionTemplate::Restart {
                element: "R1".to_string()
            }
        );
    }

    #[test]
    fn rendered_config_round_trips_through_the_loader() {
        let rendered = render_config(&SimConfig::reference_network()).expect("renders");
        let file = write_config(".toml", &rendered);
        let config = load_config(file.path()).expect("rendered config should parse");
        assert_eq!(config.elements.len(), 6);
        assert_eq!(config.policies.len(), 8);
        assert_eq!(config.scenarios, reference_scenarios());
    }

    #[test]
    fn json_configs_are_supported() {
        let file = write_config(
            ".json",
            r#"{"elements":[{"id":"R1","kind":"radio-node"}],"clock":{"ticks":3}}"#,
        );
        let config = load_config(file.path()).expect("json should parse");
        assert_eq!(config.clock.ticks, 3);
        assert!(config.links.is_empty());
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        let file = write_config(".yaml", "seed: 1");
        assert_eq!(
            load_config(file.path()).unwrap_err(),
            Error::UnsupportedConfigFormat("yaml".to_string())
        );
        let missing = load_config(Path::new("does-not-exist.toml")).unwrap_err();
        assert!(matches!(missing, Error::ConfigIo(_)));
    }

    #[test]
    fn overrides_apply_on_top_of_the_reference_network() {
        let source = SourceArgs {
            config: None,
            ticks: Some(12),
            seed: Some(5),
            traffic: Some(TrafficArg::Silent),
        };
        let config = resolve_config(&source).expect("reference network");
        assert_eq!(config.clock.ticks, 12);
        assert_eq!(config.seed, 5);
        assert_eq!(config.traffic, TrafficConfig::Silent);
    }

    #[test]
    fn realtime_requires_a_tick_rate() {
        let args = Args::try_parse_from(["oam-sim", "run", "--realtime"]).expect("parses");
        assert!(matches!(build_invocation(args), Err(Error::Cli(_))));
    }
}
