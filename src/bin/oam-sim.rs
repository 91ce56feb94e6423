use std::thread;

use oam_sim::config::{self, FormatArg, Invocation};
use oam_sim::engine::{tick_period, SimulationEngine};
use oam_sim::error::Result;
use oam_sim::output::{self, Formatter, HumanFormatter, JsonFormatter, SummaryFormatter};
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let args = config::parse_args()?;
    match config::build_invocation(args)? {
        Invocation::ListKpis => print!("{}", output::render_kpi_catalog()),
        Invocation::ShowConfig(config) => print!("{}", config::render_config(&config)?),
        Invocation::Run {
            config,
            format,
            export,
            realtime,
        } => {
            let mut engine = SimulationEngine::new(config)?;
            let pace = engine
                .config
                .clock
                .tick_rate_hz
                .filter(|_| realtime)
                .map(tick_period)
                .transpose()?;
            let report = match pace {
                Some(interval) => engine.run_with(|_| thread::sleep(interval)),
                None => engine.run(),
            };

            if let Some(path) = export {
                output::export_state(&report.final_state, &path)?;
            }

            let formatter = formatter_for(&format);
            print!("{}", formatter.write(&report));
        }
    }
    Ok(())
}

fn formatter_for(format: &FormatArg) -> Box<dyn Formatter> {
    match format {
        FormatArg::Human => Box::new(HumanFormatter),
        FormatArg::Summary => Box::new(SummaryFormatter),
        FormatArg::Json => Box::new(JsonFormatter),
    }
}
