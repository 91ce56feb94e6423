use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::kpi::{Metric, Scope};
use crate::publisher::PublishedState;
use crate::state::RunReport;

pub trait Formatter {
    fn write(&self, report: &RunReport) -> String;
}

pub struct HumanFormatter;
pub struct SummaryFormatter;
pub struct JsonFormatter;

impl Formatter for SummaryFormatter {
    fn write(&self, report: &RunReport) -> String {
        let mut out = String::new();
        write_metadata(&mut out, report);
        write_totals(&mut out, report);
        out
    }
}

impl Formatter for HumanFormatter {
    fn write(&self, report: &RunReport) -> String {
        let mut out = String::new();
        write_metadata(&mut out, report);

        let state = &report.final_state;
        let _ = writeln!(out, "Elements:");
        for element in &state.network.elements {
            let _ = write!(
                out,
                "{} [{}]: {} (health {})",
                element.id, element.kind, element.state, element.health
            );
            if !element.active_faults.is_empty() {
                let _ = write!(out, " faults: {}", element.active_faults.join(","));
            }
            out.push('\n');
        }

        let _ = writeln!(out, "Links:");
        for link in &state.network.links {
            let _ = writeln!(
                out,
                "{}: {:.1}/{:.1} latency {:.1}ms loss {:.4}",
                link.id, link.throughput, link.capacity, link.latency_ms, link.packet_loss
            );
        }

        if !state.alarms.is_empty() {
            let _ = writeln!(out, "Alarms:");
            for alarm in &state.alarms {
                let _ = writeln!(
                    out,
                    "{} {} {} = {:.3} (since {})",
                    alarm.id, alarm.severity, alarm.kpi, alarm.value, alarm.raised_at
                );
            }
        }

        let _ = writeln!(out, "Actions:");
        for action in &report.actions {
            let _ = writeln!(
                out,
                "#{} {} -> {} (attempts: {}, rule: {})",
                action.id,
                action.kind,
                action.status,
                action.attempts,
                action.rule.as_deref().unwrap_or("-")
            );
        }

        write_totals(&mut out, report);
        out
    }
}

impl Formatter for JsonFormatter {
    fn write(&self, report: &RunReport) -> String {
        match serde_json::to_string_pretty(report) {
            Ok(mut json) => {
                json.push('\n');
                json
            }
            Err(err) => format!("{{\"error\": \"{}\"}}\n", err),
        }
    }
}

fn write_metadata(out: &mut String, report: &RunReport) {
    let metadata = &report.metadata;
    let _ = writeln!(out, "Metadata:");
    let _ = writeln!(out, "seed: {}", metadata.seed);
    let _ = writeln!(out, "ticks: {}", metadata.ticks);
    let _ = writeln!(
        out,
        "intervals: kpi={} decision={}",
        metadata.kpi_interval, metadata.decision_interval
    );
    let _ = writeln!(out, "traffic: {}", metadata.traffic);
    if metadata.stopped_early {
        let _ = writeln!(out, "stopped early");
    }
}

fn write_totals(out: &mut String, report: &RunReport) {
    let events = &report.summary.events;
    let actions = &report.summary.automation;
    let _ = writeln!(out, "Events:");
    let _ = writeln!(
        out,
        "generated: {}, applied: {}, ignored: {}, dropped: {}",
        events.generated, events.applied, events.ignored, events.dropped
    );
    let _ = writeln!(out, "Automation:");
    let _ = writeln!(
        out,
        "created: {}, dispatched: {}, succeeded: {}, abandoned: {}",
        actions.created, actions.dispatched, actions.succeeded, actions.abandoned
    );
    let _ = writeln!(
        out,
        "failed attempts: {}, escalations: {}, conflicts: {}, cooldown skips: {}",
        actions.failed_attempts,
        actions.escalations,
        actions.dispatch_conflicts,
        actions.cooldown_suppressed
    );
    let _ = writeln!(
        out,
        "Alarms raised: {}, cleared: {}",
        report.summary.alarms_raised, report.summary.alarms_cleared
    );
    let _ = writeln!(out, "Network health: {}", report.summary.network_health);
}

pub fn render_kpi_catalog() -> String {
    let mut out = String::new();
    for metric in Metric::ALL {
        let scope = match metric.scope() {
            Scope::Element => "element",
            Scope::Link => "link",
            Scope::Network => "network",
        };
        let source = if metric.traffic_derived() {
            " (traffic)"
        } else {
            ""
        };
        let _ = writeln!(out, "{:<16}{}{}", metric.name(), scope, source);
    }
    out
}

pub fn export_state(state: &PublishedState, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|err| Error::Export(format!("failed to encode state: {}", err)))?;
    fs::write(path, json).map_err(|err| {
        Error::Export(format!(
            "failed to write export '{}': {}",
            path.display(),
            err
        ))
    })
}
