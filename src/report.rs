//! Rendering of simulation results.

use std::fmt::Write as _;

use crate::error::{LotError, LotResult};
use crate::simulation::SimulationReport;

/// Renders the human-readable summary: total, per-gate counts, then the log.
#[must_use]
pub fn render_text(report: &SimulationReport) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(
        out,
        "Simulation completed. Total cars served: {}",
        report.metrics.total_served
    );
    for (gate, served) in &report.metrics.per_gate {
        let _ = writeln!(out, "{gate} served {served} cars.");
    }
    if report.timed_out {
        let _ = writeln!(
            out,
            "Simulation timed out: {} car(s) cancelled.",
            report.cancelled()
        );
    }

    let _ = writeln!(out, "\nDetailed logs:");
    for entry in &report.log {
        let _ = writeln!(out, "{entry}");
    }
    out
}

/// Renders the full report as pretty-printed JSON.
///
/// # Errors
///
/// Returns `LotError::Internal` if serialization fails.
pub fn render_json(report: &SimulationReport) -> LotResult<String> {
    serde_json::to_string_pretty(report)
        .map_err(|e| LotError::internal(format!("failed to serialize report: {e}")))
}
