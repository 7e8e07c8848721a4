//! Terminal output for connection results.
//!
//! Uses the `console` crate for styling; colors switch off automatically when
//! stdout is not a terminal.

use console::style;

use crate::session::{SessionOutcome, SessionState};

/// One line describing how a connection attempt ended
pub fn outcome_line(outcome: &SessionOutcome) -> String {
    match &outcome.state {
        SessionState::Connected => {
            format!("{} {} connected", style("✓").green(), style(&outcome.name).bold())
        }
        SessionState::TimedOut => format!(
            "{} {} timed out waiting for a prompt",
            style("⏱").yellow(),
            style(&outcome.name).bold()
        ),
        SessionState::Failed(reason) => format!(
            "{} {} failed: {}",
            style("✗").red(),
            style(&outcome.name).bold(),
            reason
        ),
        other => format!("{} {} {}", style("?").dim(), outcome.name, other),
    }
}

/// Counts of each outcome kind
pub fn summary_line(outcomes: &[SessionOutcome]) -> String {
    let connected = outcomes.iter().filter(|o| o.is_connected()).count();
    let timed_out = outcomes
        .iter()
        .filter(|o| o.state == SessionState::TimedOut)
        .count();
    let failed = outcomes.len() - connected - timed_out;

    format!(
        "{} connected, {} failed, {} timed out",
        style(connected).green(),
        style(failed).red(),
        style(timed_out).yellow()
    )
}

pub fn unknown_names_warning(unknown: &[String]) -> String {
    format!(
        "{} Unknown connection names: {}",
        style("⚠").yellow(),
        unknown.join(", ")
    )
}

/// One configured name per line
pub fn listing(names: &[&str]) -> String {
    names
        .iter()
        .map(|name| format!("{} {}", style("•").dim(), name))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn holding_line(live: usize) -> String {
    format!(
        "{}",
        style(format!(
            "Holding {} tunnel{} open, press Ctrl-C to close",
            live,
            if live == 1 { "" } else { "s" }
        ))
        .dim()
    )
}
