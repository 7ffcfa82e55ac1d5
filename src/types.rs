use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Availability
// ---------------------------------------------------------------------------

/// Outcome of one check against the ticket page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRecord {
    /// A listing for the target match was on the page.
    pub found: bool,
    /// The listing's purchase action was live.
    pub available: bool,
    pub match_date: Option<String>,
    pub price: Option<String>,
    /// Status label shown instead of the purchase action (e.g. "SOLD OUT").
    pub status: Option<String>,
    pub message: String,
}

impl AvailabilityRecord {
    pub fn not_found(opponent: &str) -> Self {
        Self {
            found: false,
            available: false,
            match_date: None,
            price: None,
            status: None,
            message: format!("{opponent} match not found"),
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorPhase {
    Starting,
    Checking,
    /// Waiting for the next tick.
    Scheduled,
    /// Replacing the browser session. `check_after` is set when recovery was
    /// triggered by the pre-check validity test rather than by a failed check.
    Recovering { check_after: bool },
    Stopped,
}

impl std::fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MonitorPhase::Starting => "starting",
            MonitorPhase::Checking => "checking",
            MonitorPhase::Scheduled => "scheduled",
            MonitorPhase::Recovering { .. } => "recovering",
            MonitorPhase::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Why the monitor stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    TicketsAvailable,
    Cancelled,
}
