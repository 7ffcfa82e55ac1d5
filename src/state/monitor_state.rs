use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{AvailabilityRecord, MonitorPhase};

/// Counters and last result of the monitor. Owned and mutated by the monitor
/// loop only; everyone else sees `MonitorSnapshot` copies.
#[derive(Debug, Clone)]
pub struct MonitorState {
    check_count: u64,
    last_check_time: Option<DateTime<Utc>>,
    last_result: Option<AvailabilityRecord>,
    monitoring_start_time: DateTime<Utc>,
    terminated: bool,
}

impl MonitorState {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            check_count: 0,
            last_check_time: None,
            last_result: None,
            monitoring_start_time: started_at,
            terminated: false,
        }
    }

    /// Count a check attempt. Returns its 1-based number.
    pub fn begin_check(&mut self, at: DateTime<Utc>) -> u64 {
        self.check_count += 1;
        self.last_check_time = Some(at);
        self.check_count
    }

    pub fn record_result(&mut self, record: AvailabilityRecord) {
        self.last_result = Some(record);
    }

    /// Irreversible.
    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    pub fn check_count(&self) -> u64 {
        self.check_count
    }

    pub fn last_check_time(&self) -> Option<DateTime<Utc>> {
        self.last_check_time
    }

    pub fn last_result(&self) -> Option<&AvailabilityRecord> {
        self.last_result.as_ref()
    }

    pub fn monitoring_start_time(&self) -> DateTime<Utc> {
        self.monitoring_start_time
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

/// Read-only copy of the monitor published after every transition.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub phase: MonitorPhase,
    pub team: String,
    pub refresh_interval_minutes: u64,
    pub check_count: u64,
    pub last_check_time: Option<DateTime<Utc>>,
    pub last_result: Option<AvailabilityRecord>,
    pub monitoring_start_time: DateTime<Utc>,
    pub terminated: bool,
    /// Check duration percentiles in milliseconds (p50, p95).
    pub check_p50_ms: Option<u64>,
    pub check_p95_ms: Option<u64>,
}

impl MonitorSnapshot {
    pub fn tickets_available(&self) -> bool {
        self.last_result.as_ref().is_some_and(|r| r.available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_count_tracks_attempts() {
        let t0 = Utc::now();
        let mut state = MonitorState::new(t0);
        assert_eq!(state.check_count(), 0);
        assert!(state.last_check_time().is_none());

        assert_eq!(state.begin_check(t0), 1);
        assert_eq!(state.begin_check(t0), 2);
        assert_eq!(state.check_count(), 2);
        assert_eq!(state.last_check_time(), Some(t0));
        assert!(state.last_result().is_none(), "attempts alone record no result");
    }

    #[test]
    fn only_latest_result_is_kept() {
        let mut state = MonitorState::new(Utc::now());
        state.record_result(AvailabilityRecord::not_found("A"));
        state.record_result(AvailabilityRecord::not_found("B"));
        assert_eq!(state.last_result().unwrap().message, "B match not found");
    }

    #[test]
    fn terminate_sticks() {
        let mut state = MonitorState::new(Utc::now());
        assert!(!state.is_terminated());
        state.terminate();
        state.terminate();
        assert!(state.is_terminated());
    }
}
