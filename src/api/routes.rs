use std::fmt::Write as _;

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::config::HOME_TEAM_SHORT;
use crate::state::MonitorSnapshot;
use crate::types::AvailabilityRecord;

#[derive(Clone)]
pub struct ApiState {
    pub status_rx: watch::Receiver<MonitorSnapshot>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(get_summary))
        .route("/status", get(get_status))
        .fallback(not_found)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub team: String,
    pub refresh_interval_minutes: u64,
    pub last_check: Option<DateTime<Utc>>,
    pub checks_performed: u64,
    pub monitoring_since: DateTime<Utc>,
    pub tickets_available: bool,
    /// Latest classification, null until the first successful check.
    pub match_status: Option<AvailabilityRecord>,
}

impl From<&MonitorSnapshot> for StatusResponse {
    fn from(s: &MonitorSnapshot) -> Self {
        Self {
            status: s.phase.to_string(),
            team: s.team.clone(),
            refresh_interval_minutes: s.refresh_interval_minutes,
            last_check: s.last_check_time,
            checks_performed: s.check_count,
            monitoring_since: s.monitoring_start_time,
            tickets_available: s.tickets_available(),
            match_status: s.last_result.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let snap = state.status_rx.borrow().clone();
    Json(StatusResponse::from(&snap))
}

async fn get_summary(State(state): State<ApiState>) -> String {
    let snap = state.status_rx.borrow().clone();
    summary_text(&snap)
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

fn summary_text(s: &MonitorSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Ticket monitor: {HOME_TEAM_SHORT} vs {}", s.team);
    let _ = writeln!(out, "Status: {}", s.phase);
    let _ = writeln!(out, "Checking every {} minutes", s.refresh_interval_minutes);
    let _ = writeln!(out, "Checks performed: {}", s.check_count);
    let _ = writeln!(
        out,
        "Last check: {}",
        s.last_check_time
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
    );
    let _ = writeln!(out, "Monitoring since: {}", s.monitoring_start_time.to_rfc3339());
    let _ = writeln!(
        out,
        "Tickets available: {}",
        if s.tickets_available() { "YES" } else { "no" }
    );
    if let Some(r) = &s.last_result {
        let _ = writeln!(out, "Last result: {}", r.message);
    }
    match (s.check_p50_ms, s.check_p95_ms) {
        (Some(p50), Some(p95)) => {
            let _ = writeln!(out, "Check latency: p50 {p50}ms, p95 {p95}ms");
        }
        _ => {
            let _ = writeln!(out, "Check latency: no samples");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::types::MonitorPhase;

    fn snapshot() -> MonitorSnapshot {
        MonitorSnapshot {
            phase: MonitorPhase::Scheduled,
            team: "Delhi Capitals".to_string(),
            refresh_interval_minutes: 3,
            check_count: 4,
            last_check_time: Some(Utc::now()),
            last_result: Some(AvailabilityRecord {
                found: true,
                available: false,
                match_date: Some("2025-04-10".to_string()),
                price: None,
                status: Some("SOLD OUT".to_string()),
                message: "Tickets for Delhi Capitals are SOLD OUT".to_string(),
            }),
            monitoring_start_time: Utc::now(),
            terminated: false,
            check_p50_ms: Some(2_100),
            check_p95_ms: Some(4_800),
        }
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn app(snap: MonitorSnapshot) -> (Router, watch::Sender<MonitorSnapshot>) {
        let (tx, rx) = watch::channel(snap);
        (router(ApiState { status_rx: rx }), tx)
    }

    #[tokio::test]
    async fn status_reports_camel_case_snapshot() {
        let (app, _tx) = app(snapshot());
        let (code, body) = get(app, "/status").await;
        assert_eq!(code, StatusCode::OK);

        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["status"], "scheduled");
        assert_eq!(v["team"], "Delhi Capitals");
        assert_eq!(v["refreshIntervalMinutes"], 3);
        assert_eq!(v["checksPerformed"], 4);
        assert_eq!(v["ticketsAvailable"], false);
        assert_eq!(v["matchStatus"]["status"], "SOLD OUT");
        assert_eq!(v["matchStatus"]["matchDate"], "2025-04-10");
        assert!(v["lastCheck"].is_string());
        assert!(v["monitoringSince"].is_string());
    }

    #[tokio::test]
    async fn status_follows_latest_snapshot() {
        let (app, tx) = app(snapshot());
        tx.send_modify(|s| {
            s.check_count = 5;
            s.phase = MonitorPhase::Stopped;
            s.terminated = true;
            if let Some(r) = s.last_result.as_mut() {
                r.available = true;
            }
        });

        let (_, body) = get(app, "/status").await;
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["checksPerformed"], 5);
        assert_eq!(v["status"], "stopped");
        assert_eq!(v["ticketsAvailable"], true);
    }

    #[tokio::test]
    async fn before_first_check_fields_are_null() {
        let mut snap = snapshot();
        snap.phase = MonitorPhase::Starting;
        snap.check_count = 0;
        snap.last_check_time = None;
        snap.last_result = None;
        let (app, _tx) = app(snap);

        let (_, body) = get(app, "/status").await;
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(v["lastCheck"].is_null());
        assert!(v["matchStatus"].is_null());
        assert_eq!(v["ticketsAvailable"], false);
    }

    #[tokio::test]
    async fn root_is_plain_text_summary() {
        let (app, _tx) = app(snapshot());
        let (code, body) = get(app, "/").await;
        assert_eq!(code, StatusCode::OK);
        assert!(body.contains("RCB vs Delhi Capitals"));
        assert!(body.contains("Checks performed: 4"));
        assert!(body.contains("Tickets available: no"));
        assert!(body.contains("p50 2100ms, p95 4800ms"));
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let (app, _tx) = app(snapshot());
        let (code, _) = get(app, "/metrics").await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }
}
