use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::browser::{RenderSession, SessionFactory};
use crate::config::{ALERT_SEND_COUNT, MAX_CONSECUTIVE_ACQUIRE_FAILURES};
use crate::detector::AvailabilityExtractor;
use crate::error::Result;
use crate::notify::{messages, Notifier};
use crate::state::{CheckLatency, MonitorSnapshot, MonitorState};
use crate::types::{AvailabilityRecord, MonitorOutcome, MonitorPhase};

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub ticket_url: String,
    /// Short home-team name used in notifications, e.g. "RCB".
    pub home_short: String,
    pub refresh_interval: Duration,
    pub navigation_timeout: Duration,
}

/// The polling state machine.
///
/// ```text
/// Starting ─► Checking ─┬─► Scheduled ─► (session ok?) ─► Checking
///                       ├─► Recovering ─► Scheduled | Checking
///                       └─► Stopped (tickets available)
/// any state ─(cancel)─► Stopped
/// ```
///
/// Every tick re-navigates from scratch; no page state carries over between
/// checks.
pub struct MonitorLoop<F: SessionFactory> {
    settings: MonitorSettings,
    session: RenderSession<F>,
    extractor: AvailabilityExtractor,
    notifier: Notifier,
    cancel: CancellationToken,
    state: MonitorState,
    phase: MonitorPhase,
    outcome: Option<MonitorOutcome>,
    latency: CheckLatency,
    /// Back-to-back failed launches while recovering.
    acquire_failures: u32,
    status_tx: watch::Sender<MonitorSnapshot>,
}

impl<F: SessionFactory> MonitorLoop<F> {
    pub fn new(
        settings: MonitorSettings,
        factory: F,
        extractor: AvailabilityExtractor,
        notifier: Notifier,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<MonitorSnapshot>) {
        let state = MonitorState::new(Utc::now());
        let latency = CheckLatency::new();
        let initial = snapshot(&settings, &extractor, &state, MonitorPhase::Starting, &latency);
        let (status_tx, status_rx) = watch::channel(initial);

        let monitor = Self {
            settings,
            session: RenderSession::new(factory),
            extractor,
            notifier,
            cancel,
            state,
            phase: MonitorPhase::Starting,
            outcome: None,
            latency,
            acquire_failures: 0,
            status_tx,
        };
        (monitor, status_rx)
    }

    /// Drive the state machine until it stops. Errors only on a session that
    /// cannot be created at all.
    pub async fn run(mut self) -> Result<MonitorOutcome> {
        while self.phase != MonitorPhase::Stopped {
            self.step().await?;
        }
        Ok(self.outcome.unwrap_or(MonitorOutcome::Cancelled))
    }

    /// Perform one transition and publish the resulting snapshot.
    pub async fn step(&mut self) -> Result<MonitorPhase> {
        if self.phase == MonitorPhase::Stopped {
            return Ok(self.phase);
        }

        let next = if self.cancel.is_cancelled() {
            Ok(self.stop_by_user().await)
        } else {
            match self.phase {
                MonitorPhase::Starting => self.start().await,
                MonitorPhase::Checking => Ok(self.check().await),
                MonitorPhase::Recovering { check_after } => self.recover(check_after).await,
                MonitorPhase::Scheduled => Ok(self.wait_for_tick().await),
                MonitorPhase::Stopped => Ok(MonitorPhase::Stopped),
            }
        };

        match next {
            Ok(phase) => {
                self.phase = phase;
                self.publish();
                Ok(phase)
            }
            Err(e) => {
                self.session.release().await;
                self.phase = MonitorPhase::Stopped;
                self.publish();
                Err(e)
            }
        }
    }

    async fn start(&mut self) -> Result<MonitorPhase> {
        let opponent = self.extractor.opponent();
        info!(
            team = %opponent,
            interval_secs = self.settings.refresh_interval.as_secs(),
            "Starting monitoring for {} vs {opponent}",
            self.settings.home_short,
        );

        self.session.acquire().await?;

        self.notifier
            .send(&messages::monitoring_started(
                &self.settings.home_short,
                opponent,
                self.settings.refresh_interval.as_secs() / 60,
            ))
            .await;

        Ok(MonitorPhase::Checking)
    }

    async fn check(&mut self) -> MonitorPhase {
        let now = Utc::now();
        let n = self.state.begin_check(now);
        info!(check = n, "[{}] Check #{n}: refreshing page", now.format("%H:%M:%S"));

        let started = Instant::now();
        let result = self
            .session
            .navigate_and_extract(
                &self.settings.ticket_url,
                &self.extractor,
                self.settings.navigation_timeout,
            )
            .await;
        self.latency.record(started.elapsed());

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                error!(
                    check = n,
                    at = %now.to_rfc3339(),
                    "Check #{n} failed, recreating browser session: {e}"
                );
                self.session.release().await;
                return MonitorPhase::Recovering { check_after: false };
            }
        };

        self.log_record(n, &record);
        self.state.record_result(record.clone());

        if !record.available {
            return MonitorPhase::Scheduled;
        }

        self.alert(&record).await;
        self.state.terminate();
        self.session.release().await;
        self.outcome = Some(MonitorOutcome::TicketsAvailable);
        info!(check = n, "Monitoring stopped. Tickets are now available!");
        MonitorPhase::Stopped
    }

    async fn recover(&mut self, check_after: bool) -> Result<MonitorPhase> {
        match self.session.acquire().await {
            Ok(()) => {
                self.acquire_failures = 0;
                info!(
                    generation = self.session.generation(),
                    "Browser session recreated"
                );
                Ok(if check_after {
                    MonitorPhase::Checking
                } else {
                    MonitorPhase::Scheduled
                })
            }
            Err(e) => {
                self.acquire_failures += 1;
                if self.acquire_failures >= MAX_CONSECUTIVE_ACQUIRE_FAILURES {
                    error!(
                        attempts = self.acquire_failures,
                        "Giving up, browser session cannot be created: {e}"
                    );
                    return Err(e);
                }
                warn!(
                    attempts = self.acquire_failures,
                    "Browser relaunch failed, retrying next tick: {e}"
                );
                Ok(MonitorPhase::Scheduled)
            }
        }
    }

    async fn wait_for_tick(&mut self) -> MonitorPhase {
        let cancel = self.cancel.clone();
        let cancelled = tokio::select! {
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(self.settings.refresh_interval) => false,
        };
        if cancelled {
            return self.stop_by_user().await;
        }

        if self.session.is_valid() {
            MonitorPhase::Checking
        } else {
            info!("Page is closed or invalid, recreating browser session");
            MonitorPhase::Recovering { check_after: true }
        }
    }

    /// Detailed message first, then repeats: `ALERT_SEND_COUNT` sends in total.
    async fn alert(&self, record: &AvailabilityRecord) {
        info!(
            price = record.price.as_deref().unwrap_or("n/a"),
            "🔔🔔🔔 TICKETS ARE NOW AVAILABLE! 🔔🔔🔔"
        );
        let sequence = messages::alert_sequence(
            &self.settings.home_short,
            self.extractor.opponent(),
            record,
            &self.settings.ticket_url,
            ALERT_SEND_COUNT,
        );
        for text in &sequence {
            self.notifier.send(text).await;
        }
    }

    async fn stop_by_user(&mut self) -> MonitorPhase {
        info!("Monitoring stopped by user");
        self.notifier.send(&messages::stopped_by_user()).await;
        self.session.release().await;
        self.outcome = Some(MonitorOutcome::Cancelled);
        MonitorPhase::Stopped
    }

    fn log_record(&self, n: u64, record: &AvailabilityRecord) {
        let opponent = self.extractor.opponent();
        if !record.found {
            info!(check = n, "{}", record.message);
            return;
        }
        info!(
            check = n,
            date = record.match_date.as_deref().unwrap_or("n/a"),
            "Match found: {} vs {opponent}",
            self.settings.home_short,
        );
        if !record.available {
            info!(
                check = n,
                price = record.price.as_deref().unwrap_or("n/a"),
                status = record.status.as_deref().unwrap_or("n/a"),
                "{}",
                record.message
            );
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(snapshot(
            &self.settings,
            &self.extractor,
            &self.state,
            self.phase,
            &self.latency,
        ));
    }
}

fn snapshot(
    settings: &MonitorSettings,
    extractor: &AvailabilityExtractor,
    state: &MonitorState,
    phase: MonitorPhase,
    latency: &CheckLatency,
) -> MonitorSnapshot {
    let (p50, p95) = latency.percentiles();
    MonitorSnapshot {
        phase,
        team: extractor.opponent().to_string(),
        refresh_interval_minutes: settings.refresh_interval.as_secs() / 60,
        check_count: state.check_count(),
        last_check_time: state.last_check_time(),
        last_result: state.last_result().cloned(),
        monitoring_start_time: state.monitoring_start_time(),
        terminated: state.is_terminated(),
        check_p50_ms: p50,
        check_p95_ms: p95,
    }
}
