mod api;
mod browser;
mod config;
mod detector;
mod error;
mod monitor;
mod notify;
mod state;
mod types;

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::{router, ApiState};
use crate::browser::{ChromeConfig, ChromeLauncher};
use crate::config::{
    is_known_team, Config, BROWSER_LAUNCH_TIMEOUT_SECS, HOME_TEAM, HOME_TEAM_SHORT, IPL_TEAMS,
    NOTIFY_TIMEOUT_SECS,
};
use crate::detector::AvailabilityExtractor;
use crate::error::Result;
use crate::monitor::{MonitorLoop, MonitorSettings};
use crate::notify::{NotificationChannel, Notifier, TelegramChannel, TelegramConfig};
use crate::types::MonitorOutcome;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    if !is_known_team(&cfg.target_team) {
        warn!(
            team = %cfg.target_team,
            "Unknown team, the match will likely never be found. Valid teams: {}",
            IPL_TEAMS.join(", ")
        );
    }

    // --- Cancellation: Ctrl-C stops the monitor and the status server ---
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                ctrl_c_cancel.cancel();
            }
            Err(e) => warn!("Cannot listen for Ctrl-C: {e}"),
        }
    });

    // --- Notifications ---
    let telegram = TelegramChannel::new(TelegramConfig {
        api_url: cfg.telegram_api_url.clone(),
        bot_token: cfg.telegram_bot_token.clone(),
        chat_id: cfg.telegram_chat_id.clone(),
        ..Default::default()
    });
    if !telegram.is_enabled() {
        warn!("TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID not set, notifications are disabled");
    }
    let notifier = Notifier::new(Arc::new(telegram), Duration::from_secs(NOTIFY_TIMEOUT_SECS));

    // --- Browser ---
    let launcher = ChromeLauncher::new(ChromeConfig {
        executable: cfg.chrome_path.clone(),
        launch_timeout: Duration::from_secs(BROWSER_LAUNCH_TIMEOUT_SECS),
    })?;
    match &cfg.chrome_path {
        Some(path) => info!("Using browser at {}", path.display()),
        None => warn!("No Chrome/Chromium found on PATH; set CHROME_PATH"),
    }

    let (monitor, status_rx) = MonitorLoop::new(
        MonitorSettings {
            ticket_url: cfg.ticket_url.clone(),
            home_short: HOME_TEAM_SHORT.to_string(),
            refresh_interval: cfg.refresh_interval(),
            navigation_timeout: cfg.navigation_timeout(),
        },
        launcher,
        AvailabilityExtractor::new(HOME_TEAM, cfg.target_team.clone()),
        notifier,
        cancel.clone(),
    );

    // --- HTTP status server ---
    let app = router(ApiState { status_rx });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Status server listening on {bind_addr}");
    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    let outcome = monitor.run().await;
    if outcome.is_err() {
        cancel.cancel();
    }

    if let Ok(MonitorOutcome::TicketsAvailable) = outcome {
        ring_bell();
        info!("Tickets are available. Status server stays up until Ctrl-C");
        cancel.cancelled().await;
    }

    match server.await {
        Ok(Err(e)) => warn!("Status server stopped with error: {e}"),
        Err(e) => warn!("Status server task failed: {e}"),
        Ok(Ok(())) => {}
    }

    outcome.map(|_| ())
}

/// Terminal bell. Best effort: a closed stdout is not worth failing over.
fn ring_bell() {
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(b"\x07");
    let _ = stdout.flush();
}
