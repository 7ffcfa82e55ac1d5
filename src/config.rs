use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const TICKET_URL: &str = "https://shop.royalchallengers.com/ticket";
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Team whose home fixtures are listed on the ticket page.
pub const HOME_TEAM: &str = "Royal Challengers Bengaluru";
pub const HOME_TEAM_SHORT: &str = "RCB";

pub const DEFAULT_TARGET_TEAM: &str = "Chennai Super Kings";

/// Opponents the ticket page can list. Anything else is warned about, not rejected.
pub const IPL_TEAMS: &[&str] = &[
    "Chennai Super Kings",
    "Delhi Capitals",
    "Gujarat Titans",
    "Kolkata Knight Riders",
    "Lucknow Super Giants",
    "Mumbai Indians",
    "Punjab Kings",
    "Rajasthan Royals",
    "Sunrisers Hyderabad",
];

/// Polling interval (minutes).
pub const DEFAULT_REFRESH_INTERVAL_MINUTES: u64 = 3;
/// Longest accepted polling interval: one day.
pub const MAX_REFRESH_INTERVAL_MINUTES: u64 = 24 * 60;

/// Upper bound on navigation + network quiescence + extraction (seconds).
pub const NAVIGATION_TIMEOUT_SECS: u64 = 60;

/// How long to wait for Chrome to print its DevTools endpoint (seconds).
pub const BROWSER_LAUNCH_TIMEOUT_SECS: u64 = 30;

/// Per-message bound on Telegram delivery (seconds).
pub const NOTIFY_TIMEOUT_SECS: u64 = 10;

/// Messages per availability alert: the detailed one, then short repeats.
/// The repeats are deliberate redundancy so the alert is hard to miss; do not
/// collapse them into a single send.
pub const ALERT_SEND_COUNT: usize = 3;

/// Session launches that may fail back-to-back during recovery before the
/// monitor gives up.
pub const MAX_CONSECUTIVE_ACQUIRE_FAILURES: u32 = 3;

/// Network quiescence: at most this many requests in flight...
pub const NETWORK_IDLE_MAX_INFLIGHT: usize = 2;
/// ...for at least this long (milliseconds) after the load event.
pub const NETWORK_IDLE_QUIET_MS: u64 = 500;

/// Browser binaries tried, in order, when CHROME_PATH is not set.
pub const CHROME_CANDIDATES: &[&str] = &["google-chrome", "chromium", "chromium-browser", "chrome"];

/// Markup hooks on the ticket page. These track the shop's generated class
/// names and break whenever the site is rebuilt.
pub mod selectors {
    pub const MATCH_CARD: &str = ".css-q38j1a";
    pub const BUY_BUTTON: &str = "button.chakra-button.css-9le7ot";
    pub const MATCH_DATE: &str = ".chakra-text.css-1nm99ps";
    pub const PRICE: &str = ".css-1eveppl";
}

/// Label on the purchase action when sales are open.
pub const PURCHASE_LABEL: &str = "BUY TICKETS";

/// Labels shown in place of the purchase action.
pub const STATUS_LABELS: &[&str] = &["COMING SOON", "SOLD OUT", "PHASE 1 SOLD OUT"];

#[derive(Debug, Clone)]
pub struct Config {
    /// Opponent to watch for (TARGET_TEAM)
    pub target_team: String,
    /// Minutes between checks (REFRESH_INTERVAL_MINUTES)
    pub refresh_interval_minutes: u64,
    pub ticket_url: String,
    pub telegram_api_url: String,
    /// Empty disables notifications (TELEGRAM_BOT_TOKEN)
    pub telegram_bot_token: String,
    /// Empty disables notifications (TELEGRAM_CHAT_ID)
    pub telegram_chat_id: String,
    pub navigation_timeout_secs: u64,
    /// Browser executable (CHROME_PATH). None when nothing was found on PATH.
    pub chrome_path: Option<PathBuf>,
    pub log_level: String,
    pub api_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let refresh_interval_minutes =
            parse_refresh_interval(std::env::var("REFRESH_INTERVAL_MINUTES").ok().as_deref())?;

        Ok(Self {
            target_team: std::env::var("TARGET_TEAM")
                .map(|s| s.trim().to_string())
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_TARGET_TEAM.to_string()),
            refresh_interval_minutes,
            ticket_url: std::env::var("TICKET_URL").unwrap_or_else(|_| TICKET_URL.to_string()),
            telegram_api_url: std::env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| TELEGRAM_API_URL.to_string()),
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID").unwrap_or_default(),
            navigation_timeout_secs: std::env::var("NAVIGATION_TIMEOUT_SECS")
                .unwrap_or_else(|_| NAVIGATION_TIMEOUT_SECS.to_string())
                .parse::<u64>()
                .unwrap_or(NAVIGATION_TIMEOUT_SECS),
            chrome_path: std::env::var("CHROME_PATH")
                .ok()
                .map(PathBuf::from)
                .or_else(find_chrome),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_minutes.saturating_mul(60))
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

/// REFRESH_INTERVAL_MINUTES: unset means the default, otherwise a whole
/// number in `1..=MAX_REFRESH_INTERVAL_MINUTES`.
fn parse_refresh_interval(raw: Option<&str>) -> Result<u64> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_REFRESH_INTERVAL_MINUTES);
    };
    let minutes = raw.trim().parse::<u64>().map_err(|_| {
        AppError::Config("REFRESH_INTERVAL_MINUTES must be a whole number of minutes".to_string())
    })?;
    if !(1..=MAX_REFRESH_INTERVAL_MINUTES).contains(&minutes) {
        return Err(AppError::Config(format!(
            "REFRESH_INTERVAL_MINUTES must be between 1 and {MAX_REFRESH_INTERVAL_MINUTES}, got {minutes}"
        )));
    }
    Ok(minutes)
}

/// True when `team` is one of the opponents the ticket page is known to list.
pub fn is_known_team(team: &str) -> bool {
    IPL_TEAMS.contains(&team)
}

fn find_chrome() -> Option<PathBuf> {
    CHROME_CANDIDATES
        .iter()
        .find_map(|name| which::which(name).ok())
}
