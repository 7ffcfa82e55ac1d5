use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, info, trace};

use super::cdp::CdpConnection;
use super::{NavigationError, PageHandle, SessionFactory};
use crate::config::{NETWORK_IDLE_MAX_INFLIGHT, NETWORK_IDLE_QUIET_MS};
use crate::error::{AppError, Result};

const CHROME_ARGS: &[&str] = &[
    "--headless=new",
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--no-first-run",
    "--no-default-browser-check",
    "--remote-debugging-port=0",
];

const DEVTOOLS_BANNER: &str = "DevTools listening on ";

#[derive(Debug, Clone)]
pub struct ChromeConfig {
    /// Browser binary. None means nothing usable was found.
    pub executable: Option<PathBuf>,
    /// How long to wait for the DevTools endpoint after spawning.
    pub launch_timeout: Duration,
}

/// Launches one headless Chrome per session.
pub struct ChromeLauncher {
    cfg: ChromeConfig,
    client: reqwest::Client,
}

impl ChromeLauncher {
    pub fn new(cfg: ChromeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { cfg, client })
    }

    /// Read the DevTools endpoint from stderr, find the page target and
    /// connect to it.
    async fn attach(&self, child: &mut Child) -> Result<CdpConnection> {
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Launch("browser stderr was not captured".to_string()))?;
        let mut lines = BufReader::new(stderr).lines();

        let browser_ws = tokio::time::timeout(self.cfg.launch_timeout, read_devtools_url(&mut lines))
            .await
            .map_err(|_| {
                AppError::Launch(format!(
                    "no DevTools endpoint after {:?}",
                    self.cfg.launch_timeout
                ))
            })??;

        // Chrome blocks once its stderr pipe fills, so keep draining it.
        tokio::spawn(drain_stderr(lines));

        let base = devtools_http_base(&browser_ws)
            .ok_or_else(|| AppError::Launch(format!("unexpected DevTools URL: {browser_ws}")))?;
        let page_ws = self.discover_page(&base).await?;
        CdpConnection::connect(&page_ws).await
    }

    async fn discover_page(&self, base: &str) -> Result<String> {
        let targets: Vec<TargetInfo> = self
            .client
            .get(format!("{base}/json/list"))
            .send()
            .await?
            .json()
            .await?;

        if let Some(url) = targets
            .into_iter()
            .find(|t| t.kind == "page")
            .and_then(|t| t.web_socket_debugger_url)
        {
            return Ok(url);
        }

        let created: TargetInfo = self
            .client
            .put(format!("{base}/json/new?about:blank"))
            .send()
            .await?
            .json()
            .await?;
        created
            .web_socket_debugger_url
            .ok_or_else(|| AppError::Launch("new page target has no WebSocket URL".to_string()))
    }
}

#[async_trait]
impl SessionFactory for ChromeLauncher {
    type Page = ChromePage;

    async fn launch(&self) -> Result<ChromePage> {
        let exe = self.cfg.executable.as_ref().ok_or_else(|| {
            AppError::Launch("no Chrome/Chromium executable found; set CHROME_PATH".to_string())
        })?;
        let profile = tempfile::Builder::new()
            .prefix("ticket-watch-")
            .tempdir()?;

        let mut child = Command::new(exe)
            .args(CHROME_ARGS)
            .arg(format!("--user-data-dir={}", profile.path().display()))
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Launch(format!("{}: {e}", exe.display())))?;

        match self.attach(&mut child).await {
            Ok(conn) => {
                info!(pid = ?child.id(), "Browser launched: {}", exe.display());
                Ok(ChromePage {
                    child,
                    conn,
                    _profile: profile,
                })
            }
            Err(e) => {
                if let Err(kill_err) = child.kill().await {
                    debug!("Failed to kill half-started browser: {kill_err}");
                }
                Err(e)
            }
        }
    }
}

/// A Chrome process with one attached page.
pub struct ChromePage {
    child: Child,
    conn: CdpConnection,
    /// Removed from disk when the page is dropped.
    _profile: TempDir,
}

#[async_trait]
impl PageHandle for ChromePage {
    fn is_alive(&mut self) -> bool {
        self.conn.is_open() && matches!(self.child.try_wait(), Ok(None))
    }

    async fn navigate_and_evaluate(
        &mut self,
        url: &str,
        script: &str,
        timeout: Duration,
    ) -> std::result::Result<Value, NavigationError> {
        let conn = &mut self.conn;
        let work = async {
            conn.clear_events();
            conn.call("Page.enable", json!({})).await?;
            conn.call("Network.enable", json!({})).await?;

            let nav = conn.call("Page.navigate", json!({ "url": url })).await?;
            if let Some(err) = nav.get("errorText").and_then(Value::as_str) {
                return Err(NavigationError::Protocol(format!("navigation to {url} failed: {err}")));
            }

            conn.wait_for_network_idle(
                NETWORK_IDLE_MAX_INFLIGHT,
                Duration::from_millis(NETWORK_IDLE_QUIET_MS),
            )
            .await?;

            let eval = conn
                .call(
                    "Runtime.evaluate",
                    json!({
                        "expression": script,
                        "returnByValue": true,
                        "awaitPromise": true,
                    }),
                )
                .await?;
            evaluation_value(eval)
        };

        match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(NavigationError::Timeout(timeout)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.conn.close().await;
        self.child.kill().await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TargetInfo {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: Option<String>,
}

async fn read_devtools_url(lines: &mut Lines<BufReader<ChildStderr>>) -> Result<String> {
    while let Some(line) = lines.next_line().await? {
        trace!(target: "chrome", "{line}");
        if let Some(url) = parse_devtools_line(&line) {
            return Ok(url.to_string());
        }
    }
    Err(AppError::Launch(
        "browser exited before exposing DevTools".to_string(),
    ))
}

async fn drain_stderr(mut lines: Lines<BufReader<ChildStderr>>) {
    while let Ok(Some(line)) = lines.next_line().await {
        trace!(target: "chrome", "{line}");
    }
}

/// `DevTools listening on ws://127.0.0.1:PORT/devtools/browser/ID` → the ws URL.
fn parse_devtools_line(line: &str) -> Option<&str> {
    let idx = line.find(DEVTOOLS_BANNER)?;
    let url = line[idx + DEVTOOLS_BANNER.len()..].trim();
    url.starts_with("ws://").then_some(url)
}

/// `ws://host:port/devtools/...` → `http://host:port`.
fn devtools_http_base(ws_url: &str) -> Option<String> {
    let rest = ws_url.strip_prefix("ws://")?;
    let host = rest.split('/').next().filter(|h| !h.is_empty())?;
    Some(format!("http://{host}"))
}

/// Pull the returned value out of a `Runtime.evaluate` result, surfacing
/// script exceptions.
fn evaluation_value(eval: Value) -> std::result::Result<Value, NavigationError> {
    if let Some(details) = eval.get("exceptionDetails") {
        let text = details
            .pointer("/exception/description")
            .or_else(|| details.get("text"))
            .and_then(Value::as_str)
            .unwrap_or("unknown exception");
        return Err(NavigationError::Evaluation(text.to_string()));
    }
    Ok(eval
        .pointer("/result/value")
        .cloned()
        .unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_devtools_url_in_stderr() {
        let line = "\nDevTools listening on ws://127.0.0.1:40215/devtools/browser/3f1c-aa\n";
        assert_eq!(
            parse_devtools_line(line),
            Some("ws://127.0.0.1:40215/devtools/browser/3f1c-aa")
        );
        assert_eq!(parse_devtools_line("[0101/000000.000:ERROR:gpu] nope"), None);
    }

    #[test]
    fn http_base_from_ws_url() {
        assert_eq!(
            devtools_http_base("ws://127.0.0.1:40215/devtools/browser/x").as_deref(),
            Some("http://127.0.0.1:40215")
        );
        assert_eq!(devtools_http_base("http://127.0.0.1:1/x"), None);
        assert_eq!(devtools_http_base("ws:///x"), None);
    }

    #[test]
    fn evaluation_returns_value() {
        let eval = json!({ "result": { "type": "object", "value": { "cardFound": true } } });
        assert_eq!(evaluation_value(eval).unwrap(), json!({ "cardFound": true }));
    }

    #[test]
    fn evaluation_surfaces_exceptions() {
        let eval = json!({
            "result": { "type": "object" },
            "exceptionDetails": { "text": "Uncaught", "exception": { "description": "TypeError: x is null" } }
        });
        match evaluation_value(eval) {
            Err(NavigationError::Evaluation(msg)) => assert_eq!(msg, "TypeError: x is null"),
            other => panic!("expected Evaluation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn launch_without_executable_fails() {
        let launcher = ChromeLauncher::new(ChromeConfig {
            executable: None,
            launch_timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert!(matches!(launcher.launch().await, Err(AppError::Launch(_))));
    }
}
