use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use super::NavigationError;
use crate::error::Result;

/// An unsolicited protocol notification, e.g. `Network.requestWillBeSent`.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
}

impl CdpEvent {
    fn request_id(&self) -> Option<&str> {
        self.params.get("requestId").and_then(Value::as_str)
    }
}

#[derive(Debug)]
pub enum Incoming {
    /// Reply to a command we sent. `Err` carries the protocol error message.
    Response {
        id: u64,
        result: std::result::Result<Value, String>,
    },
    Event(CdpEvent),
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: Option<u64>,
    method: Option<String>,
    params: Option<Value>,
    result: Option<Value>,
    error: Option<RawError>,
}

#[derive(Debug, Deserialize)]
struct RawError {
    code: i64,
    message: String,
}

/// Parse one DevTools text frame. Returns None for frames that are neither a
/// response nor an event.
pub fn parse_incoming(text: &str) -> Option<Incoming> {
    let raw: RawMessage = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!("Unparseable DevTools frame: {e}");
            return None;
        }
    };

    match (raw.id, raw.method) {
        (Some(id), _) => {
            let result = match raw.error {
                Some(err) => Err(format!("{} (code {})", err.message, err.code)),
                None => Ok(raw.result.unwrap_or(Value::Null)),
            };
            Some(Incoming::Response { id, result })
        }
        (None, Some(method)) => Some(Incoming::Event(CdpEvent {
            method,
            params: raw.params.unwrap_or(Value::Null),
        })),
        (None, None) => None,
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Minimal DevTools client over a single page WebSocket. Commands are issued
/// one at a time; events that arrive while waiting for a response are queued
/// and handed out by `next_event`.
pub struct CdpConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
    events: VecDeque<CdpEvent>,
    /// Set once the socket is gone or the target crashed.
    dead: bool,
}

impl CdpConnection {
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let (ws, _) = connect_async(ws_url).await?;
        debug!("DevTools connected to {ws_url}");
        Ok(Self {
            ws,
            next_id: 0,
            events: VecDeque::new(),
            dead: false,
        })
    }

    pub fn is_open(&self) -> bool {
        !self.dead
    }

    /// Drop queued events, e.g. leftovers from a previous navigation.
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Send a command and wait for its response.
    pub async fn call(
        &mut self,
        method: &str,
        params: Value,
    ) -> std::result::Result<Value, NavigationError> {
        if self.dead {
            return Err(NavigationError::Closed("DevTools socket already closed".to_string()));
        }
        self.next_id += 1;
        let id = self.next_id;
        let frame = json!({ "id": id, "method": method, "params": params }).to_string();
        if let Err(e) = self.ws.send(Message::Text(frame.into())).await {
            self.dead = true;
            return Err(NavigationError::Closed(e.to_string()));
        }
        trace!(id, method, "DevTools command sent");

        loop {
            match self.read_incoming().await? {
                Incoming::Response { id: got, result } if got == id => {
                    return result.map_err(|e| NavigationError::Protocol(format!("{method}: {e}")));
                }
                Incoming::Response { id: got, .. } => {
                    debug!("Discarding stale DevTools response #{got}");
                }
                Incoming::Event(event) => self.events.push_back(event),
            }
        }
    }

    /// Next event, queued ones first.
    pub async fn next_event(&mut self) -> std::result::Result<CdpEvent, NavigationError> {
        if let Some(event) = self.events.pop_front() {
            return Ok(event);
        }
        loop {
            if let Incoming::Event(event) = self.read_incoming().await? {
                return Ok(event);
            }
        }
    }

    /// Wait until the load event has fired and at most `max_inflight` requests
    /// have been outstanding for `quiet`.
    pub async fn wait_for_network_idle(
        &mut self,
        max_inflight: usize,
        quiet: Duration,
    ) -> std::result::Result<(), NavigationError> {
        let mut idle = NetworkIdle::new(max_inflight, quiet);
        loop {
            let event = match idle.remaining(Instant::now()) {
                Some(d) if d.is_zero() => return Ok(()),
                Some(d) => match tokio::time::timeout(d, self.next_event()).await {
                    Ok(event) => event?,
                    Err(_) => return Ok(()),
                },
                None => self.next_event().await?,
            };
            idle.observe(&event, Instant::now());
        }
    }

    pub async fn close(&mut self) {
        self.dead = true;
        if let Err(e) = self.ws.close(None).await {
            debug!("DevTools close: {e}");
        }
    }

    async fn read_incoming(&mut self) -> std::result::Result<Incoming, NavigationError> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let Some(incoming) = parse_incoming(&text) else {
                        continue;
                    };
                    if let Incoming::Event(event) = &incoming {
                        match event.method.as_str() {
                            "Inspector.targetCrashed" => {
                                self.dead = true;
                                return Err(NavigationError::Crashed);
                            }
                            "Inspector.detached" => {
                                self.dead = true;
                                return Err(NavigationError::Closed("target detached".to_string()));
                            }
                            _ => {}
                        }
                    }
                    return Ok(incoming);
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.ws.send(Message::Pong(data)).await {
                        self.dead = true;
                        return Err(NavigationError::Closed(e.to_string()));
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.dead = true;
                    return Err(NavigationError::Closed("DevTools socket closed".to_string()));
                }
                Some(Err(e)) => {
                    self.dead = true;
                    return Err(NavigationError::Closed(e.to_string()));
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Network quiescence
// ---------------------------------------------------------------------------

/// Tracks in-flight requests after a navigation.
#[derive(Debug)]
pub struct NetworkIdle {
    max_inflight: usize,
    quiet: Duration,
    loaded: bool,
    inflight: HashSet<String>,
    /// When the page last became quiet enough; None while busy or not loaded.
    quiet_since: Option<Instant>,
}

impl NetworkIdle {
    pub fn new(max_inflight: usize, quiet: Duration) -> Self {
        Self {
            max_inflight,
            quiet,
            loaded: false,
            inflight: HashSet::new(),
            quiet_since: None,
        }
    }

    pub fn observe(&mut self, event: &CdpEvent, now: Instant) {
        match event.method.as_str() {
            "Page.loadEventFired" => self.loaded = true,
            "Network.requestWillBeSent" => {
                if let Some(id) = event.request_id() {
                    self.inflight.insert(id.to_string());
                }
            }
            "Network.loadingFinished" | "Network.loadingFailed" => {
                if let Some(id) = event.request_id() {
                    self.inflight.remove(id);
                }
            }
            _ => return,
        }

        if self.loaded && self.inflight.len() <= self.max_inflight {
            self.quiet_since.get_or_insert(now);
        } else {
            self.quiet_since = None;
        }
    }

    /// Time left until the page counts as idle. None while it cannot be idle yet.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.quiet_since
            .map(|since| (since + self.quiet).saturating_duration_since(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(method: &str, request_id: Option<&str>) -> CdpEvent {
        CdpEvent {
            method: method.to_string(),
            params: match request_id {
                Some(id) => json!({ "requestId": id }),
                None => json!({}),
            },
        }
    }

    #[test]
    fn parses_response_and_error() {
        match parse_incoming(r#"{"id":7,"result":{"frameId":"F1"}}"#) {
            Some(Incoming::Response { id, result }) => {
                assert_eq!(id, 7);
                assert_eq!(result.unwrap()["frameId"], "F1");
            }
            other => panic!("expected Response, got {other:?}"),
        }

        match parse_incoming(r#"{"id":8,"error":{"code":-32000,"message":"Cannot navigate"}}"#) {
            Some(Incoming::Response { id, result }) => {
                assert_eq!(id, 8);
                let err = result.unwrap_err();
                assert!(err.contains("Cannot navigate"), "{err}");
                assert!(err.contains("-32000"), "{err}");
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn parses_event() {
        let raw = r#"{"method":"Network.requestWillBeSent","params":{"requestId":"42.1"}}"#;
        match parse_incoming(raw) {
            Some(Incoming::Event(ev)) => {
                assert_eq!(ev.method, "Network.requestWillBeSent");
                assert_eq!(ev.request_id(), Some("42.1"));
            }
            other => panic!("expected Event, got {other:?}"),
        }
    }

    #[test]
    fn ignores_garbage() {
        assert!(parse_incoming("not json").is_none());
        assert!(parse_incoming(r#"{"foo":1}"#).is_none());
    }

    #[test]
    fn not_idle_before_load() {
        let now = Instant::now();
        let mut idle = NetworkIdle::new(2, Duration::from_millis(500));
        idle.observe(&event("Network.requestWillBeSent", Some("a")), now);
        idle.observe(&event("Network.loadingFinished", Some("a")), now);
        assert!(idle.remaining(now).is_none());
    }

    #[test]
    fn idle_after_quiet_period() {
        let t0 = Instant::now();
        let quiet = Duration::from_millis(500);
        let mut idle = NetworkIdle::new(2, quiet);
        idle.observe(&event("Page.loadEventFired", None), t0);
        assert_eq!(idle.remaining(t0), Some(quiet));
        assert_eq!(idle.remaining(t0 + quiet), Some(Duration::ZERO));
    }

    #[test]
    fn busy_network_resets_quiet_period() {
        let t0 = Instant::now();
        let quiet = Duration::from_millis(500);
        let mut idle = NetworkIdle::new(2, quiet);
        idle.observe(&event("Page.loadEventFired", None), t0);
        for id in ["a", "b", "c"] {
            idle.observe(&event("Network.requestWillBeSent", Some(id)), t0);
        }
        assert!(idle.remaining(t0).is_none(), "three requests in flight");

        let t1 = t0 + Duration::from_millis(300);
        idle.observe(&event("Network.loadingFailed", Some("b")), t1);
        assert_eq!(idle.remaining(t1), Some(quiet), "quiet period restarts at t1");
    }

    #[test]
    fn unrelated_events_do_not_touch_quiet_period() {
        let t0 = Instant::now();
        let quiet = Duration::from_millis(500);
        let mut idle = NetworkIdle::new(2, quiet);
        idle.observe(&event("Page.loadEventFired", None), t0);
        idle.observe(&event("Page.frameNavigated", None), t0 + Duration::from_millis(400));
        assert_eq!(
            idle.remaining(t0 + Duration::from_millis(400)),
            Some(Duration::from_millis(100))
        );
    }
}
