pub mod cdp;
pub mod chrome;
pub mod session;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use chrome::{ChromeConfig, ChromeLauncher};
pub use session::RenderSession;

use crate::error::Result;

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("page did not settle within {0:?}")]
    Timeout(Duration),

    #[error("page closed: {0}")]
    Closed(String),

    #[error("page crashed")]
    Crashed,

    #[error("no live page")]
    NoSession,

    #[error("DevTools protocol error: {0}")]
    Protocol(String),

    #[error("script evaluation failed: {0}")]
    Evaluation(String),
}

impl NavigationError {
    /// True when the page handle can no longer be used.
    pub fn is_fatal_to_page(&self) -> bool {
        matches!(
            self,
            NavigationError::Closed(_) | NavigationError::Crashed | NavigationError::NoSession
        )
    }
}

/// A single rendered page backed by a browser process.
#[async_trait]
pub trait PageHandle: Send {
    /// Page and its browser are still usable.
    fn is_alive(&mut self) -> bool;

    /// Navigate to `url`, wait for network quiescence, then evaluate `script`
    /// in the loaded document and return its JSON value. The whole operation is
    /// bounded by `timeout`.
    async fn navigate_and_evaluate(
        &mut self,
        url: &str,
        script: &str,
        timeout: Duration,
    ) -> std::result::Result<serde_json::Value, NavigationError>;

    /// Tear the page and its browser down.
    async fn close(&mut self) -> Result<()>;
}

/// Creates fresh page handles. The Chrome implementation lives in `chrome`
/// and talks DevTools over `cdp`.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Page: PageHandle;

    async fn launch(&self) -> Result<Self::Page>;
}

/// Something that runs inside the loaded document and turns its JSON result
/// into a typed value.
pub trait Extract {
    type Output;

    fn script(&self) -> String;

    fn parse(&self, raw: serde_json::Value) -> std::result::Result<Self::Output, NavigationError>;
}
