use std::time::Duration;

use tracing::{debug, info};

use super::{Extract, NavigationError, PageHandle, SessionFactory};
use crate::error::Result;

/// Owns at most one live page. Replacing it always releases the old one
/// before the new one is launched.
pub struct RenderSession<F: SessionFactory> {
    factory: F,
    current: Option<F::Page>,
    /// Number of pages successfully launched so far.
    generation: u64,
}

impl<F: SessionFactory> RenderSession<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            current: None,
            generation: 0,
        }
    }

    /// Replace the current page with a fresh one. On failure no page is
    /// installed, so calling again straight away is safe.
    pub async fn acquire(&mut self) -> Result<()> {
        self.release().await;
        let page = self.factory.launch().await?;
        self.current = Some(page);
        self.generation += 1;
        info!(generation = self.generation, "Browser session ready");
        Ok(())
    }

    /// Tear down the current page, if any. Teardown errors are discarded.
    pub async fn release(&mut self) {
        if let Some(mut page) = self.current.take() {
            if let Err(e) = page.close().await {
                debug!("Ignoring browser teardown error: {e}");
            }
        }
    }

    pub fn is_valid(&mut self) -> bool {
        self.current.as_mut().is_some_and(|p| p.is_alive())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn navigate_and_extract<E: Extract>(
        &mut self,
        url: &str,
        extractor: &E,
        timeout: Duration,
    ) -> std::result::Result<E::Output, NavigationError> {
        let page = self.current.as_mut().ok_or(NavigationError::NoSession)?;
        match page.navigate_and_evaluate(url, &extractor.script(), timeout).await {
            Ok(raw) => extractor.parse(raw),
            Err(e) => {
                // A dead page is torn down here so `is_valid` never sees it.
                if e.is_fatal_to_page() {
                    debug!("Dropping dead page: {e}");
                    self.release().await;
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::error::AppError;

    /// Shared bookkeeping for the fake browser.
    #[derive(Default)]
    pub(crate) struct FakeBrowser {
        pub launches: AtomicUsize,
        pub closes: AtomicUsize,
        /// Pages currently open. Must never exceed one.
        pub live: AtomicUsize,
        pub max_live: AtomicUsize,
        /// Launch attempts to fail before succeeding again.
        pub launch_failures: AtomicUsize,
        /// Scripted page results, consumed one per navigation.
        pub script: Mutex<VecDeque<std::result::Result<Value, NavigationError>>>,
        /// Set to kill the current page without a navigation error.
        pub kill_page: Mutex<bool>,
        /// Simulated page load time for every navigation.
        pub nav_delay: Mutex<Duration>,
    }

    impl FakeBrowser {
        pub fn push(&self, result: std::result::Result<Value, NavigationError>) {
            self.script.lock().unwrap().push_back(result);
        }
    }

    pub(crate) struct FakeFactory(pub Arc<FakeBrowser>);

    pub(crate) struct FakePage {
        browser: Arc<FakeBrowser>,
        alive: bool,
    }

    #[async_trait]
    impl SessionFactory for FakeFactory {
        type Page = FakePage;

        async fn launch(&self) -> Result<FakePage> {
            let b = &self.0;
            if b
                .launch_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(AppError::Launch("no browser".to_string()));
            }
            b.launches.fetch_add(1, Ordering::SeqCst);
            let live = b.live.fetch_add(1, Ordering::SeqCst) + 1;
            b.max_live.fetch_max(live, Ordering::SeqCst);
            *b.kill_page.lock().unwrap() = false;
            Ok(FakePage {
                browser: Arc::clone(b),
                alive: true,
            })
        }
    }

    #[async_trait]
    impl PageHandle for FakePage {
        fn is_alive(&mut self) -> bool {
            self.alive && !*self.browser.kill_page.lock().unwrap()
        }

        async fn navigate_and_evaluate(
            &mut self,
            _url: &str,
            _script: &str,
            _timeout: Duration,
        ) -> std::result::Result<Value, NavigationError> {
            let delay = *self.browser.nav_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let next = self.browser.script.lock().unwrap().pop_front();
            let result = next.unwrap_or_else(|| Ok(json!({ "cardFound": false })));
            if matches!(&result, Err(e) if e.is_fatal_to_page()) {
                self.alive = false;
            }
            result
        }

        async fn close(&mut self) -> Result<()> {
            self.alive = false;
            self.browser.closes.fetch_add(1, Ordering::SeqCst);
            self.browser.live.fetch_sub(1, Ordering::SeqCst);
            // Teardown errors must be swallowed by the session.
            Err(AppError::Launch("close failed".to_string()))
        }
    }

    struct Passthrough;

    impl Extract for Passthrough {
        type Output = Value;

        fn script(&self) -> String {
            "1".to_string()
        }

        fn parse(&self, raw: Value) -> std::result::Result<Value, NavigationError> {
            Ok(raw)
        }
    }

    fn session() -> (RenderSession<FakeFactory>, Arc<FakeBrowser>) {
        let browser = Arc::new(FakeBrowser::default());
        (RenderSession::new(FakeFactory(Arc::clone(&browser))), browser)
    }

    #[tokio::test]
    async fn acquire_replaces_previous_page() {
        let (mut s, b) = session();
        s.acquire().await.unwrap();
        s.acquire().await.unwrap();
        s.acquire().await.unwrap();

        assert_eq!(b.launches.load(Ordering::SeqCst), 3);
        assert_eq!(b.closes.load(Ordering::SeqCst), 2);
        assert_eq!(b.max_live.load(Ordering::SeqCst), 1);
        assert_eq!(s.generation(), 3);
        assert!(s.is_valid());
    }

    #[tokio::test]
    async fn failed_acquire_leaves_no_page_and_can_retry() {
        let (mut s, b) = session();
        s.acquire().await.unwrap();
        b.launch_failures.store(1, Ordering::SeqCst);

        assert!(s.acquire().await.is_err());
        assert!(!s.is_valid());
        assert_eq!(b.live.load(Ordering::SeqCst), 0);

        s.acquire().await.unwrap();
        assert!(s.is_valid());
        assert_eq!(b.live.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn navigate_without_page_is_an_error() {
        let (mut s, _) = session();
        let err = s
            .navigate_and_extract("about:blank", &Passthrough, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, NavigationError::NoSession));
    }

    #[tokio::test]
    async fn crash_releases_page() {
        let (mut s, b) = session();
        s.acquire().await.unwrap();
        b.push(Err(NavigationError::Crashed));

        let err = s
            .navigate_and_extract("about:blank", &Passthrough, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, NavigationError::Crashed));
        assert!(!s.is_valid());
        assert_eq!(b.closes.load(Ordering::SeqCst), 1);
        assert_eq!(b.live.load(Ordering::SeqCst), 0);

        // Releasing again is a no-op.
        s.release().await;
        assert_eq!(b.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_keeps_page_alive() {
        let (mut s, b) = session();
        s.acquire().await.unwrap();
        b.push(Err(NavigationError::Timeout(Duration::from_secs(1))));

        let err = s
            .navigate_and_extract("about:blank", &Passthrough, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, NavigationError::Timeout(_)));
        assert!(s.is_valid());
        assert_eq!(b.live.load(Ordering::SeqCst), 1);
    }
}
