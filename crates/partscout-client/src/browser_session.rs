use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use partscout_core::error::AppError;
use partscout_core::fetch::{DocumentMarkers, FetchOutcome, classify_document};
use partscout_core::traits::{Session, SessionFactory};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Headless-browser session using Chromium via the Chrome DevTools Protocol.
///
/// Each session owns one Chromium process and one tab that is reused for
/// every navigation, so cookies and anti-bot state survive between pages of
/// the same worker.
///
/// # Example
///
/// ```rust,no_run
/// use partscout_client::BrowserSessionFactory;
/// use partscout_core::traits::{Session, SessionFactory};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let session = BrowserSessionFactory::new().create().await?;
/// let outcome = session.fetch("https://example.com").await;
/// println!("{outcome:?}");
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct BrowserSession {
    id: String,
    browser: Mutex<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    connected: Arc<AtomicBool>,
    navigation_timeout: Duration,
    settle_delay: Duration,
    markers: Arc<DocumentMarkers>,
    profile_dir: PathBuf,
}

impl BrowserSession {
    async fn navigate(&self, url: &str) -> Result<String, CdpError> {
        self.page.goto(url).await?;
        // Let client-side rendering finish before reading the DOM.
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        self.page.content().await
    }
}

impl Session for BrowserSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, url: &str) -> FetchOutcome {
        match tokio::time::timeout(self.navigation_timeout, self.navigate(url)).await {
            Ok(Ok(html)) => classify_document(html, &self.markers),
            Ok(Err(e)) => classify_cdp_error(e),
            Err(_) => FetchOutcome::Timeout,
        }
    }

    async fn is_alive(&self) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        let browser = self.browser.lock().await;
        matches!(
            tokio::time::timeout(Duration::from_secs(5), browser.version()).await,
            Ok(Ok(_))
        )
    }

    async fn close(&self) -> Result<(), AppError> {
        let mut browser = self.browser.lock().await;
        let result = match browser.close().await {
            Ok(_) => {
                let _ = browser.wait().await;
                Ok(())
            }
            Err(e) => {
                // The CDP connection is gone; make sure the process is too.
                let _ = browser.kill().await;
                Err(AppError::SessionError(format!("Failed to close browser {}: {e}", self.id)))
            }
        };
        self.handler.abort();
        let _ = tokio::fs::remove_dir_all(&self.profile_dir).await;
        result
    }
}

/// Map a CDP failure onto the fetch taxonomy.
///
/// A lost websocket or dropped command channel means the browser is gone.
fn classify_cdp_error(error: CdpError) -> FetchOutcome {
    match error {
        CdpError::Timeout => FetchOutcome::Timeout,
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            FetchOutcome::SessionInvalid(error.to_string())
        }
        other => FetchOutcome::Unknown(other.to_string()),
    }
}

/// Launches one headless Chromium per [`BrowserSession`].
#[derive(Clone)]
pub struct BrowserSessionFactory {
    navigation_timeout: Duration,
    settle_delay: Duration,
    markers: Arc<DocumentMarkers>,
}

impl Default for BrowserSessionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserSessionFactory {
    /// 30 s navigation timeout, 1 s settle delay.
    pub fn new() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(1),
            markers: Arc::new(DocumentMarkers::default()),
        }
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_markers(mut self, markers: DocumentMarkers) -> Self {
        self.markers = Arc::new(markers);
        self
    }

    /// Tries to locate the real Chrome/Chromium binary.
    ///
    /// On systems where Chromium is installed via **snap**, the wrapper at
    /// `/snap/bin/chromium` strips unknown CLI flags, breaking headless mode.
    /// `CHROME_BIN` wins over every well-known path. If nothing is found we
    /// return `None` and let `chromiumoxide` do its own lookup.
    fn find_chrome_binary() -> Option<PathBuf> {
        let candidates: &[&str] = &[
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ];

        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(&p);
            if path.exists() {
                return Some(path);
            }
        }

        candidates
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }
}

impl SessionFactory for BrowserSessionFactory {
    type Session = BrowserSession;

    async fn create(&self) -> Result<BrowserSession, AppError> {
        let id = format!("browser-{}", uuid::Uuid::new_v4());
        // Concurrent Chromium processes must not share a profile.
        let profile_dir = std::env::temp_dir().join(format!("partscout-{id}"));

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .disable_default_args()
            .user_data_dir(&profile_dir)
            .window_size(1920, 1080);

        if let Some(bin) = Self::find_chrome_binary() {
            tracing::debug!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::SessionError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::SessionError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        let connected = Arc::new(AtomicBool::new(true));
        let handler_connected = Arc::clone(&connected);
        let handler_id = id.clone();
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(session = %handler_id, error = %e, "Browser CDP handler error");
                    break;
                }
            }
            handler_connected.store(false, Ordering::SeqCst);
        });

        let opened = browser.new_page("about:blank").await;
        let page = match opened {
            Ok(page) => page,
            Err(e) => {
                let mut browser = browser;
                let _ = browser.kill().await;
                handler.abort();
                return Err(AppError::SessionError(format!("Failed to open tab: {e}")));
            }
        };

        Ok(BrowserSession {
            id,
            browser: Mutex::new(browser),
            page,
            handler,
            connected,
            navigation_timeout: self.navigation_timeout,
            settle_delay: self.settle_delay,
            markers: Arc::clone(&self.markers),
            profile_dir,
        })
    }
}
