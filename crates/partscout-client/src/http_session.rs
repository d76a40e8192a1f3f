use std::sync::Arc;
use std::time::Duration;

use partscout_core::error::AppError;
use partscout_core::fetch::{DocumentMarkers, FetchOutcome, classify_document};
use partscout_core::traits::{Session, SessionFactory};
use reqwest::{Client, StatusCode};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";

/// Plain HTTP rendering session using reqwest.
///
/// Serves catalogs that render server-side. The connection pool is shared
/// with every other session from the same factory, so the session itself is
/// always alive.
pub struct HttpSession {
    id: String,
    client: Client,
    markers: Arc<DocumentMarkers>,
}

impl Session for HttpSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, url: &str) -> FetchOutcome {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return FetchOutcome::Timeout,
            Err(e) if e.is_connect() => {
                return FetchOutcome::Unknown(format!("Connection failed: {e}"));
            }
            Err(e) => return FetchOutcome::Unknown(e.to_string()),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return FetchOutcome::NotFound;
        }
        if !status.is_success() {
            return FetchOutcome::Unknown(format!("HTTP {} for {}", status.as_u16(), url));
        }

        match response.text().await {
            Ok(body) => classify_document(body, &self.markers),
            Err(e) if e.is_timeout() => FetchOutcome::Timeout,
            Err(e) => FetchOutcome::Unknown(format!("Failed to read response body: {e}")),
        }
    }

    async fn is_alive(&self) -> bool {
        true
    }

    async fn close(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Creates [`HttpSession`]s sharing one reqwest client.
#[derive(Clone)]
pub struct HttpSessionFactory {
    client: Client,
    markers: Arc<DocumentMarkers>,
}

impl HttpSessionFactory {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// `timeout` bounds a whole request, body included.
    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::SessionError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            markers: Arc::new(DocumentMarkers::default()),
        })
    }

    pub fn with_markers(mut self, markers: DocumentMarkers) -> Self {
        self.markers = Arc::new(markers);
        self
    }
}

impl SessionFactory for HttpSessionFactory {
    type Session = HttpSession;

    async fn create(&self) -> Result<HttpSession, AppError> {
        Ok(HttpSession {
            id: format!("http-{}", uuid::Uuid::new_v4()),
            client: self.client.clone(),
            markers: Arc::clone(&self.markers),
        })
    }
}
