//! Per-worker page fetching over a recoverable rendering session.
//!
//! ```text
//! Uninitialized --[first fetch]--> Live --[probe fails / SessionInvalid]--> Dead
//!                                   ^                                        |
//!                                   +---------------[next fetch]-------------+
//! ```
//!
//! A [`PageFetcher`] owns at most one session at a time. Every session it
//! creates is also tracked in a shared [`SessionRegistry`] so run teardown can
//! close sessions belonging to workers that were aborted mid-page.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{CrawlConfig, RetryPolicy};
use crate::error::AppError;
use crate::throttle::Pacer;
use crate::traits::{Session, SessionFactory};

/// Classification of a single navigation, decided by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A rendered document.
    Document(String),
    /// The catalog has no such page. Ends pagination; not an error.
    NotFound,
    /// Navigation did not finish in time. Retry on the same session.
    Timeout,
    /// The session is unusable. Replace it and retry.
    SessionInvalid(String),
    /// Anything else (blocked, empty, transport error). Retry up to the cap.
    Unknown(String),
}

/// What a caller of [`PageFetcher::fetch`] gets back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Document(String),
    NotFound,
}

/// Text markers used to classify a rendered document.
#[derive(Debug, Clone)]
pub struct DocumentMarkers {
    pub not_found: Vec<String>,
    pub blocked: Vec<String>,
}

impl Default for DocumentMarkers {
    fn default() -> Self {
        Self {
            not_found: vec![
                "Page Not Found".to_string(),
                "We can't find the page you are looking for".to_string(),
            ],
            blocked: vec!["Access Denied".to_string()],
        }
    }
}

/// Classify a rendered document. Shared by every [`Session`] implementation
/// so the not-found and blocked heuristics live in exactly one place.
pub fn classify_document(html: String, markers: &DocumentMarkers) -> FetchOutcome {
    if html.trim().is_empty() {
        return FetchOutcome::Unknown("empty document".to_string());
    }
    if markers.blocked.iter().any(|m| html.contains(m.as_str())) {
        return FetchOutcome::Unknown("access denied".to_string());
    }
    if markers.not_found.iter().any(|m| html.contains(m.as_str())) {
        return FetchOutcome::NotFound;
    }
    FetchOutcome::Document(html)
}

/// Lifecycle state of a worker's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Live,
    Dead,
}

/// Every session created during a run, keyed by session id.
pub struct SessionRegistry<S> {
    sessions: Arc<Mutex<HashMap<String, Arc<S>>>>,
    created: Arc<AtomicUsize>,
    close_timeout: Duration,
}

impl<S> Clone for SessionRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            created: Arc::clone(&self.created),
            close_timeout: self.close_timeout,
        }
    }
}

impl<S: Session> SessionRegistry<S> {
    pub fn new(close_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            created: Arc::new(AtomicUsize::new(0)),
            close_timeout,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<S>>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, session: Arc<S>) {
        self.created.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(session.id().to_string(), session);
    }

    pub fn deregister(&self, id: &str) -> Option<Arc<S>> {
        self.lock().remove(id)
    }

    /// Sessions currently tracked.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sessions ever registered, including ones since replaced.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Close every tracked session. Failures and hangs are logged, never raised.
    /// Returns the number of sessions that closed cleanly.
    pub async fn teardown(&self) -> usize {
        let sessions: Vec<Arc<S>> = self.lock().drain().map(|(_, s)| s).collect();
        let total = sessions.len();
        let mut closed = 0;

        for session in sessions {
            if close_quietly(session.as_ref(), self.close_timeout).await {
                closed += 1;
            }
        }

        tracing::debug!(closed, total, "Session teardown complete");
        closed
    }
}

async fn close_quietly<S: Session>(session: &S, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, session.close()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(session = %session.id(), error = %e, "Session already closed or unresponsive");
            false
        }
        Err(_) => {
            tracing::warn!(session = %session.id(), "Timed out closing session");
            false
        }
    }
}

/// Fetches pages for one worker, recovering its session transparently.
pub struct PageFetcher<F: SessionFactory> {
    factory: F,
    registry: SessionRegistry<F::Session>,
    session: Option<Arc<F::Session>>,
    state: SessionState,
    worker_id: String,
    retry: RetryPolicy,
    pacer: Pacer,
    page_timeout: Duration,
    close_timeout: Duration,
}

impl<F: SessionFactory> PageFetcher<F> {
    pub fn new(
        factory: F,
        registry: SessionRegistry<F::Session>,
        worker_id: impl Into<String>,
        config: &CrawlConfig,
    ) -> Self {
        Self {
            factory,
            registry,
            session: None,
            state: SessionState::Uninitialized,
            worker_id: worker_id.into(),
            retry: config.retry.clone(),
            pacer: Pacer::new(config.throttle.clone()),
            page_timeout: config.page_timeout,
            close_timeout: config.close_timeout,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Fetch one page, retrying per the [`RetryPolicy`].
    ///
    /// Returns `Ok(Page::NotFound)` for missing pages and an error only once
    /// the attempt or session-restart budget is spent. Failing to create a
    /// session counts against the restart budget.
    pub async fn fetch(&mut self, url: &str) -> Result<Page, AppError> {
        let mut attempts = 0u32;
        let mut restarts = 0u32;

        loop {
            let session = match self.acquire().await {
                Ok(session) => session,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    restarts += 1;
                    tracing::warn!(
                        worker = %self.worker_id,
                        %url,
                        error = %e,
                        restarts,
                        "Session creation failed"
                    );
                    if restarts > self.retry.max_session_restarts {
                        return Err(e);
                    }
                    tokio::time::sleep(self.retry.retry_delay).await;
                    continue;
                }
            };
            self.pacer.wait().await;

            let outcome = match tokio::time::timeout(self.page_timeout, session.fetch(url)).await
            {
                Ok(outcome) => outcome,
                Err(_) => FetchOutcome::Timeout,
            };

            let reason = match outcome {
                FetchOutcome::Document(html) => return Ok(Page::Document(html)),
                FetchOutcome::NotFound => return Ok(Page::NotFound),
                FetchOutcome::SessionInvalid(reason) => {
                    restarts += 1;
                    tracing::warn!(
                        worker = %self.worker_id,
                        %url,
                        %reason,
                        restarts,
                        "Session invalid, replacing"
                    );
                    self.invalidate().await;
                    if restarts > self.retry.max_session_restarts {
                        return Err(AppError::FetchFailed {
                            url: url.to_string(),
                            attempts: attempts + restarts,
                            reason: format!("session restart budget exhausted: {reason}"),
                        });
                    }
                    continue;
                }
                FetchOutcome::Timeout => {
                    format!("timed out after {}s", self.page_timeout.as_secs())
                }
                FetchOutcome::Unknown(reason) => reason,
            };

            attempts += 1;
            if attempts >= self.retry.max_attempts {
                return Err(AppError::FetchFailed {
                    url: url.to_string(),
                    attempts,
                    reason,
                });
            }

            tracing::warn!(
                worker = %self.worker_id,
                %url,
                attempt = attempts,
                %reason,
                "Fetch failed, retrying"
            );
            tokio::time::sleep(self.retry.retry_delay).await;
        }
    }

    /// Return the live session, probing it first; create one if needed.
    async fn acquire(&mut self) -> Result<Arc<F::Session>, AppError> {
        if let Some(session) = &self.session {
            if session.is_alive().await {
                return Ok(Arc::clone(session));
            }
            tracing::warn!(worker = %self.worker_id, session = %session.id(), "Session dead, creating a new one");
            self.invalidate().await;
        }

        let session = Arc::new(self.factory.create().await?);
        tracing::debug!(worker = %self.worker_id, session = %session.id(), "Session created");
        self.registry.register(Arc::clone(&session));
        self.session = Some(Arc::clone(&session));
        self.state = SessionState::Live;
        Ok(session)
    }

    /// Discard the current session, closing it best-effort.
    pub async fn invalidate(&mut self) {
        if let Some(session) = self.session.take() {
            self.registry.deregister(session.id());
            close_quietly(session.as_ref(), self.close_timeout).await;
            self.state = SessionState::Dead;
        }
    }

    /// Close the session at the end of the worker's life.
    pub async fn shutdown(&mut self) {
        self.invalidate().await;
        self.state = SessionState::Uninitialized;
    }
}
