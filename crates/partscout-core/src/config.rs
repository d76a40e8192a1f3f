use std::time::Duration;

use crate::error::AppError;
use crate::throttle::ThrottleConfig;

/// How a worker retries a single page.
///
/// Timeouts and unclassified failures consume an attempt; a dead session
/// consumes a restart instead, so a flaky browser cannot eat the page budget.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub max_session_restarts: u32,
    /// Pause between attempts on the same page.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_session_restarts: 2,
            retry_delay: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Limits and timeouts for one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub max_models: usize,
    pub max_parts_per_model: usize,
    pub workers: usize,
    /// Hard ceiling on pages per listing traversal.
    pub max_pages: u32,
    pub page_timeout: Duration,
    /// Wall-clock budget for one model's parts listing plus enrichment.
    pub model_timeout: Duration,
    /// Upper bound on closing a single session during teardown.
    pub close_timeout: Duration,
    pub retry: RetryPolicy,
    pub throttle: ThrottleConfig,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_models: 3,
            max_parts_per_model: 10,
            workers: 1,
            max_pages: 50,
            page_timeout: Duration::from_secs(45),
            model_timeout: Duration::from_secs(300),
            close_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            throttle: ThrottleConfig::default(),
        }
    }
}

impl CrawlConfig {
    pub fn with_max_models(mut self, max: usize) -> Self {
        self.max_models = max;
        self
    }

    pub fn with_max_parts_per_model(mut self, max: usize) -> Self {
        self.max_parts_per_model = max;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_pages(mut self, pages: u32) -> Self {
        self.max_pages = pages;
        self
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = throttle;
        self
    }

    /// Reject configurations that could never make progress.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.workers == 0 {
            return Err(AppError::ConfigError("workers must be at least 1".into()));
        }
        if self.max_pages == 0 {
            return Err(AppError::ConfigError("max_pages must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::ConfigError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.page_timeout.is_zero() || self.model_timeout.is_zero() {
            return Err(AppError::ConfigError("timeouts must be non-zero".into()));
        }
        Ok(())
    }
}
