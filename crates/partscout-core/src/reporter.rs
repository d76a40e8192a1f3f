use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ApplianceType, ReplaceSummary};

/// Events emitted by a crawl run for monitoring/logging.
#[derive(Debug, Clone)]
pub enum CrawlEvent<'a> {
    RunStarted {
        run_id: Uuid,
        appliance_type: ApplianceType,
        workers: usize,
    },
    ModelsListed {
        appliance_type: ApplianceType,
        count: usize,
    },
    ModelCompleted {
        model_number: &'a str,
        parts: usize,
    },
    ModelFailed {
        model_number: &'a str,
        error: &'a AppError,
    },
    SessionsTornDown {
        closed: usize,
        created: usize,
    },
    Persisted {
        appliance_type: ApplianceType,
        summary: &'a ReplaceSummary,
    },
    RunFinished {
        run_id: Uuid,
        models: usize,
        parts: usize,
        failures: usize,
    },
}

/// Trait for receiving crawl events (decoupled logging).
pub trait CrawlReporter: Send + Sync {
    fn report(&self, event: CrawlEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCrawlReporter;

impl CrawlReporter for TracingCrawlReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        match event {
            CrawlEvent::RunStarted {
                run_id,
                appliance_type,
                workers,
            } => {
                tracing::info!(%run_id, %appliance_type, workers, "Crawl started");
            }
            CrawlEvent::ModelsListed {
                appliance_type,
                count,
            } => {
                tracing::info!(%appliance_type, count, "Models listed");
            }
            CrawlEvent::ModelCompleted {
                model_number,
                parts,
            } => {
                tracing::info!(%model_number, parts, "Model crawled");
            }
            CrawlEvent::ModelFailed {
                model_number,
                error,
            } => {
                tracing::warn!(
                    %model_number,
                    %error,
                    transient = error.is_retryable(),
                    "Model failed"
                );
            }
            CrawlEvent::SessionsTornDown { closed, created } => {
                tracing::debug!(closed, created, "Sessions torn down");
            }
            CrawlEvent::Persisted {
                appliance_type,
                summary,
            } => {
                tracing::info!(
                    %appliance_type,
                    models = summary.models_written,
                    parts = summary.parts_written,
                    links = summary.links_written,
                    replaced_models = summary.models_deleted,
                    "Partition replaced"
                );
            }
            CrawlEvent::RunFinished {
                run_id,
                models,
                parts,
                failures,
            } => {
                tracing::info!(%run_id, models, parts, failures, "Crawl finished");
            }
        }
    }
}

/// A reporter that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl CrawlReporter for SilentReporter {}
