//! Bounded worker pool that crawls one model per task.
//!
//! Workers pull models from a shared queue, each through its own
//! [`PageFetcher`], and send back one [`ModelOutcome`] per model. A failing or
//! timed-out model never affects its siblings. Teardown aborts whatever is
//! still running and closes every session the run created.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::catalog::CatalogUrls;
use crate::config::CrawlConfig;
use crate::enrich::enrich;
use crate::error::AppError;
use crate::fetch::{PageFetcher, SessionRegistry};
use crate::models::{Model, Part, PartStub};
use crate::paginate::{Listing, PageLimits, StopReason, paginate};
use crate::reporter::{CrawlEvent, CrawlReporter};
use crate::traits::{CatalogParser, SessionFactory};

/// Result of crawling a single model.
#[derive(Debug)]
pub struct ModelOutcome {
    pub model_number: String,
    pub result: Result<Vec<Part>, AppError>,
}

/// Per-model outcomes in completion order.
#[derive(Debug)]
pub struct ScheduleReport {
    pub outcomes: Vec<ModelOutcome>,
    pub cancelled: bool,
    pub sessions_created: usize,
    pub sessions_closed: usize,
}

pub struct WorkScheduler<F: SessionFactory, P: CatalogParser> {
    factory: F,
    parser: P,
    urls: CatalogUrls,
    config: CrawlConfig,
    registry: SessionRegistry<F::Session>,
}

impl<F, P> WorkScheduler<F, P>
where
    F: SessionFactory,
    P: CatalogParser,
{
    pub fn new(
        factory: F,
        parser: P,
        urls: CatalogUrls,
        config: CrawlConfig,
        registry: SessionRegistry<F::Session>,
    ) -> Self {
        Self {
            factory,
            parser,
            urls,
            config,
            registry,
        }
    }

    /// Crawl every model. Returns once each model has an outcome, or as soon
    /// as `cancel` fires; sessions are torn down in both cases.
    pub async fn run<R: CrawlReporter>(
        &self,
        models: Vec<Model>,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> ScheduleReport {
        let total = models.len();
        if total == 0 {
            return ScheduleReport {
                outcomes: Vec::new(),
                cancelled: cancel.is_cancelled(),
                sessions_created: 0,
                sessions_closed: 0,
            };
        }

        let model_numbers: Vec<String> = models.iter().map(|m| m.model_number.clone()).collect();

        let (task_tx, task_rx) = mpsc::unbounded_channel();
        for model in models {
            // The receiver is alive until the workers below are spawned.
            let _ = task_tx.send(model);
        }
        drop(task_tx);

        let (result_tx, mut result_rx) = mpsc::unbounded_channel();
        let mut join_set = self.spawn_workers(task_rx, result_tx, worker_count(self.config.workers, total));

        let mut outcomes = Vec::with_capacity(total);
        let mut cancelled = false;
        while outcomes.len() < total {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!(completed = outcomes.len(), total, "Crawl cancelled, aborting workers");
                    cancelled = true;
                    break;
                }
                received = result_rx.recv() => match received {
                    Some(outcome) => {
                        report_outcome(reporter, &outcome);
                        outcomes.push(outcome);
                    }
                    None => break,
                },
            }
        }

        if cancelled {
            join_set.abort_all();
        }
        self.drain(&mut join_set).await;

        let finished: HashSet<&str> = outcomes.iter().map(|o| o.model_number.as_str()).collect();
        let missing: Vec<ModelOutcome> = model_numbers
            .iter()
            .filter(|n| !finished.contains(n.as_str()))
            .map(|n| ModelOutcome {
                model_number: n.clone(),
                result: Err(if cancelled {
                    AppError::Cancelled
                } else {
                    AppError::TaskFailed(format!("worker exited before crawling model {n}"))
                }),
            })
            .collect();
        for outcome in &missing {
            if !cancelled {
                report_outcome(reporter, outcome);
            }
        }
        outcomes.extend(missing);

        let sessions_closed = self.registry.teardown().await;
        let sessions_created = self.registry.created_count();
        reporter.report(CrawlEvent::SessionsTornDown {
            closed: sessions_closed,
            created: sessions_created,
        });

        ScheduleReport {
            outcomes,
            cancelled,
            sessions_created,
            sessions_closed,
        }
    }

    fn spawn_workers(
        &self,
        task_rx: mpsc::UnboundedReceiver<Model>,
        result_tx: mpsc::UnboundedSender<ModelOutcome>,
        workers: usize,
    ) -> JoinSet<()> {
        let shared_rx = Arc::new(Mutex::new(task_rx));
        let mut join_set = JoinSet::new();

        for worker_idx in 0..workers {
            let rx = Arc::clone(&shared_rx);
            let tx = result_tx.clone();
            let parser = self.parser.clone();
            let urls = self.urls.clone();
            let config = self.config.clone();
            let mut fetcher = PageFetcher::new(
                self.factory.clone(),
                self.registry.clone(),
                format!("worker-{worker_idx}"),
                &self.config,
            );

            join_set.spawn(async move {
                loop {
                    let next = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(model) = next else {
                        tracing::debug!(worker = worker_idx, "Queue drained, worker stopping");
                        break;
                    };

                    tracing::info!(worker = worker_idx, model_number = %model.model_number, "Crawling model");
                    let crawl = crawl_model(&mut fetcher, &parser, &urls, &config, &model);
                    let result = match tokio::time::timeout(config.model_timeout, crawl).await {
                        Ok(result) => result,
                        Err(_) => {
                            // The session may still be mid-navigation.
                            fetcher.invalidate().await;
                            Err(AppError::TaskTimeout {
                                model_number: model.model_number.clone(),
                                secs: config.model_timeout.as_secs(),
                            })
                        }
                    };

                    let outcome = ModelOutcome {
                        model_number: model.model_number,
                        result,
                    };
                    if tx.send(outcome).is_err() {
                        break;
                    }
                }
                fetcher.shutdown().await;
            });
        }

        join_set
    }

    /// Wait briefly for workers to exit; anything still running is aborted
    /// when the set is dropped.
    async fn drain(&self, join_set: &mut JoinSet<()>) {
        let wait = async {
            while let Some(joined) = join_set.join_next().await {
                if let Err(e) = joined
                    && e.is_panic()
                {
                    tracing::error!(error = %e, "Crawl worker panicked");
                }
            }
        };
        if tokio::time::timeout(self.config.close_timeout, wait).await.is_err() {
            tracing::warn!("Workers did not stop in time, aborting");
            join_set.abort_all();
        }
    }
}

fn report_outcome<R: CrawlReporter>(reporter: &R, outcome: &ModelOutcome) {
    match &outcome.result {
        Ok(parts) => reporter.report(CrawlEvent::ModelCompleted {
            model_number: &outcome.model_number,
            parts: parts.len(),
        }),
        Err(error) => reporter.report(CrawlEvent::ModelFailed {
            model_number: &outcome.model_number,
            error,
        }),
    }
}

/// Never more workers than models, never fewer than one.
pub fn worker_count(requested: usize, models: usize) -> usize {
    requested.min(models).max(1)
}

/// List one model's parts and enrich each from its detail page.
///
/// Fails only when not a single parts page could be read.
pub async fn crawl_model<F, P>(
    fetcher: &mut PageFetcher<F>,
    parser: &P,
    urls: &CatalogUrls,
    config: &CrawlConfig,
    model: &Model,
) -> Result<Vec<Part>, AppError>
where
    F: SessionFactory,
    P: CatalogParser,
{
    let appliance = model.appliance_type;
    let limits = PageLimits {
        max_records: config.max_parts_per_model,
        max_pages: config.max_pages,
    };

    let listing = {
        let mut source = Listing::new(&mut *fetcher, |page| {
            urls.model_parts(&model.source_url, page)
        });
        paginate(
            &mut source,
            limits,
            |html| parser.parse_part_stubs(html, appliance),
            |stub: &PartStub| stub.part_number.clone(),
        )
        .await
    };

    if listing.stop_reason == StopReason::PageFailed && listing.records.is_empty() {
        return Err(listing.error.unwrap_or_else(|| {
            AppError::TaskFailed(format!("no parts page readable for model {}", model.model_number))
        }));
    }

    tracing::debug!(
        model_number = %model.model_number,
        stubs = listing.records.len(),
        pages = listing.pages_fetched,
        stop = ?listing.stop_reason,
        "Parts listed"
    );

    // A detail page can report an identity already collected. The later read
    // wins but keeps the first position, as in the partition replace.
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut parts: Vec<Part> = Vec::with_capacity(listing.records.len());
    for stub in listing.records {
        let part = enrich(fetcher, parser, stub).await;
        match index.get(&part.part_number) {
            Some(&i) => parts[i] = part,
            None => {
                index.insert(part.part_number.clone(), parts.len());
                parts.push(part);
            }
        }
    }
    Ok(parts)
}
