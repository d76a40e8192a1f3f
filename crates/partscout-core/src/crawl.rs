use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::catalog::CatalogUrls;
use crate::config::CrawlConfig;
use crate::error::AppError;
use crate::fetch::{PageFetcher, SessionRegistry};
use crate::models::{ApplianceType, Model, ReplaceSummary};
use crate::paginate::{Listing, PageLimits, StopReason, paginate};
use crate::reporter::{CrawlEvent, CrawlReporter};
use crate::scheduler::WorkScheduler;
use crate::snapshot::{CatalogSnapshot, SnapshotBuilder};
use crate::traits::{CatalogParser, CatalogStore, SessionFactory};
use crate::util::extract_brand_from_name;

/// A model whose crawl failed, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct ModelFailure {
    pub model_number: String,
    pub error: String,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub run_id: Uuid,
    pub appliance_type: ApplianceType,
    pub models: usize,
    pub parts: usize,
    pub failures: Vec<ModelFailure>,
    pub snapshot: CatalogSnapshot,
    /// `None` when persistence is disabled or nothing was listed.
    pub summary: Option<ReplaceSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Orchestrates one crawl: list models → crawl them in parallel → snapshot → persist.
///
/// [`run`](Self::run) does everything; callers that need the snapshot before
/// it is written (an export, say) call [`crawl`](Self::crawl) and
/// [`persist`](Self::persist) themselves.
///
/// Generic over all external dependencies via traits, enabling dependency injection
/// and testability without a browser or a database.
pub struct CrawlOrchestrator<F, P, S>
where
    F: SessionFactory,
    P: CatalogParser,
    S: CatalogStore,
{
    factory: F,
    parser: P,
    store: Option<S>,
    urls: CatalogUrls,
    config: CrawlConfig,
}

impl<F, P, S> CrawlOrchestrator<F, P, S>
where
    F: SessionFactory,
    P: CatalogParser,
    S: CatalogStore,
{
    /// Create an orchestrator without persistence.
    pub fn new(factory: F, parser: P, urls: CatalogUrls, config: CrawlConfig) -> Self {
        Self {
            factory,
            parser,
            store: None,
            urls,
            config,
        }
    }

    /// Create an orchestrator that replaces the partition in `store` on success.
    pub fn with_store(
        factory: F,
        parser: P,
        store: S,
        urls: CatalogUrls,
        config: CrawlConfig,
    ) -> Self {
        Self {
            factory,
            parser,
            store: Some(store),
            urls,
            config,
        }
    }

    /// Run a full crawl of one appliance type, then persist it.
    ///
    /// Per-model failures land in the report; listing failures, cancellation,
    /// and persistence failures are returned as errors.
    pub async fn run<R: CrawlReporter>(
        &self,
        appliance: ApplianceType,
        cancel: CancellationToken,
        reporter: &R,
    ) -> Result<CrawlReport, AppError> {
        let mut report = self.crawl(appliance, cancel, reporter).await?;
        self.persist(&mut report, reporter).await?;
        Ok(report)
    }

    /// Crawl one appliance type without touching the store.
    ///
    /// 1. List models (paged, capped at `max_models`)
    /// 2. Crawl every model's parts on the worker pool
    /// 3. Build the snapshot from the models that succeeded
    pub async fn crawl<R: CrawlReporter>(
        &self,
        appliance: ApplianceType,
        cancel: CancellationToken,
        reporter: &R,
    ) -> Result<CrawlReport, AppError> {
        self.config.validate()?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        reporter.report(CrawlEvent::RunStarted {
            run_id,
            appliance_type: appliance,
            workers: self.config.workers,
        });

        let registry = SessionRegistry::new(self.config.close_timeout);

        // 1. List
        let listed = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            listed = self.list_models(appliance, &registry) => listed,
        };
        let models = match listed {
            Ok(models) => models,
            Err(e) => {
                registry.teardown().await;
                return Err(e);
            }
        };
        reporter.report(CrawlEvent::ModelsListed {
            appliance_type: appliance,
            count: models.len(),
        });

        if models.is_empty() {
            tracing::warn!(%appliance, "No models listed, nothing to crawl or persist");
            reporter.report(CrawlEvent::RunFinished {
                run_id,
                models: 0,
                parts: 0,
                failures: 0,
            });
            return Ok(CrawlReport {
                run_id,
                appliance_type: appliance,
                models: 0,
                parts: 0,
                failures: Vec::new(),
                snapshot: CatalogSnapshot::empty(appliance),
                summary: None,
                started_at,
                finished_at: Utc::now(),
            });
        }

        // 2. Crawl
        let mut builder = SnapshotBuilder::new(appliance);
        for model in &models {
            builder.add_model(model.clone());
        }

        let scheduler = WorkScheduler::new(
            self.factory.clone(),
            self.parser.clone(),
            self.urls.clone(),
            self.config.clone(),
            registry,
        );
        let schedule = scheduler.run(models, &cancel, reporter).await;
        if schedule.cancelled {
            return Err(AppError::Cancelled);
        }

        // 3. Snapshot
        let mut failures = Vec::new();
        for outcome in schedule.outcomes {
            match outcome.result {
                Ok(parts) => builder.absorb(&outcome.model_number, parts),
                Err(e) => failures.push(ModelFailure {
                    model_number: outcome.model_number,
                    error: e.to_string(),
                }),
            }
        }
        let snapshot = builder.build();
        tracing::info!(
            models = snapshot.models.len(),
            parts = snapshot.parts.len(),
            links = snapshot.links.len(),
            failed = failures.len(),
            "Snapshot built"
        );

        reporter.report(CrawlEvent::RunFinished {
            run_id,
            models: snapshot.models.len(),
            parts: snapshot.parts.len(),
            failures: failures.len(),
        });

        Ok(CrawlReport {
            run_id,
            appliance_type: appliance,
            models: snapshot.models.len(),
            parts: snapshot.parts.len(),
            failures,
            snapshot,
            summary: None,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Replace the report's partition in the store and record the summary.
    ///
    /// A no-op without a store or for an empty snapshot, so a run that
    /// listed nothing never wipes the partition.
    pub async fn persist<R: CrawlReporter>(
        &self,
        report: &mut CrawlReport,
        reporter: &R,
    ) -> Result<(), AppError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if report.snapshot.is_empty() {
            return Ok(());
        }
        let summary = store.replace_partition(&report.snapshot).await?;
        reporter.report(CrawlEvent::Persisted {
            appliance_type: report.appliance_type,
            summary: &summary,
        });
        report.summary = Some(summary);
        Ok(())
    }

    async fn list_models(
        &self,
        appliance: ApplianceType,
        registry: &SessionRegistry<F::Session>,
    ) -> Result<Vec<Model>, AppError> {
        let mut fetcher = PageFetcher::new(
            self.factory.clone(),
            registry.clone(),
            "lister",
            &self.config,
        );
        let limits = PageLimits {
            max_records: self.config.max_models,
            max_pages: self.config.max_pages,
        };

        let listing = {
            let mut source = Listing::new(&mut fetcher, |page| {
                self.urls.model_listing(appliance, page)
            });
            paginate(
                &mut source,
                limits,
                |html| self.parser.parse_models(html, appliance),
                |model: &Model| model.model_number.clone(),
            )
            .await
        };
        fetcher.shutdown().await;

        if listing.stop_reason == StopReason::PageFailed && listing.records.is_empty() {
            return Err(listing.error.unwrap_or_else(|| {
                AppError::Generic(format!("model listing for {appliance} failed"))
            }));
        }

        Ok(listing
            .records
            .into_iter()
            .map(|mut model| {
                if model.brand.is_none() {
                    model.brand = extract_brand_from_name(&model.name);
                }
                model
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::RetryPolicy;
    use crate::fetch::FetchOutcome;
    use crate::testutil::*;
    use crate::throttle::ThrottleConfig;
    use crate::traits::NullStore;

    fn test_config() -> CrawlConfig {
        CrawlConfig::default()
            .with_max_models(10)
            .with_workers(2)
            .with_throttle(ThrottleConfig::disabled())
            .with_retry(RetryPolicy::default().with_retry_delay(Duration::ZERO))
    }

    fn listing_page(page: u32) -> String {
        test_urls().model_listing(ApplianceType::Refrigerator, page)
    }

    fn parts_page(model_number: &str) -> String {
        test_urls().model_parts(&test_urls().model_url(model_number), 1)
    }

    fn catalog() -> MockSite {
        MockSite::new()
            .with_page(
                &listing_page(1),
                "model M1 Whirlpool Refrigerator\nmodel M2 GE Refrigerator",
            )
            .with_page(&listing_page(2), "model M3 Samsung Refrigerator")
            .with_page(&parts_page("M1"), "part PS1 10.00 Shelf\npart PS2 3.00 Bin")
            .with_page(&parts_page("M2"), "part PS2 3.00 Bin")
            .with_page(&parts_page("M3"), "part PS3 7.25 Knob")
    }

    fn orchestrator(
        site: &MockSite,
        store: &MemoryStore,
        config: CrawlConfig,
    ) -> CrawlOrchestrator<MockSessionFactory, TextCatalogParser, MemoryStore> {
        CrawlOrchestrator::with_store(
            MockSessionFactory::new(site.clone()),
            TextCatalogParser::new(),
            store.clone(),
            test_urls(),
            config,
        )
    }

    #[tokio::test]
    async fn full_run_persists_snapshot() {
        let site = catalog();
        let store = MemoryStore::empty();
        let reporter = MockReporter::new();

        let report = orchestrator(&site, &store, test_config())
            .run(ApplianceType::Refrigerator, CancellationToken::new(), &reporter)
            .await
            .unwrap();

        assert_eq!(report.models, 3);
        assert_eq!(report.parts, 3);
        assert!(report.failures.is_empty());
        assert_eq!(report.summary.unwrap().links_written, 4);

        assert_eq!(store.model_numbers(), vec!["M1", "M2", "M3"]);
        assert_eq!(store.part_numbers(), vec!["PS1", "PS2", "PS3"]);
        assert_eq!(store.links().len(), 4);
        assert_eq!(store.model("M2").unwrap().brand.as_deref(), Some("GE"));

        assert_eq!(reporter.count("RunStarted"), 1);
        assert_eq!(reporter.count("Persisted"), 1);
        assert_eq!(reporter.count("RunFinished"), 1);
    }

    #[tokio::test]
    async fn max_models_caps_the_listing() {
        let site = catalog();
        let store = MemoryStore::empty();

        let report = orchestrator(&site, &store, test_config().with_max_models(2))
            .run(ApplianceType::Refrigerator, CancellationToken::new(), &MockReporter::new())
            .await
            .unwrap();

        assert_eq!(report.models, 2);
        assert_eq!(site.fetch_count(&listing_page(2)), 0);
    }

    #[tokio::test]
    async fn failed_models_are_reported_and_the_rest_persisted() {
        let site = catalog().with_outcomes(
            &parts_page("M3"),
            vec![FetchOutcome::Unknown("access denied".into()); 3],
        );
        let store = MemoryStore::empty();

        let report = orchestrator(&site, &store, test_config())
            .run(ApplianceType::Refrigerator, CancellationToken::new(), &MockReporter::new())
            .await
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].model_number, "M3");
        assert_eq!(store.part_numbers(), vec!["PS1", "PS2"]);
        assert!(store.links().iter().all(|l| l.model_number != "M3"));
    }

    #[tokio::test]
    async fn empty_listing_persists_nothing() {
        let site = MockSite::new();
        let store = MemoryStore::empty();
        let reporter = MockReporter::new();

        let report = orchestrator(&site, &store, test_config())
            .run(ApplianceType::Refrigerator, CancellationToken::new(), &reporter)
            .await
            .unwrap();

        assert_eq!(report.models, 0);
        assert!(report.summary.is_none());
        assert!(store.replaces.lock().unwrap().is_empty());
        assert_eq!(reporter.count("Persisted"), 0);
    }

    #[tokio::test]
    async fn listing_failure_is_an_error() {
        let site = MockSite::new().with_outcomes(
            &listing_page(1),
            vec![FetchOutcome::Unknown("access denied".into()); 3],
        );
        let store = MemoryStore::empty();

        let err = orchestrator(&site, &store, test_config())
            .run(ApplianceType::Refrigerator, CancellationToken::new(), &MockReporter::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::FetchFailed { .. }));
        assert!(store.replaces.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_is_fatal() {
        let site = catalog();
        let store =
            MemoryStore::empty().with_replace_error(AppError::DatabaseError("connection reset".into()));

        let err = orchestrator(&site, &store, test_config())
            .run(ApplianceType::Refrigerator, CancellationToken::new(), &MockReporter::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DatabaseError(_)));
        assert!(store.model_numbers().is_empty());
    }

    #[tokio::test]
    async fn cancelled_run_persists_nothing() {
        let site = catalog();
        let store = MemoryStore::empty();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orchestrator(&site, &store, test_config())
            .run(ApplianceType::Refrigerator, cancel, &MockReporter::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Cancelled));
        assert!(store.replaces.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_any_fetch() {
        let site = catalog();
        let store = MemoryStore::empty();

        let err = orchestrator(&site, &store, test_config().with_workers(0))
            .run(ApplianceType::Refrigerator, CancellationToken::new(), &MockReporter::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ConfigError(_)));
        assert!(site.fetches().is_empty());
    }

    #[tokio::test]
    async fn second_run_replaces_the_partition() {
        let store = MemoryStore::empty();
        orchestrator(&catalog(), &store, test_config())
            .run(ApplianceType::Refrigerator, CancellationToken::new(), &MockReporter::new())
            .await
            .unwrap();

        let shrunk = MockSite::new()
            .with_page(&listing_page(1), "model M1 Whirlpool Refrigerator")
            .with_page(&parts_page("M1"), "part PS1 12.50 Shelf");
        let report = orchestrator(&shrunk, &store, test_config())
            .run(ApplianceType::Refrigerator, CancellationToken::new(), &MockReporter::new())
            .await
            .unwrap();

        assert_eq!(report.summary.unwrap().models_deleted, 3);
        assert_eq!(store.model_numbers(), vec!["M1"]);
        assert_eq!(store.part("PS1").unwrap().price, Some(12.5));
    }

    #[tokio::test]
    async fn crawl_leaves_the_store_alone_until_persist() {
        let store = MemoryStore::empty();
        let orchestrator = orchestrator(&catalog(), &store, test_config());
        let reporter = MockReporter::new();

        let mut report = orchestrator
            .crawl(ApplianceType::Refrigerator, CancellationToken::new(), &reporter)
            .await
            .unwrap();

        assert_eq!(report.snapshot.parts.len(), 3);
        assert!(report.summary.is_none());
        assert!(store.replaces.lock().unwrap().is_empty());

        orchestrator.persist(&mut report, &reporter).await.unwrap();

        assert_eq!(report.summary.unwrap().models_written, 3);
        assert_eq!(store.model_numbers(), vec!["M1", "M2", "M3"]);
        assert_eq!(reporter.count("Persisted"), 1);
    }

    #[tokio::test]
    async fn failed_persist_keeps_the_crawled_snapshot() {
        let store =
            MemoryStore::empty().with_replace_error(AppError::DatabaseError("disk full".into()));
        let orchestrator = orchestrator(&catalog(), &store, test_config());

        let mut report = orchestrator
            .crawl(ApplianceType::Refrigerator, CancellationToken::new(), &MockReporter::new())
            .await
            .unwrap();
        let err = orchestrator
            .persist(&mut report, &MockReporter::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DatabaseError(_)));
        assert_eq!(report.snapshot.models.len(), 3);
        assert!(report.summary.is_none());
    }

    #[tokio::test]
    async fn runs_without_a_store() {
        let orchestrator: CrawlOrchestrator<_, _, NullStore> = CrawlOrchestrator::new(
            MockSessionFactory::new(catalog()),
            TextCatalogParser::new(),
            test_urls(),
            test_config(),
        );

        let report = orchestrator
            .run(ApplianceType::Refrigerator, CancellationToken::new(), &MockReporter::new())
            .await
            .unwrap();

        assert_eq!(report.models, 3);
        assert!(report.summary.is_none());
    }
}
