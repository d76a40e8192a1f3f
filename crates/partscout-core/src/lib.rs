pub mod catalog;
pub mod config;
pub mod crawl;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod models;
pub mod paginate;
pub mod reporter;
pub mod scheduler;
pub mod snapshot;
pub mod throttle;
pub mod traits;
pub mod util;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use catalog::{CatalogUrls, DEFAULT_BASE_URL};
pub use config::{CrawlConfig, RetryPolicy};
pub use crawl::{CrawlOrchestrator, CrawlReport, ModelFailure};
pub use error::AppError;
pub use fetch::{DocumentMarkers, FetchOutcome, Page, PageFetcher, SessionRegistry, classify_document};
pub use models::{
    ApplianceType, Model, ModelPart, Part, PartDetail, PartStub, PartitionCounts, ReplaceSummary,
};
pub use reporter::{CrawlEvent, CrawlReporter, SilentReporter, TracingCrawlReporter};
pub use snapshot::{CatalogSnapshot, SnapshotBuilder};
pub use throttle::{Pacer, ThrottleConfig};
pub use traits::{CatalogParser, CatalogStore, NullStore, Session, SessionFactory};
