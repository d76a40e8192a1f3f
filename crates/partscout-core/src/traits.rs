use std::future::Future;

use crate::error::AppError;
use crate::fetch::FetchOutcome;
use crate::models::{
    ApplianceType, Model, PartDetail, PartStub, PartitionCounts, ReplaceSummary,
};
use crate::snapshot::CatalogSnapshot;

/// A long-lived rendering session (a browser tab, an HTTP client, ...).
///
/// Implementations classify every navigation into a [`FetchOutcome`]; they
/// never hand back a document they could not make sense of.
pub trait Session: Send + Sync + 'static {
    /// Stable identifier used by the session registry.
    fn id(&self) -> &str;

    fn fetch(&self, url: &str) -> impl Future<Output = FetchOutcome> + Send;

    /// Cheap liveness probe, run before the session is reused.
    fn is_alive(&self) -> impl Future<Output = bool> + Send;

    /// Release the underlying resources. Must tolerate an already-dead session.
    fn close(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Creates fresh sessions for workers.
pub trait SessionFactory: Send + Sync + Clone + 'static {
    type Session: Session;

    fn create(&self) -> impl Future<Output = Result<Self::Session, AppError>> + Send;
}

/// Turns fetched documents into candidate records. Pure and side-effect free.
pub trait CatalogParser: Send + Sync + Clone + 'static {
    /// Models listed on one page of the model listing.
    fn parse_models(&self, html: &str, appliance: ApplianceType) -> Vec<Result<Model, AppError>>;

    /// Part stubs listed on one page of a model's parts listing.
    fn parse_part_stubs(
        &self,
        html: &str,
        appliance: ApplianceType,
    ) -> Vec<Result<PartStub, AppError>>;

    /// Authoritative fields from a part's detail page.
    fn parse_part_detail(&self, html: &str, url: &str) -> Result<PartDetail, AppError>;
}

/// Persists crawl snapshots, one appliance partition at a time.
pub trait CatalogStore: Send + Sync + Clone {
    /// Atomically replace every row of `snapshot.appliance_type` with the snapshot.
    fn replace_partition(
        &self,
        snapshot: &CatalogSnapshot,
    ) -> impl Future<Output = Result<ReplaceSummary, AppError>> + Send;

    fn partition_counts(
        &self,
        appliance: ApplianceType,
    ) -> impl Future<Output = Result<PartitionCounts, AppError>> + Send;
}

/// A no-op CatalogStore for use when persistence is not needed.
#[derive(Debug, Clone)]
pub struct NullStore;

impl CatalogStore for NullStore {
    async fn replace_partition(
        &self,
        _snapshot: &CatalogSnapshot,
    ) -> Result<ReplaceSummary, AppError> {
        Ok(ReplaceSummary::default())
    }

    async fn partition_counts(
        &self,
        _appliance: ApplianceType,
    ) -> Result<PartitionCounts, AppError> {
        Ok(PartitionCounts::default())
    }
}
