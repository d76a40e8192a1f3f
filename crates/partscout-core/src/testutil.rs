//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::catalog::CatalogUrls;
use crate::error::AppError;
use crate::fetch::FetchOutcome;
use crate::models::{
    ApplianceType, Model, ModelPart, Part, PartDetail, PartStub, PartitionCounts, ReplaceSummary,
};
use crate::reporter::{CrawlEvent, CrawlReporter};
use crate::snapshot::CatalogSnapshot;
use crate::traits::{CatalogParser, CatalogStore, Session, SessionFactory};

pub const TEST_BASE_URL: &str = "https://catalog.test";

// ---------------------------------------------------------------------------
// MockSite
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockSiteInner {
    /// Static documents, served on every fetch.
    pages: HashMap<String, String>,
    /// One-shot outcomes, consumed before falling back to `pages`.
    scripted: HashMap<String, VecDeque<FetchOutcome>>,
    delays: HashMap<String, Duration>,
    /// Recorded fetches: (session id, url).
    fetches: Vec<(String, String)>,
}

/// In-memory catalog shared by every session a [`MockSessionFactory`] creates.
///
/// URLs with neither a page nor a scripted outcome answer `NotFound`.
#[derive(Clone, Default)]
pub struct MockSite {
    inner: Arc<Mutex<MockSiteInner>>,
}

impl MockSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), html.to_string());
        self
    }

    pub fn with_outcomes(self, url: &str, outcomes: Vec<FetchOutcome>) -> Self {
        self.inner
            .lock()
            .unwrap()
            .scripted
            .entry(url.to_string())
            .or_default()
            .extend(outcomes);
        self
    }

    /// Every fetch of `url` sleeps for `delay` before answering.
    pub fn with_delay(self, url: &str, delay: Duration) -> Self {
        self.inner
            .lock()
            .unwrap()
            .delays
            .insert(url.to_string(), delay);
        self
    }

    pub fn fetches(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().fetches.clone()
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .fetches
            .iter()
            .filter(|(_, u)| u == url)
            .count()
    }

    fn answer(&self, session_id: &str, url: &str) -> (FetchOutcome, Option<Duration>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .fetches
            .push((session_id.to_string(), url.to_string()));
        let delay = inner.delays.get(url).copied();

        if let Some(outcome) = inner.scripted.get_mut(url).and_then(|q| q.pop_front()) {
            return (outcome, delay);
        }
        let outcome = match inner.pages.get(url) {
            Some(html) => FetchOutcome::Document(html.clone()),
            None => FetchOutcome::NotFound,
        };
        (outcome, delay)
    }
}

// ---------------------------------------------------------------------------
// MockSession / MockSessionFactory
// ---------------------------------------------------------------------------

pub struct MockSession {
    id: String,
    site: MockSite,
    alive: Arc<AtomicBool>,
    closed: Arc<AtomicUsize>,
}

impl Session for MockSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, url: &str) -> FetchOutcome {
        let (outcome, delay) = self.site.answer(&self.id, url);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if matches!(outcome, FetchOutcome::SessionInvalid(_)) {
            self.alive.store(false, Ordering::SeqCst);
        }
        outcome
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), AppError> {
        self.alive.store(false, Ordering::SeqCst);
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory whose sessions all read from one [`MockSite`].
#[derive(Clone)]
pub struct MockSessionFactory {
    site: MockSite,
    created: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    liveness: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
    create_errors: Arc<Mutex<VecDeque<AppError>>>,
}

impl MockSessionFactory {
    pub fn new(site: MockSite) -> Self {
        Self {
            site,
            created: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            liveness: Arc::new(Mutex::new(Vec::new())),
            create_errors: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Queue a failure: the next `create` call not already scripted to fail
    /// fails with `error`.
    pub fn with_create_error(self, error: AppError) -> Self {
        self.create_errors.lock().unwrap().push_back(error);
        self
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Simulate every session's browser crashing.
    pub fn kill_all_sessions(&self) {
        for alive in self.liveness.lock().unwrap().iter() {
            alive.store(false, Ordering::SeqCst);
        }
    }
}

impl SessionFactory for MockSessionFactory {
    type Session = MockSession;

    async fn create(&self) -> Result<MockSession, AppError> {
        if let Some(e) = self.create_errors.lock().unwrap().pop_front() {
            return Err(e);
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        let alive = Arc::new(AtomicBool::new(true));
        self.liveness.lock().unwrap().push(Arc::clone(&alive));
        Ok(MockSession {
            id: format!("mock-session-{n}"),
            site: self.site.clone(),
            alive,
            closed: Arc::clone(&self.closed),
        })
    }
}

// ---------------------------------------------------------------------------
// TextCatalogParser
// ---------------------------------------------------------------------------

/// Line-oriented stand-in for the HTML parser.
///
/// - model pages: `model <number> <name...>`
/// - part pages: `part <number> <price|-> <name...>`
/// - detail pages: `key=value` lines (`part_number`, `mpn`, `name`,
///   `description`, `price`, `manufacturer`)
/// - a line reading `bad` yields a parse error
#[derive(Clone)]
pub struct TextCatalogParser {
    urls: CatalogUrls,
}

impl TextCatalogParser {
    pub fn new() -> Self {
        Self {
            urls: test_urls(),
        }
    }
}

impl Default for TextCatalogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogParser for TextCatalogParser {
    fn parse_models(&self, html: &str, appliance: ApplianceType) -> Vec<Result<Model, AppError>> {
        html.lines()
            .map(str::trim)
            .filter(|l| l.starts_with("model ") || *l == "bad")
            .map(|line| {
                let mut words = line.split_whitespace().skip(1);
                let number = words
                    .next()
                    .ok_or_else(|| AppError::ParseError(format!("bad model line: {line}")))?;
                let name = words.collect::<Vec<_>>().join(" ");
                Ok(Model {
                    model_number: number.to_string(),
                    name,
                    brand: None,
                    appliance_type: appliance,
                    source_url: self.urls.model_url(number),
                })
            })
            .collect()
    }

    fn parse_part_stubs(
        &self,
        html: &str,
        appliance: ApplianceType,
    ) -> Vec<Result<PartStub, AppError>> {
        html.lines()
            .map(str::trim)
            .filter(|l| l.starts_with("part ") || *l == "bad")
            .map(|line| {
                let mut words = line.split_whitespace().skip(1);
                let number = words
                    .next()
                    .ok_or_else(|| AppError::ParseError(format!("bad part line: {line}")))?;
                let price = words.next().and_then(|p| p.parse::<f64>().ok());
                let name = words.collect::<Vec<_>>().join(" ");
                let mut stub = PartStub::new(
                    number,
                    appliance,
                    self.urls.absolute(&format!("/{number}.htm")),
                );
                stub.price = price;
                stub.name = (!name.is_empty()).then_some(name);
                Ok(stub)
            })
            .collect()
    }

    fn parse_part_detail(&self, html: &str, _url: &str) -> Result<PartDetail, AppError> {
        if html.trim() == "bad" {
            return Err(AppError::ParseError("unreadable detail page".into()));
        }
        let mut detail = PartDetail::default();
        for line in html.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = Some(value.trim().to_string());
            match key.trim() {
                "part_number" => detail.part_number = value,
                "mpn" => detail.manufacturer_part_number = value,
                "name" => detail.name = value,
                "description" => detail.description = value,
                "manufacturer" => detail.manufacturer = value,
                "price" => detail.price = value.and_then(|v| v.parse().ok()),
                _ => {}
            }
        }
        Ok(detail)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryTables {
    models: BTreeMap<String, Model>,
    parts: BTreeMap<String, Part>,
    links: BTreeSet<ModelPart>,
}

/// In-memory CatalogStore with the same partition-replace semantics as the
/// PostgreSQL repository, including all-or-nothing failure.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<MemoryTables>>,
    replace_error: Arc<Mutex<Option<AppError>>>,
    pub replaces: Arc<Mutex<Vec<ApplianceType>>>,
}

impl MemoryStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The next replace fails without touching stored rows.
    pub fn with_replace_error(self, error: AppError) -> Self {
        *self.replace_error.lock().unwrap() = Some(error);
        self
    }

    pub fn part(&self, part_number: &str) -> Option<Part> {
        self.tables.lock().unwrap().parts.get(part_number).cloned()
    }

    pub fn model(&self, model_number: &str) -> Option<Model> {
        self.tables.lock().unwrap().models.get(model_number).cloned()
    }

    pub fn links(&self) -> Vec<ModelPart> {
        self.tables.lock().unwrap().links.iter().cloned().collect()
    }

    pub fn model_numbers(&self) -> Vec<String> {
        self.tables.lock().unwrap().models.keys().cloned().collect()
    }

    pub fn part_numbers(&self) -> Vec<String> {
        self.tables.lock().unwrap().parts.keys().cloned().collect()
    }
}

impl CatalogStore for MemoryStore {
    async fn replace_partition(
        &self,
        snapshot: &CatalogSnapshot,
    ) -> Result<ReplaceSummary, AppError> {
        if let Some(e) = self.replace_error.lock().unwrap().take() {
            return Err(e);
        }
        self.replaces.lock().unwrap().push(snapshot.appliance_type);

        let appliance = snapshot.appliance_type;
        let mut tables = self.tables.lock().unwrap();
        let mut summary = ReplaceSummary::default();

        let stale_models: BTreeSet<String> = tables
            .models
            .values()
            .filter(|m| m.appliance_type == appliance)
            .map(|m| m.model_number.clone())
            .collect();
        let stale_parts: BTreeSet<String> = tables
            .parts
            .values()
            .filter(|p| p.appliance_type == appliance)
            .map(|p| p.part_number.clone())
            .collect();

        let before = tables.links.len();
        tables.links.retain(|l| {
            !stale_models.contains(&l.model_number) && !stale_parts.contains(&l.part_number)
        });
        summary.links_deleted = (before - tables.links.len()) as u64;

        tables.parts.retain(|k, _| !stale_parts.contains(k));
        summary.parts_deleted = stale_parts.len() as u64;
        tables.models.retain(|k, _| !stale_models.contains(k));
        summary.models_deleted = stale_models.len() as u64;

        for model in &snapshot.models {
            tables
                .models
                .insert(model.model_number.clone(), model.clone());
        }
        for part in &snapshot.parts {
            tables.parts.insert(part.part_number.clone(), part.clone());
        }
        for link in &snapshot.links {
            tables.links.insert(link.clone());
        }
        summary.models_written = snapshot.models.len() as u64;
        summary.parts_written = snapshot.parts.len() as u64;
        summary.links_written = snapshot.links.len() as u64;

        Ok(summary)
    }

    async fn partition_counts(&self, appliance: ApplianceType) -> Result<PartitionCounts, AppError> {
        let tables = self.tables.lock().unwrap();
        let models: BTreeSet<&String> = tables
            .models
            .values()
            .filter(|m| m.appliance_type == appliance)
            .map(|m| &m.model_number)
            .collect();
        Ok(PartitionCounts {
            models: models.len() as i64,
            parts: tables
                .parts
                .values()
                .filter(|p| p.appliance_type == appliance)
                .count() as i64,
            links: tables
                .links
                .iter()
                .filter(|l| models.contains(&l.model_number))
                .count() as i64,
        })
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock crawl reporter that records event labels.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, label: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.as_str() == label)
            .count()
    }
}

impl CrawlReporter for MockReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        let label = match &event {
            CrawlEvent::RunStarted { .. } => "RunStarted",
            CrawlEvent::ModelsListed { .. } => "ModelsListed",
            CrawlEvent::ModelCompleted { .. } => "ModelCompleted",
            CrawlEvent::ModelFailed { .. } => "ModelFailed",
            CrawlEvent::SessionsTornDown { .. } => "SessionsTornDown",
            CrawlEvent::Persisted { .. } => "Persisted",
            CrawlEvent::RunFinished { .. } => "RunFinished",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

pub fn test_urls() -> CatalogUrls {
    CatalogUrls::new(TEST_BASE_URL).expect("valid test base url")
}

pub fn make_test_model(model_number: &str) -> Model {
    Model {
        model_number: model_number.to_string(),
        name: format!("{model_number} Test Refrigerator"),
        brand: None,
        appliance_type: ApplianceType::Refrigerator,
        source_url: test_urls().model_url(model_number),
    }
}

pub fn make_test_part(part_number: &str, price: Option<f64>) -> Part {
    Part {
        part_number: part_number.to_string(),
        manufacturer_part_number: None,
        name: format!("Part {part_number}"),
        description: String::new(),
        price,
        manufacturer: None,
        appliance_type: ApplianceType::Refrigerator,
        source_url: format!("{TEST_BASE_URL}/{part_number}.htm"),
    }
}
