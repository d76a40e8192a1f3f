use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use partscout_client::{HtmlCatalogParser, HttpSessionFactory};
use partscout_core::models::ApplianceType;
use partscout_core::traits::{CatalogParser, CatalogStore, NullStore, SessionFactory};
use partscout_core::{
    CatalogUrls, CrawlConfig, CrawlOrchestrator, CrawlReport, DEFAULT_BASE_URL, ThrottleConfig,
    TracingCrawlReporter,
};
use partscout_db::{CatalogRepository, Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "partscout", version, about = "Appliance parts catalog crawler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl models and their parts, then export and/or persist them
    Crawl(CrawlArgs),

    /// Show stored row counts per appliance partition
    Stats {
        #[arg(short = 't', long = "type", value_enum, default_value_t = TypeArg::All)]
        appliance: TypeArg,
    },

    /// Apply pending database migrations
    Migrate,
}

#[derive(clap::Args, Debug)]
struct CrawlArgs {
    /// Appliance partition(s) to crawl
    #[arg(short = 't', long = "type", value_enum, default_value_t = TypeArg::Refrigerator)]
    appliance: TypeArg,

    #[arg(long, default_value_t = 3)]
    max_models: usize,

    #[arg(long, default_value_t = 10)]
    max_parts_per_model: usize,

    /// Concurrent rendering sessions
    #[arg(short, long, default_value_t = 1)]
    workers: usize,

    /// Replace the crawled partitions in the database (requires DATABASE_URL)
    #[arg(long, default_value_t = false)]
    db: bool,

    /// Skip the JSON export
    #[arg(long, default_value_t = false)]
    no_json: bool,

    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Prepended to the `{type}_models.json` / `{type}_parts.json` file names
    #[arg(long)]
    output_prefix: Option<String>,

    #[arg(long, value_enum, default_value_t = Renderer::default())]
    renderer: Renderer,

    /// Page ceiling for every listing traversal
    #[arg(long, default_value_t = 50)]
    max_pages: u32,

    /// Per-model budget in seconds
    #[arg(long, default_value_t = 300)]
    model_timeout: u64,

    /// Per-page navigation timeout in seconds
    #[arg(long, default_value_t = 45)]
    page_timeout: u64,

    /// Minimum spacing between page fetches of one worker, in milliseconds
    /// [default: 3000]
    #[arg(long)]
    throttle_ms: Option<u64>,

    /// Upper bound of the random extra spacing, in milliseconds [default: 3000]
    #[arg(long)]
    jitter_ms: Option<u64>,

    /// Refuse to replace a partition with fewer than R × its stored models
    #[arg(long)]
    min_model_ratio: Option<f64>,

    #[arg(long, env = "CATALOG_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TypeArg {
    Refrigerator,
    Dishwasher,
    All,
}

impl TypeArg {
    fn appliances(self) -> Vec<ApplianceType> {
        match self {
            TypeArg::Refrigerator => vec![ApplianceType::Refrigerator],
            TypeArg::Dishwasher => vec![ApplianceType::Dishwasher],
            TypeArg::All => ApplianceType::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Renderer {
    /// Headless Chromium (needs the `browser` feature)
    Browser,
    /// Plain HTTP, for server-rendered catalogs
    Http,
}

impl Default for Renderer {
    fn default() -> Self {
        if cfg!(feature = "browser") {
            Renderer::Browser
        } else {
            Renderer::Http
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("partscout=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl(args) => cmd_crawl(args).await?,
        Commands::Stats { appliance } => {
            let db = connect_db().await?;
            cmd_stats(appliance, &db.catalog_repo()).await?;
        }
        Commands::Migrate => {
            connect_db().await?;
            println!("Migrations applied");
        }
    }

    Ok(())
}

/// Connect using DATABASE_URL and bring the schema up to date.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to run migrations")?;
    Ok(db)
}

fn crawl_config(args: &CrawlArgs) -> CrawlConfig {
    CrawlConfig::default()
        .with_max_models(args.max_models)
        .with_max_parts_per_model(args.max_parts_per_model)
        .with_workers(args.workers)
        .with_max_pages(args.max_pages)
        .with_model_timeout(Duration::from_secs(args.model_timeout))
        .with_page_timeout(Duration::from_secs(args.page_timeout))
        .with_throttle(throttle_config(args))
}

/// Built from [`ThrottleConfig::default`], with whichever half the flags override.
fn throttle_config(args: &CrawlArgs) -> ThrottleConfig {
    let mut throttle = ThrottleConfig::default();
    if let Some(ms) = args.throttle_ms {
        throttle.delay = Duration::from_millis(ms);
    }
    if let Some(ms) = args.jitter_ms {
        throttle.jitter = Duration::from_millis(ms);
    }
    throttle
}

async fn cmd_crawl(args: CrawlArgs) -> Result<()> {
    let config = crawl_config(&args);
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    let urls = CatalogUrls::new(&args.base_url).context("Invalid --base-url")?;
    let parser = HtmlCatalogParser::new(urls.clone()).context("Failed to build HTML parser")?;

    let store = if args.db {
        let repo = connect_db().await?.catalog_repo();
        Some(match args.min_model_ratio {
            Some(ratio) => repo.with_min_model_ratio(ratio),
            None => repo,
        })
    } else {
        None
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling crawl");
            ctrl_c.cancel();
        }
    });

    let export = (!args.no_json).then(|| JsonExport {
        dir: args.output_dir.clone(),
        prefix: args.output_prefix.clone(),
    });
    let appliances = args.appliance.appliances();

    let page_timeout = Duration::from_secs(args.page_timeout);
    let (reports, failed) = match args.renderer {
        Renderer::Http => {
            let factory =
                HttpSessionFactory::with_timeout(page_timeout).context("Failed to build HTTP client")?;
            crawl_with(factory, parser, store, urls, config, &appliances, export.as_ref(), cancel)
                .await
        }
        #[cfg(feature = "browser")]
        Renderer::Browser => {
            let factory =
                partscout_client::BrowserSessionFactory::new().with_navigation_timeout(page_timeout);
            crawl_with(factory, parser, store, urls, config, &appliances, export.as_ref(), cancel)
                .await
        }
        #[cfg(not(feature = "browser"))]
        Renderer::Browser => {
            anyhow::bail!(
                "This build has no browser renderer; rebuild with --features browser or pass --renderer http"
            )
        }
    }?;

    for report in &reports {
        println!(
            "{}: {} models, {} parts, {} failed models",
            report.appliance_type,
            report.models,
            report.parts,
            report.failures.len()
        );
        for failure in &report.failures {
            println!("  {}: {}", failure.model_number, failure.error);
        }
    }

    match failed {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Where the per-partition JSON files go.
#[derive(Debug, Clone)]
struct JsonExport {
    dir: PathBuf,
    prefix: Option<String>,
}

impl JsonExport {
    /// `{dir}/[{prefix}_]{type}_models.json` and the matching parts file.
    fn paths(&self, appliance: ApplianceType) -> (PathBuf, PathBuf) {
        let stem = match &self.prefix {
            Some(prefix) => format!("{prefix}_{}", appliance.as_str().to_lowercase()),
            None => appliance.as_str().to_lowercase(),
        };
        (
            self.dir.join(format!("{stem}_models.json")),
            self.dir.join(format!("{stem}_parts.json")),
        )
    }

    fn write(&self, report: &CrawlReport) -> Result<(PathBuf, PathBuf)> {
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create output directory: {}", self.dir.display())
        })?;

        let (models_path, parts_path) = self.paths(report.appliance_type);
        write_pretty(&models_path, &report.snapshot.models)?;
        write_pretty(&parts_path, &report.snapshot.parts)?;
        Ok((models_path, parts_path))
    }
}

#[allow(clippy::too_many_arguments)]
async fn crawl_with<F: SessionFactory>(
    factory: F,
    parser: HtmlCatalogParser,
    store: Option<CatalogRepository>,
    urls: CatalogUrls,
    config: CrawlConfig,
    appliances: &[ApplianceType],
    export: Option<&JsonExport>,
    cancel: CancellationToken,
) -> Result<(Vec<CrawlReport>, Option<anyhow::Error>)> {
    match store {
        Some(store) => {
            let orchestrator = CrawlOrchestrator::with_store(factory, parser, store, urls, config);
            crawl_all(&orchestrator, appliances, export, cancel).await
        }
        None => {
            let orchestrator: CrawlOrchestrator<_, _, NullStore> =
                CrawlOrchestrator::new(factory, parser, urls, config);
            crawl_all(&orchestrator, appliances, export, cancel).await
        }
    }
}

/// Crawl each requested partition in turn, exporting it before it is persisted
/// so a store failure never loses the crawled data.
///
/// A fatal error such as a database failure or cancellation stops the loop.
/// Other partition failures are logged and the next partition still runs; the
/// first of them is handed back with the reports that completed.
async fn crawl_all<F, P, S>(
    orchestrator: &CrawlOrchestrator<F, P, S>,
    appliances: &[ApplianceType],
    export: Option<&JsonExport>,
    cancel: CancellationToken,
) -> Result<(Vec<CrawlReport>, Option<anyhow::Error>)>
where
    F: SessionFactory,
    P: CatalogParser,
    S: CatalogStore,
{
    let mut reports = Vec::new();
    let mut failed = None;
    for &appliance in appliances {
        let mut report = match orchestrator
            .crawl(appliance, cancel.clone(), &TracingCrawlReporter)
            .await
        {
            Ok(report) => report,
            Err(e) if e.is_fatal() => {
                return Err(e).with_context(|| format!("Crawl of {appliance} partition failed"));
            }
            Err(e) => {
                tracing::error!(%appliance, error = %e, "Partition crawl failed");
                if failed.is_none() {
                    failed = Some(
                        anyhow::Error::new(e)
                            .context(format!("Crawl of {appliance} partition failed")),
                    );
                }
                continue;
            }
        };

        if let Some(export) = export {
            let (models_path, parts_path) = export.write(&report)?;
            tracing::info!(
                %appliance,
                models = %models_path.display(),
                parts = %parts_path.display(),
                "JSON export written"
            );
        }

        orchestrator
            .persist(&mut report, &TracingCrawlReporter)
            .await
            .with_context(|| format!("Persisting {appliance} partition failed"))?;
        reports.push(report);
    }
    Ok((reports, failed))
}

fn write_pretty<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

async fn cmd_stats(appliance: TypeArg, repo: &CatalogRepository) -> Result<()> {
    for appliance in appliance.appliances() {
        let counts = repo
            .partition_counts(appliance)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        println!(
            "{appliance}: {} models, {} parts, {} links",
            counts.models, counts.parts, counts.links
        );
    }
    Ok(())
}
