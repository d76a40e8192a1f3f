/// Smoke-test for `BrowserSessionFactory`.
///
/// Launches a headless Chromium, renders the first refrigerator model listing
/// page, and checks that the HTML parser finds models on it.
///
/// Run with:
///   cargo run -p partscout-client --example browser_smoke --features browser
use partscout_client::{BrowserSessionFactory, HtmlCatalogParser};
use partscout_core::catalog::{CatalogUrls, DEFAULT_BASE_URL};
use partscout_core::fetch::FetchOutcome;
use partscout_core::models::ApplianceType;
use partscout_core::traits::{CatalogParser, Session, SessionFactory};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let urls = CatalogUrls::new(DEFAULT_BASE_URL)?;
    let parser = HtmlCatalogParser::new(urls.clone())?;

    println!("Launching headless browser…");
    let session = BrowserSessionFactory::new().create().await?;
    println!("Session {} alive: {}", session.id(), session.is_alive().await);

    let url = urls.model_listing(ApplianceType::Refrigerator, 1);
    println!("Fetching {url} …");
    let outcome = session.fetch(&url).await;
    session.close().await?;

    let html = match outcome {
        FetchOutcome::Document(html) => html,
        other => anyhow::bail!("Expected a document, got {other:?}"),
    };

    let models: Vec<_> = parser
        .parse_models(&html, ApplianceType::Refrigerator)
        .into_iter()
        .filter_map(Result::ok)
        .collect();
    assert!(!models.is_empty(), "No models found in rendered HTML");

    println!("OK: {} bytes of rendered HTML, {} models", html.len(), models.len());
    for model in models.iter().take(5) {
        println!("  {} {}", model.model_number, model.name);
    }
    Ok(())
}
