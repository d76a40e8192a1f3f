//! HTML parser for the parts catalog.
//!
//! This module extracts:
//! - Models from a model listing page (`/Models/<number>/` links)
//! - Part stubs from a model's parts page (`div.mega-m__part` containers)
//! - Part details from a part page (schema.org microdata)

use std::sync::Arc;

use partscout_core::catalog::CatalogUrls;
use partscout_core::error::AppError;
use partscout_core::models::{ApplianceType, Model, PartDetail, PartStub};
use partscout_core::traits::CatalogParser;
use partscout_core::util::extract_brand_from_name;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

struct Selectors {
    link: Selector,
    part_container: Selector,
    part_name: Selector,
    part_price: Selector,
    product_id: Selector,
    mpn: Selector,
    heading: Selector,
    title: Selector,
    description: Selector,
    description_fallback: Selector,
    price: Selector,
    brand: Selector,
}

struct Patterns {
    model_href: Regex,
    ps_label: Regex,
    ps_href: Regex,
    manufacturer_label: Regex,
    price: Regex,
    url_brand: Regex,
}

/// [`CatalogParser`] backed by `scraper` CSS selectors.
#[derive(Clone)]
pub struct HtmlCatalogParser {
    urls: CatalogUrls,
    selectors: Arc<Selectors>,
    patterns: Arc<Patterns>,
}

fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::ConfigError(format!("Invalid selector '{css}': {e}")))
}

fn pattern(re: &str) -> Result<Regex, AppError> {
    Regex::new(re).map_err(|e| AppError::ConfigError(format!("Invalid pattern '{re}': {e}")))
}

impl HtmlCatalogParser {
    /// Relative links are resolved against `urls`.
    pub fn new(urls: CatalogUrls) -> Result<Self, AppError> {
        let selectors = Selectors {
            link: selector("a[href]")?,
            part_container: selector("div.mega-m__part")?,
            part_name: selector("a.mega-m__part__name")?,
            part_price: selector("div.mega-m__part__price")?,
            product_id: selector(r#"[itemprop="productID"]"#)?,
            mpn: selector(r#"[itemprop="mpn"]"#)?,
            heading: selector("h1")?,
            title: selector("title")?,
            description: selector(r#"div[itemprop="description"]"#)?,
            description_fallback: selector("div.pd__description")?,
            price: selector(r#"[itemprop="price"]"#)?,
            brand: selector(r#"[itemprop="brand"]"#)?,
        };
        let patterns = Patterns {
            model_href: pattern(r"^(?:https?://[^/]+)?/Models/([A-Za-z0-9]+)/?$")?,
            ps_label: pattern(r"PartSelect #:\s*PS(\d+)")?,
            ps_href: pattern(r"/PS(\d+)")?,
            manufacturer_label: pattern(r"Manufacturer #:\s*(\S+)")?,
            price: pattern(r"\$?\s*([\d,]+(?:\.\d+)?)")?,
            url_brand: pattern(r"/PS\d+-([A-Za-z]+)-")?,
        };

        Ok(Self {
            urls,
            selectors: Arc::new(selectors),
            patterns: Arc::new(patterns),
        })
    }

    fn parse_stub(
        &self,
        container: ElementRef<'_>,
        appliance: ApplianceType,
    ) -> Result<PartStub, AppError> {
        let link = container
            .select(&self.selectors.part_name)
            .next()
            .ok_or_else(|| AppError::ParseError("part container without a name link".into()))?;
        let href = link.value().attr("href").unwrap_or_default();

        let lines = text_lines(container);
        let flat = lines.join(" ");

        let part_number = self
            .patterns
            .ps_label
            .captures(&flat)
            .or_else(|| self.patterns.ps_href.captures(href))
            .map(|c| format!("PS{}", &c[1]))
            .ok_or_else(|| {
                AppError::ParseError(format!("no PartSelect number in part container ({href})"))
            })?;

        let mut stub = PartStub::new(part_number, appliance, self.urls.absolute(href));
        stub.name = Some(collapse(link)).filter(|n| !n.is_empty());
        stub.manufacturer_part_number = self
            .patterns
            .manufacturer_label
            .captures(&flat)
            .map(|c| c[1].to_string());
        stub.price = container
            .select(&self.selectors.part_price)
            .next()
            .and_then(|el| parse_price(&self.patterns.price, &collapse(el)));
        stub.description = short_description(&lines);
        Ok(stub)
    }
}

impl CatalogParser for HtmlCatalogParser {
    fn parse_models(&self, html: &str, appliance: ApplianceType) -> Vec<Result<Model, AppError>> {
        let document = Html::parse_document(html);

        document
            .select(&self.selectors.link)
            .filter_map(|link| {
                let href = link.value().attr("href")?.trim();
                let number = self.patterns.model_href.captures(href)?[1].to_string();
                let name = collapse(link);
                Some(Ok(Model {
                    brand: extract_brand_from_name(&name),
                    name: if name.is_empty() { number.clone() } else { name },
                    source_url: self.urls.absolute(href),
                    model_number: number,
                    appliance_type: appliance,
                }))
            })
            .collect()
    }

    fn parse_part_stubs(
        &self,
        html: &str,
        appliance: ApplianceType,
    ) -> Vec<Result<PartStub, AppError>> {
        let document = Html::parse_document(html);

        document
            .select(&self.selectors.part_container)
            .map(|container| self.parse_stub(container, appliance))
            .collect()
    }

    fn parse_part_detail(&self, html: &str, url: &str) -> Result<PartDetail, AppError> {
        let document = Html::parse_document(html);
        let first_text = |selector: &Selector| {
            document
                .select(selector)
                .next()
                .map(collapse)
                .filter(|t| !t.is_empty())
        };

        let name = document
            .select(&self.selectors.heading)
            .find(|h| {
                h.value()
                    .attr("class")
                    .is_some_and(|c| c.to_lowercase().contains("title"))
            })
            .map(collapse)
            .filter(|t| !t.is_empty())
            .or_else(|| {
                first_text(&self.selectors.title).and_then(|t| {
                    t.split(['–', '|'])
                        .next()
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                })
            });

        let price = document.select(&self.selectors.price).next().and_then(|el| {
            let raw = el
                .value()
                .attr("content")
                .map(str::to_string)
                .unwrap_or_else(|| collapse(el));
            parse_price(&self.patterns.price, &raw)
        });

        let manufacturer = first_text(&self.selectors.brand).or_else(|| {
            self.patterns
                .url_brand
                .captures(url)
                .map(|c| c[1].to_string())
        });

        let detail = PartDetail {
            part_number: first_text(&self.selectors.product_id),
            manufacturer_part_number: first_text(&self.selectors.mpn),
            name,
            description: first_text(&self.selectors.description)
                .or_else(|| first_text(&self.selectors.description_fallback)),
            price,
            manufacturer,
        };

        if detail == PartDetail::default() {
            return Err(AppError::ParseError(format!("no part details found at {url}")));
        }
        Ok(detail)
    }
}

/// Element text with whitespace runs collapsed to single spaces.
fn collapse(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Non-empty trimmed text nodes, in document order.
fn text_lines(element: ElementRef<'_>) -> Vec<String> {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// `"$1,234.56"` → `1234.56`
fn parse_price(pattern: &Regex, text: &str) -> Option<f64> {
    let caps = pattern.captures(text)?;
    caps[1].replace(',', "").parse().ok()
}

/// The listing shows a blurb within two lines of the manufacturer number.
fn short_description(lines: &[String]) -> Option<String> {
    let idx = lines.iter().position(|l| l.contains("Manufacturer #:"))?;
    lines
        .iter()
        .skip(idx + 1)
        .take(2)
        .find(|l| l.chars().count() > 50 && !l.starts_with('$'))
        .map(|l| l.chars().take(200).collect())
}
