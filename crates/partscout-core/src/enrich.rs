use crate::fetch::{Page, PageFetcher};
use crate::models::{Part, PartDetail, PartStub};
use crate::traits::{CatalogParser, SessionFactory};

pub const UNKNOWN_PART_NAME: &str = "Unknown Part";

/// Fold a detail page into its listing stub.
///
/// A detail value wins only when it is present and non-blank; otherwise the
/// stub's value is kept.
pub fn merge(stub: PartStub, detail: PartDetail) -> Part {
    let PartStub {
        part_number,
        manufacturer_part_number,
        name,
        description,
        price,
        manufacturer,
        appliance_type,
        detail_url,
    } = stub;

    Part {
        part_number: prefer(detail.part_number, Some(part_number)).unwrap_or_default(),
        manufacturer_part_number: prefer(
            detail.manufacturer_part_number,
            manufacturer_part_number,
        ),
        name: prefer(detail.name, name).unwrap_or_else(|| UNKNOWN_PART_NAME.to_string()),
        description: prefer(detail.description, description).unwrap_or_default(),
        price: detail.price.or(price),
        manufacturer: prefer(detail.manufacturer, manufacturer),
        appliance_type,
        source_url: detail_url,
    }
}

fn prefer(detail: Option<String>, stub: Option<String>) -> Option<String> {
    non_blank(detail).or_else(|| non_blank(stub))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Fetch a stub's detail page and merge it. Never fails: a missing or
/// unreadable detail page degrades to the stub alone.
pub async fn enrich<F, P>(fetcher: &mut PageFetcher<F>, parser: &P, stub: PartStub) -> Part
where
    F: SessionFactory,
    P: CatalogParser,
{
    let detail = match fetcher.fetch(&stub.detail_url).await {
        Ok(Page::Document(html)) => match parser.parse_part_detail(&html, &stub.detail_url) {
            Ok(detail) => detail,
            Err(e) => {
                tracing::warn!(part_number = %stub.part_number, error = %e, "Unreadable detail page, keeping listing data");
                PartDetail::default()
            }
        },
        Ok(Page::NotFound) => {
            tracing::warn!(part_number = %stub.part_number, url = %stub.detail_url, "Detail page not found, keeping listing data");
            PartDetail::default()
        }
        Err(e) => {
            tracing::warn!(part_number = %stub.part_number, error = %e, "Detail fetch failed, keeping listing data");
            PartDetail::default()
        }
    };
    merge(stub, detail)
}
