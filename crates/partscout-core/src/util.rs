/// Brands recognised in model listing names. Longer names come first;
/// two-letter brands need an exact word match.
const KNOWN_BRANDS: &[&str] = &[
    "Whirlpool",
    "Samsung",
    "Frigidaire",
    "Kenmore",
    "Maytag",
    "KitchenAid",
    "Bosch",
    "Amana",
    "Admiral",
    "Electrolux",
    "Hotpoint",
    "Jenn-Air",
    "Magic Chef",
    "Midea",
    "Haier",
    "Sub-Zero",
    "Viking",
    "Thermador",
    "GE",
    "LG",
];

/// Derive a brand from a model listing name.
///
/// Example: `"00740570 Bosch Refrigerator"` → `Some("Bosch")`
pub fn extract_brand_from_name(name: &str) -> Option<String> {
    let words: Vec<&str> = name.split_whitespace().collect();
    let lowered = name.to_lowercase();

    KNOWN_BRANDS
        .iter()
        .find(|brand| {
            if brand.contains(' ') {
                // Multi-word brands are matched as a phrase.
                lowered
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .windows(2)
                    .any(|pair| pair.join(" ") == brand.to_lowercase())
            } else {
                words.iter().any(|w| w.eq_ignore_ascii_case(brand))
            }
        })
        .map(|brand| brand.to_string())
}

/// Strip the query string and fragment from a URL.
pub fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_brand_from_name() {
        assert_eq!(
            extract_brand_from_name("00740570 Bosch Refrigerator").as_deref(),
            Some("Bosch")
        );
        assert_eq!(
            extract_brand_from_name("WRS325SDHZ whirlpool Side-by-Side").as_deref(),
            Some("Whirlpool")
        );
        assert_eq!(
            extract_brand_from_name("MCBR1010 Magic Chef Refrigerator").as_deref(),
            Some("Magic Chef")
        );
    }

    #[test]
    fn test_short_brands_need_whole_word() {
        assert_eq!(
            extract_brand_from_name("GSS25GSHSS GE Refrigerator").as_deref(),
            Some("GE")
        );
        assert_eq!(extract_brand_from_name("GEARBOX 1234 Freezer"), None);
        assert_eq!(extract_brand_from_name("LGX200 Dishwasher"), None);
    }

    #[test]
    fn test_strip_query() {
        assert_eq!(
            strip_query("https://example.com/PS123-Bosch.htm?SourceCode=18"),
            "https://example.com/PS123-Bosch.htm"
        );
        assert_eq!(strip_query("https://example.com/a#b"), "https://example.com/a");
        assert_eq!(strip_query("https://example.com/a"), "https://example.com/a");
    }
}
