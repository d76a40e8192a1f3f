use url::Url;

use crate::error::AppError;
use crate::models::ApplianceType;
use crate::util::strip_query;

pub const DEFAULT_BASE_URL: &str = "https://www.partselect.com";

/// URL layout of the parts catalog.
#[derive(Debug, Clone)]
pub struct CatalogUrls {
    base: Url,
}

impl CatalogUrls {
    /// Parse `base` (scheme and host, optionally a path prefix).
    pub fn new(base: &str) -> Result<Self, AppError> {
        let trimmed = base.trim().trim_end_matches('/');
        let base = Url::parse(&format!("{trimmed}/"))
            .map_err(|e| AppError::ConfigError(format!("Invalid catalog base URL '{base}': {e}")))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(AppError::ConfigError(format!(
                "Catalog base URL must be http(s): {base}"
            )));
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// One page of the model listing for an appliance type, 1-based.
    ///
    /// Example: `https://www.partselect.com/Refrigerator-Models.htm?start=2`
    pub fn model_listing(&self, appliance: ApplianceType, page: u32) -> String {
        format!("{}/{}-Models.htm?start={page}", self.base(), appliance.as_str())
    }

    /// One page of a model's parts listing, 1-based.
    pub fn model_parts(&self, model_url: &str, page: u32) -> String {
        format!(
            "{}/Parts/?start={page}",
            strip_query(model_url).trim_end_matches('/')
        )
    }

    /// Canonical page of a model.
    pub fn model_url(&self, model_number: &str) -> String {
        format!("{}/Models/{model_number}/", self.base())
    }

    /// Resolve `href` against the catalog base, dropping any query string.
    /// Site-rooted hrefs land under the base path, so a catalog mirrored at
    /// `http://host/mirror/` keeps its prefix. Hrefs that cannot be resolved
    /// are returned unchanged.
    pub fn absolute(&self, href: &str) -> String {
        let href = href.trim();
        let href = match href.strip_prefix('/') {
            Some(rest) if !rest.starts_with('/') && !href.starts_with(self.base.path()) => rest,
            _ => href,
        };
        match self.base.join(href) {
            Ok(url) => strip_query(url.as_str()).to_string(),
            Err(_) => strip_query(href).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_listing_url() {
        let urls = CatalogUrls::new(DEFAULT_BASE_URL).unwrap();
        assert_eq!(
            urls.model_listing(ApplianceType::Refrigerator, 1),
            "https://www.partselect.com/Refrigerator-Models.htm?start=1"
        );
        assert_eq!(
            urls.model_listing(ApplianceType::Dishwasher, 3),
            "https://www.partselect.com/Dishwasher-Models.htm?start=3"
        );
    }

    #[test]
    fn test_model_parts_url_ignores_trailing_slash_and_query() {
        let urls = CatalogUrls::new(DEFAULT_BASE_URL).unwrap();
        assert_eq!(
            urls.model_parts("https://www.partselect.com/Models/WRS325SDHZ/", 2),
            "https://www.partselect.com/Models/WRS325SDHZ/Parts/?start=2"
        );
        assert_eq!(
            urls.model_parts("https://www.partselect.com/Models/WRS325SDHZ?x=1", 1),
            "https://www.partselect.com/Models/WRS325SDHZ/Parts/?start=1"
        );
    }

    #[test]
    fn test_absolute_strips_query() {
        let urls = CatalogUrls::new("https://catalog.test/").unwrap();
        assert_eq!(
            urls.absolute("/PS11752778-Whirlpool-WPW10321304.htm?SourceCode=18"),
            "https://catalog.test/PS11752778-Whirlpool-WPW10321304.htm"
        );
        assert_eq!(
            urls.absolute("https://other.test/PS1.htm"),
            "https://other.test/PS1.htm"
        );
    }

    #[test]
    fn test_absolute_keeps_base_path_prefix() {
        let urls = CatalogUrls::new("http://host/mirror").unwrap();
        assert_eq!(urls.absolute("/PS1.htm"), "http://host/mirror/PS1.htm");
        assert_eq!(urls.absolute("PS2.htm"), "http://host/mirror/PS2.htm");
        assert_eq!(
            urls.absolute("/mirror/Models/M1/"),
            "http://host/mirror/Models/M1/"
        );
        assert_eq!(urls.absolute("//cdn.test/PS3.htm"), "http://cdn.test/PS3.htm");
        assert_eq!(urls.model_url("M1"), "http://host/mirror/Models/M1/");
    }

    #[test]
    fn test_base_is_normalised() {
        let urls = CatalogUrls::new("http://localhost:8080/").unwrap();
        assert_eq!(urls.base(), "http://localhost:8080");
        assert_eq!(urls.model_url("ABC1"), "http://localhost:8080/Models/ABC1/");
    }

    #[test]
    fn test_invalid_base_rejected() {
        assert!(matches!(
            CatalogUrls::new("not a url"),
            Err(AppError::ConfigError(_))
        ));
        assert!(CatalogUrls::new("ftp://catalog.test").is_err());
    }
}
