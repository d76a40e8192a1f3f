use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Appliance category. Its string form is the persistence partition key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplianceType {
    Refrigerator,
    Dishwasher,
}

impl ApplianceType {
    pub const ALL: [ApplianceType; 2] = [ApplianceType::Refrigerator, ApplianceType::Dishwasher];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplianceType::Refrigerator => "Refrigerator",
            ApplianceType::Dishwasher => "Dishwasher",
        }
    }
}

impl fmt::Display for ApplianceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ApplianceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "refrigerator" => Ok(ApplianceType::Refrigerator),
            "dishwasher" => Ok(ApplianceType::Dishwasher),
            _ => Err(format!("Unknown appliance type: {}", s)),
        }
    }
}

/// An appliance model listed in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub model_number: String,
    pub name: String,
    pub brand: Option<String>,
    pub appliance_type: ApplianceType,
    pub source_url: String,
}

/// A fully enriched part, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub part_number: String,
    pub manufacturer_part_number: Option<String>,
    pub name: String,
    pub description: String,
    pub price: Option<f64>,
    pub manufacturer: Option<String>,
    pub appliance_type: ApplianceType,
    pub source_url: String,
}

/// A part as seen on a model's listing page, before enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartStub {
    pub part_number: String,
    pub manufacturer_part_number: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub manufacturer: Option<String>,
    pub appliance_type: ApplianceType,
    /// Absolute URL of the part's detail page, query string stripped.
    pub detail_url: String,
}

impl PartStub {
    pub fn new(
        part_number: impl Into<String>,
        appliance_type: ApplianceType,
        detail_url: impl Into<String>,
    ) -> Self {
        Self {
            part_number: part_number.into(),
            manufacturer_part_number: None,
            name: None,
            description: None,
            price: None,
            manufacturer: None,
            appliance_type,
            detail_url: detail_url.into(),
        }
    }
}

/// Fields read from a part's detail page. Every field is optional;
/// absent or empty values never override the stub.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartDetail {
    pub part_number: Option<String>,
    pub manufacturer_part_number: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub manufacturer: Option<String>,
}

/// Compatibility link between a model and a part.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelPart {
    pub model_number: String,
    pub part_number: String,
}

impl ModelPart {
    pub fn new(model_number: impl Into<String>, part_number: impl Into<String>) -> Self {
        Self {
            model_number: model_number.into(),
            part_number: part_number.into(),
        }
    }
}

/// Row counts for one persisted partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PartitionCounts {
    pub models: i64,
    pub parts: i64,
    pub links: i64,
}

/// Outcome of a partition replace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceSummary {
    pub links_deleted: u64,
    pub parts_deleted: u64,
    pub models_deleted: u64,
    pub models_written: u64,
    pub parts_written: u64,
    pub links_written: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appliance_type_parse_is_case_insensitive() {
        assert_eq!(
            "refrigerator".parse::<ApplianceType>().unwrap(),
            ApplianceType::Refrigerator
        );
        assert_eq!(
            "DishWasher".parse::<ApplianceType>().unwrap(),
            ApplianceType::Dishwasher
        );
        assert!("oven".parse::<ApplianceType>().is_err());
    }

    #[test]
    fn test_appliance_type_partition_key() {
        for appliance in ApplianceType::ALL {
            let parsed: ApplianceType = appliance.as_str().parse().unwrap();
            assert_eq!(parsed, appliance);
        }
        assert_eq!(ApplianceType::Dishwasher.to_string(), "Dishwasher");
    }

    #[test]
    fn test_model_part_ordering_is_by_model_then_part() {
        let mut links = vec![
            ModelPart::new("B", "PS1"),
            ModelPart::new("A", "PS2"),
            ModelPart::new("A", "PS1"),
        ];
        links.sort();
        assert_eq!(links[0], ModelPart::new("A", "PS1"));
        assert_eq!(links[2], ModelPart::new("B", "PS1"));
    }
}
