use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::models::{ApplianceType, Model, ModelPart, Part};

/// Everything one run collected for a single appliance partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogSnapshot {
    pub appliance_type: ApplianceType,
    pub models: Vec<Model>,
    /// Unique by `part_number`.
    pub parts: Vec<Part>,
    /// Every link references a model in `models` and a part in `parts`.
    pub links: Vec<ModelPart>,
}

impl CatalogSnapshot {
    pub fn empty(appliance_type: ApplianceType) -> Self {
        Self {
            appliance_type,
            models: Vec::new(),
            parts: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Accumulates model results as they complete.
///
/// A part seen under several models is stored once; the last copy absorbed
/// wins, and each model keeps its own link to it.
#[derive(Debug)]
pub struct SnapshotBuilder {
    appliance_type: ApplianceType,
    models: BTreeMap<String, Model>,
    parts: BTreeMap<String, Part>,
    links: BTreeSet<ModelPart>,
}

impl SnapshotBuilder {
    pub fn new(appliance_type: ApplianceType) -> Self {
        Self {
            appliance_type,
            models: BTreeMap::new(),
            parts: BTreeMap::new(),
            links: BTreeSet::new(),
        }
    }

    pub fn add_model(&mut self, model: Model) {
        self.models.insert(model.model_number.clone(), model);
    }

    /// Record the parts crawled for `model_number`.
    pub fn absorb(&mut self, model_number: &str, parts: Vec<Part>) {
        for part in parts {
            self.links
                .insert(ModelPart::new(model_number, part.part_number.clone()));
            self.parts.insert(part.part_number.clone(), part);
        }
    }

    pub fn build(self) -> CatalogSnapshot {
        let links = self
            .links
            .into_iter()
            .filter(|l| self.models.contains_key(&l.model_number))
            .collect();
        CatalogSnapshot {
            appliance_type: self.appliance_type,
            models: self.models.into_values().collect(),
            parts: self.parts.into_values().collect(),
            links,
        }
    }
}
