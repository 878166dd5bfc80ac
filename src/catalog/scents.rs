//! Fixed scent catalog loaded from TOML.
//!
//! Provides two loading methods:
//! - `default_catalog()` - Loads the catalog compiled into the binary
//! - `load_catalog(path)` - Loads a custom catalog from a file path

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::recipe::Strength;

/// Category profile on the 0-10 scale, keyed by category name.
pub type CategoryProfile = BTreeMap<String, u8>;

/// Highest score a category can carry.
pub const MAX_CATEGORY_SCORE: u8 = 10;

const DEFAULT_CATALOG: &str = include_str!("../../config/scents.toml");

/// A single scent that can be added to a blend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScentNote {
    /// Display name
    pub name: String,
    /// How strongly the scent projects
    pub intensity: Strength,
    /// Category scores; missing categories count as 0
    #[serde(default)]
    pub profile: CategoryProfile,
}

/// Root of the scent catalog file.
#[derive(Debug, Clone, Deserialize)]
pub struct ScentCatalog {
    /// Known categories, in display order
    pub categories: Vec<String>,
    /// Scents keyed by catalog id (e.g., "bergamot")
    pub scents: BTreeMap<String, ScentNote>,
}

impl ScentCatalog {
    pub fn get(&self, id: &str) -> Option<&ScentNote> {
        self.scents.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.scents.contains_key(id)
    }

    /// Category profile for a scent id, if the scent is in the catalog.
    pub fn profile(&self, id: &str) -> Option<&CategoryProfile> {
        self.scents.get(id).map(|note| &note.profile)
    }

    /// Case-insensitive search over ids and names.
    pub fn search(&self, query: &str) -> Vec<(&str, &ScentNote)> {
        let needle = query.trim().to_lowercase();
        self.scents
            .iter()
            .filter(|(id, note)| id.contains(&needle) || note.name.to_lowercase().contains(&needle))
            .map(|(id, note)| (id.as_str(), note))
            .collect()
    }

    /// Reject profiles that reference unknown categories or exceed the score scale.
    fn check(&self) -> Result<()> {
        for (id, note) in &self.scents {
            for (category, score) in &note.profile {
                if !self.categories.contains(category) {
                    bail!("Scent '{}' uses unknown category '{}'", id, category);
                }
                if *score > MAX_CATEGORY_SCORE {
                    bail!(
                        "Scent '{}' scores {} for '{}', max is {}",
                        id,
                        score,
                        category,
                        MAX_CATEGORY_SCORE
                    );
                }
            }
        }
        Ok(())
    }
}

/// Load a scent catalog from a TOML file.
pub fn load_catalog(path: &Path) -> Result<ScentCatalog> {
    let content = std::fs::read_to_string(path)?;
    let catalog: ScentCatalog = toml::from_str(&content)?;
    catalog.check()?;
    Ok(catalog)
}

/// The catalog embedded in the binary.
///
/// # Panics
/// Panics if the embedded TOML is invalid (this would be a build-time bug).
pub fn default_catalog() -> ScentCatalog {
    let catalog: ScentCatalog =
        toml::from_str(DEFAULT_CATALOG).expect("embedded scents.toml must be valid TOML");
    catalog
        .check()
        .expect("embedded scents.toml must use declared categories");
    catalog
}
