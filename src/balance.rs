//! Before/after category balance for a recipe.
//!
//! A recipe's category score is the ratio-weighted sum of its parts' category
//! profiles, rounded to the 0-10 scale. The retained share of the base counts
//! at the base's own scores. Deltas supplied by the
//! generator are trusted as-is; local synthesis is the fallback.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::allocator::FeedbackSelection;
use crate::catalog::scents::{CategoryProfile, ScentCatalog, MAX_CATEGORY_SCORE};
use crate::recipe::{BaseRecipe, GeneratedRecipe};

/// Direction a category moved between the original profile and a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increased,
    Decreased,
    Unchanged,
}

/// Score change for one category. `direction` always follows from the scores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawCategoryChange", rename_all = "camelCase")]
pub struct CategoryChange {
    category: String,
    original_score: u8,
    new_score: u8,
    direction: Direction,
}

/// Incoming shape; any `direction` the sender includes is ignored.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCategoryChange {
    category: String,
    original_score: u8,
    new_score: u8,
}

impl From<RawCategoryChange> for CategoryChange {
    fn from(raw: RawCategoryChange) -> Self {
        CategoryChange::new(raw.category, raw.original_score, raw.new_score)
    }
}

impl CategoryChange {
    /// Scores above 10 are clamped onto the scale.
    pub fn new(category: impl Into<String>, original_score: u8, new_score: u8) -> Self {
        let original_score = original_score.min(MAX_CATEGORY_SCORE);
        let new_score = new_score.min(MAX_CATEGORY_SCORE);
        let direction = match new_score.cmp(&original_score) {
            std::cmp::Ordering::Greater => Direction::Increased,
            std::cmp::Ordering::Less => Direction::Decreased,
            std::cmp::Ordering::Equal => Direction::Unchanged,
        };
        Self {
            category: category.into(),
            original_score,
            new_score,
            direction,
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn original_score(&self) -> u8 {
        self.original_score
    }

    pub fn new_score(&self) -> u8 {
        self.new_score
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Signed score difference.
    pub fn delta(&self) -> i16 {
        self.new_score as i16 - self.original_score as i16
    }
}

/// Ratio-weighted scores of a blend made of `base_share` percent of the base
/// plus the listed notes. Notes outside the catalog count as base material.
fn blend_scores<'a>(
    base_share: f64,
    notes: impl IntoIterator<Item = (&'a str, f64)>,
    catalog: &ScentCatalog,
    base_scores: &CategoryProfile,
) -> BTreeMap<String, u8> {
    let mut weighted: BTreeMap<String, f64> = BTreeMap::new();
    for (category, score) in base_scores {
        *weighted.entry(category.clone()).or_default() += *score as f64 * base_share / 100.0;
    }
    for (id, ratio) in notes {
        let profile = catalog.profile(id).unwrap_or(base_scores);
        for (category, score) in profile {
            *weighted.entry(category.clone()).or_default() += *score as f64 * ratio / 100.0;
        }
    }

    weighted
        .into_iter()
        .map(|(category, score)| {
            let rounded = score.round().clamp(0.0, MAX_CATEGORY_SCORE as f64) as u8;
            (category, rounded)
        })
        .collect()
}

/// Whether a recipe component is material carried over from the base blend.
fn is_retained(base: &BaseRecipe, id: &str) -> bool {
    id == base.id || base.components.iter().any(|c| c.id == id)
}

/// Category scores implied by a recipe.
///
/// Components that carry over from the base contribute the base's own scores,
/// even when the catalog also lists them. Other catalog notes contribute their
/// catalog profile.
pub fn implied_scores(
    recipe: &GeneratedRecipe,
    catalog: &ScentCatalog,
    base: &BaseRecipe,
) -> BTreeMap<String, u8> {
    let (retained, added): (Vec<_>, Vec<_>) = recipe
        .components
        .iter()
        .partition(|c| is_retained(base, &c.id));
    let base_share: f64 = retained.iter().map(|c| c.ratio).sum();
    blend_scores(
        base_share,
        added.iter().map(|c| (c.id.as_str(), c.ratio)),
        catalog,
        &base.category_scores,
    )
}

/// Category scores implied by a selection: the retained share at the base's
/// scores plus each extra scent at its catalog profile.
pub fn selection_scores(
    selection: &FeedbackSelection,
    catalog: &ScentCatalog,
    base: &BaseRecipe,
) -> BTreeMap<String, u8> {
    blend_scores(
        f64::from(selection.retention_percentage),
        selection
            .extra_scents
            .iter()
            .map(|s| (s.id.as_str(), f64::from(s.ratio))),
        catalog,
        &base.category_scores,
    )
}

/// One change per category in `original_scores`.
pub fn changes_against(
    original_scores: &CategoryProfile,
    implied: &BTreeMap<String, u8>,
) -> Vec<CategoryChange> {
    original_scores
        .iter()
        .map(|(category, original)| {
            let new_score = implied.get(category).copied().unwrap_or(0);
            CategoryChange::new(category.clone(), *original, new_score)
        })
        .collect()
}

/// One change per base category, computed locally from the recipe.
pub fn synthesize_changes(
    base: &BaseRecipe,
    recipe: &GeneratedRecipe,
    catalog: &ScentCatalog,
) -> Vec<CategoryChange> {
    changes_against(&base.category_scores, &implied_scores(recipe, catalog, base))
}

/// Deltas for a recipe: the generator's own when it supplied any, otherwise synthesized.
pub fn resolve_changes(
    base: &BaseRecipe,
    recipe: &GeneratedRecipe,
    catalog: &ScentCatalog,
) -> Vec<CategoryChange> {
    if !recipe.category_changes.is_empty() {
        return recipe.category_changes.clone();
    }
    debug!(
        "No category deltas supplied, synthesizing for {} categories",
        base.category_scores.len()
    );
    synthesize_changes(base, recipe, catalog)
}
