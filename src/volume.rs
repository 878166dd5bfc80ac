//! Scale a recipe's percentage composition into measurable amounts.
//!
//! Amounts are always recomputed from the recipe and the container table;
//! nothing here caches or mutates its inputs.

use serde::Serialize;

use crate::catalog::ContainerType;
use crate::recipe::GeneratedRecipe;

/// Grams per millilitre assumed for every scent. There is no per-scent density table.
pub const DEFAULT_DENSITY_G_PER_ML: f64 = 1.0;

/// Allowed gap between the summed amounts and the container's fragrance volume.
pub const VOLUME_TOLERANCE_ML: f64 = 0.01;

/// Measured quantity of one component for a specific container.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentAmount {
    pub id: String,
    pub name: String,
    pub ratio: f64,
    pub amount_ml: f64,
    pub amount_g: f64,
}

/// Per-component amounts filling `container.fragrance_volume_ml`.
///
/// Ratios are normalized by their actual sum, so a recipe whose ratios drift
/// from 100 within rounding tolerance still fills the container exactly.
/// A recipe whose ratios sum to zero yields zero amounts.
pub fn compute_amounts(recipe: &GeneratedRecipe, container: &ContainerType) -> Vec<ComponentAmount> {
    let total_ratio = recipe.ratio_sum();

    recipe
        .components
        .iter()
        .map(|component| {
            let amount_ml = if total_ratio > 0.0 {
                container.fragrance_volume_ml * component.ratio / total_ratio
            } else {
                0.0
            };
            ComponentAmount {
                id: component.id.clone(),
                name: component.name.clone(),
                ratio: component.ratio,
                amount_ml,
                amount_g: amount_ml * DEFAULT_DENSITY_G_PER_ML,
            }
        })
        .collect()
}

pub fn total_ml(amounts: &[ComponentAmount]) -> f64 {
    amounts.iter().map(|a| a.amount_ml).sum()
}

/// True when the amounts fill the container within tolerance.
pub fn fills_container(amounts: &[ComponentAmount], container: &ContainerType) -> bool {
    (total_ml(amounts) - container.fragrance_volume_ml).abs() <= VOLUME_TOLERANCE_ML
}
