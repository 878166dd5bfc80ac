//! The "direct" recipe: a deterministic local transformation of the selection.
//!
//! The retained percentage is spread over the base recipe's own components in
//! proportion to their original ratios, and every extra scent becomes one
//! component at its chosen ratio. Units equal ratios under a 100-unit total.

use tracing::debug;

use crate::allocator::FeedbackSelection;
use crate::balance::{changes_against, selection_scores};
use crate::catalog::ScentCatalog;

use super::types::*;

const TESTING_STEPS: [&str; 4] = [
    "Measure each component into a clean glass vial in the order listed.",
    "Cap the vial and swirl gently for 30 seconds.",
    "Let the blend rest for 48 hours before judging it.",
    "Test on a blotter strip first, then on skin.",
];

const CLOSING_MESSAGE: &str =
    "Your blend keeps what you liked and adds what you asked for. Enjoy experimenting.";

/// Split `total` whole units across `weights` by largest remainder.
///
/// The result always sums to `total` unless every weight is zero.
/// Ties in the fractional part go to the earlier entry.
pub fn apportion(weights: &[f64], total: u32) -> Vec<u32> {
    let weight_sum: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    if weight_sum <= 0.0 {
        return vec![0; weights.len()];
    }

    let exact: Vec<f64> = weights
        .iter()
        .map(|w| w.max(0.0) * total as f64 / weight_sum)
        .collect();
    let mut units: Vec<u32> = exact.iter().map(|e| e.floor() as u32).collect();

    let assigned: u32 = units.iter().sum();
    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = exact[a] - exact[a].floor();
        let fb = exact[b] - exact[b].floor();
        fb.partial_cmp(&fa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    for &i in order.iter().take(total.saturating_sub(assigned) as usize) {
        units[i] += 1;
    }
    units
}

/// Build the direct variant for a selection.
///
/// The selection is expected to be validated (retention plus extras equal 100).
pub fn build_direct_recipe(
    selection: &FeedbackSelection,
    base: &BaseRecipe,
    catalog: &ScentCatalog,
) -> GeneratedRecipe {
    let base_parts: Vec<BaseComponent> = if base.components.is_empty() {
        vec![BaseComponent {
            id: base.id.clone(),
            name: base.name.clone(),
            ratio: 100.0,
        }]
    } else {
        base.components.clone()
    };

    let weights: Vec<f64> = base_parts.iter().map(|c| c.ratio).collect();
    let retained_units = apportion(&weights, selection.retention_percentage);

    let mut components: Vec<Component> = Vec::new();
    for (part, units) in base_parts.iter().zip(retained_units) {
        if units == 0 {
            continue;
        }
        components.push(Component {
            id: part.id.clone(),
            name: part.name.clone(),
            ratio: units as f64,
            units,
            rationale: format!("Retained from {}", base.name),
        });
    }

    // One component per extra scent, even when it shares an id with a base component.
    for scent in &selection.extra_scents {
        components.push(Component {
            id: scent.id.clone(),
            name: scent.name.clone(),
            ratio: scent.ratio as f64,
            units: scent.ratio,
            rationale: format!("Added at your chosen {}%", scent.ratio),
        });
    }

    let total_units = components.iter().map(|c| c.units).sum();
    let estimated_strength = estimate_strength(&components, catalog);

    let mut recipe = GeneratedRecipe {
        summary: summarize(selection, &base.name),
        components,
        total_units,
        estimated_strength,
        category_changes: Vec::new(),
        testing_steps: TESTING_STEPS.iter().map(|s| s.to_string()).collect(),
        closing_message: CLOSING_MESSAGE.to_string(),
    };
    recipe.category_changes =
        changes_against(&base.category_scores, &selection_scores(selection, catalog, base));

    debug!(
        "Built direct recipe for '{}': {} components, {} units",
        base.name,
        recipe.components.len(),
        recipe.total_units
    );
    recipe
}

/// Ratio-weighted intensity; components outside the catalog count as medium.
fn estimate_strength(components: &[Component], catalog: &ScentCatalog) -> Strength {
    let total: f64 = components.iter().map(|c| c.ratio).sum();
    if total <= 0.0 {
        return Strength::Medium;
    }
    let weighted: f64 = components
        .iter()
        .map(|c| {
            let intensity = catalog
                .get(&c.id)
                .map(|note| note.intensity)
                .unwrap_or(Strength::Medium);
            intensity.weight() * c.ratio
        })
        .sum();
    Strength::from_weight(weighted / total)
}

fn summarize(selection: &FeedbackSelection, base_name: &str) -> String {
    if selection.extra_scents.is_empty() {
        return format!(
            "Keeps {}% of {} unchanged.",
            selection.retention_percentage, base_name
        );
    }
    let extras = selection
        .extra_scents
        .iter()
        .map(|s| format!("{} ({}%)", s.name, s.ratio))
        .collect::<Vec<_>>()
        .join(" and ");
    format!(
        "Keeps {}% of {} and adds {}.",
        selection.retention_percentage, base_name, extras
    )
}
