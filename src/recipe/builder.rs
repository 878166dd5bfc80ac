//! Turns a validated selection into the two recipe slots offered for review.
//!
//! The direct recipe is always computed locally. The generated recipe comes
//! from one call to the external generator; there is no retry. When that call
//! fails and fallback is enabled, both slots carry the direct recipe.

use std::sync::Arc;

use tracing::{info, warn};

use crate::allocator::{check_catalog, validate_selection, FeedbackSelection};
use crate::balance::resolve_changes;
use crate::catalog::ScentCatalog;
use crate::error::{FeedbackError, GenerationError};

use super::direct::{apportion, build_direct_recipe};
use super::generator::RecipeGenerator;
use super::types::*;

pub struct RecipeRequestBuilder {
    generator: Arc<dyn RecipeGenerator>,
    catalog: Arc<ScentCatalog>,
    fallback_to_direct: bool,
    context_name: Option<String>,
}

impl RecipeRequestBuilder {
    pub fn new(generator: Arc<dyn RecipeGenerator>, catalog: Arc<ScentCatalog>) -> Self {
        Self {
            generator,
            catalog,
            fallback_to_direct: true,
            context_name: None,
        }
    }

    /// Whether a failed generation degrades to two direct slots (default) or fails the submission.
    pub fn with_fallback(mut self, fallback_to_direct: bool) -> Self {
        self.fallback_to_direct = fallback_to_direct;
        self
    }

    pub fn with_context_name(mut self, context_name: Option<String>) -> Self {
        self.context_name = context_name;
        self
    }

    pub fn catalog(&self) -> &ScentCatalog {
        &self.catalog
    }

    pub fn request_for(&self, selection: &FeedbackSelection, base: &BaseRecipe) -> GenerationRequest {
        GenerationRequest {
            selection: selection.clone(),
            base_recipe: BaseRecipeSummary::from(base),
            context_name: self.context_name.clone(),
        }
    }

    /// Validate the selection against the allocation rules and the catalog, compute the direct recipe and request the generated one.
    pub async fn build(
        &self,
        selection: &FeedbackSelection,
        base: &BaseRecipe,
    ) -> Result<VariantPair, FeedbackError> {
        validate_selection(selection)?;
        check_catalog(selection, &self.catalog)?;

        let direct = RecipeVariant {
            kind: VariantKind::Direct,
            recipe: build_direct_recipe(selection, base, &self.catalog),
        };

        let request = self.request_for(selection, base);
        let generated = match self.generator.generate(&request).await {
            Ok(response) => self.accept_response(response, base),
            Err(e) => Err(e),
        };

        match generated {
            Ok(recipe) => {
                info!(
                    "Generated recipe for '{}' with {} components",
                    base.name,
                    recipe.components.len()
                );
                Ok(VariantPair {
                    slots: [
                        direct,
                        RecipeVariant {
                            kind: VariantKind::Generated,
                            recipe,
                        },
                    ],
                    degraded: false,
                })
            }
            Err(e) if self.fallback_to_direct => {
                warn!(
                    "Recipe generation failed for '{}', offering the direct recipe in both slots: {}",
                    base.name, e
                );
                Ok(VariantPair {
                    slots: [direct.clone(), direct],
                    degraded: true,
                })
            }
            Err(e) => {
                warn!("Recipe generation failed for '{}': {}", base.name, e);
                Err(e.into())
            }
        }
    }

    fn accept_response(
        &self,
        response: GenerationResponse,
        base: &BaseRecipe,
    ) -> Result<GeneratedRecipe, GenerationError> {
        if !response.success {
            return Err(GenerationError::Rejected(
                response
                    .error
                    .unwrap_or_else(|| "no reason given".to_string()),
            ));
        }
        let recipe = response
            .recipe
            .ok_or_else(|| GenerationError::Malformed("success without a recipe".to_string()))?;
        normalize_generated(recipe, base, &self.catalog)
    }
}

/// Fill in what a generator may omit and check the recipe invariants.
///
/// Missing units are derived from the ratios; missing category deltas are
/// synthesized locally. Supplied deltas are kept verbatim.
pub fn normalize_generated(
    mut recipe: GeneratedRecipe,
    base: &BaseRecipe,
    catalog: &ScentCatalog,
) -> Result<GeneratedRecipe, GenerationError> {
    if recipe.components.is_empty() {
        return Err(GenerationError::Malformed("recipe has no components".to_string()));
    }

    if recipe.unit_sum() == 0 {
        let ratios: Vec<f64> = recipe.components.iter().map(|c| c.ratio).collect();
        let units = apportion(&ratios, DEFAULT_TOTAL_UNITS);
        for (component, u) in recipe.components.iter_mut().zip(units) {
            component.units = u;
        }
        recipe.total_units = DEFAULT_TOTAL_UNITS;
    } else if recipe.total_units == 0 {
        recipe.total_units = recipe.unit_sum();
    }

    recipe
        .check_invariants()
        .map_err(GenerationError::Malformed)?;

    recipe.category_changes = resolve_changes(base, &recipe, catalog);
    Ok(recipe)
}
