//! Recipe types shared by the direct and generated variants.
//!
//! These types travel over the wire to and from the generation and
//! persistence services, so they use camelCase field names.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::allocator::FeedbackSelection;
use crate::balance::CategoryChange;

/// Units every recipe is expressed in when the generator does not say otherwise.
pub const DEFAULT_TOTAL_UNITS: u32 = 100;
/// Allowed drift of the ratio sum away from 100 before a recipe is rejected.
pub const RATIO_SUM_TOLERANCE: f64 = 1.0;

/// How strongly a blend projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Light,
    Medium,
    Strong,
}

impl Strength {
    pub fn weight(self) -> f64 {
        match self {
            Strength::Light => 1.0,
            Strength::Medium => 2.0,
            Strength::Strong => 3.0,
        }
    }

    /// Nearest strength for an averaged weight.
    pub fn from_weight(weight: f64) -> Self {
        if weight < 1.5 {
            Strength::Light
        } else if weight < 2.5 {
            Strength::Medium
        } else {
            Strength::Strong
        }
    }
}

/// One ingredient of a finished recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub name: String,
    /// Percentage of the blend (0-100)
    pub ratio: f64,
    /// Whole measuring units; sums to the recipe's `total_units`
    #[serde(default)]
    pub units: u32,
    #[serde(default)]
    pub rationale: String,
}

/// A complete blend recipe, either computed locally or returned by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedRecipe {
    pub components: Vec<Component>,
    #[serde(default)]
    pub total_units: u32,
    pub estimated_strength: Strength,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub category_changes: Vec<CategoryChange>,
    #[serde(default)]
    pub testing_steps: Vec<String>,
    #[serde(default)]
    pub closing_message: String,
}

impl GeneratedRecipe {
    pub fn ratio_sum(&self) -> f64 {
        self.components.iter().map(|c| c.ratio).sum()
    }

    pub fn unit_sum(&self) -> u32 {
        self.components.iter().map(|c| c.units).sum()
    }

    /// Check the ratio and unit invariants.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.components.is_empty() {
            return Err("recipe has no components".to_string());
        }
        if let Some(bad) = self
            .components
            .iter()
            .find(|c| !c.ratio.is_finite() || c.ratio < 0.0 || c.ratio > 100.0)
        {
            return Err(format!("component '{}' has ratio {}", bad.id, bad.ratio));
        }
        let sum = self.ratio_sum();
        if (sum - 100.0).abs() > RATIO_SUM_TOLERANCE {
            return Err(format!("component ratios sum to {:.2}, expected 100", sum));
        }
        if self.unit_sum() != self.total_units {
            return Err(format!(
                "component units sum to {}, recipe total is {}",
                self.unit_sum(),
                self.total_units
            ));
        }
        Ok(())
    }
}

/// Which path produced a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantKind {
    /// Computed locally from the selection, no AI involved
    Direct,
    /// Returned by the external generator
    Generated,
}

impl VariantKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VariantKind::Direct => "direct",
            VariantKind::Generated => "generated",
        }
    }
}

/// A recipe tagged with the path that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeVariant {
    pub kind: VariantKind,
    pub recipe: GeneratedRecipe,
}

/// The two recipe slots offered for review after a submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantPair {
    pub slots: [RecipeVariant; 2],
    /// True when this round's generation failed. The second slot then holds the
    /// direct recipe, or the generated recipe of an earlier successful round.
    pub degraded: bool,
}

impl VariantPair {
    pub fn get(&self, index: usize) -> Option<&RecipeVariant> {
        self.slots.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecipeVariant> {
        self.slots.iter()
    }
}

/// An ingredient of the base recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseComponent {
    pub id: String,
    pub name: String,
    pub ratio: f64,
}

/// The AI-generated recommendation the user is customizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseRecipe {
    pub id: String,
    pub name: String,
    pub category_scores: BTreeMap<String, u8>,
    pub primary_category: String,
    #[serde(default)]
    pub components: Vec<BaseComponent>,
}

/// The part of a base recipe sent to the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseRecipeSummary {
    pub id: String,
    pub name: String,
    pub category_scores: BTreeMap<String, u8>,
    pub primary_category: String,
}

impl From<&BaseRecipe> for BaseRecipeSummary {
    fn from(base: &BaseRecipe) -> Self {
        Self {
            id: base.id.clone(),
            name: base.name.clone(),
            category_scores: base.category_scores.clone(),
            primary_category: base.primary_category.clone(),
        }
    }
}

/// Request body for the recipe generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub selection: FeedbackSelection,
    pub base_recipe: BaseRecipeSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_name: Option<String>,
}

/// Response body of the recipe generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub success: bool,
    #[serde(default)]
    pub recipe: Option<GeneratedRecipe>,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(id: &str, ratio: f64, units: u32) -> Component {
        Component {
            id: id.to_string(),
            name: id.to_string(),
            ratio,
            units,
            rationale: String::new(),
        }
    }

    fn recipe(components: Vec<Component>, total_units: u32) -> GeneratedRecipe {
        GeneratedRecipe {
            components,
            total_units,
            estimated_strength: Strength::Medium,
            summary: String::new(),
            category_changes: vec![],
            testing_steps: vec![],
            closing_message: String::new(),
        }
    }

    #[test]
    fn test_invariants_accept_rounding_drift() {
        let r = recipe(
            vec![component("a", 33.4, 33), component("b", 33.3, 33), component("c", 33.0, 34)],
            100,
        );
        assert!(r.check_invariants().is_ok());
    }

    #[test]
    fn test_invariants_reject_bad_sums() {
        let r = recipe(vec![component("a", 60.0, 60), component("b", 30.0, 30)], 90);
        assert!(r.check_invariants().unwrap_err().contains("ratios sum"));

        let r = recipe(vec![component("a", 60.0, 60), component("b", 40.0, 30)], 100);
        assert!(r.check_invariants().unwrap_err().contains("units sum"));

        let r = recipe(vec![], 0);
        assert!(r.check_invariants().is_err());
    }

    #[test]
    fn test_strength_from_weight() {
        assert_eq!(Strength::from_weight(1.2), Strength::Light);
        assert_eq!(Strength::from_weight(2.0), Strength::Medium);
        assert_eq!(Strength::from_weight(2.7), Strength::Strong);
    }

    #[test]
    fn test_generation_response_deserialize() {
        let json = r#"{
            "success": true,
            "recipe": {
                "components": [
                    {"id": "rose", "name": "Rose", "ratio": 70, "units": 70, "rationale": "base"},
                    {"id": "amber", "name": "Amber", "ratio": 30, "units": 30}
                ],
                "totalUnits": 100,
                "estimatedStrength": "strong",
                "summary": "Warmer rose",
                "testingSteps": ["Blend", "Rest 48h"],
                "closingMessage": "Enjoy"
            }
        }"#;
        let response: GenerationResponse = serde_json::from_str(json).unwrap();
        assert!(response.success);
        let recipe = response.recipe.unwrap();
        assert_eq!(recipe.components.len(), 2);
        assert_eq!(recipe.estimated_strength, Strength::Strong);
        assert!(recipe.category_changes.is_empty());
        assert!(recipe.check_invariants().is_ok());
    }

    #[test]
    fn test_request_serializes_summary_only() {
        let base = BaseRecipe {
            id: "rec-1".to_string(),
            name: "Morning Citrus".to_string(),
            category_scores: BTreeMap::from([("citrus".to_string(), 8)]),
            primary_category: "citrus".to_string(),
            components: vec![BaseComponent {
                id: "lemon".to_string(),
                name: "Lemon".to_string(),
                ratio: 100.0,
            }],
        };
        let request = GenerationRequest {
            selection: FeedbackSelection::new("rec-1", "Morning Citrus"),
            base_recipe: BaseRecipeSummary::from(&base),
            context_name: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["baseRecipe"]["primaryCategory"], "citrus");
        assert!(json["baseRecipe"].get("components").is_none());
        assert!(json.get("contextName").is_none());
    }
}
