use serde::{Deserialize, Serialize};

use crate::allocator::{ExtraScent, FeedbackSelection};
use crate::catalog::ContainerKind;
use crate::error::PersistenceError;
use crate::recipe::{GeneratedRecipe, VariantKind};

/// A recipe the user confirmed for a specific container. The only artifact handed
/// to the store at confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedRecord {
    pub recipe: GeneratedRecipe,
    pub base_recipe_name: String,
    pub container_type: ContainerKind,
    #[serde(rename = "originWeightsource")]
    pub origin: VariantKind,
}

/// Body of the feedback persistence call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSaveRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<String>,
    pub base_recipe_id: String,
    pub base_recipe_name: String,
    pub retention_percentage: u32,
    pub extra_scents: Vec<ExtraScent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_text: Option<String>,
    pub generated_recipe: GeneratedRecipe,
    pub identity_fingerprint: String,
}

impl FeedbackSaveRequest {
    pub fn new(
        selection: &FeedbackSelection,
        recipe: &GeneratedRecipe,
        result_id: Option<String>,
        identity_fingerprint: String,
    ) -> Self {
        Self {
            result_id,
            base_recipe_id: selection.base_recipe_id.clone(),
            base_recipe_name: selection.base_recipe_name.clone(),
            retention_percentage: selection.retention_percentage,
            extra_scents: selection.extra_scents.clone(),
            free_text: selection.free_text.clone(),
            generated_recipe: recipe.clone(),
            identity_fingerprint,
        }
    }
}

/// Body of the confirmed-recipe save call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedSaveRequest {
    #[serde(flatten)]
    pub record: ConfirmedRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<String>,
}

/// Response of either save call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl SaveResponse {
    pub fn into_result(self) -> Result<String, PersistenceError> {
        match (self.success, self.id) {
            (true, Some(id)) => Ok(id),
            (true, None) => Err(PersistenceError::Rejected("saved without an id".to_string())),
            (false, _) => Err(PersistenceError::Rejected(
                self.error.unwrap_or_else(|| "no reason given".to_string()),
            )),
        }
    }
}

/// Summary of a confirmed recipe for list views.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmedSummary {
    pub id: i64,
    pub base_recipe_name: String,
    pub container_type: String,
    pub origin: String,
    pub user_id: String,
    pub created_at: String,
}

/// Full details of a confirmed recipe.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmedDetail {
    pub id: i64,
    pub record: ConfirmedRecord,
    pub result_id: Option<String>,
    pub user_id: String,
    pub created_at: String,
}

/// Summary of a stored feedback submission.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackSummary {
    pub id: i64,
    pub base_recipe_name: String,
    pub retention_percentage: u32,
    pub created_at: String,
}
