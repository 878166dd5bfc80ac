//! Prompt and schema for the recipe generation call.

use crate::catalog::ScentCatalog;

use super::types::GenerationRequest;

/// JSON schema for the recipe object the model must return.
/// Matches `GeneratedRecipe` field names.
pub fn recipe_json_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "components": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "name": {"type": "string"},
                        "ratio": {
                            "type": "number",
                            "description": "Percentage of the blend, all ratios sum to 100"
                        },
                        "units": {
                            "type": "integer",
                            "description": "Whole units, equal to ratio when totalUnits is 100"
                        },
                        "rationale": {"type": "string"}
                    },
                    "required": ["id", "name", "ratio", "units", "rationale"],
                    "additionalProperties": false
                }
            },
            "totalUnits": {"type": "integer"},
            "estimatedStrength": {
                "type": "string",
                "enum": ["light", "medium", "strong"]
            },
            "summary": {"type": "string"},
            "categoryChanges": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "category": {"type": "string"},
                        "originalScore": {"type": "integer"},
                        "newScore": {"type": "integer"}
                    },
                    "required": ["category", "originalScore", "newScore"],
                    "additionalProperties": false
                }
            },
            "testingSteps": {"type": "array", "items": {"type": "string"}},
            "closingMessage": {"type": "string"}
        },
        "required": ["components", "totalUnits", "estimatedStrength", "summary",
                     "categoryChanges", "testingSteps", "closingMessage"],
        "additionalProperties": false
    })
}

/// Build the generation prompt from the request and the scent catalog.
pub fn build_recipe_prompt(request: &GenerationRequest, catalog: &ScentCatalog) -> String {
    let selection = &request.selection;
    let base = &request.base_recipe;

    let scores = base
        .category_scores
        .iter()
        .map(|(category, score)| format!("- {}: {}/10", category, score))
        .collect::<Vec<_>>()
        .join("\n");

    let extras = if selection.extra_scents.is_empty() {
        "- (none)".to_string()
    } else {
        selection
            .extra_scents
            .iter()
            .map(|scent| {
                let family = catalog
                    .profile(&scent.id)
                    .and_then(|p| p.iter().max_by_key(|(_, s)| **s))
                    .map(|(category, _)| category.as_str())
                    .unwrap_or("unknown");
                format!("- {} ({}, {}): {}%", scent.name, scent.id, family, scent.ratio)
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let guidance = selection
        .free_text
        .as_deref()
        .unwrap_or("(no additional guidance)");

    let context = request
        .context_name
        .as_deref()
        .map(|name| format!("\nThe blend is for: {}\n", name))
        .unwrap_or_default();

    format!(
        r#"Create a custom fragrance blend recipe.

Base recommendation: {base_name} (primary category: {primary})
Category profile of the base:
{scores}

The user keeps {retention}% of the base recommendation and adds:
{extras}

User guidance:
{guidance}
{context}
Rules:
- Component ratios must sum to exactly 100.
- Use totalUnits = 100 and set each component's units equal to its ratio.
- Keep every added scent at its chosen ratio unless the guidance asks otherwise.
- estimatedStrength is one of: light, medium, strong.
- categoryChanges lists each base category with originalScore (0-10) and newScore (0-10).
- Provide 3-5 short testingSteps and a one-sentence closingMessage.

Respond with a single JSON object only."#,
        base_name = base.name,
        primary = base.primary_category,
        scores = scores,
        retention = selection.retention_percentage,
        extras = extras,
        guidance = guidance,
        context = context,
    )
}
