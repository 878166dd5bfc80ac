//! External recipe generation.
//!
//! `RecipeGenerator` is the seam to the generative service. Two implementations:
//! - `EndpointGenerator` posts the generation request to a recipe service URL
//! - `LlmGenerator` asks a chat model directly and parses the JSON it returns

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use crate::catalog::ScentCatalog;
use crate::error::GenerationError;

use super::prompts::{build_recipe_prompt, recipe_json_schema};
use super::types::{GeneratedRecipe, GenerationRequest, GenerationResponse};

/// Providers `LlmGenerator` knows how to call.
pub const SUPPORTED_PROVIDERS: [&str; 4] = ["claude", "openai", "kimi", "openrouter"];

const SYSTEM_PROMPT: &str = "You are a perfumer's assistant that writes blend recipes. \
Always respond with valid JSON only, no markdown formatting or code blocks.";

/// Turns a validated selection into a recipe. Called once per submission, never retried.
#[async_trait]
pub trait RecipeGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, GenerationError>;
}

/// Build a reqwest client with the given timeout for generation calls.
fn build_api_client(timeout_secs: u64) -> Result<reqwest::Client, GenerationError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| GenerationError::Transport(format!("Failed to build HTTP client: {}", e)))
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    } else {
        text.to_string()
    }
}

fn send_error(e: reqwest::Error, target: &str, timeout_secs: u64) -> GenerationError {
    let msg = if e.is_timeout() {
        format!("timeout after {}s for '{}'", timeout_secs, target)
    } else {
        format!("request to '{}' failed: {}", target, e)
    };
    error!("Recipe generation {}", msg);
    GenerationError::Transport(msg)
}

/// Check status and extract the body text.
async fn handle_api_response(
    response: reqwest::Response,
    target: &str,
) -> Result<String, GenerationError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        let msg = format!("{} from {} - {}", status, target, truncate(&body, 1024));
        error!("Recipe generation API error: {}", msg);
        return Err(GenerationError::Transport(msg));
    }
    response
        .text()
        .await
        .map_err(|e| GenerationError::Transport(format!("Failed to read body from {}: {}", target, e)))
}

/// Strip markdown code fences from a model response if present.
fn strip_markdown_json(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let after_open = match trimmed.find('\n') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    };
    let cleaned = after_open.trim_end();
    cleaned
        .strip_suffix("```")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| cleaned.to_string())
}

/// Parse the recipe JSON a model produced.
pub fn parse_recipe_text(text: &str) -> Result<GeneratedRecipe, GenerationError> {
    let cleaned = strip_markdown_json(text);
    serde_json::from_str(&cleaned).map_err(|e| {
        let msg = format!(
            "model output is not a recipe: {}. Raw response (first 500 chars): {}",
            e,
            truncate(&cleaned, 500)
        );
        error!("{}", msg);
        GenerationError::Malformed(msg)
    })
}

// =============================================================================
// RECIPE SERVICE ENDPOINT
// =============================================================================

/// Posts `GenerationRequest` JSON to a recipe service and reads back `GenerationResponse`.
pub struct EndpointGenerator {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl EndpointGenerator {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout_secs: u64) -> Result<Self, GenerationError> {
        Ok(Self {
            client: build_api_client(timeout_secs)?,
            url: url.into(),
            api_key,
            timeout_secs,
        })
    }
}

#[async_trait]
impl RecipeGenerator for EndpointGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, GenerationError> {
        info!(
            "Requesting recipe for '{}' from {}",
            request.base_recipe.name, self.url
        );

        let mut call = self.client.post(&self.url).json(request);
        if let Some(ref key) = self.api_key {
            call = call.bearer_auth(key);
        }
        let response = call
            .send()
            .await
            .map_err(|e| send_error(e, &self.url, self.timeout_secs))?;

        let body = handle_api_response(response, &self.url).await?;
        serde_json::from_str(&body).map_err(|e| {
            let msg = format!(
                "response is not a generation result: {}. Body: {}",
                e,
                truncate(&body, 500)
            );
            error!("{}", msg);
            GenerationError::Malformed(msg)
        })
    }
}

// =============================================================================
// DIRECT MODEL CALLS
// =============================================================================

/// Calls a chat model with the recipe prompt.
pub struct LlmGenerator {
    client: reqwest::Client,
    provider: String,
    model: String,
    api_key: String,
    timeout_secs: u64,
    catalog: Arc<ScentCatalog>,
}

impl LlmGenerator {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
        catalog: Arc<ScentCatalog>,
    ) -> Result<Self, GenerationError> {
        let provider = provider.into();
        if !SUPPORTED_PROVIDERS.contains(&provider.as_str()) {
            error!("Unsupported AI provider: '{}'", provider);
            return Err(GenerationError::UnsupportedProvider(provider));
        }
        Ok(Self {
            client: build_api_client(timeout_secs)?,
            provider,
            model: model.into(),
            api_key: api_key.into(),
            timeout_secs,
            catalog,
        })
    }

    /// Anthropic messages API. Schema guidance goes in the prompt.
    async fn call_claude(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 2048,
            "system": SYSTEM_PROMPT,
            "messages": [
                {"role": "user", "content": prompt}
            ]
        });

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, "claude", self.timeout_secs))?;

        let body_text = handle_api_response(response, "claude").await?;

        // { "content": [{"type": "text", "text": "..."}] }
        let resp_json: serde_json::Value = serde_json::from_str(&body_text).map_err(|e| {
            GenerationError::Malformed(format!("Failed to parse Claude API response wrapper: {}", e))
        })?;
        resp_json["content"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| GenerationError::Malformed("No text content in Claude API response".to_string()))
    }

    /// OpenAI-compatible chat completions (openai, kimi, openrouter).
    async fn call_chat_completions(&self, url: &str, prompt: &str) -> Result<String, GenerationError> {
        let response_format = if self.provider == "openai" {
            serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "blend_recipe",
                    "strict": true,
                    "schema": recipe_json_schema()
                }
            })
        } else {
            serde_json::json!({"type": "json_object"})
        };

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 2048,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "response_format": response_format
        });

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, &self.provider, self.timeout_secs))?;

        let body_text = handle_api_response(response, &self.provider).await?;

        // { "choices": [{"message": {"content": "..."}}] }
        let resp_json: serde_json::Value = serde_json::from_str(&body_text).map_err(|e| {
            GenerationError::Malformed(format!(
                "Failed to parse {} API response wrapper: {}",
                self.provider, e
            ))
        })?;
        resp_json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                GenerationError::Malformed(format!("No content in {} API response", self.provider))
            })
    }
}

#[async_trait]
impl RecipeGenerator for LlmGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, GenerationError> {
        let prompt = build_recipe_prompt(request, &self.catalog);

        info!(
            "Generating recipe for '{}' using provider '{}' model '{}'",
            request.base_recipe.name, self.provider, self.model
        );

        let text = match self.provider.as_str() {
            "claude" => self.call_claude(&prompt).await?,
            "openai" => {
                self.call_chat_completions("https://api.openai.com/v1/chat/completions", &prompt)
                    .await?
            }
            "kimi" => {
                self.call_chat_completions("https://api.moonshot.cn/v1/chat/completions", &prompt)
                    .await?
            }
            "openrouter" => {
                self.call_chat_completions("https://openrouter.ai/api/v1/chat/completions", &prompt)
                    .await?
            }
            other => return Err(GenerationError::UnsupportedProvider(other.to_string())),
        };

        let recipe = parse_recipe_text(&text)?;
        Ok(GenerationResponse {
            success: true,
            recipe: Some(recipe),
            error: None,
        })
    }
}
