//! Recipe variants: the locally computed direct recipe, the externally
//! generated one, and the builder that produces both for a submission.

pub mod builder;
pub mod direct;
pub mod generator;
pub mod prompts;
mod types;

pub use builder::{normalize_generated, RecipeRequestBuilder};
pub use direct::build_direct_recipe;
pub use generator::{EndpointGenerator, LlmGenerator, RecipeGenerator};
pub use types::*;
