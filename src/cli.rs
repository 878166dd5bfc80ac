//! Command-line surface over the library.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::allocator::{check_catalog, FeedbackSelection, RatioAllocator, ScentCandidate};
use crate::catalog::{all_containers, default_catalog, load_catalog, ContainerKind, ScentCatalog};
use crate::config::{optional_api_key, resolve_api_key, store_api_key, AppConfig};
use crate::error::GenerationError;
use crate::history::SqliteFeedbackStore;
use crate::identity::{device_fingerprint, SharedIdentity};
use crate::recipe::{
    BaseRecipe, EndpointGenerator, GeneratedRecipe, GenerationRequest, GenerationResponse,
    LlmGenerator, RecipeGenerator, RecipeRequestBuilder,
};
use crate::session::{ConfirmOutcome, FeedbackSession};
use crate::volume::{compute_amounts, total_ml};

#[derive(Parser, Debug)]
#[command(name = "scentmix")]
#[command(about = "Customize a recommended fragrance blend and scale it to a container")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to <config_dir>/scentmix/config.toml)
    #[arg(long, global = true, env = "SCENTMIX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Scent catalog TOML replacing the built-in one
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List container formats
    Containers,

    /// List or search the scent catalog
    Scents {
        /// Case-insensitive match on id or name
        query: Option<String>,
    },

    /// Scale a recipe JSON file to a container
    Amounts {
        #[arg(long)]
        recipe: PathBuf,
        #[arg(long)]
        container: ContainerKind,
    },

    /// Build recipe variants from a selection and optionally confirm one
    Blend {
        /// FeedbackSelection JSON file
        #[arg(long)]
        selection: PathBuf,
        /// Base recipe JSON file
        #[arg(long)]
        base: PathBuf,
        /// Container to scale the chosen variant to
        #[arg(long)]
        container: Option<ContainerKind>,
        /// Variant slot to use (0 = direct, 1 = generated)
        #[arg(long)]
        variant: Option<usize>,
        /// Skip generation and offer only the direct recipe
        #[arg(long)]
        offline: bool,
        /// Save the chosen variant as confirmed
        #[arg(long, requires = "container")]
        confirm: bool,
        /// Signed-in user id for confirmation
        #[arg(long, env = "SCENTMIX_USER")]
        user: Option<String>,
        /// Id of the recommendation result being customized
        #[arg(long)]
        result_id: Option<String>,
    },

    /// Show confirmed recipes, newest first
    History {
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show feedback submitted for a base recipe, newest first
    Feedback {
        /// Id of the base recipe
        base_recipe_id: String,
    },

    /// Store a provider API key in the OS keychain
    SetKey { provider: String, key: String },
}

/// Generator used with `--offline`. Always fails so the direct recipe is offered.
struct OfflineGenerator;

#[async_trait]
impl RecipeGenerator for OfflineGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<GenerationResponse, GenerationError> {
        Err(GenerationError::Transport("offline mode".to_string()))
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_default()?,
    };
    let catalog = Arc::new(match &cli.catalog {
        Some(path) => load_catalog(path)?,
        None => default_catalog(),
    });

    match cli.command {
        Command::Containers => {
            for c in all_containers() {
                println!(
                    "{:<14} {:<14} total {:>5.1} ml, fragrance {:>5.1} ml",
                    c.id, c.label, c.total_volume_ml, c.fragrance_volume_ml
                );
            }
        }
        Command::Scents { query } => {
            let hits = match query.as_deref() {
                Some(q) => catalog.search(q),
                None => catalog.search(""),
            };
            for (id, note) in hits {
                let families: Vec<String> = note
                    .profile
                    .iter()
                    .map(|(cat, score)| format!("{} {}", cat, score))
                    .collect();
                println!("{:<14} {:<16} {:?}  {}", id, note.name, note.intensity, families.join(", "));
            }
        }
        Command::Amounts { recipe, container } => {
            let recipe: GeneratedRecipe = read_json(&recipe)?;
            let amounts = compute_amounts(&recipe, container.spec());
            println!("{}", serde_json::to_string_pretty(&amounts)?);
            println!("Total: {:.2} ml", total_ml(&amounts));
        }
        Command::Blend {
            selection,
            base,
            container,
            variant,
            offline,
            confirm,
            user,
            result_id,
        } => {
            let selection: FeedbackSelection = read_json(&selection)?;
            let base: BaseRecipe = read_json(&base)?;
            let builder = recipe_builder(&config, catalog, offline)?;
            let store = SqliteFeedbackStore::open(&config.db_path())?;
            let identity = match user {
                Some(u) => SharedIdentity::signed_in(device_fingerprint(), u),
                None => SharedIdentity::anonymous(device_fingerprint()),
            };

            let mut session = FeedbackSession::new(base, result_id);
            apply_selection(session.allocator_mut()?, &selection, builder.catalog())?;

            let pair = session.submit(&builder, &store, &identity).await?;
            println!("{}", serde_json::to_string_pretty(pair)?);
            let default_slot = if pair.degraded { 0 } else { 1 };
            for warning in session.warnings() {
                eprintln!("warning: {}", warning);
            }

            if let Some(kind) = container {
                session.select_variant(variant.unwrap_or(default_slot))?;
                session.select_container(kind)?;
                if let Some(amounts) = session.amounts() {
                    println!("{}", serde_json::to_string_pretty(&amounts)?);
                }

                if confirm {
                    match session.confirm(&store, &identity).await? {
                        ConfirmOutcome::Saved { id } => println!("Saved confirmed recipe {}", id),
                        ConfirmOutcome::Deferred => {
                            println!("Not signed in; pass --user to save the confirmed recipe")
                        }
                        ConfirmOutcome::Abandoned => println!("Session abandoned; nothing saved"),
                    }
                }
            }
        }
        Command::History { limit } => {
            let store = SqliteFeedbackStore::open(&config.db_path())?;
            for entry in store.list_confirmed(limit).await? {
                println!(
                    "#{:<4} {}  {:<24} {:<13} {:<9} {}",
                    entry.id,
                    entry.created_at,
                    entry.base_recipe_name,
                    entry.container_type,
                    entry.origin,
                    entry.user_id
                );
            }
        }
        Command::Feedback { base_recipe_id } => {
            let store = SqliteFeedbackStore::open(&config.db_path())?;
            for entry in store.list_feedback(&base_recipe_id).await? {
                println!(
                    "#{:<4} {}  {:<24} kept {:>3}%",
                    entry.id, entry.created_at, entry.base_recipe_name, entry.retention_percentage
                );
            }
        }
        Command::SetKey { provider, key } => {
            store_api_key(&provider, &key)?;
            println!("Stored API key for {}", provider);
        }
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Build the recipe builder the config asks for.
pub fn recipe_builder(
    config: &AppConfig,
    catalog: Arc<ScentCatalog>,
    offline: bool,
) -> Result<RecipeRequestBuilder> {
    let gen = &config.generation;
    let generator: Arc<dyn RecipeGenerator> = if offline {
        Arc::new(OfflineGenerator)
    } else if let Some(url) = &gen.endpoint {
        Arc::new(EndpointGenerator::new(
            url.clone(),
            optional_api_key(&gen.provider)?,
            gen.timeout_secs,
        )?)
    } else {
        let key = resolve_api_key(&gen.provider)?;
        Arc::new(LlmGenerator::new(
            gen.provider.clone(),
            gen.model.clone(),
            key,
            gen.timeout_secs,
            catalog.clone(),
        )?)
    };
    info!("Recipe generation: {}", if offline { "offline" } else { gen.provider.as_str() });

    Ok(RecipeRequestBuilder::new(generator, catalog)
        .with_fallback(offline || gen.fallback_to_direct)
        .with_context_name(gen.context_name.clone()))
}

/// Replay a stored selection through the allocator so every edit rule applies.
pub fn apply_selection(
    allocator: &mut RatioAllocator,
    selection: &FeedbackSelection,
    catalog: &ScentCatalog,
) -> Result<()> {
    allocator.set_retention(i64::from(selection.retention_percentage));
    for scent in &selection.extra_scents {
        allocator.add_scent(ScentCandidate::new(scent.id.clone(), scent.name.clone()))?;
        allocator.update_scent_ratio(&scent.id, i64::from(scent.ratio))?;
    }
    allocator.set_free_text(selection.free_text.clone())?;
    allocator.validate()?;
    check_catalog(allocator.selection(), catalog)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::ExtraScent;

    fn selection(retention: u32, extras: &[(&str, u32)]) -> FeedbackSelection {
        let mut s = FeedbackSelection::new("rec-1", "Morning Citrus");
        s.retention_percentage = retention;
        s.extra_scents = extras
            .iter()
            .map(|(id, ratio)| ExtraScent {
                id: id.to_string(),
                name: id.to_string(),
                ratio: *ratio,
            })
            .collect();
        s
    }

    #[test]
    fn test_apply_selection_replays_edits() {
        let mut allocator = RatioAllocator::for_base("rec-1", "Morning Citrus");
        apply_selection(
            &mut allocator,
            &selection(60, &[("vetiver", 25), ("amber", 15)]),
            &default_catalog(),
        )
        .unwrap();

        let applied = allocator.selection();
        assert_eq!(applied.retention_percentage, 60);
        assert_eq!(applied.extra_scents[0].ratio, 25);
        assert_eq!(applied.extra_scents[1].ratio, 15);
        assert!(allocator.is_submittable().is_ok());
    }

    #[test]
    fn test_apply_selection_rejects_three_scents() {
        let mut allocator = RatioAllocator::for_base("rec-1", "Morning Citrus");
        let result = apply_selection(
            &mut allocator,
            &selection(40, &[("rose", 20), ("lemon", 20), ("amber", 20)]),
            &default_catalog(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_selection_rejects_scent_outside_catalog() {
        let mut allocator = RatioAllocator::for_base("rec-1", "Morning Citrus");
        let err = apply_selection(
            &mut allocator,
            &selection(70, &[("no-such-scent", 30)]),
            &default_catalog(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not in the scent catalog"));
    }

    #[test]
    fn test_parse_blend_command() {
        let cli = Cli::try_parse_from([
            "scentmix",
            "blend",
            "--selection",
            "sel.json",
            "--base",
            "base.json",
            "--container",
            "full-perfume",
            "--offline",
        ])
        .unwrap();
        match cli.command {
            Command::Blend {
                container, offline, ..
            } => {
                assert_eq!(container, Some(ContainerKind::FullPerfume));
                assert!(offline);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_confirm_requires_container() {
        let result = Cli::try_parse_from([
            "scentmix",
            "blend",
            "--selection",
            "sel.json",
            "--base",
            "base.json",
            "--confirm",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_feedback_command() {
        let cli = Cli::try_parse_from(["scentmix", "feedback", "rec-42"]).unwrap();
        match cli.command {
            Command::Feedback { base_recipe_id } => assert_eq!(base_recipe_id, "rec-42"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_container_rejected() {
        let result = Cli::try_parse_from([
            "scentmix", "amounts", "--recipe", "r.json", "--container", "bathtub",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_offline_builder_offers_direct_only() {
        let builder = recipe_builder(&AppConfig::default(), Arc::new(default_catalog()), true).unwrap();
        let base = BaseRecipe {
            id: "rec-1".to_string(),
            name: "Morning Citrus".to_string(),
            category_scores: [("citrus".to_string(), 8)].into_iter().collect(),
            primary_category: "citrus".to_string(),
            components: vec![],
        };
        let pair = builder
            .build(&selection(70, &[("cedarwood", 30)]), &base)
            .await
            .unwrap();
        assert!(pair.degraded);
    }
}
