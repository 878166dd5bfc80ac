//! Selection types built up while the user customizes a base recommendation.
//!
//! Wire names are camelCase to match the generation and persistence services.

use serde::{Deserialize, Serialize};

/// Most extra scents a blend may carry.
pub const MAX_EXTRA_SCENTS: usize = 2;
/// Smallest ratio an extra scent may hold.
pub const MIN_SCENT_RATIO: u32 = 5;
/// Largest ratio an extra scent may hold.
pub const MAX_SCENT_RATIO: u32 = 50;
/// Ceiling for the ratio suggested when a scent is first added.
pub const DEFAULT_RATIO_CEILING: u32 = 30;
/// Allocations move in steps of this many percent.
pub const RATIO_STEP: u32 = 5;
/// Longest accepted free-text guidance, in characters.
pub const MAX_FREE_TEXT_CHARS: usize = 500;

/// An additional scent layered on top of the retained base recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraScent {
    /// Scent catalog id
    pub id: String,
    pub name: String,
    /// Share of the blend in percent
    pub ratio: u32,
}

/// A scent the user picked but that has no ratio yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScentCandidate {
    pub id: String,
    pub name: String,
}

impl ScentCandidate {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The in-progress customization of one base recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSelection {
    pub base_recipe_id: String,
    pub base_recipe_name: String,
    /// Percentage of the base recommendation kept in the blend
    pub retention_percentage: u32,
    #[serde(default)]
    pub extra_scents: Vec<ExtraScent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_text: Option<String>,
}

impl FeedbackSelection {
    /// A fresh selection that keeps the whole base recommendation.
    pub fn new(base_recipe_id: impl Into<String>, base_recipe_name: impl Into<String>) -> Self {
        Self {
            base_recipe_id: base_recipe_id.into(),
            base_recipe_name: base_recipe_name.into(),
            retention_percentage: 100,
            extra_scents: Vec::new(),
            free_text: None,
        }
    }

    /// Sum of all extra scent ratios.
    pub fn extra_total(&self) -> u32 {
        self.extra_scents.iter().map(|s| s.ratio).sum()
    }

    /// Retention plus every extra scent ratio.
    pub fn total(&self) -> u32 {
        self.retention_percentage + self.extra_total()
    }

    pub fn scent(&self, id: &str) -> Option<&ExtraScent> {
        self.extra_scents.iter().find(|s| s.id == id)
    }
}

/// Where the blend stands relative to a 100% total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Allocation {
    Balanced,
    /// `missing` more percent is needed
    Short { missing: u32 },
    /// The blend is `excess` percent over
    Over { excess: u32 },
}

impl Allocation {
    pub fn from_total(total: u32) -> Self {
        match total {
            100 => Allocation::Balanced,
            t if t < 100 => Allocation::Short { missing: 100 - t },
            t => Allocation::Over { excess: t - 100 },
        }
    }

    pub fn is_balanced(&self) -> bool {
        matches!(self, Allocation::Balanced)
    }

    /// `100 - total`: positive for a shortfall, negative for an excess.
    pub fn signed_delta(&self) -> i32 {
        match *self {
            Allocation::Balanced => 0,
            Allocation::Short { missing } => missing as i32,
            Allocation::Over { excess } => -(excess as i32),
        }
    }

    /// Directive message for the user, `None` when balanced.
    pub fn message(&self) -> Option<String> {
        match self {
            Allocation::Balanced => None,
            Allocation::Short { missing } => Some(format!("need {}% more", missing)),
            Allocation::Over { excess } => Some(format!("{}% over", excess)),
        }
    }
}

/// Inclusive ratio range a scent may take right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RatioBounds {
    pub min: u32,
    pub max: u32,
}

impl RatioBounds {
    pub fn clamp(&self, value: i64) -> u32 {
        value.clamp(self.min as i64, self.max as i64) as u32
    }
}
