//! Ratio bookkeeping for the retention slider and extra-scent allocations.
//!
//! Every bound is computed on demand from the current selection. Nothing is
//! rebalanced behind the user's back: removing or shrinking one scent leaves
//! the others exactly where they were.

use tracing::debug;

use crate::catalog::ScentCatalog;
use crate::error::ValidationError;

use super::types::*;

/// Owns one in-progress `FeedbackSelection` and enforces its edit rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatioAllocator {
    selection: FeedbackSelection,
}

impl RatioAllocator {
    pub fn new(selection: FeedbackSelection) -> Self {
        Self { selection }
    }

    /// Start from a base recommendation with full retention and no extras.
    pub fn for_base(base_recipe_id: impl Into<String>, base_recipe_name: impl Into<String>) -> Self {
        Self::new(FeedbackSelection::new(base_recipe_id, base_recipe_name))
    }

    pub fn selection(&self) -> &FeedbackSelection {
        &self.selection
    }

    pub fn into_selection(self) -> FeedbackSelection {
        self.selection
    }

    /// Set the retained share of the base recommendation, clamped to 0-100.
    pub fn set_retention(&mut self, value: i64) -> u32 {
        let clamped = value.clamp(0, 100) as u32;
        self.selection.retention_percentage = clamped;
        clamped
    }

    /// Add a scent with a suggested ratio.
    ///
    /// The suggestion is half of what is left, floored to a multiple of 5 and
    /// kept within 5-30. Returns the ratio the scent was added with.
    pub fn add_scent(&mut self, candidate: ScentCandidate) -> Result<u32, ValidationError> {
        if self.selection.extra_scents.len() >= MAX_EXTRA_SCENTS {
            return Err(ValidationError::MaxScentsReached {
                max: MAX_EXTRA_SCENTS,
            });
        }
        if self.selection.scent(&candidate.id).is_some() {
            return Err(ValidationError::DuplicateScent { id: candidate.id });
        }

        let ratio = default_ratio(
            self.selection.retention_percentage,
            self.selection.extra_total(),
        );
        debug!("Adding scent '{}' at {}%", candidate.id, ratio);

        self.selection.extra_scents.push(ExtraScent {
            id: candidate.id,
            name: candidate.name,
            ratio,
        });
        Ok(ratio)
    }

    /// Remove a scent. Other allocations are left untouched.
    pub fn remove_scent(&mut self, id: &str) -> Option<ExtraScent> {
        let index = self.selection.extra_scents.iter().position(|s| s.id == id)?;
        Some(self.selection.extra_scents.remove(index))
    }

    /// Range the given scent may be set to right now.
    ///
    /// The ceiling is what remains after retention and every other scent,
    /// capped at 50. When that drops below 5 the floor of 5 wins.
    pub fn bounds(&self, id: &str) -> Result<RatioBounds, ValidationError> {
        if self.selection.scent(id).is_none() {
            return Err(ValidationError::UnknownScent { id: id.to_string() });
        }
        Ok(ratio_bounds(&self.selection, id))
    }

    /// Set a scent's ratio, clamped to the bounds at call time.
    pub fn update_scent_ratio(&mut self, id: &str, value: i64) -> Result<u32, ValidationError> {
        let bounds = self.bounds(id)?;
        let ratio = bounds.clamp(value);

        if let Some(scent) = self.selection.extra_scents.iter_mut().find(|s| s.id == id) {
            scent.ratio = ratio;
        }
        Ok(ratio)
    }

    pub fn set_free_text(&mut self, text: Option<String>) -> Result<(), ValidationError> {
        let text = text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if let Some(ref t) = text {
            let len = t.chars().count();
            if len > MAX_FREE_TEXT_CHARS {
                return Err(ValidationError::FreeTextTooLong {
                    len,
                    max: MAX_FREE_TEXT_CHARS,
                });
            }
        }
        self.selection.free_text = text;
        Ok(())
    }

    pub fn allocation(&self) -> Allocation {
        Allocation::from_total(self.selection.total())
    }

    /// `Ok` when retention plus extras is exactly 100, otherwise the exact gap.
    pub fn is_submittable(&self) -> Result<(), ValidationError> {
        check_sum(&self.selection)
    }

    /// Every rule a selection must satisfy before it can be submitted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_selection(&self.selection)
    }
}

/// Suggested ratio for a scent added after `existing_total` is already allocated.
pub fn default_ratio(retention: u32, existing_total: u32) -> u32 {
    let remainder = 100 - retention as i64 - existing_total as i64;
    floor_to_step(remainder.div_euclid(2)).clamp(MIN_SCENT_RATIO as i64, DEFAULT_RATIO_CEILING as i64)
        as u32
}

fn floor_to_step(value: i64) -> i64 {
    value.div_euclid(RATIO_STEP as i64) * RATIO_STEP as i64
}

/// Bounds for `id` given the rest of the selection.
pub fn ratio_bounds(selection: &FeedbackSelection, id: &str) -> RatioBounds {
    let other_sum: i64 = selection
        .extra_scents
        .iter()
        .filter(|s| s.id != id)
        .map(|s| s.ratio as i64)
        .sum();
    let ceiling = (100 - selection.retention_percentage as i64 - other_sum)
        .min(MAX_SCENT_RATIO as i64)
        .max(MIN_SCENT_RATIO as i64);

    RatioBounds {
        min: MIN_SCENT_RATIO,
        max: ceiling as u32,
    }
}

fn check_sum(selection: &FeedbackSelection) -> Result<(), ValidationError> {
    match Allocation::from_total(selection.total()) {
        Allocation::Balanced => Ok(()),
        other => Err(ValidationError::RatioSumMismatch {
            sum: selection.total(),
            delta: other.signed_delta(),
        }),
    }
}

/// Full pre-submission check of a selection, however it was built.
pub fn validate_selection(selection: &FeedbackSelection) -> Result<(), ValidationError> {
    let retention = selection.retention_percentage;
    if retention > 100 || retention % RATIO_STEP != 0 {
        return Err(ValidationError::RetentionOutOfStep { value: retention });
    }

    if selection.extra_scents.len() > MAX_EXTRA_SCENTS {
        return Err(ValidationError::MaxScentsReached {
            max: MAX_EXTRA_SCENTS,
        });
    }

    for (i, scent) in selection.extra_scents.iter().enumerate() {
        if selection.extra_scents[..i].iter().any(|s| s.id == scent.id) {
            return Err(ValidationError::DuplicateScent {
                id: scent.id.clone(),
            });
        }
        if scent.ratio < MIN_SCENT_RATIO
            || scent.ratio > MAX_SCENT_RATIO
            || scent.ratio % RATIO_STEP != 0
        {
            return Err(ValidationError::RatioOutOfRange {
                id: scent.id.clone(),
                ratio: scent.ratio,
                min: MIN_SCENT_RATIO,
                max: MAX_SCENT_RATIO,
            });
        }
    }

    if let Some(ref text) = selection.free_text {
        let len = text.chars().count();
        if len > MAX_FREE_TEXT_CHARS {
            return Err(ValidationError::FreeTextTooLong {
                len,
                max: MAX_FREE_TEXT_CHARS,
            });
        }
    }

    check_sum(selection)
}

/// Every extra scent must name a catalog entry.
pub fn check_catalog(selection: &FeedbackSelection, catalog: &ScentCatalog) -> Result<(), ValidationError> {
    match selection.extra_scents.iter().find(|s| !catalog.contains(&s.id)) {
        Some(unknown) => Err(ValidationError::NotInCatalog {
            id: unknown.id.clone(),
        }),
        None => Ok(()),
    }
}
