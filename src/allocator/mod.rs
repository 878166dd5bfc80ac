//! In-progress blend selection: retention of the base recommendation plus up
//! to two extra scents, and the rules that decide when it can be submitted.
//!
//! # Example
//!
//! ```
//! use scentmix::allocator::{RatioAllocator, ScentCandidate, Allocation};
//!
//! let mut alloc = RatioAllocator::for_base("rec-1", "Morning Citrus");
//! alloc.set_retention(60);
//! alloc.add_scent(ScentCandidate::new("vetiver", "Vetiver")).unwrap();
//! alloc.update_scent_ratio("vetiver", 25).unwrap();
//!
//! assert_eq!(alloc.allocation(), Allocation::Short { missing: 15 });
//! ```

mod ratio;
mod types;

pub use ratio::{check_catalog, default_ratio, ratio_bounds, validate_selection, RatioAllocator};
pub use types::*;
