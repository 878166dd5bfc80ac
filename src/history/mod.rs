pub mod store;
pub mod types;

pub use store::{FeedbackHistory, FeedbackStore, SqliteFeedbackStore};
pub use types::*;
