pub mod allocator;
pub mod balance;
pub mod catalog;
pub mod cli;
pub mod config;
mod error;
pub mod history;
pub mod identity;
pub mod recipe;
pub mod session;
pub mod volume;

pub use error::{ConfigError, FeedbackError, GenerationError, PersistenceError, ValidationError};
pub use history::{FeedbackHistory, FeedbackStore, SqliteFeedbackStore};
pub use session::{ConfirmOutcome, FeedbackSession, SessionState};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
