use thiserror::Error;

/// Local, synchronous rejection of a selection edit. No network call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("At most {max} extra scents can be added")]
    MaxScentsReached { max: usize },

    #[error("Scent '{id}' is already part of the blend")]
    DuplicateScent { id: String },

    #[error("Scent '{id}' is not part of the blend")]
    UnknownScent { id: String },

    #[error("Scent '{id}' is not in the scent catalog")]
    NotInCatalog { id: String },

    #[error("Ratio {ratio}% for '{id}' is outside {min}-{max}% in steps of 5")]
    RatioOutOfRange {
        id: String,
        ratio: u32,
        min: u32,
        max: u32,
    },

    #[error("Retention {value}% must be 0-100 in steps of 5")]
    RetentionOutOfStep { value: u32 },

    /// `delta` is `100 - sum`: positive means a shortfall, negative an excess.
    #[error("Blend totals {sum}%: {}", describe_delta(.delta))]
    RatioSumMismatch { sum: u32, delta: i32 },

    #[error("Free text is {len} characters, limit is {max}")]
    FreeTextTooLong { len: usize, max: usize },
}

fn describe_delta(delta: &i32) -> String {
    if *delta > 0 {
        format!("need {}% more", delta)
    } else {
        format!("{}% over", -delta)
    }
}

/// Failure of the remote recipe generation call.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Unsupported AI provider: '{0}'. Supported: claude, openai, kimi, openrouter")]
    UnsupportedProvider(String),

    #[error("Recipe generation request failed: {0}")]
    Transport(String),

    #[error("Recipe generation was rejected: {0}")]
    Rejected(String),

    #[error("Recipe generation returned a malformed payload: {0}")]
    Malformed(String),
}

/// Failure of a persistence call. Never blocks the user from continuing.
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Store rejected the record: {0}")]
    Rejected(String),

    #[error("Failed to serialize record: {0}")]
    Serialization(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("No API key configured for '{0}'. Set SCENTMIX_API_KEY or store it in the keychain.")]
    MissingApiKey(String),

    #[error("Keychain error: {0}")]
    Keychain(String),
}

/// Crate-level error for building and confirming a custom blend.
#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("No recipe variant selected")]
    NoVariantSelected,

    #[error("There is no recipe variant {0}; pick 0 or 1")]
    VariantOutOfRange(usize),

    #[error("No container type selected")]
    NoContainerSelected,
}

impl From<FeedbackError> for String {
    fn from(err: FeedbackError) -> Self {
        err.to_string()
    }
}
