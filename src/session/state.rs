use serde::Serialize;

use crate::allocator::FeedbackSelection;

/// Where a feedback session is in the submit, review and confirm lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// The selection can be edited
    Editing,
    /// A submission is in flight under `epoch`
    Submitted { epoch: u64 },
    /// Variants are on offer; the user picks one and a container
    Reviewing,
    /// Confirmed without an identity; the record is held until sign-in
    AwaitingIdentity,
    Confirmed { record_id: String },
    Abandoned,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Editing => "editing",
            SessionState::Submitted { .. } => "submitted",
            SessionState::Reviewing => "reviewing",
            SessionState::AwaitingIdentity => "awaiting identity",
            SessionState::Confirmed { .. } => "confirmed",
            SessionState::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Confirmed { .. } | SessionState::Abandoned)
    }
}

/// Proof of a started submission. Results are applied only while its epoch is current.
#[derive(Debug, Clone)]
pub struct SubmitTicket {
    pub(crate) epoch: u64,
    pub selection: FeedbackSelection,
}

impl SubmitTicket {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// What `complete_submit` did with a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Applied,
    /// The session moved on (abandoned, restarted or resubmitted) before the result arrived
    Discarded,
}

/// Result of confirming a recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Saved { id: String },
    /// No identity yet; the record is kept and saved once one is available
    Deferred,
    /// The session was abandoned while waiting for an identity; nothing was saved
    Abandoned,
}
