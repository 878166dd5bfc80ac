mod flow;
mod state;

pub use flow::{AbandonHandle, FeedbackSession};
pub use state::{ConfirmOutcome, SessionState, SubmitOutcome, SubmitTicket};
