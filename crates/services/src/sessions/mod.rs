mod engine;
mod prefetch;
mod progress;
mod store;
mod submission;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use engine::{Advance, PracticeEngine, SubmitOutcome};
pub use prefetch::{PrefetchCoordinator, PrefetchTag};
pub use progress::SessionProgress;
pub use store::{DEFAULT_REQUEST_TIMEOUT, SessionStore};
pub use submission::{
    Countdown, IgnoredReason, QuestionPhase, SubmissionCoordinator, SubmitDecision, resolve_tick,
};
