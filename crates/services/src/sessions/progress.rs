use practice_core::model::{Difficulty, Session};

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub remaining: usize,
    pub difficulty: Difficulty,
    pub is_complete: bool,
}

impl SessionProgress {
    #[must_use]
    pub fn of(session: &Session) -> Self {
        Self {
            total: session.target(),
            answered: session.answered_count(),
            remaining: session.remaining(),
            difficulty: session.current_difficulty(),
            is_complete: session.is_complete(),
        }
    }
}
