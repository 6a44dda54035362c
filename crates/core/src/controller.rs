use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Difficulty, Streak};

/// Consecutive correct answers needed to move up one level.
pub const DEFAULT_PROMOTE_AFTER: u32 = 3;

/// Consecutive incorrect answers needed to move down one level.
pub const DEFAULT_DEMOTE_AFTER: u32 = 2;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("promotion threshold must be > 0")]
    InvalidPromoteAfter,
    #[error("demotion threshold must be > 0")]
    InvalidDemoteAfter,
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Difficulty level plus the streak counters that drive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyState {
    pub difficulty: Difficulty,
    pub streak: Streak,
}

impl DifficultyState {
    #[must_use]
    pub fn new(difficulty: Difficulty, streak: Streak) -> Self {
        Self { difficulty, streak }
    }

    /// Fresh state at the given level with empty streaks.
    #[must_use]
    pub fn at(difficulty: Difficulty) -> Self {
        Self::new(difficulty, Streak::default())
    }
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// Predicts the next difficulty from a stream of graded outcomes.
///
/// The prediction is local and advisory: the Question Service grades answers
/// and its difficulty always wins. The controller lets the engine prepare the
/// next question before the grade response arrives.
///
/// Streak counters reset whenever the level changes, so each promotion needs a
/// fresh run of correct answers.
///
/// # Examples
///
/// ```
/// # use practice_core::controller::{DifficultyController, DifficultyState};
/// # use practice_core::model::Difficulty;
/// let controller = DifficultyController::default();
/// let mut state = DifficultyState::at(Difficulty::Easy);
/// for _ in 0..3 {
///     state = controller.next(state, true);
/// }
/// assert_eq!(state.difficulty, Difficulty::Medium);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifficultyController {
    promote_after: u32,
    demote_after: u32,
}

impl DifficultyController {
    /// Build a controller with custom thresholds.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError` if either threshold is zero.
    pub fn new(promote_after: u32, demote_after: u32) -> Result<Self, ControllerError> {
        if promote_after == 0 {
            return Err(ControllerError::InvalidPromoteAfter);
        }
        if demote_after == 0 {
            return Err(ControllerError::InvalidDemoteAfter);
        }
        Ok(Self {
            promote_after,
            demote_after,
        })
    }

    #[must_use]
    pub fn promote_after(&self) -> u32 {
        self.promote_after
    }

    #[must_use]
    pub fn demote_after(&self) -> u32 {
        self.demote_after
    }

    /// Apply one graded outcome. Total and side-effect free.
    #[must_use]
    pub fn next(&self, state: DifficultyState, correct: bool) -> DifficultyState {
        let streak = state.streak.record(correct);

        let moved = if correct && streak.consecutive_correct >= self.promote_after {
            state.difficulty.harder()
        } else if !correct && streak.consecutive_incorrect >= self.demote_after {
            state.difficulty.easier()
        } else {
            None
        };

        match moved {
            Some(difficulty) => DifficultyState::at(difficulty),
            None => DifficultyState::new(state.difficulty, streak),
        }
    }
}

impl Default for DifficultyController {
    fn default() -> Self {
        Self {
            promote_after: DEFAULT_PROMOTE_AFTER,
            demote_after: DEFAULT_DEMOTE_AFTER,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
