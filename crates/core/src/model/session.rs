use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::controller::{DifficultyController, DifficultyState};
use crate::model::{Difficulty, QuestionId, SessionId, SnapshotKey, Streak, UnitId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("target question count must be > 0")]
    InvalidTarget,

    #[error("per-question timer must be > 0 seconds")]
    InvalidTimer,

    #[error("answered {answered} questions but target is {target}")]
    AnsweredExceedsTarget { answered: usize, target: u32 },

    #[error("question {0} appears twice in the answer history")]
    DuplicateAnswer(QuestionId),

    #[error("streak counters are both non-zero")]
    InconsistentStreak,

    #[error("session already completed")]
    Completed,

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

//
// ─── MODE & TIMER ──────────────────────────────────────────────────────────────
//

/// Where questions are drawn from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "unitId", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionMode {
    SingleUnit(UnitId),
    Mixed,
}

impl SessionMode {
    #[must_use]
    pub fn unit_id(&self) -> Option<&UnitId> {
        match self {
            SessionMode::SingleUnit(unit_id) => Some(unit_id),
            SessionMode::Mixed => None,
        }
    }

    #[must_use]
    pub fn is_mixed(&self) -> bool {
        matches!(self, SessionMode::Mixed)
    }

    /// Storage key of the resumable snapshot for this mode.
    #[must_use]
    pub fn snapshot_key(&self) -> SnapshotKey {
        match self {
            SessionMode::SingleUnit(unit_id) => SnapshotKey::for_unit(unit_id),
            SessionMode::Mixed => SnapshotKey::mixed(),
        }
    }
}

/// Per-question countdown settings. Absent on a session means untimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawTimedConfig")]
pub struct TimedConfig {
    per_question_seconds: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTimedConfig {
    per_question_seconds: u32,
}

impl TryFrom<RawTimedConfig> for TimedConfig {
    type Error = SessionStateError;

    fn try_from(raw: RawTimedConfig) -> Result<Self, Self::Error> {
        Self::new(raw.per_question_seconds)
    }
}

impl TimedConfig {
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidTimer` for a zero-second timer.
    pub fn new(per_question_seconds: u32) -> Result<Self, SessionStateError> {
        if per_question_seconds == 0 {
            return Err(SessionStateError::InvalidTimer);
        }
        Ok(Self {
            per_question_seconds,
        })
    }

    #[must_use]
    pub fn per_question_seconds(&self) -> u32 {
        self.per_question_seconds
    }
}

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// Result of recording an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Appended; `predicted` is the locally predicted next level.
    Recorded { predicted: Difficulty },
    /// The question was already in the history; nothing changed.
    Duplicate,
}

/// Result of overwriting the predicted level with the server's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Confirmed,
    Corrected {
        predicted: Difficulty,
        authoritative: Difficulty,
    },
}

impl Reconciliation {
    #[must_use]
    pub fn is_corrected(&self) -> bool {
        matches!(self, Reconciliation::Corrected { .. })
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One bounded run of practice questions.
///
/// Invariants upheld by every constructor and mutator:
/// - `target_question_count > 0`
/// - `answered_question_ids.len() <= target_question_count`
/// - no question id appears twice in the history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    mode: SessionMode,
    target_question_count: u32,
    answered_question_ids: Vec<QuestionId>,
    state: DifficultyState,
    timed: Option<TimedConfig>,
    started_at: DateTime<Utc>,
}

impl Session {
    /// Create a fresh session with an empty history.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidTarget` if `target_question_count` is zero.
    pub fn new(
        id: SessionId,
        mode: SessionMode,
        target_question_count: u32,
        timed: Option<TimedConfig>,
        initial_difficulty: Difficulty,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionStateError> {
        Self::from_persisted(
            id,
            mode,
            target_question_count,
            Vec::new(),
            DifficultyState::at(initial_difficulty),
            timed,
            started_at,
        )
    }

    /// Rehydrate a session, validating every invariant.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` if the target is zero, the history is longer
    /// than the target, contains duplicates, or the streak is inconsistent.
    pub fn from_persisted(
        id: SessionId,
        mode: SessionMode,
        target_question_count: u32,
        answered_question_ids: Vec<QuestionId>,
        state: DifficultyState,
        timed: Option<TimedConfig>,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionStateError> {
        if target_question_count == 0 {
            return Err(SessionStateError::InvalidTarget);
        }
        let target = usize::try_from(target_question_count).unwrap_or(usize::MAX);
        if answered_question_ids.len() > target {
            return Err(SessionStateError::AnsweredExceedsTarget {
                answered: answered_question_ids.len(),
                target: target_question_count,
            });
        }
        for (idx, id) in answered_question_ids.iter().enumerate() {
            if answered_question_ids[..idx].contains(id) {
                return Err(SessionStateError::DuplicateAnswer(id.clone()));
            }
        }
        if !state.streak.is_consistent() {
            return Err(SessionStateError::InconsistentStreak);
        }

        Ok(Self {
            id,
            mode,
            target_question_count,
            answered_question_ids,
            state,
            timed,
            started_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub fn mode(&self) -> &SessionMode {
        &self.mode
    }

    #[must_use]
    pub fn target_question_count(&self) -> u32 {
        self.target_question_count
    }

    #[must_use]
    pub fn answered_question_ids(&self) -> &[QuestionId] {
        &self.answered_question_ids
    }

    #[must_use]
    pub fn current_difficulty(&self) -> Difficulty {
        self.state.difficulty
    }

    #[must_use]
    pub fn streak(&self) -> Streak {
        self.state.streak
    }

    #[must_use]
    pub fn difficulty_state(&self) -> DifficultyState {
        self.state
    }

    #[must_use]
    pub fn timed(&self) -> Option<TimedConfig> {
        self.timed
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answered_question_ids.len()
    }

    #[must_use]
    pub fn target(&self) -> usize {
        usize::try_from(self.target_question_count).unwrap_or(usize::MAX)
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.target().saturating_sub(self.answered_count())
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.answered_count() >= self.target()
    }

    #[must_use]
    pub fn has_answered(&self, question_id: &QuestionId) -> bool {
        self.answered_question_ids.contains(question_id)
    }

    /// Append a graded question and apply the local difficulty prediction.
    ///
    /// Recording the same question twice is a no-op so a late duplicate
    /// response cannot double-count progress.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Completed` if the target is already reached.
    pub fn record_answer(
        &mut self,
        question_id: QuestionId,
        correct: bool,
        controller: &DifficultyController,
    ) -> Result<RecordOutcome, SessionStateError> {
        if self.has_answered(&question_id) {
            return Ok(RecordOutcome::Duplicate);
        }
        if self.is_complete() {
            return Err(SessionStateError::Completed);
        }

        self.answered_question_ids.push(question_id);
        self.state = controller.next(self.state, correct);
        Ok(RecordOutcome::Recorded {
            predicted: self.state.difficulty,
        })
    }

    /// Overwrite the predicted level with the server's value.
    ///
    /// Server-supplied streak counters replace the local ones. Without them, a
    /// corrected level starts a fresh streak.
    pub fn reconcile_difficulty(
        &mut self,
        authoritative: Difficulty,
        server_streak: Option<Streak>,
    ) -> Reconciliation {
        let predicted = self.state.difficulty;

        match server_streak {
            Some(streak) if streak.is_consistent() => {
                self.state = DifficultyState::new(authoritative, streak);
            }
            _ if predicted != authoritative => {
                self.state = DifficultyState::at(authoritative);
            }
            _ => {}
        }

        if predicted == authoritative {
            Reconciliation::Confirmed
        } else {
            Reconciliation::Corrected {
                predicted,
                authoritative,
            }
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
