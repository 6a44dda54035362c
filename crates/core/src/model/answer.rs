use serde::{Deserialize, Serialize};

use crate::model::{Difficulty, QuestionId, Streak};

/// What caused a submission to be issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionTrigger {
    /// The learner pressed submit with an option selected.
    Manual,
    /// The per-question countdown reached zero.
    Timeout,
}

/// An answer about to be sent for grading. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAnswer {
    pub question_id: QuestionId,
    /// Empty when the countdown forced the submission.
    pub selected_option: String,
    pub time_spent_seconds: u32,
    pub trigger: SubmissionTrigger,
}

impl PendingAnswer {
    #[must_use]
    pub fn manual(
        question_id: QuestionId,
        selected_option: impl Into<String>,
        time_spent_seconds: u32,
    ) -> Self {
        Self {
            question_id,
            selected_option: selected_option.into(),
            time_spent_seconds,
            trigger: SubmissionTrigger::Manual,
        }
    }

    #[must_use]
    pub fn timed_out(question_id: QuestionId, time_spent_seconds: u32) -> Self {
        Self {
            question_id,
            selected_option: String::new(),
            time_spent_seconds,
            trigger: SubmissionTrigger::Timeout,
        }
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.selected_option.trim().is_empty()
    }
}

/// Grading result returned by the Question Service.
///
/// `difficulty` is authoritative and overwrites the locally predicted level.
/// `streak` is optional; services that track streaks server-side send it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedAnswer {
    pub question_id: QuestionId,
    pub is_correct: bool,
    pub correct_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(alias = "currentDifficulty")]
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streak: Option<Streak>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answered_count: Option<u32>,
}
