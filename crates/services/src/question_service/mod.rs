//! The remote Question Service the engine consumes, plus two implementations:
//! an HTTP client and an in-memory question bank.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use practice_core::model::{
    Difficulty, GradedAnswer, PendingAnswer, Question, QuestionId, Session, SessionId,
    SessionMode, SessionSummary, TimedConfig, UnitId, UserId,
};

use crate::error::QuestionServiceError;

mod http;
mod in_memory;

pub use http::{HttpQuestionService, QuestionServiceConfig};
pub use in_memory::{BankQuestion, InMemoryQuestionService};

//
// ─── REQUESTS & RESPONSES ──────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<UnitId>,
    pub mixed: bool,
    pub target_count: u32,
    pub timed: bool,
}

impl StartSessionRequest {
    #[must_use]
    pub fn new(
        user_id: UserId,
        mode: &SessionMode,
        target_count: u32,
        timed: Option<TimedConfig>,
    ) -> Self {
        Self {
            user_id,
            unit_id: mode.unit_id().cloned(),
            mixed: mode.is_mixed(),
            target_count,
            timed: timed.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedSession {
    pub session_id: SessionId,
    pub first_question: Question,
    #[serde(default)]
    pub initial_difficulty: Difficulty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextQuestionRequest {
    pub user_id: UserId,
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<UnitId>,
    pub mixed: bool,
    pub answered_question_ids: Vec<QuestionId>,
    pub current_difficulty: Difficulty,
}

impl NextQuestionRequest {
    /// Request the next question for the session's current history and level.
    #[must_use]
    pub fn for_session(user_id: UserId, session: &Session) -> Self {
        Self {
            user_id,
            session_id: session.id().clone(),
            unit_id: session.mode().unit_id().cloned(),
            mixed: session.mode().is_mixed(),
            answered_question_ids: session.answered_question_ids().to_vec(),
            current_difficulty: session.current_difficulty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub question_id: QuestionId,
    pub selected_option: String,
    pub time_spent_seconds: u32,
}

impl SubmitAnswerRequest {
    #[must_use]
    pub fn new(user_id: UserId, session_id: SessionId, answer: &PendingAnswer) -> Self {
        Self {
            user_id,
            session_id,
            question_id: answer.question_id.clone(),
            selected_option: answer.selected_option.clone(),
            time_spent_seconds: answer.time_spent_seconds,
        }
    }
}

//
// ─── SERVICE CONTRACT ──────────────────────────────────────────────────────────
//

/// Remote collaborator that owns questions, grading and summaries.
#[async_trait]
pub trait QuestionService: Send + Sync {
    /// Allocate a session and return its first question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionServiceError` on transport or service failure.
    async fn start_session(
        &self,
        request: &StartSessionRequest,
    ) -> Result<StartedSession, QuestionServiceError>;

    /// Next question for the given history, or `None` when the pool is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `QuestionServiceError` on transport or service failure.
    async fn next_question(
        &self,
        request: &NextQuestionRequest,
    ) -> Result<Option<Question>, QuestionServiceError>;

    /// Grade an answer. An empty `selected_option` means no answer was given.
    ///
    /// # Errors
    ///
    /// Returns `QuestionServiceError` on transport or service failure.
    async fn submit_answer(
        &self,
        request: &SubmitAnswerRequest,
    ) -> Result<GradedAnswer, QuestionServiceError>;

    /// Close the session and return its summary.
    ///
    /// # Errors
    ///
    /// Returns `QuestionServiceError` on transport or service failure.
    async fn end_session(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionSummary, QuestionServiceError>;
}

/// Bound a service call by `limit`, mapping expiry to `QuestionServiceError::Timeout`.
///
/// # Errors
///
/// Returns the call's own error, or `Timeout` if it did not finish in time.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, QuestionServiceError>
where
    F: Future<Output = Result<T, QuestionServiceError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| QuestionServiceError::Timeout(limit))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use practice_core::controller::DifficultyController;
    use practice_core::time::fixed_now;

    #[test]
    fn start_request_reflects_mode() {
        let unit = StartSessionRequest::new(
            UserId::new("u1"),
            &SessionMode::SingleUnit(UnitId::new("unit-2")),
            10,
            Some(TimedConfig::new(60).unwrap()),
        );
        assert_eq!(unit.unit_id, Some(UnitId::new("unit-2")));
        assert!(!unit.mixed);
        assert!(unit.timed);

        let json = serde_json::to_value(StartSessionRequest::new(
            UserId::new("u1"),
            &SessionMode::Mixed,
            5,
            None,
        ))
        .unwrap();
        assert_eq!(json["mixed"], true);
        assert_eq!(json["targetCount"], 5);
        assert!(json.get("unitId").is_none());
    }

    #[test]
    fn next_request_snapshots_history() {
        let mut session = Session::new(
            SessionId::new("s1"),
            SessionMode::Mixed,
            10,
            None,
            Difficulty::Easy,
            fixed_now(),
        )
        .unwrap();
        session
            .record_answer(QuestionId::new("q1"), true, &DifficultyController::default())
            .unwrap();

        let request = NextQuestionRequest::for_session(UserId::new("u1"), &session);
        assert_eq!(request.answered_question_ids, vec![QuestionId::new("q1")]);
        assert_eq!(request.current_difficulty, Difficulty::Easy);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["answeredQuestionIds"][0], "q1");
        assert_eq!(json["currentDifficulty"], "EASY");
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_maps_expiry_to_timeout() {
        let limit = Duration::from_secs(20);
        let result: Result<(), _> = bounded(limit, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(QuestionServiceError::Timeout(d)) if d == limit));
    }

    #[tokio::test]
    async fn bounded_passes_through_results() {
        let ok = bounded(Duration::from_secs(1), async { Ok::<_, QuestionServiceError>(7) })
            .await
            .unwrap();
        assert_eq!(ok, 7);
    }
}
