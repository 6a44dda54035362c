use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use practice_core::controller::{DifficultyController, DifficultyState};
use practice_core::model::{
    AnswerRecord, Difficulty, GradedAnswer, Question, QuestionId, SessionId, SessionSummary,
    UnitId,
};

use super::{
    NextQuestionRequest, QuestionService, StartSessionRequest, StartedSession,
    SubmitAnswerRequest,
};
use crate::error::QuestionServiceError;

/// A question together with its answer key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankQuestion {
    pub question: Question,
    pub correct_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl BankQuestion {
    #[must_use]
    pub fn new(question: Question, correct_answer: impl Into<String>) -> Self {
        Self {
            question,
            correct_answer: correct_answer.into(),
            explanation: None,
        }
    }

    #[must_use]
    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    fn grades_as_correct(&self, selected: &str) -> bool {
        let selected = selected.trim();
        !selected.is_empty() && selected.eq_ignore_ascii_case(self.correct_answer.trim())
    }
}

struct LocalSession {
    unit_id: Option<UnitId>,
    target: usize,
    state: DifficultyState,
    graded: Vec<(AnswerRecord, GradedAnswer)>,
}

/// Local `QuestionService` backed by a fixed question bank.
///
/// Grades answers itself and tracks the authoritative difficulty with the same
/// controller rules the client uses for prediction. Selection prefers the
/// requested level and falls back to the nearest one.
pub struct InMemoryQuestionService {
    bank: Vec<BankQuestion>,
    controller: DifficultyController,
    sessions: Mutex<HashMap<SessionId, LocalSession>>,
    next_id: AtomicU64,
}

impl InMemoryQuestionService {
    #[must_use]
    pub fn new(bank: Vec<BankQuestion>) -> Self {
        Self {
            bank,
            controller: DifficultyController::default(),
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn with_controller(mut self, controller: DifficultyController) -> Self {
        self.controller = controller;
        self
    }

    /// Load a bank from a JSON array of [`BankQuestion`]s.
    ///
    /// # Errors
    ///
    /// Returns `QuestionServiceError::Decode` if the JSON is not a valid bank.
    pub fn from_json(json: &str) -> Result<Self, QuestionServiceError> {
        let bank: Vec<BankQuestion> =
            serde_json::from_str(json).map_err(|err| QuestionServiceError::Decode(err.to_string()))?;
        Ok(Self::new(bank))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bank.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bank.is_empty()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SessionId, LocalSession>>, QuestionServiceError> {
        self.sessions
            .lock()
            .map_err(|err| QuestionServiceError::Rejected(err.to_string()))
    }

    fn pick(
        &self,
        unit_id: Option<&UnitId>,
        difficulty: Difficulty,
        exclude: &[QuestionId],
    ) -> Option<Question> {
        self.bank
            .iter()
            .map(|entry| &entry.question)
            .filter(|q| unit_id.is_none_or(|unit| q.unit_id.as_ref() == Some(unit)))
            .filter(|q| !exclude.contains(&q.id))
            .min_by_key(|q| q.difficulty.distance(difficulty))
            .cloned()
    }

    fn entry(&self, question_id: &QuestionId) -> Option<&BankQuestion> {
        self.bank.iter().find(|entry| &entry.question.id == question_id)
    }
}

fn unknown_session(session_id: &SessionId) -> QuestionServiceError {
    QuestionServiceError::Rejected(format!("unknown session {session_id}"))
}

#[async_trait]
impl QuestionService for InMemoryQuestionService {
    async fn start_session(
        &self,
        request: &StartSessionRequest,
    ) -> Result<StartedSession, QuestionServiceError> {
        if request.target_count == 0 {
            return Err(QuestionServiceError::Rejected(
                "target count must be > 0".into(),
            ));
        }
        let unit_id = if request.mixed {
            None
        } else {
            request.unit_id.clone()
        };
        let initial_difficulty = Difficulty::Easy;
        let first_question = self
            .pick(unit_id.as_ref(), initial_difficulty, &[])
            .ok_or_else(|| QuestionServiceError::Rejected("no questions available".into()))?;

        let session_id = SessionId::new(format!(
            "local-{}",
            self.next_id.fetch_add(1, Ordering::Relaxed)
        ));
        self.lock()?.insert(
            session_id.clone(),
            LocalSession {
                unit_id,
                target: usize::try_from(request.target_count).unwrap_or(usize::MAX),
                state: DifficultyState::at(initial_difficulty),
                graded: Vec::new(),
            },
        );

        Ok(StartedSession {
            session_id,
            first_question,
            initial_difficulty,
        })
    }

    async fn next_question(
        &self,
        request: &NextQuestionRequest,
    ) -> Result<Option<Question>, QuestionServiceError> {
        let sessions = self.lock()?;
        let session = sessions
            .get(&request.session_id)
            .ok_or_else(|| unknown_session(&request.session_id))?;
        if request.answered_question_ids.len() >= session.target {
            return Ok(None);
        }
        Ok(self.pick(
            session.unit_id.as_ref(),
            request.current_difficulty,
            &request.answered_question_ids,
        ))
    }

    async fn submit_answer(
        &self,
        request: &SubmitAnswerRequest,
    ) -> Result<GradedAnswer, QuestionServiceError> {
        let entry = self.entry(&request.question_id).ok_or_else(|| {
            QuestionServiceError::Rejected(format!("unknown question {}", request.question_id))
        })?;

        let mut sessions = self.lock()?;
        let session = sessions
            .get_mut(&request.session_id)
            .ok_or_else(|| unknown_session(&request.session_id))?;

        // A resubmission returns the original grade without moving the level.
        if let Some((_, graded)) = session
            .graded
            .iter()
            .find(|(_, graded)| graded.question_id == request.question_id)
        {
            return Ok(graded.clone());
        }

        let is_correct = entry.grades_as_correct(&request.selected_option);
        session.state = self.controller.next(session.state, is_correct);
        let answered_count = u32::try_from(session.graded.len() + 1).unwrap_or(u32::MAX);

        let graded = GradedAnswer {
            question_id: request.question_id.clone(),
            is_correct,
            correct_answer: entry.correct_answer.clone(),
            explanation: entry.explanation.clone(),
            difficulty: session.state.difficulty,
            streak: Some(session.state.streak),
            answered_count: Some(answered_count),
        };
        let record = AnswerRecord {
            unit_id: entry.question.unit_id.clone(),
            difficulty: entry.question.difficulty,
            is_correct,
        };
        session.graded.push((record, graded.clone()));

        Ok(graded)
    }

    async fn end_session(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionSummary, QuestionServiceError> {
        let sessions = self.lock()?;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| unknown_session(session_id))?;
        let records: Vec<AnswerRecord> = session
            .graded
            .iter()
            .map(|(record, _)| record.clone())
            .collect();
        Ok(SessionSummary::from_results(session_id.clone(), &records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use practice_core::model::{SessionMode, UserId};

    fn bank() -> Vec<BankQuestion> {
        let mut bank = Vec::new();
        for (n, difficulty) in [
            (1, Difficulty::Easy),
            (2, Difficulty::Easy),
            (3, Difficulty::Medium),
            (4, Difficulty::Hard),
        ] {
            let unit = if n % 2 == 0 { "unit-2" } else { "unit-1" };
            let question = Question::new(
                QuestionId::new(format!("q{n}")),
                difficulty,
                Some(UnitId::new(unit)),
            )
            .with_field("questionText", format!("Question {n}"));
            bank.push(BankQuestion::new(question, "A").with_explanation(format!("Why {n}")));
        }
        bank
    }

    async fn start(service: &InMemoryQuestionService, mode: SessionMode) -> StartedSession {
        service
            .start_session(&StartSessionRequest::new(UserId::new("u1"), &mode, 3, None))
            .await
            .unwrap()
    }

    fn submit(session_id: &SessionId, question: &str, option: &str) -> SubmitAnswerRequest {
        SubmitAnswerRequest {
            user_id: UserId::new("u1"),
            session_id: session_id.clone(),
            question_id: QuestionId::new(question),
            selected_option: option.to_owned(),
            time_spent_seconds: 5,
        }
    }

    #[tokio::test]
    async fn start_serves_an_easy_question_from_the_unit() {
        let service = InMemoryQuestionService::new(bank());
        let started = start(&service, SessionMode::SingleUnit(UnitId::new("unit-2"))).await;
        assert_eq!(started.first_question.id, QuestionId::new("q2"));
        assert_eq!(started.initial_difficulty, Difficulty::Easy);
    }

    #[tokio::test]
    async fn next_falls_back_to_nearest_level_and_skips_answered() {
        let service = InMemoryQuestionService::new(bank());
        let started = start(&service, SessionMode::Mixed).await;

        let request = NextQuestionRequest {
            user_id: UserId::new("u1"),
            session_id: started.session_id.clone(),
            unit_id: None,
            mixed: true,
            answered_question_ids: vec![QuestionId::new("q1"), QuestionId::new("q2")],
            current_difficulty: Difficulty::Easy,
        };
        let next = service.next_question(&request).await.unwrap().unwrap();
        assert_eq!(next.id, QuestionId::new("q3"));
    }

    #[tokio::test]
    async fn next_reports_exhaustion_at_target() {
        let service = InMemoryQuestionService::new(bank());
        let started = start(&service, SessionMode::Mixed).await;
        let request = NextQuestionRequest {
            user_id: UserId::new("u1"),
            session_id: started.session_id,
            unit_id: None,
            mixed: true,
            answered_question_ids: vec![
                QuestionId::new("q1"),
                QuestionId::new("q2"),
                QuestionId::new("q3"),
            ],
            current_difficulty: Difficulty::Medium,
        };
        assert!(service.next_question(&request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn grading_is_case_insensitive_and_blank_is_wrong() {
        let service = InMemoryQuestionService::new(bank());
        let started = start(&service, SessionMode::Mixed).await;

        let graded = service
            .submit_answer(&submit(&started.session_id, "q1", " a "))
            .await
            .unwrap();
        assert!(graded.is_correct);
        assert_eq!(graded.explanation.as_deref(), Some("Why 1"));

        let graded = service
            .submit_answer(&submit(&started.session_id, "q2", ""))
            .await
            .unwrap();
        assert!(!graded.is_correct);
        assert_eq!(graded.answered_count, Some(2));
    }

    #[tokio::test]
    async fn resubmission_returns_original_grade() {
        let service = InMemoryQuestionService::new(bank());
        let started = start(&service, SessionMode::Mixed).await;

        let first = service
            .submit_answer(&submit(&started.session_id, "q1", "A"))
            .await
            .unwrap();
        let again = service
            .submit_answer(&submit(&started.session_id, "q1", "B"))
            .await
            .unwrap();
        assert_eq!(first, again);

        let summary = service.end_session(&started.session_id).await.unwrap();
        assert_eq!(summary.total_questions, 1);
    }

    #[tokio::test]
    async fn unknown_session_is_rejected() {
        let service = InMemoryQuestionService::new(bank());
        let err = service
            .end_session(&SessionId::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, QuestionServiceError::Rejected(_)));
    }

    #[test]
    fn bank_loads_from_json() {
        let json = r#"[
            {
                "question": {"id": "q1", "difficulty": "EASY", "unitId": "unit-1", "questionText": "?"},
                "correctAnswer": "B",
                "explanation": "Because."
            }
        ]"#;
        let service = InMemoryQuestionService::from_json(json).unwrap();
        assert_eq!(service.len(), 1);
        assert!(matches!(
            InMemoryQuestionService::from_json("{"),
            Err(QuestionServiceError::Decode(_))
        ));
    }
}
