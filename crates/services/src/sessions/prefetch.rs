use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use practice_core::model::{Difficulty, Question, Session, SessionId, UserId};

use crate::question_service::{NextQuestionRequest, QuestionService, bounded};

/// The session state a prefetched question was requested for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchTag {
    pub session_id: SessionId,
    pub answered_count: usize,
    pub difficulty: Difficulty,
}

impl PrefetchTag {
    #[must_use]
    pub fn for_session(session: &Session) -> Self {
        Self {
            session_id: session.id().clone(),
            answered_count: session.answered_count(),
            difficulty: session.current_difficulty(),
        }
    }
}

struct InFlight {
    tag: PrefetchTag,
    cancel: CancellationToken,
    handle: JoinHandle<Option<Question>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

/// Speculatively fetches the next question while feedback is on screen.
///
/// Holds at most one request. Scheduling a new one cancels the previous one,
/// and a cancelled request never reaches the slot. Failures are logged and
/// reported as a miss; the caller's synchronous fetch is the fallback.
pub struct PrefetchCoordinator {
    service: Arc<dyn QuestionService>,
    user_id: UserId,
    request_timeout: Duration,
    slot: Option<InFlight>,
}

impl PrefetchCoordinator {
    #[must_use]
    pub fn new(
        service: Arc<dyn QuestionService>,
        user_id: UserId,
        request_timeout: Duration,
    ) -> Self {
        Self {
            service,
            user_id,
            request_timeout,
            slot: None,
        }
    }

    /// Start fetching the question that follows the session's current state.
    ///
    /// Does nothing once `answered >= target - 1`. Returns whether a request
    /// was issued. Must be called from within a Tokio runtime.
    pub fn schedule(&mut self, session: &Session) -> bool {
        if session.answered_count() + 1 >= session.target() {
            debug!(
                session_id = %session.id(),
                answered = session.answered_count(),
                "prefetch skipped near end of session"
            );
            return false;
        }

        self.invalidate();

        let tag = PrefetchTag::for_session(session);
        let request = NextQuestionRequest::for_session(self.user_id.clone(), session);
        let cancel = CancellationToken::new();
        let cancelled = cancel.clone();
        let service = Arc::clone(&self.service);
        let limit = self.request_timeout;

        let handle = tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => None,
                result = bounded(limit, service.next_question(&request)) => match result {
                    Ok(question) => question,
                    Err(err) => {
                        warn!(session_id = %request.session_id, error = %err, "prefetch failed");
                        None
                    }
                },
            }
        });

        debug!(
            session_id = %tag.session_id,
            answered = tag.answered_count,
            difficulty = %tag.difficulty,
            "prefetch scheduled"
        );
        self.slot = Some(InFlight {
            tag,
            cancel,
            handle,
        });
        true
    }

    /// Take the prefetched question if its tag matches `session` exactly.
    ///
    /// Waits for a matching request that is still in flight. Any mismatch
    /// cancels and discards the slot.
    pub async fn consume(&mut self, session: &Session) -> Option<Question> {
        let mut in_flight = self.slot.take()?;
        let current = PrefetchTag::for_session(session);

        if in_flight.tag != current {
            debug!(
                session_id = %current.session_id,
                tagged_answered = in_flight.tag.answered_count,
                tagged_difficulty = %in_flight.tag.difficulty,
                answered = current.answered_count,
                difficulty = %current.difficulty,
                "stale prefetch discarded"
            );
            return None;
        }

        match (&mut in_flight.handle).await {
            Ok(Some(question)) if !session.has_answered(&question.id) => {
                debug!(session_id = %current.session_id, question_id = %question.id, "prefetch hit");
                Some(question)
            }
            Ok(_) => None,
            Err(err) => {
                warn!(session_id = %current.session_id, error = %err, "prefetch task failed");
                None
            }
        }
    }

    /// Cancel and drop any outstanding prefetch. Returns whether one existed.
    pub fn invalidate(&mut self) -> bool {
        self.slot.take().is_some()
    }

    #[must_use]
    pub fn tag(&self) -> Option<&PrefetchTag> {
        self.slot.as_ref().map(|in_flight| &in_flight.tag)
    }

    /// Whether a request is still running.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.slot
            .as_ref()
            .is_some_and(|in_flight| !in_flight.handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question_service::{BankQuestion, InMemoryQuestionService};
    use practice_core::controller::DifficultyController;
    use practice_core::model::{QuestionId, SessionMode, UnitId};
    use practice_core::time::fixed_now;

    fn service() -> Arc<dyn QuestionService> {
        Arc::new(InMemoryQuestionService::new(
            [
                ("q1", Difficulty::Easy),
                ("q2", Difficulty::Easy),
                ("q3", Difficulty::Medium),
            ]
            .into_iter()
            .map(|(id, difficulty)| {
                BankQuestion::new(
                    Question::new(QuestionId::new(id), difficulty, Some(UnitId::new("u1"))),
                    "A",
                )
            })
            .collect(),
        ))
    }

    async fn started(service: &Arc<dyn QuestionService>, target: u32) -> Session {
        let mode = SessionMode::SingleUnit(UnitId::new("u1"));
        let started = service
            .start_session(&crate::question_service::StartSessionRequest::new(
                UserId::new("u1"),
                &mode,
                target,
                None,
            ))
            .await
            .unwrap();
        Session::new(
            started.session_id,
            mode,
            target,
            None,
            started.initial_difficulty,
            fixed_now(),
        )
        .unwrap()
    }

    fn coordinator(service: &Arc<dyn QuestionService>) -> PrefetchCoordinator {
        PrefetchCoordinator::new(
            Arc::clone(service),
            UserId::new("u1"),
            Duration::from_secs(20),
        )
    }

    #[tokio::test]
    async fn matching_tag_is_a_hit() {
        let service = service();
        let mut session = started(&service, 3).await;
        session
            .record_answer(QuestionId::new("q1"), true, &DifficultyController::default())
            .unwrap();

        let mut prefetch = coordinator(&service);
        assert!(prefetch.schedule(&session));
        let question = prefetch.consume(&session).await.unwrap();
        assert_eq!(question.id, QuestionId::new("q2"));
        assert!(prefetch.tag().is_none());
    }

    #[tokio::test]
    async fn changed_difficulty_is_a_miss() {
        let service = service();
        let mut session = started(&service, 10).await;
        let controller = DifficultyController::default();
        session
            .record_answer(QuestionId::new("q1"), true, &controller)
            .unwrap();

        let mut prefetch = coordinator(&service);
        prefetch.schedule(&session);
        session.reconcile_difficulty(Difficulty::Hard, None);

        assert!(prefetch.consume(&session).await.is_none());
        assert!(!prefetch.is_in_flight());
    }

    #[tokio::test]
    async fn changed_answered_count_is_a_miss() {
        let service = service();
        let mut session = started(&service, 10).await;
        let controller = DifficultyController::default();

        let mut prefetch = coordinator(&service);
        prefetch.schedule(&session);
        session
            .record_answer(QuestionId::new("q1"), false, &controller)
            .unwrap();

        assert!(prefetch.consume(&session).await.is_none());
    }

    #[tokio::test]
    async fn nothing_is_scheduled_for_the_last_question() {
        let service = service();
        let mut session = started(&service, 2).await;
        session
            .record_answer(QuestionId::new("q1"), true, &DifficultyController::default())
            .unwrap();

        let mut prefetch = coordinator(&service);
        assert!(!prefetch.schedule(&session));
        assert!(prefetch.tag().is_none());
    }

    #[tokio::test]
    async fn rescheduling_replaces_the_slot() {
        let service = service();
        let mut session = started(&service, 10).await;
        let mut prefetch = coordinator(&service);

        prefetch.schedule(&session);
        session
            .record_answer(QuestionId::new("q1"), true, &DifficultyController::default())
            .unwrap();
        prefetch.schedule(&session);

        assert_eq!(prefetch.tag().map(|tag| tag.answered_count), Some(1));
        assert!(prefetch.invalidate());
        assert!(!prefetch.invalidate());
    }
}
