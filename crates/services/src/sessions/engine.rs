use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use practice_core::model::{
    GradedAnswer, PendingAnswer, Question, Session, SessionMode, SessionSummary, TimedConfig,
    UserId,
};
use storage::repository::SnapshotRepository;

use super::prefetch::PrefetchCoordinator;
use super::progress::SessionProgress;
use super::store::SessionStore;
use super::submission::{IgnoredReason, QuestionPhase, SubmissionCoordinator, SubmitDecision};
use crate::config::EngineConfig;
use crate::error::{ConfigError, SessionError};
use crate::question_service::{
    NextQuestionRequest, QuestionService, SubmitAnswerRequest, bounded,
};

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// Where the engine goes after a graded question or a resume.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Question(Question),
    Completed(SessionSummary),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Graded(GradedAnswer),
    Ignored(IgnoredReason),
}

struct CurrentQuestion {
    question: Question,
    submission: SubmissionCoordinator,
    graded: Option<GradedAnswer>,
}

struct ActiveSession {
    session: Session,
    current: Option<CurrentQuestion>,
}

/// Fails the in-flight submission unless it is settled first.
struct InFlightSubmission<'a> {
    submission: Option<&'a mut SubmissionCoordinator>,
}

impl<'a> InFlightSubmission<'a> {
    fn new(submission: &'a mut SubmissionCoordinator) -> Self {
        Self {
            submission: Some(submission),
        }
    }

    fn fail(mut self, error: impl std::fmt::Display) {
        if let Some(submission) = self.submission.take() {
            submission.fail(error);
        }
    }

    fn graded(mut self) {
        if let Some(submission) = self.submission.take() {
            submission.graded();
        }
    }
}

impl Drop for InFlightSubmission<'_> {
    fn drop(&mut self) {
        if let Some(submission) = self.submission.take() {
            debug!(question_id = %submission.question_id(), "submission cancelled");
            submission.fail("submission cancelled");
        }
    }
}

impl ActiveSession {
    fn showing(session: Session, question: Question) -> Self {
        let submission = SubmissionCoordinator::new(question.id.clone(), session.timed());
        Self {
            session,
            current: Some(CurrentQuestion {
                question,
                submission,
                graded: None,
            }),
        }
    }
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Drives one practice session at a time.
///
/// Every operation takes `&mut self`, so a reset cannot interleave with an
/// in-flight submission. Dropping a pending submission future puts the
/// question back to awaiting an answer with the answer kept for
/// [`PracticeEngine::retry_submission`]; a grade that arrives meanwhile is
/// not recorded.
pub struct PracticeEngine {
    store: SessionStore,
    service: Arc<dyn QuestionService>,
    prefetch: PrefetchCoordinator,
    config: EngineConfig,
    active: Option<ActiveSession>,
}

impl PracticeEngine {
    /// # Errors
    ///
    /// Returns `ConfigError` if the configured thresholds are invalid.
    pub fn new(
        snapshots: Arc<dyn SnapshotRepository>,
        service: Arc<dyn QuestionService>,
        user_id: UserId,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        let store = SessionStore::new(snapshots, Arc::clone(&service), user_id)
            .with_controller(config.controller()?)
            .with_request_timeout(config.request_timeout);
        Ok(Self::from_store(store, config))
    }

    /// Build around an already configured store.
    #[must_use]
    pub fn from_store(store: SessionStore, config: EngineConfig) -> Self {
        let service = store.service();
        let prefetch = PrefetchCoordinator::new(
            Arc::clone(&service),
            store.user_id().clone(),
            store.request_timeout(),
        );
        Self {
            store,
            service,
            prefetch,
            config,
            active: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.active.as_ref().map(|active| &active.session)
    }

    #[must_use]
    pub fn progress(&self) -> Option<SessionProgress> {
        self.session().map(SessionProgress::of)
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.current().map(|current| &current.question)
    }

    #[must_use]
    pub fn phase(&self) -> Option<QuestionPhase> {
        self.current().map(|current| current.submission.phase())
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> Option<u32> {
        self.current()
            .and_then(|current| current.submission.remaining_seconds())
    }

    #[must_use]
    pub fn last_graded(&self) -> Option<&GradedAnswer> {
        self.current().and_then(|current| current.graded.as_ref())
    }

    /// Error of the last failed submission on the current question.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.current()
            .and_then(|current| current.submission.last_error())
    }

    fn current(&self) -> Option<&CurrentQuestion> {
        self.active
            .as_ref()
            .and_then(|active| active.current.as_ref())
    }

    //
    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────
    //

    /// Start a fresh session, replacing any active one, and show its first
    /// question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ServiceUnavailable` if the service call fails; the
    /// caller may retry.
    pub async fn start(
        &mut self,
        mode: SessionMode,
        target_question_count: u32,
        timed: Option<TimedConfig>,
    ) -> Result<Question, SessionError> {
        self.prefetch.invalidate();
        self.active = None;

        let (session, question) = self
            .store
            .start(mode, target_question_count, timed)
            .await?;
        self.active = Some(ActiveSession::showing(session, question.clone()));
        Ok(question)
    }

    /// Resume the stored session for `mode`, or start a new one.
    ///
    /// A corrupt snapshot is discarded and a fresh session started. A stored
    /// session that is already complete goes straight to its summary. The
    /// target and timer of a resumed session come from the snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ServiceUnavailable` if a service call fails and
    /// `SessionError::Storage` if the snapshot store fails.
    pub async fn resume_or_start(
        &mut self,
        mode: SessionMode,
        target_question_count: u32,
        timed: Option<TimedConfig>,
    ) -> Result<Advance, SessionError> {
        self.prefetch.invalidate();
        self.active = None;

        let key = mode.snapshot_key();
        let stored = match self.store.resume(&key).await {
            Ok(stored) => stored,
            Err(SessionError::Corrupt(reason)) => {
                warn!(key = %key, reason = %reason, "discarding corrupt session snapshot");
                self.store.clear_key(&key).await?;
                None
            }
            Err(err) => return Err(err),
        };

        let Some(session) = stored else {
            let question = self.start(mode, target_question_count, timed).await?;
            return Ok(Advance::Question(question));
        };

        self.active = Some(ActiveSession {
            session,
            current: None,
        });
        self.advance().await
    }

    /// Close the active session and return its summary.
    ///
    /// On failure the session stays active so the call can be retried.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoActiveSession` without a session,
    /// `SessionError::ServiceUnavailable` if the summary cannot be fetched.
    pub async fn finish(&mut self) -> Result<SessionSummary, SessionError> {
        self.prefetch.invalidate();
        let active = self.active.as_ref().ok_or(SessionError::NoActiveSession)?;
        let session_id = active.session.id().clone();

        let summary = bounded(
            self.store.request_timeout(),
            self.service.end_session(&session_id),
        )
        .await?;
        self.store.clear(&active.session).await?;

        info!(
            session_id = %session_id,
            total = summary.total_questions,
            correct = summary.correct_answers,
            "practice session completed"
        );
        self.active = None;
        Ok(summary)
    }

    /// Abandon the active session and drop its snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the snapshot cannot be deleted.
    pub async fn reset(&mut self) -> Result<(), SessionError> {
        self.prefetch.invalidate();
        if let Some(active) = self.active.take() {
            self.store.clear(&active.session).await?;
            info!(session_id = %active.session.id(), "practice session reset");
        }
        Ok(())
    }

    /// Drop the stored snapshot for `mode` without loading it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the snapshot cannot be deleted.
    pub async fn discard(&mut self, mode: &SessionMode) -> Result<bool, SessionError> {
        if self
            .active
            .as_ref()
            .is_some_and(|active| active.session.mode() == mode)
        {
            self.prefetch.invalidate();
            self.active = None;
        }
        self.store.clear_key(&mode.snapshot_key()).await
    }

    //
    // ─── ANSWERING ─────────────────────────────────────────────────────────────
    //

    /// Manual submit of the selected option.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ServiceUnavailable` if grading fails; the answer
    /// is kept for [`PracticeEngine::retry_submission`].
    pub async fn submit(&mut self, selected_option: &str) -> Result<SubmitOutcome, SessionError> {
        let decision = self
            .current_mut()?
            .submission
            .submit(selected_option);
        self.dispatch(decision).await
    }

    /// Advance the countdown by one second, submitting a blank answer when it
    /// expires. Returns the grade of that forced submission.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ServiceUnavailable` if the forced submission fails.
    pub async fn tick(&mut self) -> Result<Option<GradedAnswer>, SessionError> {
        let Some(answer) = self.current_mut()?.submission.tick() else {
            return Ok(None);
        };
        debug!(question_id = %answer.question_id, "countdown expired");
        self.send(answer).await.map(Some)
    }

    /// Resend the answer of the last failed submission.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ServiceUnavailable` if grading fails again.
    pub async fn retry_submission(&mut self) -> Result<SubmitOutcome, SessionError> {
        let decision = self.current_mut()?.submission.retry();
        self.dispatch(decision).await
    }

    /// Run the current question until it is graded.
    ///
    /// Answers arrive on `answers`; when timed, the countdown ticks once per
    /// second and wins over an answer that is ready on the same tick.
    /// Returns `None` if the channel closes first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ServiceUnavailable` if a submission fails.
    pub async fn drive_question(
        &mut self,
        answers: &mut mpsc::Receiver<String>,
    ) -> Result<Option<GradedAnswer>, SessionError> {
        let timed = self.current_mut()?.submission.countdown_running();
        let second = Duration::from_secs(1);
        let mut ticker = interval_at(Instant::now() + second, second);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = ticker.tick(), if timed => {
                    if let Some(graded) = self.tick().await? {
                        return Ok(Some(graded));
                    }
                }
                answer = answers.recv() => {
                    let Some(selected) = answer else {
                        return Ok(None);
                    };
                    match self.submit(&selected).await? {
                        SubmitOutcome::Graded(graded) => return Ok(Some(graded)),
                        SubmitOutcome::Ignored(reason) => {
                            debug!(reason = %reason, "submit ignored");
                        }
                    }
                }
            }
        }
    }

    /// Move past a graded question: the next question, or the summary once
    /// the target is reached or the service runs out of questions.
    ///
    /// Also retries a fetch that failed while no question was showing, as
    /// after a failed resume.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotGraded` before the current question is
    /// graded, and `SessionError::ServiceUnavailable` if a fetch fails.
    pub async fn next(&mut self) -> Result<Advance, SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::NoActiveSession)?;
        if active
            .current
            .as_ref()
            .is_some_and(|current| current.graded.is_none())
        {
            return Err(SessionError::NotGraded);
        }
        self.advance().await
    }

    async fn advance(&mut self) -> Result<Advance, SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::NoActiveSession)?;
        if active.session.is_complete() {
            return self.finish().await.map(Advance::Completed);
        }

        let prefetched = self.prefetch.consume(&active.session).await;
        let question = match prefetched {
            Some(question) => question,
            None => {
                let request =
                    NextQuestionRequest::for_session(self.store.user_id().clone(), &active.session);
                let fetched = bounded(
                    self.store.request_timeout(),
                    self.service.next_question(&request),
                )
                .await?;
                match fetched {
                    Some(question) => question,
                    None => {
                        info!(
                            session_id = %active.session.id(),
                            answered = active.session.answered_count(),
                            "question pool exhausted before target"
                        );
                        return self.finish().await.map(Advance::Completed);
                    }
                }
            }
        };

        if let Some(active) = self.active.take() {
            self.active = Some(ActiveSession::showing(active.session, question.clone()));
        }
        Ok(Advance::Question(question))
    }

    async fn dispatch(&mut self, decision: SubmitDecision) -> Result<SubmitOutcome, SessionError> {
        match decision {
            SubmitDecision::Proceed(answer) => self.send(answer).await.map(SubmitOutcome::Graded),
            SubmitDecision::Ignored(reason) => Ok(SubmitOutcome::Ignored(reason)),
        }
    }

    async fn send(&mut self, answer: PendingAnswer) -> Result<GradedAnswer, SessionError> {
        let Self {
            store,
            service,
            prefetch,
            config,
            active,
        } = self;
        let active = active.as_mut().ok_or(SessionError::NoActiveSession)?;
        let current = active
            .current
            .as_mut()
            .ok_or(SessionError::NoActiveQuestion)?;

        let request = SubmitAnswerRequest::new(
            store.user_id().clone(),
            active.session.id().clone(),
            &answer,
        );
        let in_flight = InFlightSubmission::new(&mut current.submission);
        let graded = match bounded(store.request_timeout(), service.submit_answer(&request)).await
        {
            Ok(graded) => graded,
            Err(err) => {
                warn!(
                    session_id = %active.session.id(),
                    question_id = %answer.question_id,
                    error = %err,
                    "answer submission failed"
                );
                in_flight.fail(&err);
                return Err(err.into());
            }
        };
        in_flight.graded();
        current.graded = Some(graded.clone());

        store
            .record_answer(
                &mut active.session,
                answer.question_id.clone(),
                graded.is_correct,
            )
            .await?;
        store
            .reconcile_server_difficulty(&mut active.session, graded.difficulty, graded.streak)
            .await?;
        // After reconciliation, so the tag carries the server's level.
        if config.prefetch {
            prefetch.schedule(&active.session);
        }

        Ok(graded)
    }

    fn current_mut(&mut self) -> Result<&mut CurrentQuestion, SessionError> {
        self.active
            .as_mut()
            .ok_or(SessionError::NoActiveSession)?
            .current
            .as_mut()
            .ok_or(SessionError::NoActiveQuestion)
    }
}
