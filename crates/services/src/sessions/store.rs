use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use practice_core::Clock;
use practice_core::controller::DifficultyController;
use practice_core::model::{
    Difficulty, Question, QuestionId, RecordOutcome, Reconciliation, Session, SessionMode,
    SessionSnapshot, SessionStateError, SnapshotKey, Streak, TimedConfig, UserId,
};
use storage::repository::{SnapshotRecord, SnapshotRepository, StorageError};

use crate::error::SessionError;
use crate::question_service::{QuestionService, StartSessionRequest, bounded};

/// Default bound on every Question Service call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Owns session identity and progress, and the only writer of its snapshot.
///
/// Every mutating call writes the full snapshot before returning, so a crash
/// at any point loses at most the network call in flight.
pub struct SessionStore {
    snapshots: Arc<dyn SnapshotRepository>,
    service: Arc<dyn QuestionService>,
    controller: DifficultyController,
    clock: Clock,
    request_timeout: Duration,
    user_id: UserId,
}

impl SessionStore {
    #[must_use]
    pub fn new(
        snapshots: Arc<dyn SnapshotRepository>,
        service: Arc<dyn QuestionService>,
        user_id: UserId,
    ) -> Self {
        Self {
            snapshots,
            service,
            controller: DifficultyController::default(),
            clock: Clock::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_id,
        }
    }

    #[must_use]
    pub fn with_controller(mut self, controller: DifficultyController) -> Self {
        self.controller = controller;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    #[must_use]
    pub fn controller(&self) -> &DifficultyController {
        &self.controller
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    #[must_use]
    pub fn service(&self) -> Arc<dyn QuestionService> {
        Arc::clone(&self.service)
    }

    /// Allocate a session on the Question Service and persist it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ServiceUnavailable` if the service call fails or
    /// times out, `SessionError::State` for a zero target, and
    /// `SessionError::Storage` if the snapshot cannot be written.
    pub async fn start(
        &self,
        mode: SessionMode,
        target_question_count: u32,
        timed: Option<TimedConfig>,
    ) -> Result<(Session, Question), SessionError> {
        if target_question_count == 0 {
            return Err(SessionStateError::InvalidTarget.into());
        }

        let request =
            StartSessionRequest::new(self.user_id.clone(), &mode, target_question_count, timed);
        let started = bounded(self.request_timeout, self.service.start_session(&request)).await?;

        let session = Session::new(
            started.session_id,
            mode,
            target_question_count,
            timed,
            started.initial_difficulty,
            self.clock.now(),
        )?;
        self.persist(&session).await?;

        info!(
            session_id = %session.id(),
            target = target_question_count,
            timed = timed.is_some(),
            difficulty = %session.current_difficulty(),
            "practice session started"
        );
        Ok((session, started.first_question))
    }

    /// Rebuild the session stored under `key`, if any.
    ///
    /// A returned session may already be complete; callers route it to the
    /// summary instead of fetching another question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Corrupt` if the payload cannot be decoded or breaks
    /// a session invariant, and `SessionError::Storage` if it cannot be read.
    pub async fn resume(&self, key: &SnapshotKey) -> Result<Option<Session>, SessionError> {
        let Some(record) = self.snapshots.load_snapshot(key).await? else {
            return Ok(None);
        };

        let snapshot = SessionSnapshot::from_json(&record.payload)
            .map_err(|err| SessionError::Corrupt(err.to_string()))?;
        let session = snapshot
            .into_session()
            .map_err(|err| SessionError::Corrupt(err.to_string()))?;
        if &session.mode().snapshot_key() != key {
            return Err(SessionError::Corrupt(format!(
                "snapshot under {key} belongs to {}",
                session.mode().snapshot_key()
            )));
        }

        info!(
            session_id = %session.id(),
            answered = session.answered_count(),
            target = session.target_question_count(),
            difficulty = %session.current_difficulty(),
            "practice session resumed"
        );
        Ok(Some(session))
    }

    /// Append a graded question and apply the local difficulty prediction.
    ///
    /// Duplicates are a no-op and skip the write.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` if the session is already complete and
    /// `SessionError::Storage` if the snapshot cannot be written.
    pub async fn record_answer(
        &self,
        session: &mut Session,
        question_id: QuestionId,
        correct: bool,
    ) -> Result<RecordOutcome, SessionError> {
        let outcome = session.record_answer(question_id, correct, &self.controller)?;
        match outcome {
            RecordOutcome::Recorded { predicted } => {
                self.persist(session).await?;
                debug!(
                    session_id = %session.id(),
                    answered = session.answered_count(),
                    predicted = %predicted,
                    "answer recorded"
                );
            }
            RecordOutcome::Duplicate => {
                debug!(session_id = %session.id(), "duplicate answer ignored");
            }
        }
        Ok(outcome)
    }

    /// Overwrite the predicted level with the server's.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the snapshot cannot be written.
    pub async fn reconcile_server_difficulty(
        &self,
        session: &mut Session,
        authoritative: Difficulty,
        server_streak: Option<Streak>,
    ) -> Result<Reconciliation, SessionError> {
        let reconciliation = session.reconcile_difficulty(authoritative, server_streak);
        self.persist(session).await?;
        if let Reconciliation::Corrected { predicted, authoritative } = reconciliation {
            debug!(
                session_id = %session.id(),
                predicted = %predicted,
                authoritative = %authoritative,
                "difficulty prediction corrected"
            );
        }
        Ok(reconciliation)
    }

    /// Remove the persisted snapshot of `session`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the snapshot cannot be deleted.
    pub async fn clear(&self, session: &Session) -> Result<bool, SessionError> {
        self.clear_key(&session.mode().snapshot_key()).await
    }

    /// Remove whatever is stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the snapshot cannot be deleted.
    pub async fn clear_key(&self, key: &SnapshotKey) -> Result<bool, SessionError> {
        let removed = self.snapshots.delete_snapshot(key).await?;
        debug!(key = %key, removed, "snapshot cleared");
        Ok(removed)
    }

    async fn persist(&self, session: &Session) -> Result<(), SessionError> {
        let saved_at = self.clock.now();
        let payload = SessionSnapshot::from_session(session, saved_at)
            .to_json()
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let record = SnapshotRecord::new(session.mode().snapshot_key(), payload, saved_at);
        self.snapshots.save_snapshot(&record).await?;
        Ok(())
    }
}
