use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::controller::DifficultyState;
use crate::model::{
    Difficulty, QuestionId, Session, SessionId, SessionMode, SessionStateError, Streak,
    TimedConfig,
};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Durable, resumable representation of a session.
///
/// Written after every mutation and read back on resume. The field names are
/// an internal cache format; only the `Session` invariants are binding, and
/// [`SessionSnapshot::into_session`] re-checks all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub version: u32,
    pub session_id: SessionId,
    pub mode: SessionMode,
    pub target_question_count: u32,
    pub answered_question_ids: Vec<QuestionId>,
    pub current_difficulty: Difficulty,
    #[serde(default)]
    pub streak: Streak,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timed_config: Option<TimedConfig>,
    pub started_at: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn from_session(session: &Session, saved_at: DateTime<Utc>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            session_id: session.id().clone(),
            mode: session.mode().clone(),
            target_question_count: session.target_question_count(),
            answered_question_ids: session.answered_question_ids().to_vec(),
            current_difficulty: session.current_difficulty(),
            streak: session.streak(),
            timed_config: session.timed(),
            started_at: session.started_at(),
            saved_at,
        }
    }

    /// Rebuild the session, validating its invariants.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::UnsupportedVersion` for unknown versions and
    /// any invariant error raised by `Session::from_persisted`.
    pub fn into_session(self) -> Result<Session, SessionStateError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SessionStateError::UnsupportedVersion(self.version));
        }
        Session::from_persisted(
            self.session_id,
            self.mode,
            self.target_question_count,
            self.answered_question_ids,
            DifficultyState::new(self.current_difficulty, self.streak),
            self.timed_config,
            self.started_at,
        )
    }

    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// # Errors
    ///
    /// Returns `serde_json::Error` if the payload is not a valid snapshot.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::DifficultyController;
    use crate::model::UnitId;
    use crate::time::fixed_now;

    fn answered_session() -> Session {
        let mut session = Session::new(
            SessionId::new("s-7"),
            SessionMode::SingleUnit(UnitId::new("unit-5")),
            10,
            Some(TimedConfig::new(90).unwrap()),
            Difficulty::Easy,
            fixed_now(),
        )
        .unwrap();
        let controller = DifficultyController::default();
        session
            .record_answer(QuestionId::new("q1"), true, &controller)
            .unwrap();
        session
            .record_answer(QuestionId::new("q2"), true, &controller)
            .unwrap();
        session
    }

    #[test]
    fn snapshot_restores_history_and_difficulty() {
        let session = answered_session();
        let json = SessionSnapshot::from_session(&session, fixed_now())
            .to_json()
            .unwrap();

        let restored = SessionSnapshot::from_json(&json)
            .unwrap()
            .into_session()
            .unwrap();

        assert_eq!(restored, session);
        assert_eq!(
            restored.answered_question_ids(),
            &[QuestionId::new("q1"), QuestionId::new("q2")]
        );
        assert_eq!(restored.streak(), Streak::new(2, 0));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut snapshot = SessionSnapshot::from_session(&answered_session(), fixed_now());
        snapshot.version = 99;
        assert_eq!(
            snapshot.into_session().unwrap_err(),
            SessionStateError::UnsupportedVersion(99)
        );
    }

    #[test]
    fn over_target_snapshot_is_rejected() {
        let mut snapshot = SessionSnapshot::from_session(&answered_session(), fixed_now());
        snapshot.target_question_count = 1;
        assert!(matches!(
            snapshot.into_session(),
            Err(SessionStateError::AnsweredExceedsTarget { .. })
        ));
    }

    #[test]
    fn zero_second_timer_fails_to_parse() {
        let json = SessionSnapshot::from_session(&answered_session(), fixed_now())
            .to_json()
            .unwrap()
            .replace("\"perQuestionSeconds\":90", "\"perQuestionSeconds\":0");
        assert!(json.contains("\"perQuestionSeconds\":0"));
        assert!(SessionSnapshot::from_json(&json).is_err());
    }

    #[test]
    fn garbage_payload_fails_to_parse() {
        assert!(SessionSnapshot::from_json("{\"version\": 1").is_err());
        assert!(SessionSnapshot::from_json("[]").is_err());
    }
}
