use std::sync::Arc;

use practice_core::Clock;
use practice_core::model::UserId;
use storage::repository::Storage;

use crate::config::EngineConfig;
use crate::error::AppServicesError;
use crate::question_service::{HttpQuestionService, InMemoryQuestionService, QuestionService};
use crate::sessions::{PracticeEngine, SessionStore};

/// Assembles storage, the question service and configuration into engines.
#[derive(Clone)]
pub struct PracticeServices {
    storage: Storage,
    question_service: Arc<dyn QuestionService>,
    user_id: UserId,
    config: EngineConfig,
    clock: Clock,
}

impl PracticeServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails or the
    /// configuration is invalid.
    pub async fn new_sqlite(
        db_url: &str,
        question_service: Arc<dyn QuestionService>,
        user_id: UserId,
        config: EngineConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::new(storage, question_service, user_id, config)
    }

    /// # Errors
    ///
    /// Returns `AppServicesError::Config` if the difficulty thresholds are invalid.
    pub fn new(
        storage: Storage,
        question_service: Arc<dyn QuestionService>,
        user_id: UserId,
        config: EngineConfig,
    ) -> Result<Self, AppServicesError> {
        config.controller()?;
        Ok(Self {
            storage,
            question_service,
            user_id,
            config,
            clock: Clock::default(),
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn question_service(&self) -> Arc<dyn QuestionService> {
        Arc::clone(&self.question_service)
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A fresh engine over the shared storage and service.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Config` if the difficulty thresholds are invalid.
    pub fn engine(&self) -> Result<PracticeEngine, AppServicesError> {
        let store = SessionStore::new(
            Arc::clone(&self.storage.snapshots),
            Arc::clone(&self.question_service),
            self.user_id.clone(),
        )
        .with_controller(self.config.controller()?)
        .with_clock(self.clock)
        .with_request_timeout(self.config.request_timeout);
        Ok(PracticeEngine::from_store(store, self.config.clone()))
    }
}

/// Pick the question service: an offline bank when `bank_json` is given,
/// otherwise the HTTP service configured from the environment.
///
/// # Errors
///
/// Returns `AppServicesError::QuestionService` if the bank cannot be decoded
/// or no HTTP service is configured.
pub fn question_service_from(
    bank_json: Option<&str>,
    config: &EngineConfig,
) -> Result<Arc<dyn QuestionService>, AppServicesError> {
    if let Some(json) = bank_json {
        let bank = InMemoryQuestionService::from_json(json)?.with_controller(config.controller()?);
        return Ok(Arc::new(bank));
    }
    Ok(Arc::new(HttpQuestionService::from_env()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use practice_core::model::{SessionMode, UnitId};

    const BANK: &str = r#"[
        {"question": {"id": "q1", "difficulty": "EASY", "unitId": "u1"}, "correctAnswer": "A"},
        {"question": {"id": "q2", "difficulty": "EASY", "unitId": "u1"}, "correctAnswer": "B"}
    ]"#;

    #[tokio::test]
    async fn engine_runs_against_offline_bank() {
        let config = EngineConfig::default();
        let service = question_service_from(Some(BANK), &config).unwrap();
        let services =
            PracticeServices::new(Storage::in_memory(), service, UserId::new("u1"), config)
                .unwrap();

        let mut engine = services.engine().unwrap();
        let question = engine
            .start(SessionMode::SingleUnit(UnitId::new("u1")), 2, None)
            .await
            .unwrap();
        assert_eq!(question.id.as_str(), "q1");
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        let config = EngineConfig {
            demote_after: 0,
            ..EngineConfig::default()
        };
        let service: Arc<dyn QuestionService> = Arc::new(InMemoryQuestionService::new(Vec::new()));
        let err = PracticeServices::new(Storage::in_memory(), service, UserId::new("u1"), config)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            AppServicesError::Config(ConfigError::Controller(_))
        ));
    }
}
