#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use practice_core::model::{
    Difficulty, GradedAnswer, Question, QuestionId, SessionId, SessionMode, SessionSummary,
    UnitId, UserId,
};
use practice_core::time::fixed_clock;
use services::config::EngineConfig;
use services::error::QuestionServiceError;
use services::question_service::{
    BankQuestion, InMemoryQuestionService, NextQuestionRequest, QuestionService,
    StartSessionRequest, StartedSession, SubmitAnswerRequest,
};
use services::sessions::{PracticeEngine, SessionStore};
use storage::repository::InMemoryRepository;

pub const UNIT: &str = "unit-1";

pub fn unit_mode() -> SessionMode {
    SessionMode::SingleUnit(UnitId::new(UNIT))
}

/// Bank questions in `UNIT`, all answered correctly by "A".
pub fn bank(entries: &[(&str, Difficulty)]) -> Vec<BankQuestion> {
    entries
        .iter()
        .map(|(id, difficulty)| {
            BankQuestion::new(
                Question::new(QuestionId::new(*id), *difficulty, Some(UnitId::new(UNIT)))
                    .with_field("questionText", format!("Question {id}")),
                "A",
            )
        })
        .collect()
}

pub fn easy_bank(count: usize) -> Vec<BankQuestion> {
    let ids: Vec<String> = (1..=count).map(|n| format!("q{n}")).collect();
    let entries: Vec<(&str, Difficulty)> = ids
        .iter()
        .map(|id| (id.as_str(), Difficulty::Easy))
        .collect();
    bank(&entries)
}

/// Records calls to an in-memory service and injects failures on demand.
pub struct ScriptedService {
    inner: InMemoryQuestionService,
    pub start_calls: AtomicUsize,
    pub next_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    pub end_calls: AtomicUsize,
    fail_next_submit: AtomicBool,
    fail_next_fetch: AtomicBool,
    submit_delay: Mutex<Option<Duration>>,
    forced_difficulty: Mutex<Option<Difficulty>>,
    submitted: Mutex<Vec<SubmitAnswerRequest>>,
}

impl ScriptedService {
    pub fn new(bank: Vec<BankQuestion>) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryQuestionService::new(bank),
            start_calls: AtomicUsize::new(0),
            next_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            end_calls: AtomicUsize::new(0),
            fail_next_submit: AtomicBool::new(false),
            fail_next_fetch: AtomicBool::new(false),
            submit_delay: Mutex::new(None),
            forced_difficulty: Mutex::new(None),
            submitted: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_next_submit(&self) {
        self.fail_next_submit.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_fetch(&self) {
        self.fail_next_fetch.store(true, Ordering::SeqCst);
    }

    pub fn delay_submits(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = Some(delay);
    }

    /// Grade responses report this level without streak counters.
    pub fn force_difficulty(&self, difficulty: Difficulty) {
        *self.forced_difficulty.lock().unwrap() = Some(difficulty);
    }

    pub fn submitted(&self) -> Vec<SubmitAnswerRequest> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionService for ScriptedService {
    async fn start_session(
        &self,
        request: &StartSessionRequest,
    ) -> Result<StartedSession, QuestionServiceError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.start_session(request).await
    }

    async fn next_question(
        &self,
        request: &NextQuestionRequest,
    ) -> Result<Option<Question>, QuestionServiceError> {
        self.next_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_fetch.swap(false, Ordering::SeqCst) {
            return Err(QuestionServiceError::Rejected("injected failure".into()));
        }
        self.inner.next_question(request).await
    }

    async fn submit_answer(
        &self,
        request: &SubmitAnswerRequest,
    ) -> Result<GradedAnswer, QuestionServiceError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(request.clone());

        let delay = *self.submit_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_next_submit.swap(false, Ordering::SeqCst) {
            return Err(QuestionServiceError::Rejected("injected failure".into()));
        }

        let mut graded = self.inner.submit_answer(request).await?;
        let forced = *self.forced_difficulty.lock().unwrap();
        if let Some(difficulty) = forced {
            graded.difficulty = difficulty;
            graded.streak = None;
        }
        Ok(graded)
    }

    async fn end_session(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionSummary, QuestionServiceError> {
        self.end_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.end_session(session_id).await
    }
}

pub fn engine(repo: &InMemoryRepository, service: &Arc<ScriptedService>) -> PracticeEngine {
    engine_with(repo, service, EngineConfig::default())
}

pub fn engine_with(
    repo: &InMemoryRepository,
    service: &Arc<ScriptedService>,
    config: EngineConfig,
) -> PracticeEngine {
    let service: Arc<dyn QuestionService> = Arc::clone(service) as Arc<dyn QuestionService>;
    let store = SessionStore::new(Arc::new(repo.clone()), service, UserId::new("learner-1"))
        .with_controller(config.controller().unwrap())
        .with_clock(fixed_clock())
        .with_request_timeout(config.request_timeout);
    PracticeEngine::from_store(store, config)
}
