#![forbid(unsafe_code)]

pub mod app_services;
pub mod config;
pub mod error;
pub mod question_service;
pub mod sessions;

pub use practice_core::Clock;
pub use sessions as session;

pub use app_services::PracticeServices;
pub use config::EngineConfig;
pub use error::{AppServicesError, ConfigError, QuestionServiceError, SessionError};
pub use question_service::{
    BankQuestion, HttpQuestionService, InMemoryQuestionService, QuestionService,
    QuestionServiceConfig,
};
pub use sessions::{
    Advance, PracticeEngine, PrefetchCoordinator, SessionProgress, SessionStore,
    SubmissionCoordinator, SubmitOutcome,
};
