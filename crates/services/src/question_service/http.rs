use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use practice_core::model::{GradedAnswer, Question, SessionId, SessionSummary};

use super::{
    NextQuestionRequest, QuestionService, StartSessionRequest, StartedSession,
    SubmitAnswerRequest,
};
use crate::error::QuestionServiceError;

/// Default per-request timeout for the HTTP transport.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Clone, Debug)]
pub struct QuestionServiceConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl QuestionServiceConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Read `PRACTICE_API_URL` and `PRACTICE_API_TOKEN`.
    ///
    /// Returns `None` when no base URL is configured.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("PRACTICE_API_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        let api_token = env::var("PRACTICE_API_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        Some(Self {
            base_url,
            api_token,
            timeout: DEFAULT_HTTP_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// `QuestionService` over HTTP + JSON.
#[derive(Clone)]
pub struct HttpQuestionService {
    client: Client,
    config: QuestionServiceConfig,
}

impl HttpQuestionService {
    /// # Errors
    ///
    /// Returns `QuestionServiceError::Http` if the HTTP client cannot be built.
    pub fn new(config: QuestionServiceConfig) -> Result<Self, QuestionServiceError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Build from the environment.
    ///
    /// # Errors
    ///
    /// Returns `QuestionServiceError::Disabled` when `PRACTICE_API_URL` is unset.
    pub fn from_env() -> Result<Self, QuestionServiceError> {
        let config = QuestionServiceConfig::from_env().ok_or(QuestionServiceError::Disabled)?;
        Self::new(config)
    }

    #[must_use]
    pub fn config(&self) -> &QuestionServiceConfig {
        &self.config
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let request = self.client.post(self.config.endpoint(path));
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<T, QuestionServiceError> {
        if !response.status().is_success() {
            return Err(QuestionServiceError::HttpStatus(response.status()));
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|err| QuestionServiceError::Decode(err.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct NextQuestionResponse {
    #[serde(default)]
    question: Option<Question>,
}

#[async_trait]
impl QuestionService for HttpQuestionService {
    async fn start_session(
        &self,
        request: &StartSessionRequest,
    ) -> Result<StartedSession, QuestionServiceError> {
        debug!(target_count = request.target_count, mixed = request.mixed, "POST start session");
        let response = self.post("practice-sessions").json(request).send().await?;
        Self::read(response).await
    }

    async fn next_question(
        &self,
        request: &NextQuestionRequest,
    ) -> Result<Option<Question>, QuestionServiceError> {
        let path = format!("practice-sessions/{}/next", request.session_id);
        debug!(
            session_id = %request.session_id,
            answered = request.answered_question_ids.len(),
            difficulty = %request.current_difficulty,
            "POST next question"
        );
        let response = self.post(&path).json(request).send().await?;
        let body: NextQuestionResponse = Self::read(response).await?;
        Ok(body.question)
    }

    async fn submit_answer(
        &self,
        request: &SubmitAnswerRequest,
    ) -> Result<GradedAnswer, QuestionServiceError> {
        let path = format!("practice-sessions/{}/answers", request.session_id);
        debug!(session_id = %request.session_id, question_id = %request.question_id, "POST answer");
        let response = self.post(&path).json(request).send().await?;
        Self::read(response).await
    }

    async fn end_session(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionSummary, QuestionServiceError> {
        let path = format!("practice-sessions/{session_id}/end");
        debug!(session_id = %session_id, "POST end session");
        let response = self.post(&path).send().await?;
        Self::read(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = QuestionServiceConfig::new("https://api.example.test/v1/");
        assert_eq!(
            config.endpoint("practice-sessions/s1/next"),
            "https://api.example.test/v1/practice-sessions/s1/next"
        );
    }

    #[test]
    fn client_builds_with_custom_timeout() {
        let config =
            QuestionServiceConfig::new("http://localhost:9").with_timeout(Duration::from_secs(3));
        let service = HttpQuestionService::new(config).unwrap();
        assert_eq!(service.config().timeout, Duration::from_secs(3));
        assert!(service.config().api_token.is_none());
    }

    #[test]
    fn next_response_treats_null_as_exhausted() {
        let body: NextQuestionResponse = serde_json::from_str(r#"{"question": null}"#).unwrap();
        assert!(body.question.is_none());
        let body: NextQuestionResponse = serde_json::from_str("{}").unwrap();
        assert!(body.question.is_none());
    }
}
