use std::env;
use std::str::FromStr;
use std::time::Duration;

use practice_core::controller::{DEFAULT_DEMOTE_AFTER, DEFAULT_PROMOTE_AFTER, DifficultyController};

use crate::error::ConfigError;
use crate::sessions::DEFAULT_REQUEST_TIMEOUT;

pub const DEFAULT_TARGET_QUESTION_COUNT: u32 = 10;

/// Tunables of the practice engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub target_question_count: u32,
    pub request_timeout: Duration,
    pub promote_after: u32,
    pub demote_after: u32,
    pub prefetch: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_question_count: DEFAULT_TARGET_QUESTION_COUNT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            promote_after: DEFAULT_PROMOTE_AFTER,
            demote_after: DEFAULT_DEMOTE_AFTER,
            prefetch: true,
        }
    }
}

impl EngineConfig {
    /// Read `PRACTICE_*` overrides from the environment.
    ///
    /// Missing, unparsable or zero values keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let positive = |key: &str| parse::<u32>(lookup(key)).filter(|value| *value > 0);

        Self {
            target_question_count: positive("PRACTICE_TARGET_COUNT")
                .unwrap_or(defaults.target_question_count),
            request_timeout: positive("PRACTICE_REQUEST_TIMEOUT_SECS")
                .map(|secs| Duration::from_secs(u64::from(secs)))
                .unwrap_or(defaults.request_timeout),
            promote_after: positive("PRACTICE_PROMOTE_AFTER").unwrap_or(defaults.promote_after),
            demote_after: positive("PRACTICE_DEMOTE_AFTER").unwrap_or(defaults.demote_after),
            prefetch: lookup("PRACTICE_PREFETCH")
                .and_then(|raw| parse_flag(&raw))
                .unwrap_or(defaults.prefetch),
        }
    }

    /// Build the difficulty controller for these thresholds.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Controller` if a threshold is zero.
    pub fn controller(&self) -> Result<DifficultyController, ConfigError> {
        Ok(DifficultyController::new(
            self.promote_after,
            self.demote_after,
        )?)
    }
}

fn parse<T: FromStr>(raw: Option<String>) -> Option<T> {
    raw.and_then(|value| value.trim().parse().ok())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
