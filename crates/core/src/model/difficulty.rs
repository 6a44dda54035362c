use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DifficultyError {
    #[error("unknown difficulty level: {0}")]
    Unknown(String),
}

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

/// Ordinal difficulty level controlling question selection.
///
/// Ordered `Easy < Medium < Hard`. Serialized in upper case (`"EASY"`) to match
/// the Question Service wire format.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    /// One level up, or `None` when already at `Hard`.
    #[must_use]
    pub fn harder(self) -> Option<Self> {
        match self {
            Difficulty::Easy => Some(Difficulty::Medium),
            Difficulty::Medium => Some(Difficulty::Hard),
            Difficulty::Hard => None,
        }
    }

    /// One level down, or `None` when already at `Easy`.
    #[must_use]
    pub fn easier(self) -> Option<Self> {
        match self {
            Difficulty::Easy => None,
            Difficulty::Medium => Some(Difficulty::Easy),
            Difficulty::Hard => Some(Difficulty::Medium),
        }
    }

    /// Distance in levels between two difficulties.
    #[must_use]
    pub fn distance(self, other: Self) -> u8 {
        self.rank().abs_diff(other.rank())
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "EASY",
            Difficulty::Medium => "MEDIUM",
            Difficulty::Hard => "HARD",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Difficulty::Easy => 0,
            Difficulty::Medium => 1,
            Difficulty::Hard => 2,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = DifficultyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EASY" => Ok(Difficulty::Easy),
            "MEDIUM" => Ok(Difficulty::Medium),
            "HARD" => Ok(Difficulty::Hard),
            _ => Err(DifficultyError::Unknown(s.to_owned())),
        }
    }
}

//
// ─── STREAK ────────────────────────────────────────────────────────────────────
//

/// Consecutive correct/incorrect counters. At most one of them is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Streak {
    pub consecutive_correct: u32,
    pub consecutive_incorrect: u32,
}

impl Streak {
    #[must_use]
    pub fn new(consecutive_correct: u32, consecutive_incorrect: u32) -> Self {
        Self {
            consecutive_correct,
            consecutive_incorrect,
        }
    }

    /// Streak after one more graded answer.
    #[must_use]
    pub fn record(self, correct: bool) -> Self {
        if correct {
            Self::new(self.consecutive_correct.saturating_add(1), 0)
        } else {
            Self::new(0, self.consecutive_incorrect.saturating_add(1))
        }
    }

    #[must_use]
    pub fn is_consistent(self) -> bool {
        self.consecutive_correct == 0 || self.consecutive_incorrect == 0
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
