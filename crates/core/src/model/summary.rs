use serde::{Deserialize, Serialize};

use crate::model::{Difficulty, SessionId, UnitId};

/// Units below this accuracy (in percent) get a review recommendation.
const REVIEW_THRESHOLD_PERCENT: f64 = 60.0;

/// Overall accuracy (in percent) above which harder material is suggested.
const STRONG_THRESHOLD_PERCENT: f64 = 80.0;

//
// ─── BREAKDOWNS ────────────────────────────────────────────────────────────────
//

/// Correct/total tally for one slice of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub total: u32,
    pub correct: u32,
}

impl Tally {
    pub fn add(&mut self, correct: bool) {
        self.total = self.total.saturating_add(1);
        if correct {
            self.correct = self.correct.saturating_add(1);
        }
    }

    /// Accuracy in percent, `0.0` for an empty tally.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        f64::from(self.correct) * 100.0 / f64::from(self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyBreakdown {
    pub difficulty: Difficulty,
    #[serde(flatten)]
    pub tally: Tally,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitBreakdown {
    pub unit_id: UnitId,
    #[serde(flatten)]
    pub tally: Tally,
}

/// One graded answer, as fed into [`SessionSummary::from_results`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    pub unit_id: Option<UnitId>,
    pub difficulty: Difficulty,
    pub is_correct: bool,
}

//
// ─── SUMMARY ───────────────────────────────────────────────────────────────────
//

/// End-of-session report returned by the Question Service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub total_questions: u32,
    pub correct_answers: u32,
    /// Percent, 0–100.
    pub accuracy: f64,
    #[serde(default)]
    pub by_difficulty: Vec<DifficultyBreakdown>,
    #[serde(default)]
    pub by_unit: Vec<UnitBreakdown>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl SessionSummary {
    /// Build a summary from the graded answers of a session.
    ///
    /// Difficulty rows are always listed `Easy`, `Medium`, `Hard` and only
    /// include levels that were attempted; unit rows keep first-seen order.
    #[must_use]
    pub fn from_results(session_id: SessionId, results: &[AnswerRecord]) -> Self {
        let mut overall = Tally::default();
        let mut per_level = [Tally::default(); 3];
        let mut by_unit: Vec<UnitBreakdown> = Vec::new();

        for record in results {
            overall.add(record.is_correct);
            let slot = Difficulty::ALL
                .iter()
                .position(|level| *level == record.difficulty)
                .unwrap_or(0);
            per_level[slot].add(record.is_correct);

            if let Some(unit_id) = &record.unit_id {
                match by_unit.iter_mut().find(|row| &row.unit_id == unit_id) {
                    Some(row) => row.tally.add(record.is_correct),
                    None => {
                        let mut tally = Tally::default();
                        tally.add(record.is_correct);
                        by_unit.push(UnitBreakdown {
                            unit_id: unit_id.clone(),
                            tally,
                        });
                    }
                }
            }
        }

        let by_difficulty: Vec<DifficultyBreakdown> = Difficulty::ALL
            .iter()
            .zip(per_level)
            .filter(|(_, tally)| tally.total > 0)
            .map(|(difficulty, tally)| DifficultyBreakdown {
                difficulty: *difficulty,
                tally,
            })
            .collect();

        let recommendations = recommend(&overall, &by_difficulty, &by_unit);

        Self {
            session_id,
            total_questions: overall.total,
            correct_answers: overall.correct,
            accuracy: overall.accuracy(),
            by_difficulty,
            by_unit,
            recommendations,
        }
    }
}

fn recommend(
    overall: &Tally,
    by_difficulty: &[DifficultyBreakdown],
    by_unit: &[UnitBreakdown],
) -> Vec<String> {
    let mut out: Vec<String> = by_unit
        .iter()
        .filter(|row| row.tally.accuracy() < REVIEW_THRESHOLD_PERCENT)
        .map(|row| {
            format!(
                "Review {}: {}/{} correct",
                row.unit_id, row.tally.correct, row.tally.total
            )
        })
        .collect();

    let reached_hard = by_difficulty
        .iter()
        .any(|row| row.difficulty == Difficulty::Hard);
    if overall.total > 0 && overall.accuracy() >= STRONG_THRESHOLD_PERCENT {
        if reached_hard {
            out.push("Strong result at HARD level. Try a full-length timed exam.".to_owned());
        } else {
            out.push("Strong accuracy. Keep the streak going to unlock HARD questions.".to_owned());
        }
    } else if overall.total > 0 && out.is_empty() {
        out.push("Keep practicing mixed sets to build consistency.".to_owned());
    }

    out
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
