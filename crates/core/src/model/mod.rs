mod answer;
mod difficulty;
mod ids;
mod question;
mod session;
mod snapshot;
mod summary;

pub use answer::{GradedAnswer, PendingAnswer, SubmissionTrigger};
pub use difficulty::{Difficulty, DifficultyError, Streak};
pub use ids::{ParseIdError, QuestionId, SessionId, SnapshotKey, UnitId, UserId};
pub use question::Question;
pub use session::{
    RecordOutcome, Reconciliation, Session, SessionMode, SessionStateError, TimedConfig,
};
pub use snapshot::{SNAPSHOT_VERSION, SessionSnapshot};
pub use summary::{AnswerRecord, DifficultyBreakdown, SessionSummary, Tally, UnitBreakdown};
