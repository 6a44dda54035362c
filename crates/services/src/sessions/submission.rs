use std::fmt;

use tokio::time::Instant;

use practice_core::model::{PendingAnswer, QuestionId, SubmissionTrigger, TimedConfig};

//
// ─── PHASES ────────────────────────────────────────────────────────────────────
//

/// Lifecycle of a single displayed question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionPhase {
    AwaitingAnswer,
    Submitting,
    Graded,
}

/// Why a submit request did not produce a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredReason {
    /// Manual submit without a selected option.
    EmptySelection,
    /// A submission for this question is already in flight.
    InFlight,
    AlreadyGraded,
    /// Retry requested but no failed submission is pending.
    NothingToRetry,
}

impl fmt::Display for IgnoredReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            IgnoredReason::EmptySelection => "no option selected",
            IgnoredReason::InFlight => "submission already in flight",
            IgnoredReason::AlreadyGraded => "question already graded",
            IgnoredReason::NothingToRetry => "nothing to retry",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitDecision {
    /// Send this answer; the coordinator is now `Submitting`.
    Proceed(PendingAnswer),
    Ignored(IgnoredReason),
}

/// Decide which trigger owns a tick in which both fired. The timer wins.
#[must_use]
pub fn resolve_tick(timer_expired: bool, manual_submit: bool) -> Option<SubmissionTrigger> {
    if timer_expired {
        Some(SubmissionTrigger::Timeout)
    } else if manual_submit {
        Some(SubmissionTrigger::Manual)
    } else {
        None
    }
}

//
// ─── COUNTDOWN ─────────────────────────────────────────────────────────────────
//

/// Per-question countdown, advanced once per second by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    remaining: u32,
    running: bool,
}

impl Countdown {
    #[must_use]
    pub fn new(seconds: u32) -> Self {
        Self {
            remaining: seconds,
            running: seconds > 0,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Advance one second. Returns `true` exactly once, on the tick that
    /// reaches zero.
    pub fn tick(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.running = false;
            return true;
        }
        false
    }

    pub fn stop(&mut self) {
        self.running = false;
    }
}

//
// ─── COORDINATOR ───────────────────────────────────────────────────────────────
//

/// Single-writer guard guaranteeing at most one submission per question.
///
/// The countdown stops as soon as a submission begins and is not restarted
/// after a failure.
#[derive(Debug, Clone)]
pub struct SubmissionCoordinator {
    question_id: QuestionId,
    phase: QuestionPhase,
    countdown: Option<Countdown>,
    per_question_seconds: Option<u32>,
    shown_at: Instant,
    pending: Option<PendingAnswer>,
    last_error: Option<String>,
}

impl SubmissionCoordinator {
    /// Start tracking a question that was just displayed.
    #[must_use]
    pub fn new(question_id: QuestionId, timed: Option<TimedConfig>) -> Self {
        let per_question_seconds = timed.map(|config| config.per_question_seconds());
        Self {
            question_id,
            phase: QuestionPhase::AwaitingAnswer,
            countdown: per_question_seconds.map(Countdown::new),
            per_question_seconds,
            shown_at: Instant::now(),
            pending: None,
            last_error: None,
        }
    }

    #[must_use]
    pub fn question_id(&self) -> &QuestionId {
        &self.question_id
    }

    #[must_use]
    pub fn phase(&self) -> QuestionPhase {
        self.phase
    }

    #[must_use]
    pub fn is_timed(&self) -> bool {
        self.countdown.is_some()
    }

    /// Seconds left on the countdown, `None` when untimed.
    #[must_use]
    pub fn remaining_seconds(&self) -> Option<u32> {
        self.countdown.map(|countdown| countdown.remaining())
    }

    #[must_use]
    pub fn countdown_running(&self) -> bool {
        self.countdown.is_some_and(|countdown| countdown.is_running())
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The answer of the last failed submission, kept for retry.
    #[must_use]
    pub fn pending(&self) -> Option<&PendingAnswer> {
        self.pending.as_ref()
    }

    /// Advance the countdown by one second.
    ///
    /// When it reaches zero while awaiting an answer, a blank timeout
    /// submission begins and is returned.
    pub fn tick(&mut self) -> Option<PendingAnswer> {
        let expired = self
            .countdown
            .as_mut()
            .is_some_and(|countdown| countdown.tick());
        match self.begin(resolve_tick(expired, false)?, "") {
            SubmitDecision::Proceed(answer) => Some(answer),
            SubmitDecision::Ignored(_) => None,
        }
    }

    /// Manual submit with the learner's selection.
    pub fn submit(&mut self, selected_option: &str) -> SubmitDecision {
        self.begin(SubmissionTrigger::Manual, selected_option)
    }

    /// Enter `Submitting` if nothing else already has.
    ///
    /// After a failed timeout submission the blank answer stands; a later
    /// manual submit resends it rather than picking a new option.
    pub fn begin(&mut self, trigger: SubmissionTrigger, selected_option: &str) -> SubmitDecision {
        match self.phase {
            QuestionPhase::Submitting => return SubmitDecision::Ignored(IgnoredReason::InFlight),
            QuestionPhase::Graded => return SubmitDecision::Ignored(IgnoredReason::AlreadyGraded),
            QuestionPhase::AwaitingAnswer => {}
        }

        let answer = match (trigger, &self.pending) {
            (SubmissionTrigger::Manual, Some(pending))
                if pending.trigger == SubmissionTrigger::Timeout =>
            {
                pending.clone()
            }
            (SubmissionTrigger::Manual, _) => {
                if selected_option.trim().is_empty() {
                    return SubmitDecision::Ignored(IgnoredReason::EmptySelection);
                }
                PendingAnswer::manual(
                    self.question_id.clone(),
                    selected_option.trim(),
                    self.elapsed_seconds(),
                )
            }
            (SubmissionTrigger::Timeout, _) => PendingAnswer::timed_out(
                self.question_id.clone(),
                self.per_question_seconds
                    .unwrap_or_else(|| self.elapsed_seconds()),
            ),
        };

        self.start_submitting(answer)
    }

    /// Resend the answer of the last failed submission.
    pub fn retry(&mut self) -> SubmitDecision {
        match (self.phase, self.pending.clone()) {
            (QuestionPhase::AwaitingAnswer, Some(answer)) => self.start_submitting(answer),
            (QuestionPhase::Submitting, _) => SubmitDecision::Ignored(IgnoredReason::InFlight),
            (QuestionPhase::Graded, _) => SubmitDecision::Ignored(IgnoredReason::AlreadyGraded),
            (QuestionPhase::AwaitingAnswer, None) => {
                SubmitDecision::Ignored(IgnoredReason::NothingToRetry)
            }
        }
    }

    /// The in-flight submission failed; back to `AwaitingAnswer` with the
    /// countdown still stopped.
    pub fn fail(&mut self, error: impl fmt::Display) {
        if self.phase == QuestionPhase::Submitting {
            self.phase = QuestionPhase::AwaitingAnswer;
            self.last_error = Some(error.to_string());
        }
    }

    /// The in-flight submission was graded.
    pub fn graded(&mut self) {
        if self.phase == QuestionPhase::Submitting {
            self.phase = QuestionPhase::Graded;
            self.pending = None;
            self.last_error = None;
        }
    }

    fn start_submitting(&mut self, answer: PendingAnswer) -> SubmitDecision {
        if let Some(countdown) = self.countdown.as_mut() {
            countdown.stop();
        }
        self.phase = QuestionPhase::Submitting;
        self.pending = Some(answer.clone());
        self.last_error = None;
        SubmitDecision::Proceed(answer)
    }

    fn elapsed_seconds(&self) -> u32 {
        u32::try_from(self.shown_at.elapsed().as_secs()).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn qid() -> QuestionId {
        QuestionId::new("q1")
    }

    fn timed(seconds: u32) -> Option<TimedConfig> {
        Some(TimedConfig::new(seconds).unwrap())
    }

    #[test]
    fn timer_wins_a_shared_tick() {
        assert_eq!(resolve_tick(true, true), Some(SubmissionTrigger::Timeout));
        assert_eq!(resolve_tick(false, true), Some(SubmissionTrigger::Manual));
        assert_eq!(resolve_tick(true, false), Some(SubmissionTrigger::Timeout));
        assert_eq!(resolve_tick(false, false), None);
    }

    #[test]
    fn countdown_fires_once() {
        let mut countdown = Countdown::new(2);
        assert!(!countdown.tick());
        assert!(countdown.tick());
        assert!(!countdown.tick());
        assert_eq!(countdown.remaining(), 0);
    }

    #[tokio::test]
    async fn empty_manual_submit_is_ignored() {
        let mut coordinator = SubmissionCoordinator::new(qid(), None);
        assert_eq!(
            coordinator.submit("  "),
            SubmitDecision::Ignored(IgnoredReason::EmptySelection)
        );
        assert_eq!(coordinator.phase(), QuestionPhase::AwaitingAnswer);
    }

    #[tokio::test]
    async fn second_trigger_is_ignored_while_submitting() {
        let mut coordinator = SubmissionCoordinator::new(qid(), timed(1));
        let Some(answer) = coordinator.tick() else {
            panic!("countdown should expire");
        };
        assert!(answer.is_blank());
        assert_eq!(answer.trigger, SubmissionTrigger::Timeout);
        assert_eq!(answer.time_spent_seconds, 1);

        assert_eq!(
            coordinator.submit("B"),
            SubmitDecision::Ignored(IgnoredReason::InFlight)
        );
        assert!(coordinator.tick().is_none());
    }

    #[tokio::test]
    async fn manual_submit_stops_the_countdown() {
        let mut coordinator = SubmissionCoordinator::new(qid(), timed(3));
        assert!(coordinator.tick().is_none());
        assert!(matches!(coordinator.submit("C"), SubmitDecision::Proceed(_)));
        assert!(!coordinator.countdown_running());
        assert!(coordinator.tick().is_none());
        assert!(coordinator.tick().is_none());
        assert_eq!(coordinator.phase(), QuestionPhase::Submitting);
    }

    #[tokio::test]
    async fn failure_keeps_countdown_stopped_and_allows_retry() {
        let mut coordinator = SubmissionCoordinator::new(qid(), timed(30));
        let SubmitDecision::Proceed(sent) = coordinator.submit("A") else {
            panic!("submit should proceed");
        };
        coordinator.fail("connection reset");

        assert_eq!(coordinator.phase(), QuestionPhase::AwaitingAnswer);
        assert_eq!(coordinator.last_error(), Some("connection reset"));
        assert!(!coordinator.countdown_running());
        assert_eq!(coordinator.remaining_seconds(), Some(30));

        assert_eq!(coordinator.retry(), SubmitDecision::Proceed(sent));
        coordinator.graded();
        assert_eq!(coordinator.phase(), QuestionPhase::Graded);
        assert_eq!(
            coordinator.retry(),
            SubmitDecision::Ignored(IgnoredReason::AlreadyGraded)
        );
    }

    #[tokio::test]
    async fn failed_timeout_answer_cannot_be_replaced() {
        let mut coordinator = SubmissionCoordinator::new(qid(), timed(1));
        assert!(coordinator.tick().is_some());
        coordinator.fail("timeout");

        let SubmitDecision::Proceed(answer) = coordinator.submit("A") else {
            panic!("resubmit should proceed");
        };
        assert!(answer.is_blank());
    }

    #[tokio::test]
    async fn retry_without_failure_is_ignored() {
        let mut coordinator = SubmissionCoordinator::new(qid(), None);
        assert_eq!(
            coordinator.retry(),
            SubmitDecision::Ignored(IgnoredReason::NothingToRetry)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn time_spent_is_measured_from_display() {
        let mut coordinator = SubmissionCoordinator::new(qid(), None);
        tokio::time::advance(Duration::from_secs(7)).await;
        let SubmitDecision::Proceed(answer) = coordinator.submit("B") else {
            panic!("submit should proceed");
        };
        assert_eq!(answer.time_spent_seconds, 7);
        assert_eq!(answer.selected_option, "B");
    }
}
