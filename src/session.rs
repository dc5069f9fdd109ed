use crate::assessment::AssessmentDefinition;
use crate::submit::{AnswerEntry, SubmissionPayload};
use crate::util::is_blank;
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::SystemTime;

/// Forward-only session lifecycle. There is no Cancelled or Expired
/// state; the deadline is modeled as an automatic transition to
/// Submitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum SessionStatus {
    NotStarted,
    Active,
    Submitted,
}

/// What a one-second countdown tick produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Session not Active; the tick was ignored.
    Idle,
    /// Time remains on the clock.
    Running,
    /// The clock just hit zero; the caller must auto-submit now.
    DeadlineReached,
}

/// represents one attempt at one assessment, from start to submission
#[derive(Debug)]
pub struct ExamSession {
    definition: AssessmentDefinition,
    status: SessionStatus,
    /// Presentation order: position on screen -> original question index.
    order: Vec<usize>,
    current: usize,
    /// Keyed by original question index, pre-filled at start().
    answers: Vec<String>,
    remaining_seconds: u64,
    fullscreen_exit_count: u32,
    started_at: Option<SystemTime>,
    final_elapsed_seconds: u64,
    auto_submitted: bool,
}

impl ExamSession {
    pub fn new(definition: AssessmentDefinition) -> Self {
        let order = (0..definition.question_count()).collect();
        Self {
            definition,
            status: SessionStatus::NotStarted,
            order,
            current: 0,
            answers: vec![],
            remaining_seconds: 0,
            fullscreen_exit_count: 0,
            started_at: None,
            final_elapsed_seconds: 0,
            auto_submitted: false,
        }
    }

    /// Randomize the order questions are presented in. Answers stay keyed
    /// (and are submitted) by original question index. Only allowed
    /// before the session starts.
    pub fn shuffle_order<R: Rng>(&mut self, rng: &mut R) {
        if self.status == SessionStatus::NotStarted {
            self.order.shuffle(rng);
        }
    }

    /// NotStarted -> Active. The caller invokes this only once fullscreen
    /// compliance has been confirmed, so the countdown never begins out
    /// of compliance.
    pub fn start(&mut self) {
        if self.status != SessionStatus::NotStarted {
            return;
        }
        self.answers = vec![String::new(); self.definition.question_count()];
        self.remaining_seconds = self.definition.time_limit_minutes * 60;
        self.started_at = Some(SystemTime::now());
        self.status = SessionStatus::Active;
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn definition(&self) -> &AssessmentDefinition {
        &self.definition
    }

    pub fn question_count(&self) -> usize {
        self.definition.question_count()
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    pub fn fullscreen_exit_count(&self) -> u32 {
        self.fullscreen_exit_count
    }

    pub fn was_auto_submitted(&self) -> bool {
        self.auto_submitted
    }

    /// Elapsed wall-clock seconds; frozen at its final value once
    /// Submitted.
    pub fn elapsed_seconds(&self) -> u64 {
        if self.status == SessionStatus::Submitted {
            return self.final_elapsed_seconds;
        }
        self.started_at
            .and_then(|t| t.elapsed().ok())
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Position of the question currently on screen, 0-based.
    pub fn current_position(&self) -> usize {
        self.current
    }

    /// Original index of the question currently on screen.
    pub fn current_question_index(&self) -> usize {
        self.order.get(self.current).copied().unwrap_or(0)
    }

    pub fn current_prompt(&self) -> &str {
        &self.definition.questions[self.current_question_index()].prompt
    }

    pub fn current_answer(&self) -> &str {
        self.answers
            .get(self.current_question_index())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn answer_at(&self, question_index: usize) -> Option<&str> {
        self.answers.get(question_index).map(String::as_str)
    }

    /// Replace the answer for the question at `question_index` verbatim.
    /// Last write wins; empty text is a legitimate value.
    pub fn set_answer(&mut self, question_index: usize, text: String) {
        if self.status != SessionStatus::Active {
            return;
        }
        if let Some(slot) = self.answers.get_mut(question_index) {
            *slot = text;
        }
    }

    /// Append one character to the answer currently being edited.
    pub fn push_answer_char(&mut self, c: char) {
        if self.status != SessionStatus::Active {
            return;
        }
        let idx = self.current_question_index();
        if let Some(slot) = self.answers.get_mut(idx) {
            slot.push(c);
        }
    }

    /// Delete the last character of the answer currently being edited.
    pub fn pop_answer_char(&mut self) {
        if self.status != SessionStatus::Active {
            return;
        }
        let idx = self.current_question_index();
        if let Some(slot) = self.answers.get_mut(idx) {
            slot.pop();
        }
    }

    /// Jump to a presentation position, clamped into range. View-state
    /// only; answers and the clock are untouched.
    pub fn navigate_to(&mut self, position: usize) {
        if self.status != SessionStatus::Active {
            return;
        }
        let last = self.question_count().saturating_sub(1);
        self.current = position.min(last);
    }

    pub fn next_question(&mut self) {
        self.navigate_to(self.current.saturating_add(1));
    }

    pub fn prev_question(&mut self) {
        self.navigate_to(self.current.saturating_sub(1));
    }

    /// One-second countdown tick. Clamps at zero; the tick that reaches
    /// zero reports the deadline exactly once so the caller performs the
    /// auto-submit.
    pub fn on_countdown_tick(&mut self) -> TickOutcome {
        if self.status != SessionStatus::Active {
            return TickOutcome::Idle;
        }
        if self.remaining_seconds <= 1 {
            self.remaining_seconds = 0;
            return TickOutcome::DeadlineReached;
        }
        self.remaining_seconds -= 1;
        TickOutcome::Running
    }

    /// Bump the exit counter for one compliance-loss event. Returns the
    /// cumulative count for the warning banner.
    pub fn record_compliance_loss(&mut self) -> u32 {
        if self.status == SessionStatus::Active {
            self.fullscreen_exit_count += 1;
        }
        self.fullscreen_exit_count
    }

    pub fn unanswered_count(&self) -> usize {
        self.answers.iter().filter(|a| is_blank(a)).count()
    }

    /// 1-based on-screen numbers of unanswered questions, in the order
    /// they are presented. Feeds the manual-submit confirmation.
    pub fn unanswered_display_numbers(&self) -> Vec<usize> {
        self.order
            .iter()
            .enumerate()
            .filter(|(_, &qi)| self.answers.get(qi).map(|a| is_blank(a)).unwrap_or(true))
            .map(|(pos, _)| pos + 1)
            .collect()
    }

    /// Active -> Submitted. Freezes every counter and yields the single
    /// submission payload, answers in original question order. A second
    /// call is a no-op returning None.
    pub fn submit(&mut self, auto: bool) -> Option<SubmissionPayload> {
        if self.status != SessionStatus::Active {
            return None;
        }
        self.final_elapsed_seconds = self
            .started_at
            .and_then(|t| t.elapsed().ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.status = SessionStatus::Submitted;
        self.auto_submitted = auto;

        Some(SubmissionPayload {
            test_id: self.definition.id.clone(),
            answers: self
                .answers
                .iter()
                .enumerate()
                .map(|(question_index, answer_text)| AnswerEntry {
                    question_index,
                    answer_text: answer_text.clone(),
                })
                .collect(),
            elapsed_seconds: self.final_elapsed_seconds,
            fullscreen_exit_count: self.fullscreen_exit_count,
        })
    }
}
