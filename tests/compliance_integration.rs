// Compliance monitoring driven through a scripted fullscreen driver,
// the way the app loop wires monitor, driver, and session together.

use invigil::assessment::{AssessmentDefinition, Question};
use invigil::proctor::{ComplianceAction, ComplianceMonitor, FullscreenDriver, ProctorError};
use invigil::session::{ExamSession, SessionStatus};

fn paper(questions: usize, minutes: u64) -> AssessmentDefinition {
    AssessmentDefinition {
        id: "compliance".into(),
        title: "Compliance paper".into(),
        time_limit_minutes: minutes,
        questions: (0..questions)
            .map(|i| Question {
                prompt: format!("Question {}", i + 1),
            })
            .collect(),
    }
}

/// Driver whose focus is scripted from the test; engage() is rejected
/// while unfocused, like the real terminal.
struct ScriptedDriver {
    focused: bool,
    engaged: bool,
    engage_attempts: u32,
}

impl ScriptedDriver {
    fn new() -> Self {
        Self {
            focused: true,
            engaged: false,
            engage_attempts: 0,
        }
    }
}

impl FullscreenDriver for ScriptedDriver {
    fn engage(&mut self) -> Result<(), ProctorError> {
        self.engage_attempts += 1;
        if !self.focused {
            return Err(ProctorError::Unfocused);
        }
        self.engaged = true;
        Ok(())
    }

    fn release(&mut self) -> Result<(), ProctorError> {
        self.engaged = false;
        Ok(())
    }

    fn is_engaged(&self) -> bool {
        self.engaged && self.focused
    }

    fn note_focus(&mut self, focused: bool) {
        self.focused = focused;
        if !focused {
            self.engaged = false;
        }
    }
}

/// One poll iteration as the app loop performs it.
fn poll(
    session: &mut ExamSession,
    monitor: &mut ComplianceMonitor,
    driver: &mut ScriptedDriver,
) -> ComplianceAction {
    let action = monitor.observe(driver.is_engaged());
    match action {
        ComplianceAction::Compliant => {}
        ComplianceAction::RecordLoss => {
            session.record_compliance_loss();
        }
        ComplianceAction::Reacquire => {
            let _ = driver.engage();
        }
    }
    action
}

#[test]
fn three_losses_are_recorded_and_reacquired() {
    let mut session = ExamSession::new(paper(4, 10));
    let mut monitor = ComplianceMonitor::new();
    let mut driver = ScriptedDriver::new();

    driver.engage().unwrap();
    session.start();
    let baseline_attempts = driver.engage_attempts;

    for _ in 0..3 {
        // Focus lost: the loss is recorded on one poll, re-acquired on
        // the next once focus is back
        driver.note_focus(false);
        assert_eq!(poll(&mut session, &mut monitor, &mut driver), ComplianceAction::RecordLoss);

        driver.note_focus(true);
        assert_eq!(poll(&mut session, &mut monitor, &mut driver), ComplianceAction::Reacquire);
        assert_eq!(poll(&mut session, &mut monitor, &mut driver), ComplianceAction::Compliant);
    }

    assert_eq!(session.fullscreen_exit_count(), 3);
    assert_eq!(driver.engage_attempts - baseline_attempts, 3);

    let payload = session.submit(false).unwrap();
    assert_eq!(payload.fullscreen_exit_count, 3);
}

#[test]
fn rejected_reacquisition_retries_until_focus_returns() {
    let mut session = ExamSession::new(paper(2, 10));
    let mut monitor = ComplianceMonitor::new();
    let mut driver = ScriptedDriver::new();

    driver.engage().unwrap();
    session.start();

    driver.note_focus(false);
    assert_eq!(poll(&mut session, &mut monitor, &mut driver), ComplianceAction::RecordLoss);

    // Still unfocused: every poll retries, every engage is rejected
    for _ in 0..10 {
        assert_eq!(poll(&mut session, &mut monitor, &mut driver), ComplianceAction::Reacquire);
        assert!(!driver.is_engaged());
    }

    // The session never fails from repeated loss; only the counter moved
    assert_eq!(session.status(), SessionStatus::Active);
    assert_eq!(session.fullscreen_exit_count(), 1);

    driver.note_focus(true);
    assert_eq!(poll(&mut session, &mut monitor, &mut driver), ComplianceAction::Reacquire);
    assert!(driver.is_engaged());
    assert_eq!(poll(&mut session, &mut monitor, &mut driver), ComplianceAction::Compliant);
}

#[test]
fn monitoring_stops_mattering_after_submission() {
    let mut session = ExamSession::new(paper(2, 10));
    let mut monitor = ComplianceMonitor::new();
    let mut driver = ScriptedDriver::new();

    driver.engage().unwrap();
    session.start();

    driver.note_focus(false);
    poll(&mut session, &mut monitor, &mut driver);
    assert_eq!(session.fullscreen_exit_count(), 1);

    session.submit(false).unwrap();

    // Recover compliance, then lose it again: the loss event fires in
    // the monitor but cannot move the frozen counter
    driver.note_focus(true);
    driver.engage().unwrap();
    assert_eq!(poll(&mut session, &mut monitor, &mut driver), ComplianceAction::Compliant);

    driver.note_focus(false);
    assert_eq!(poll(&mut session, &mut monitor, &mut driver), ComplianceAction::RecordLoss);

    assert_eq!(session.fullscreen_exit_count(), 1);
}
