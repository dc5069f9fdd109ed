use std::io;

use crossterm::cursor::{Hide, Show};
use crossterm::event::{KeyCode, KeyEvent};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProctorError {
    /// The platform refused the request; recoverable, the monitor
    /// retries on the next poll.
    #[error("terminal is not focused; cannot re-enter the locked screen")]
    Unfocused,
    #[error("terminal control failed: {0}")]
    Terminal(#[from] io::Error),
}

/// Capability interface over the locked fullscreen view, injected into
/// the app loop so tests can fake acquisition failures and compliance
/// loss deterministically.
pub trait FullscreenDriver {
    /// Request the locked view. May be rejected (e.g. the terminal
    /// window is not focused and focus cannot be forced).
    fn engage(&mut self) -> Result<(), ProctorError>;

    /// Leave the locked view.
    fn release(&mut self) -> Result<(), ProctorError>;

    fn is_engaged(&self) -> bool;

    /// Focus change reported by the platform event stream.
    fn note_focus(&mut self, focused: bool);
}

/// Production driver: the raw-mode alternate screen plus terminal focus.
/// Losing window focus is the compliance loss; it cannot be reversed
/// programmatically, so engage() fails until focus returns — the same
/// recoverable-rejection shape a browser fullscreen request has.
#[derive(Debug)]
pub struct TerminalFullscreen {
    screen_active: bool,
    focused: bool,
    engaged: bool,
}

impl TerminalFullscreen {
    pub fn new() -> Self {
        Self {
            screen_active: false,
            // Assume focus at launch; the first FocusLost corrects this.
            focused: true,
            engaged: false,
        }
    }
}

impl Default for TerminalFullscreen {
    fn default() -> Self {
        Self::new()
    }
}

impl FullscreenDriver for TerminalFullscreen {
    fn engage(&mut self) -> Result<(), ProctorError> {
        if !self.focused {
            return Err(ProctorError::Unfocused);
        }
        if !self.screen_active {
            execute!(io::stdout(), EnterAlternateScreen, Hide)?;
            self.screen_active = true;
        }
        self.engaged = true;
        Ok(())
    }

    fn release(&mut self) -> Result<(), ProctorError> {
        if self.screen_active {
            execute!(io::stdout(), LeaveAlternateScreen, Show)?;
            self.screen_active = false;
        }
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

/// What one compliance poll observation asks the caller to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum ComplianceAction {
    /// Still in the locked view; nothing to do.
    Compliant,
    /// Compliance was just lost: bump the exit counter and warn. The
    /// re-request happens on the next poll, so the warning gets a
    /// chance to render first.
    RecordLoss,
    /// Still out of compliance: re-request the locked view. Repeats on
    /// every poll until it succeeds; the monitor never gives up.
    Reacquire,
}

/// Edge-detecting poll logic for the compliance loop. One observation
/// per sub-second poll while the session is Active; the poll interval
/// doubles as the fixed retry delay.
#[derive(Debug, Default)]
pub struct ComplianceMonitor {
    lost: bool,
}

impl ComplianceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, engaged: bool) -> ComplianceAction {
        if engaged {
            self.lost = false;
            ComplianceAction::Compliant
        } else if !self.lost {
            self.lost = true;
            ComplianceAction::RecordLoss
        } else {
            ComplianceAction::Reacquire
        }
    }
}

/// Keys swallowed while a session is Active: the key that natively
/// leaves the locked view and the fullscreen toggle. A UX affordance,
/// not a security boundary.
pub fn blocked_while_active(key: &KeyEvent) -> bool {
    matches!(key.code, KeyCode::Esc | KeyCode::F(11))
}
