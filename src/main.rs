pub mod app_dirs;
pub mod assessment;
pub mod config;
pub mod history;
pub mod proctor;
pub mod runtime;
pub mod session;
pub mod submit;
pub mod ui;
pub mod util;

use crate::{
    assessment::{load_paper, sample_papers, AssessmentDefinition, HttpCatalog},
    config::{Config, ConfigStore, FileConfigStore},
    history::{AttemptDb, AttemptRecord},
    proctor::{
        blocked_while_active, ComplianceAction, ComplianceMonitor, FullscreenDriver,
        TerminalFullscreen,
    },
    runtime::{
        spawn_countdown, CrosstermEventSource, EventSource, FixedTicker, ProctorEvent, Runner,
        Ticker, TickerGuard,
    },
    session::{ExamSession, TickOutcome},
    submit::{HttpSink, LocalSink, SubmissionSink, SubmitError},
    util::is_blank,
};
use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{DisableFocusChange, EnableFocusChange, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    time::Duration,
};

const COUNTDOWN_PERIOD_MS: u64 = 1000;

/// terminal runner for proctored timed assessments
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Runs timed assessments inside a locked terminal screen, tracking fullscreen compliance and delivering answers to the assessment service (or to local receipts when offline)."
)]
pub struct Cli {
    /// base URL of the assessment service; omit to run the bundled sample papers
    #[clap(short = 'u', long)]
    base_url: Option<String>,

    /// run a single paper loaded from a local JSON file
    #[clap(short = 'p', long)]
    paper: Option<PathBuf>,

    /// preselect the assessment with this id in the catalog
    #[clap(short = 'a', long)]
    assessment: Option<String>,

    /// randomize the order questions are presented in
    #[clap(long)]
    shuffle: bool,

    /// open on the attempt history instead of the catalog
    #[clap(long)]
    history: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppState {
    Catalog,
    Launching,
    Active,
    Confirming,
    Results,
    History,
}

/// What the results screen shows once a session is terminal.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub title: String,
    pub answered: usize,
    pub total: usize,
    pub elapsed_seconds: u64,
    pub fullscreen_exits: u32,
    pub auto_submitted: bool,
    pub delivery_error: Option<String>,
}

pub struct App {
    pub config: Config,
    pub catalog: Vec<AssessmentDefinition>,
    pub catalog_notice: Option<String>,
    pub selected: usize,
    pub session: Option<ExamSession>,
    pub monitor: ComplianceMonitor,
    pub state: AppState,
    pub notice: Option<String>,
    pub outcome: Option<SessionOutcome>,
    pub history_rows: Vec<AttemptRecord>,
    sink: Box<dyn SubmissionSink>,
    attempt_db: Option<AttemptDb>,
}

impl App {
    pub fn new(
        config: Config,
        catalog: Vec<AssessmentDefinition>,
        sink: Box<dyn SubmissionSink>,
        attempt_db: Option<AttemptDb>,
    ) -> Self {
        Self {
            config,
            catalog,
            catalog_notice: None,
            selected: 0,
            session: None,
            monitor: ComplianceMonitor::new(),
            state: AppState::Catalog,
            notice: None,
            outcome: None,
            history_rows: vec![],
            sink,
            attempt_db,
        }
    }

    pub fn selected_paper(&self) -> Option<&AssessmentDefinition> {
        self.catalog.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.catalog.len() {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn preselect(&mut self, id: &str) {
        if let Some(pos) = self.catalog.iter().position(|p| p.id == id) {
            self.selected = pos;
        }
    }

    /// Catalog -> Launching. The session is created fresh per attempt
    /// but starts only once the locked screen is confirmed.
    pub fn begin_launch(&mut self) {
        let Some(paper) = self.selected_paper() else {
            return;
        };
        if let Err(e) = paper.validate() {
            self.catalog_notice = Some(e.to_string());
            return;
        }

        let mut session = ExamSession::new(paper.clone());
        if self.config.shuffle {
            session.shuffle_order(&mut rand::thread_rng());
        }
        self.session = Some(session);
        self.monitor = ComplianceMonitor::new();
        self.notice = Some("Preparing the locked screen…".to_string());
        self.state = AppState::Launching;
    }

    pub fn cancel_launch(&mut self) {
        self.session = None;
        self.notice = None;
        self.state = AppState::Catalog;
    }

    /// F9 while Active: gate the manual path behind confirmation when
    /// unanswered questions remain.
    pub fn request_manual_submit(&mut self) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        if session.unanswered_count() > 0 {
            self.state = AppState::Confirming;
            false
        } else {
            true
        }
    }

    pub fn decline_confirmation(&mut self) {
        if self.state == AppState::Confirming {
            self.state = AppState::Active;
        }
    }

    /// Active -> Submitted by either path. The countdown is already
    /// cancelled by the caller; the session freezes itself, the one
    /// payload is delivered, and the attempt is remembered locally.
    pub fn finish_session(&mut self, auto: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(payload) = session.submit(auto) else {
            return;
        };

        let delivery = self.sink.deliver(&payload);
        let delivery_error = match &delivery {
            Ok(()) => None,
            Err(SubmitError::Rejected(msg)) => Some(msg.clone()),
            Err(e) => Some(e.to_string()),
        };
        if delivery.is_err() {
            // Keep the payload for a supervised resubmission
            let _ = LocalSink::new().deliver(&payload);
        }

        let answered = payload
            .answers
            .iter()
            .filter(|a| !is_blank(&a.answer_text))
            .count();

        if let Some(db) = &self.attempt_db {
            let _ = db.record_attempt(&AttemptRecord {
                assessment_id: payload.test_id.clone(),
                title: session.definition().title.clone(),
                submitted_at: chrono::Local::now(),
                answered: answered as u32,
                total: session.question_count() as u32,
                elapsed_seconds: payload.elapsed_seconds,
                fullscreen_exits: payload.fullscreen_exit_count,
                delivered: delivery.is_ok(),
                auto_submitted: auto,
            });
        }

        self.outcome = Some(SessionOutcome {
            title: session.definition().title.clone(),
            answered,
            total: session.question_count(),
            elapsed_seconds: payload.elapsed_seconds,
            fullscreen_exits: payload.fullscreen_exit_count,
            auto_submitted: auto,
            delivery_error,
        });
        self.notice = None;
        self.state = AppState::Results;
    }

    pub fn back_to_catalog(&mut self) {
        self.session = None;
        self.notice = None;
        self.state = AppState::Catalog;
    }

    pub fn load_history(&mut self) {
        if let Some(db) = &self.attempt_db {
            self.history_rows = db.recent(50).unwrap_or_default();
        }
        self.state = AppState::History;
    }

    pub fn reload_catalog(&mut self) {
        match &self.config.base_url {
            Some(base) => match HttpCatalog::new(base.clone()).list() {
                Ok(papers) => {
                    self.catalog = papers;
                    self.catalog_notice = None;
                }
                Err(e) => {
                    self.catalog_notice =
                        Some(format!("Could not load the catalog: {} — press r to retry", e));
                }
            },
            None => {
                self.catalog = sample_papers();
                self.catalog_notice = None;
            }
        }
        self.selected = 0;
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let store = FileConfigStore::new();
    let mut config = store.load();
    if let Some(base) = &cli.base_url {
        config.base_url = Some(base.clone());
    }
    if cli.shuffle {
        config.shuffle = true;
    }

    // Resolve catalog and sink before touching the terminal
    let mut catalog_notice = None;
    let catalog = if let Some(path) = &cli.paper {
        vec![load_paper(path)?]
    } else if let Some(base) = &config.base_url {
        match HttpCatalog::new(base.clone()).list() {
            Ok(papers) => papers,
            Err(e) => {
                catalog_notice =
                    Some(format!("Could not load the catalog: {} — press r to retry", e));
                vec![]
            }
        }
    } else {
        sample_papers()
    };

    let sink: Box<dyn SubmissionSink> = match (&cli.paper, &config.base_url) {
        (None, Some(base)) => Box::new(HttpSink::new(base.clone())),
        _ => Box::new(LocalSink::new()),
    };

    enable_raw_mode()?;
    execute!(io::stdout(), EnableFocusChange)?;

    let mut driver = TerminalFullscreen::new();
    driver.engage()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(config, catalog, sink, AttemptDb::new().ok());
    app.catalog_notice = catalog_notice;
    if let Some(id) = &cli.assessment {
        app.preselect(id);
    }
    if cli.history {
        app.load_history();
    }

    let poll = Duration::from_millis(app.config.poll_interval_ms.max(50));
    let runner = Runner::new(CrosstermEventSource::new(), FixedTicker::new(poll));

    let res = run_app(&mut terminal, &mut app, &runner, &mut driver);

    execute!(io::stdout(), DisableFocusChange)?;
    driver.release()?;
    disable_raw_mode()?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: Backend, E: EventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<E, T>,
    driver: &mut dyn FullscreenDriver,
) -> Result<(), Box<dyn Error>> {
    // Countdown handle for the running session; cancelled on any
    // terminal transition so no late tick reaches a frozen session.
    let mut countdown: Option<TickerGuard> = None;

    loop {
        terminal.draw(|f| ui::render(app, f))?;

        match runner.step() {
            ProctorEvent::Resize => {}

            ProctorEvent::Focus(focused) => {
                driver.note_focus(focused);
            }

            ProctorEvent::CountdownTick => {
                if let Some(session) = app.session.as_mut() {
                    if session.on_countdown_tick() == TickOutcome::DeadlineReached {
                        // Hard deadline: submit without confirmation,
                        // even if the confirm overlay is open
                        cancel_countdown(&mut countdown);
                        app.finish_session(true);
                    }
                }
            }

            ProctorEvent::CompliancePoll => match app.state {
                AppState::Launching => {
                    match driver.engage() {
                        Ok(()) => {
                            if let Some(session) = app.session.as_mut() {
                                session.start();
                            }
                            countdown = Some(spawn_countdown(
                                runner.sender(),
                                Duration::from_millis(COUNTDOWN_PERIOD_MS),
                            ));
                            app.notice = None;
                            app.state = AppState::Active;
                        }
                        Err(e) => {
                            app.notice = Some(format!("{} — retrying", e));
                        }
                    }
                }
                AppState::Active | AppState::Confirming => {
                    if let Some(session) = app.session.as_mut() {
                        match app.monitor.observe(driver.is_engaged()) {
                            ComplianceAction::Compliant => {}
                            ComplianceAction::RecordLoss => {
                                let count = session.record_compliance_loss();
                                app.notice = Some(format!(
                                    "Fullscreen exited {} time(s) — returning to the locked screen",
                                    count
                                ));
                            }
                            ComplianceAction::Reacquire => {
                                // Rejection is recoverable; the next poll retries
                                if driver.engage().is_ok() {
                                    app.notice = None;
                                }
                            }
                        }
                    }
                }
                _ => {}
            },

            ProctorEvent::Key(key) => {
                let ctrl_c = key.modifiers.contains(KeyModifiers::CONTROL)
                    && key.code == KeyCode::Char('c');

                match app.state {
                    AppState::Catalog => match key.code {
                        KeyCode::Up => app.select_prev(),
                        KeyCode::Down => app.select_next(),
                        KeyCode::Enter => app.begin_launch(),
                        KeyCode::Char('r') => app.reload_catalog(),
                        KeyCode::Char('h') => app.load_history(),
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        _ if ctrl_c => break,
                        _ => {}
                    },

                    AppState::Launching => match key.code {
                        KeyCode::Esc => app.cancel_launch(),
                        _ if ctrl_c => break,
                        _ => {}
                    },

                    AppState::Active => {
                        if ctrl_c {
                            // Abandon the attempt; nothing is submitted
                            cancel_countdown(&mut countdown);
                            break;
                        }
                        if blocked_while_active(&key) {
                            app.notice =
                                Some("That key is blocked during the assessment".to_string());
                        } else if key.code == KeyCode::F(9) {
                            if app.request_manual_submit() {
                                cancel_countdown(&mut countdown);
                                app.finish_session(false);
                            }
                        } else if let Some(session) = app.session.as_mut() {
                            match key.code {
                                KeyCode::Char(c) => session.push_answer_char(c),
                                KeyCode::Backspace => session.pop_answer_char(),
                                KeyCode::Up | KeyCode::BackTab => session.prev_question(),
                                KeyCode::Down | KeyCode::Tab | KeyCode::Enter => {
                                    session.next_question()
                                }
                                _ => {}
                            }
                        }
                    }

                    AppState::Confirming => {
                        if ctrl_c {
                            cancel_countdown(&mut countdown);
                            break;
                        }
                        if blocked_while_active(&key) {
                            app.notice =
                                Some("That key is blocked during the assessment".to_string());
                        } else {
                            match key.code {
                                KeyCode::Char('y') | KeyCode::Char('Y') => {
                                    cancel_countdown(&mut countdown);
                                    app.finish_session(false);
                                }
                                KeyCode::Char('n') | KeyCode::Char('N') => {
                                    app.decline_confirmation()
                                }
                                _ => {}
                            }
                        }
                    }

                    AppState::Results => match key.code {
                        KeyCode::Enter | KeyCode::Char('b') => app.back_to_catalog(),
                        KeyCode::Char('h') => app.load_history(),
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        _ if ctrl_c => break,
                        _ => {}
                    },

                    AppState::History => match key.code {
                        KeyCode::Char('b') | KeyCode::Backspace => {
                            app.state = if app.outcome.is_some() {
                                AppState::Results
                            } else {
                                AppState::Catalog
                            };
                        }
                        KeyCode::Char('e') => {
                            if let Some(db) = &app.attempt_db {
                                app.notice = match db.export_csv("invigil_attempts.csv") {
                                    Ok(n) => Some(format!(
                                        "Exported {} attempt(s) to invigil_attempts.csv",
                                        n
                                    )),
                                    Err(e) => Some(format!("Export failed: {}", e)),
                                };
                            }
                        }
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        _ if ctrl_c => break,
                        _ => {}
                    },
                }
            }
        }
    }

    cancel_countdown(&mut countdown);
    Ok(())
}

fn cancel_countdown(countdown: &mut Option<TickerGuard>) {
    if let Some(guard) = countdown.as_mut() {
        guard.cancel();
    }
    // Dropping the guard joins the ticker thread
    *countdown = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::Question;
    use crate::submit::SubmissionPayload;
    use clap::Parser;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingSink {
        delivered: Arc<Mutex<Vec<SubmissionPayload>>>,
        fail_with: Arc<Mutex<Option<String>>>,
    }

    impl SubmissionSink for RecordingSink {
        fn deliver(&self, payload: &SubmissionPayload) -> Result<(), SubmitError> {
            if let Some(msg) = self.fail_with.lock().unwrap().clone() {
                return Err(SubmitError::Rejected(msg));
            }
            self.delivered.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    fn paper(questions: usize, minutes: u64) -> AssessmentDefinition {
        AssessmentDefinition {
            id: "app-test".into(),
            title: "App test paper".into(),
            time_limit_minutes: minutes,
            questions: (0..questions)
                .map(|i| Question {
                    prompt: format!("Question {}", i + 1),
                })
                .collect(),
        }
    }

    fn app_with(papers: Vec<AssessmentDefinition>) -> (App, RecordingSink) {
        let sink = RecordingSink::default();
        let app = App::new(Config::default(), papers, Box::new(sink.clone()), None);
        (app, sink)
    }

    fn launched_app(questions: usize, minutes: u64) -> (App, RecordingSink) {
        let (mut app, sink) = app_with(vec![paper(questions, minutes)]);
        app.begin_launch();
        app.session.as_mut().unwrap().start();
        app.state = AppState::Active;
        (app, sink)
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["invigil"]);

        assert_eq!(cli.base_url, None);
        assert_eq!(cli.paper, None);
        assert_eq!(cli.assessment, None);
        assert!(!cli.shuffle);
        assert!(!cli.history);
    }

    #[test]
    fn test_cli_base_url() {
        let cli = Cli::parse_from(["invigil", "-u", "https://school.example.org"]);
        assert_eq!(cli.base_url.as_deref(), Some("https://school.example.org"));

        let cli = Cli::parse_from(["invigil", "--base-url", "http://localhost:8080"]);
        assert_eq!(cli.base_url.as_deref(), Some("http://localhost:8080"));
    }

    #[test]
    fn test_cli_paper_and_assessment() {
        let cli = Cli::parse_from(["invigil", "-p", "paper.json", "-a", "geo-1"]);
        assert_eq!(cli.paper, Some(PathBuf::from("paper.json")));
        assert_eq!(cli.assessment.as_deref(), Some("geo-1"));
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from(["invigil", "--shuffle", "--history"]);
        assert!(cli.shuffle);
        assert!(cli.history);
    }

    #[test]
    fn test_catalog_selection_clamps() {
        let (mut app, _) = app_with(vec![paper(3, 5), paper(4, 5)]);

        app.select_prev();
        assert_eq!(app.selected, 0);

        app.select_next();
        app.select_next();
        app.select_next();
        assert_eq!(app.selected, 1);
    }

    #[test]
    fn test_preselect_by_id() {
        let mut second = paper(3, 5);
        second.id = "other".into();
        let (mut app, _) = app_with(vec![paper(3, 5), second]);

        app.preselect("other");
        assert_eq!(app.selected, 1);

        app.preselect("missing");
        assert_eq!(app.selected, 1);
    }

    #[test]
    fn test_begin_launch_creates_fresh_session() {
        let (mut app, _) = app_with(vec![paper(5, 10)]);

        app.begin_launch();

        assert_eq!(app.state, AppState::Launching);
        let session = app.session.as_ref().unwrap();
        assert_eq!(session.question_count(), 5);
        assert!(!session.is_active());
    }

    #[test]
    fn test_begin_launch_rejects_invalid_paper() {
        let (mut app, _) = app_with(vec![paper(0, 10)]);

        app.begin_launch();

        assert_eq!(app.state, AppState::Catalog);
        assert!(app.session.is_none());
        assert!(app.catalog_notice.is_some());
    }

    #[test]
    fn test_cancel_launch_discards_session() {
        let (mut app, _) = app_with(vec![paper(5, 10)]);
        app.begin_launch();

        app.cancel_launch();

        assert_eq!(app.state, AppState::Catalog);
        assert!(app.session.is_none());
    }

    #[test]
    fn test_manual_submit_with_unanswered_requires_confirmation() {
        let (mut app, sink) = launched_app(5, 10);

        let proceed = app.request_manual_submit();

        assert!(!proceed);
        assert_eq!(app.state, AppState::Confirming);
        assert!(sink.delivered.lock().unwrap().is_empty());
    }

    #[test]
    fn test_declining_confirmation_keeps_session_active() {
        let (mut app, sink) = launched_app(5, 10);
        app.request_manual_submit();

        app.decline_confirmation();

        assert_eq!(app.state, AppState::Active);
        assert!(app.session.as_ref().unwrap().is_active());
        assert!(sink.delivered.lock().unwrap().is_empty());
    }

    #[test]
    fn test_manual_submit_with_all_answered_proceeds() {
        let (mut app, _) = launched_app(2, 10);
        {
            let session = app.session.as_mut().unwrap();
            session.set_answer(0, "a".into());
            session.set_answer(1, "b".into());
        }

        assert!(app.request_manual_submit());
    }

    #[test]
    fn test_finish_session_delivers_exactly_one_payload() {
        let (mut app, sink) = launched_app(3, 10);

        app.finish_session(false);
        app.finish_session(false);

        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
        assert_eq!(app.state, AppState::Results);
        let outcome = app.outcome.as_ref().unwrap();
        assert_eq!(outcome.total, 3);
        assert!(outcome.delivery_error.is_none());
    }

    #[test]
    fn test_finish_session_records_delivery_failure() {
        let (mut app, sink) = launched_app(3, 10);
        *sink.fail_with.lock().unwrap() = Some("duplicate submission".into());

        app.finish_session(false);

        let outcome = app.outcome.as_ref().unwrap();
        assert_eq!(outcome.delivery_error.as_deref(), Some("duplicate submission"));
        // The session is terminal regardless of the delivery result
        assert!(!app.session.as_ref().unwrap().is_active());
    }

    #[test]
    fn test_auto_finish_skips_confirmation() {
        let (mut app, sink) = launched_app(5, 10);
        // All five unanswered, yet the deadline path never asks
        app.finish_session(true);

        assert_eq!(app.state, AppState::Results);
        assert!(app.outcome.as_ref().unwrap().auto_submitted);
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_outcome_counts_answered_questions() {
        let (mut app, _) = launched_app(5, 10);
        {
            let session = app.session.as_mut().unwrap();
            session.set_answer(0, "x".into());
            session.set_answer(2, "  ".into()); // whitespace-only stays unanswered
            session.set_answer(4, "y".into());
        }

        app.finish_session(false);

        let outcome = app.outcome.as_ref().unwrap();
        assert_eq!(outcome.answered, 2);
        assert_eq!(outcome.total, 5);
    }

    #[test]
    fn test_back_to_catalog_discards_session() {
        let (mut app, _) = launched_app(3, 10);
        app.finish_session(false);

        app.back_to_catalog();

        assert_eq!(app.state, AppState::Catalog);
        assert!(app.session.is_none());
    }

    #[test]
    fn test_compliance_loss_via_monitor_updates_session() {
        let (mut app, _) = launched_app(3, 10);

        // Simulate the poll path: engaged -> lost -> lost
        assert_eq!(app.monitor.observe(true), ComplianceAction::Compliant);
        assert_eq!(app.monitor.observe(false), ComplianceAction::RecordLoss);
        let count = app.session.as_mut().unwrap().record_compliance_loss();
        assert_eq!(count, 1);
        assert_eq!(app.monitor.observe(false), ComplianceAction::Reacquire);
    }

    #[test]
    fn test_countdown_period_constant() {
        assert_eq!(COUNTDOWN_PERIOD_MS, 1000);

        const _: () = assert!(COUNTDOWN_PERIOD_MS >= 1000); // one-second resolution
    }
}
