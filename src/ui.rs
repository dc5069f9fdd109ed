use itertools::Itertools;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap},
    Frame,
};
use time_humanize::HumanTime;
use unicode_width::UnicodeWidthStr;

use crate::session::ExamSession;
use crate::util::format_clock;
use crate::{App, AppState};

const HORIZONTAL_MARGIN: u16 = 4;

pub fn render(app: &App, f: &mut Frame) {
    match app.state {
        AppState::Catalog => render_catalog(app, f),
        AppState::Launching => render_launching(app, f),
        AppState::Active => render_active(app, f, false),
        AppState::Confirming => render_active(app, f, true),
        AppState::Results => render_results(app, f),
        AppState::History => render_history(app, f),
    }
}

fn footer(text: &str) -> Paragraph<'_> {
    Paragraph::new(text)
        .style(
            Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::ITALIC),
        )
        .alignment(Alignment::Center)
}

fn render_catalog(app: &App, f: &mut Frame) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(2),
            Constraint::Length(2),
        ])
        .split(f.area());

    let title = Paragraph::new("Available assessments")
        .block(Block::default().borders(Borders::ALL).title("invigil"))
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center);
    f.render_widget(title, chunks[0]);

    if app.catalog.is_empty() {
        let empty = Paragraph::new("No assessments available.")
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center);
        f.render_widget(empty, chunks[1]);
    } else {
        let rows: Vec<Row> = app
            .catalog
            .iter()
            .enumerate()
            .map(|(idx, paper)| {
                let style = if idx == app.selected {
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                Row::new(vec![
                    Cell::from(paper.title.clone()),
                    Cell::from(format!("{} questions", paper.question_count())),
                    Cell::from(format!("{} min", paper.time_limit_minutes)),
                ])
                .style(style)
            })
            .collect();

        let table = Table::new(
            rows,
            &[
                Constraint::Min(30),
                Constraint::Length(14),
                Constraint::Length(8),
            ],
        )
        .block(Block::default().borders(Borders::ALL));
        f.render_widget(table, chunks[1]);
    }

    if let Some(notice) = &app.catalog_notice {
        let warn = Paragraph::new(notice.as_str())
            .style(Style::default().fg(Color::Yellow))
            .alignment(Alignment::Center);
        f.render_widget(warn, chunks[2]);
    }

    f.render_widget(
        footer("(↑/↓) select  (enter) begin  (r) reload  (h) history  (q) quit"),
        chunks[3],
    );
}

fn render_launching(app: &App, f: &mut Frame) {
    let message = app
        .notice
        .clone()
        .unwrap_or_else(|| "Preparing the locked screen…".to_string());

    let widget = Paragraph::new(Span::styled(
        message,
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::ITALIC),
    ))
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true });

    f.render_widget(widget, centered_rect(f.area(), 60, 20));
}

fn render_active(app: &App, f: &mut Frame, confirming: bool) {
    let Some(session) = app.session.as_ref() else {
        return;
    };

    let area = f.area();
    let max_chars_per_line = area.width.saturating_sub(HORIZONTAL_MARGIN * 2).max(1);
    let prompt = session.current_prompt();
    let prompt_lines = ((prompt.width() as f64 / max_chars_per_line as f64).ceil() as u16).max(1);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(1)
        .constraints([
            Constraint::Length(2),               // header: position + clock
            Constraint::Length(1),               // warning banner
            Constraint::Length(prompt_lines + 2), // question
            Constraint::Length(3),               // answer box
            Constraint::Min(0),
            Constraint::Length(2),               // footer
        ])
        .split(area);

    let header = Line::from(vec![
        Span::styled(
            format!(
                "{}  ·  question {}/{}",
                session.definition().title,
                session.current_position() + 1,
                session.question_count()
            ),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw("   "),
        Span::styled(
            format_clock(session.remaining_seconds()),
            if session.remaining_seconds() <= 30 {
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            },
        ),
    ]);
    f.render_widget(Paragraph::new(header), chunks[0]);

    if let Some(notice) = &app.notice {
        let banner = Paragraph::new(notice.as_str())
            .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
        f.render_widget(banner, chunks[1]);
    } else if session.fullscreen_exit_count() > 0 {
        let banner = Paragraph::new(format!(
            "fullscreen exits recorded: {}",
            session.fullscreen_exit_count()
        ))
        .style(Style::default().fg(Color::Yellow));
        f.render_widget(banner, chunks[1]);
    }

    let question = Paragraph::new(prompt)
        .block(Block::default().borders(Borders::ALL).title("Question"))
        .wrap(Wrap { trim: true });
    f.render_widget(question, chunks[2]);

    let answer = Paragraph::new(Line::from(vec![
        Span::raw(session.current_answer()),
        Span::styled("█", Style::default().add_modifier(Modifier::DIM)),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Your answer"));
    f.render_widget(answer, chunks[3]);

    f.render_widget(
        footer("(↑/↓) question  (enter) next  (F9) submit  — esc/F11 are blocked"),
        chunks[5],
    );

    if confirming {
        render_confirm_overlay(session, f);
    }
}

fn render_confirm_overlay(session: &ExamSession, f: &mut Frame) {
    let unanswered = session.unanswered_display_numbers();
    let listing = unanswered.iter().map(usize::to_string).join(", ");
    let text = vec![
        Line::from(Span::styled(
            format!("You have {} unanswered question(s).", unanswered.len()),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(format!("Unanswered: {}", listing)),
        Line::from(""),
        Line::from("Submit anyway?  (y) submit  (n) keep working"),
    ];

    let area = centered_rect(f.area(), 60, 30);
    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(text)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Confirm submission"),
            )
            .style(Style::default().fg(Color::Yellow))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true }),
        area,
    );
}

fn render_results(app: &App, f: &mut Frame) {
    let Some(outcome) = app.outcome.as_ref() else {
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(2),
        ])
        .split(f.area());

    let heading = if outcome.auto_submitted {
        "Time expired — answers submitted automatically"
    } else {
        "Answers submitted"
    };
    let title = Paragraph::new(heading)
        .block(Block::default().borders(Borders::ALL).title("Result"))
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center);
    f.render_widget(title, chunks[0]);

    let mut lines = vec![
        Line::from(outcome.title.clone()),
        Line::from(format!(
            "answered {}/{} · elapsed {} · fullscreen exits {}",
            outcome.answered,
            outcome.total,
            format_clock(outcome.elapsed_seconds),
            outcome.fullscreen_exits
        )),
        Line::from(""),
    ];
    match &outcome.delivery_error {
        None => lines.push(Line::from(Span::styled(
            "Delivered.",
            Style::default().fg(Color::Green),
        ))),
        Some(err) => {
            lines.push(Line::from(Span::styled(
                format!("Delivery failed: {}", err),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(
                "The attempt may not have been recorded. A local receipt was kept; contact your teacher to resolve it.",
            ));
        }
    }

    let body = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(body, chunks[1]);

    f.render_widget(footer("(enter) back to list  (h) history  (q) quit"), chunks[2]);
}

fn render_history(app: &App, f: &mut Frame) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
            Constraint::Length(2),
        ])
        .split(f.area());

    let title = Paragraph::new("Attempt history")
        .block(Block::default().borders(Borders::ALL).title("History"))
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center);
    f.render_widget(title, chunks[0]);

    if app.history_rows.is_empty() {
        let empty = Paragraph::new("No attempts recorded yet.")
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center);
        f.render_widget(empty, chunks[1]);
    } else {
        let header = Row::new(vec![
            Cell::from("Assessment"),
            Cell::from("When"),
            Cell::from("Answered"),
            Cell::from("Elapsed"),
            Cell::from("Exits"),
            Cell::from("Delivered"),
        ])
        .style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

        let rows: Vec<Row> = app
            .history_rows
            .iter()
            .map(|rec| {
                let age_secs = (chrono::Local::now() - rec.submitted_at).num_seconds();
                let delivered_cell = if rec.delivered {
                    Cell::from("yes").style(Style::default().fg(Color::Green))
                } else {
                    Cell::from("NO").style(Style::default().fg(Color::Red))
                };
                Row::new(vec![
                    Cell::from(rec.title.clone()),
                    Cell::from(HumanTime::from(-age_secs).to_string()),
                    Cell::from(format!("{}/{}", rec.answered, rec.total)),
                    Cell::from(format_clock(rec.elapsed_seconds)),
                    Cell::from(rec.fullscreen_exits.to_string()),
                    delivered_cell,
                ])
            })
            .collect();

        let table = Table::new(
            rows,
            &[
                Constraint::Min(24),
                Constraint::Length(18),
                Constraint::Length(9),
                Constraint::Length(8),
                Constraint::Length(6),
                Constraint::Length(9),
            ],
        )
        .header(header)
        .block(Block::default().borders(Borders::ALL));
        f.render_widget(table, chunks[1]);
    }

    if let Some(notice) = &app.notice {
        let line = Paragraph::new(notice.as_str())
            .style(Style::default().fg(Color::Yellow))
            .alignment(Alignment::Center);
        f.render_widget(line, chunks[2]);
    }

    f.render_widget(footer("(b) back  (e) export csv  (q) quit"), chunks[3]);
}

fn centered_rect(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
