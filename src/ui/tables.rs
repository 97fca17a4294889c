use chrono::{DateTime, Local};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap},
    Frame,
};
use std::time::SystemTime;
use time_humanize::{Accuracy, HumanTime, Tense};
use typepro::{
    catalog::Mode,
    reporter::{HistoryRow, LeaderboardRow, UserStatistics},
};

use crate::App;

/// "3 minutes ago" style age of a stored timestamp.
pub fn humanize_age(at: DateTime<Local>, now: SystemTime) -> String {
    let age = now
        .duration_since(SystemTime::from(at))
        .unwrap_or_default();
    HumanTime::from(age).to_text_en(Accuracy::Rough, Tense::Past)
}

fn accuracy_style(accuracy: f64) -> Style {
    let color = if accuracy >= 95.0 {
        Color::Green
    } else if accuracy >= 85.0 {
        Color::Yellow
    } else {
        Color::Red
    };
    Style::default().fg(color)
}

fn filter_label(filter: Option<Mode>) -> &'static str {
    filter.map(|m| m.as_str()).unwrap_or("all modes")
}

fn load_failure(what: &str, err: &str) -> Paragraph<'static> {
    Paragraph::new(format!("Could not load {what}: {err}"))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(Color::Red))
}

fn header_style() -> Style {
    Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD)
}

/// One-line digest: test count, averages, bests and the latest change.
pub fn summary_line(stats: &UserStatistics) -> Line<'static> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let mut spans = vec![Span::styled(format!("{} tests", stats.totals.tests), bold)];

    if let Some(avg) = stats.averages {
        spans.push(Span::raw(format!(
            "   avg {:.0} wpm {:.1}%",
            avg.wpm, avg.accuracy
        )));
    }
    if let Some(best) = stats.best {
        spans.push(Span::raw(format!("   best {} wpm", best.wpm)));
    }
    if let Some(delta) = stats.improvement {
        let color = match delta.wpm {
            d if d > 0 => Color::Green,
            d if d < 0 => Color::Red,
            _ => Color::Gray,
        };
        spans.push(Span::styled(
            format!("   {:+} wpm {:+.1}%", delta.wpm, delta.accuracy),
            Style::default().fg(color),
        ));
    }
    Line::from(spans)
}

/// Pure presenter for a single history row
pub fn present_history_row(row: &HistoryRow, now: SystemTime) -> Row<'static> {
    Row::new(vec![
        Cell::from(row.wpm.to_string()).style(Style::default().add_modifier(Modifier::BOLD)),
        Cell::from(format!("{:.1}", row.accuracy)).style(accuracy_style(row.accuracy)),
        Cell::from(format!("{}s", row.time_taken)),
        Cell::from(row.language.clone()),
        Cell::from(row.mode.clone()),
        Cell::from(humanize_age(row.created_at, now)),
    ])
}

pub fn present_leaderboard_row(rank: usize, row: &LeaderboardRow, now: SystemTime) -> Row<'static> {
    let rank_style = match rank {
        1 => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        2 | 3 => Style::default().fg(Color::Cyan),
        _ => Style::default(),
    };
    Row::new(vec![
        Cell::from(format!("{rank}.")).style(rank_style),
        Cell::from(row.username.clone().unwrap_or_else(|| "—".to_string())),
        Cell::from(row.wpm.to_string()).style(Style::default().add_modifier(Modifier::BOLD)),
        Cell::from(format!("{:.1}", row.accuracy)).style(accuracy_style(row.accuracy)),
        Cell::from(format!("{}s", row.time_taken)),
        Cell::from(row.language.clone()),
        Cell::from(row.mode.clone()),
        Cell::from(humanize_age(row.created_at, now)),
    ])
}

pub fn history_table(rows: &[HistoryRow], now: SystemTime) -> Table<'static> {
    let header = Row::new(vec!["WPM", "Acc %", "Time", "Lang", "Mode", "When"]).style(header_style());
    let widths = [
        Constraint::Length(5),
        Constraint::Length(7),
        Constraint::Length(6),
        Constraint::Length(8),
        Constraint::Length(8),
        Constraint::Min(10),
    ];
    Table::new(
        rows.iter().map(|row| present_history_row(row, now)).collect::<Vec<_>>(),
        widths,
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title("Recent"))
    .column_spacing(2)
}

/// Render the statistics screen
pub fn render_stats(app: &App, f: &mut Frame) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(3), // title
            Constraint::Length(5), // totals
            Constraint::Min(0),    // history
            Constraint::Length(2), // instructions
        ])
        .split(f.area());

    let title = Paragraph::new(format!(
        "{} · {}",
        app.username,
        filter_label(app.stats_filter)
    ))
    .block(Block::default().borders(Borders::ALL).title("Statistics"))
    .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
    .alignment(Alignment::Center);
    f.render_widget(title, chunks[0]);

    match (&app.stats_error, &app.statistics) {
        (Some(err), _) => f.render_widget(load_failure("statistics", err), chunks[1]),
        (None, Some(stats)) if stats.totals.tests > 0 => {
            let mut lines = vec![summary_line(stats)];
            if let (Some(avg), Some(best)) = (stats.averages, stats.best) {
                lines.push(Line::from(format!(
                    "average time {:.0}s   best accuracy {:.1}%   fastest {}s",
                    avg.time_taken, best.accuracy, best.time_taken
                )));
            }
            f.render_widget(
                Paragraph::new(lines).alignment(Alignment::Center),
                chunks[1],
            );
            f.render_widget(history_table(&stats.recent, SystemTime::now()), chunks[2]);
        }
        _ => {
            let no_data = Paragraph::new("No results yet. Finish a run to start your history.")
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::Gray));
            f.render_widget(no_data, chunks[1]);
        }
    }

    let instructions = Paragraph::new("(m) mode filter  (l) leaderboard  (b/backspace) back  (n) new  (r) retry")
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(instructions, chunks[3]);
}

/// Render the leaderboard screen. Scrolling is clamped to the rows that exist.
pub fn render_leaderboard(app: &App, f: &mut Frame) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(3), // title
            Constraint::Min(0),    // table
            Constraint::Length(2), // instructions
        ])
        .split(f.area());

    let title = Paragraph::new(format!("Top {} · {}", app.leaderboard.len(), filter_label(app.leaderboard_filter)))
        .block(Block::default().borders(Borders::ALL).title("Leaderboard"))
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .alignment(Alignment::Center);
    f.render_widget(title, chunks[0]);

    if let Some(err) = &app.leaderboard_error {
        f.render_widget(load_failure("the leaderboard", err), chunks[1]);
    } else if app.leaderboard.is_empty() {
        let no_data = Paragraph::new("Nobody has finished a run yet.")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::Gray));
        f.render_widget(no_data, chunks[1]);
    } else {
        let table_height = chunks[1].height.saturating_sub(3) as usize; // borders + header
        let max_scroll = app.leaderboard.len().saturating_sub(table_height);
        let offset = app.scroll_offset.min(max_scroll);
        let now = SystemTime::now();

        let visible_rows: Vec<Row> = app
            .leaderboard
            .iter()
            .enumerate()
            .skip(offset)
            .take(table_height)
            .map(|(idx, row)| present_leaderboard_row(idx + 1, row, now))
            .collect();

        let header = Row::new(vec!["#", "User", "WPM", "Acc %", "Time", "Lang", "Mode", "When"])
            .style(header_style());
        let widths = [
            Constraint::Length(4),
            Constraint::Length(16),
            Constraint::Length(5),
            Constraint::Length(7),
            Constraint::Length(6),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Min(10),
        ];
        let table = Table::new(visible_rows, widths)
            .header(header)
            .block(Block::default().borders(Borders::ALL))
            .column_spacing(2);
        f.render_widget(table, chunks[1]);
    }

    let instructions = Paragraph::new(
        "(↑/↓) scroll  (PgUp/PgDn) page  (Home) top  (m) mode filter  (s) stats  (b/backspace) back",
    )
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true });
    f.render_widget(instructions, chunks[2]);
}
