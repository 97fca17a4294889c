pub mod screen;
pub mod tables;

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Gauge, Paragraph, Widget, Wrap},
    Frame,
};
use std::time::SystemTime;
use typepro::{diff::Verdict, session::FinishReason};

use crate::{App, AppState, SaveStatus};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

pub fn draw(app: &App, f: &mut Frame) {
    screen::current_screen(app.state).render(app, f);
}

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn visible(c: char) -> String {
    match c {
        '\n' => "↵".to_string(),
        '\t' => "⇥".to_string(),
        c => c.to_string(),
    }
}

/// Target text colored by verdict, split at the target's own line breaks. Characters typed
/// past the end are appended in red.
pub fn prompt_lines(target: &[char], typed: &[char], verdicts: &[Verdict]) -> Vec<Line<'static>> {
    let green = bold().fg(Color::Green);
    let red = bold().fg(Color::Red);
    let dim = bold().add_modifier(Modifier::DIM);
    let cursor = dim.add_modifier(Modifier::UNDERLINED);

    let mut lines = Vec::new();
    let mut spans = Vec::new();

    for (idx, (&expected, verdict)) in target.iter().zip(verdicts).enumerate() {
        let (text, style) = match verdict {
            Verdict::Correct if expected == '\n' => (String::new(), green),
            Verdict::Correct => (visible(expected), green),
            Verdict::Incorrect => match typed.get(idx) {
                Some(' ') if expected != '\n' => ("·".to_string(), red),
                _ => (visible(expected), red),
            },
            Verdict::Pending => (visible(expected), cursor),
            Verdict::Untyped if expected == '\n' => (String::new(), dim),
            Verdict::Untyped => (visible(expected), dim),
        };
        if !text.is_empty() {
            spans.push(Span::styled(text, style));
        }
        if expected == '\n' {
            lines.push(Line::from(std::mem::take(&mut spans)));
        }
    }

    for &extra in typed.iter().skip(target.len()) {
        spans.push(Span::styled(visible(extra), red));
    }
    lines.push(Line::from(spans));
    lines
}

fn accuracy_color(accuracy: f64) -> Color {
    if accuracy >= 95.0 {
        Color::Green
    } else if accuracy >= 85.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match self.state {
            AppState::Results => render_results(self, area, buf),
            _ => render_typing(self, area, buf),
        }
    }
}

fn render_typing(app: &App, area: Rect, buf: &mut Buffer) {
    let now = SystemTime::now();
    let session = &app.session;
    let snapshot = session.snapshot(now);
    let lines = prompt_lines(session.target(), session.typed(), &session.verdicts());
    let prompt_height = (lines.len() as u16).min(area.height.saturating_sub(8)).max(1);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(1)
        .constraints([
            Constraint::Length(1), // header
            Constraint::Min(0),
            Constraint::Length(1), // timer
            Constraint::Length(1),
            Constraint::Length(prompt_height),
            Constraint::Length(1),
            Constraint::Length(1), // live stats
            Constraint::Length(1), // progress
            Constraint::Min(0),
            Constraint::Length(1), // legend
        ])
        .split(area);

    let header = Paragraph::new(Line::from(vec![
        Span::styled("typepro", bold().fg(Color::Cyan)),
        Span::raw(format!(
            "  {} · {} · {} · {}",
            session.snippet().language,
            session.mode(),
            app.settings.budget.code(),
            app.username
        )),
    ]));
    header.render(chunks[0], buf);

    let timer_style = match session.clock().remaining(now) {
        Some(left) if session.has_started() && left.as_secs() < 10 => bold().fg(Color::Red),
        _ => bold().fg(Color::Yellow),
    };
    Paragraph::new(Span::styled(session.time_display(now), timer_style))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);

    Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .render(chunks[4], buf);

    let stats = if session.has_started() {
        Line::from(vec![
            Span::styled(format!("{} wpm", snapshot.wpm), bold()),
            Span::raw("   "),
            Span::styled(
                format!("{}% acc", snapshot.accuracy),
                bold().fg(accuracy_color(f64::from(snapshot.accuracy))),
            ),
        ])
    } else {
        Line::from(Span::styled(
            "start typing to begin",
            Style::default().add_modifier(Modifier::ITALIC | Modifier::DIM),
        ))
    };
    Paragraph::new(stats)
        .alignment(Alignment::Center)
        .render(chunks[6], buf);

    Gauge::default()
        .gauge_style(Style::default().fg(Color::Magenta))
        .ratio(session.progress())
        .label(format!("{:.0}%", session.progress() * 100.0))
        .render(chunks[7], buf);

    Paragraph::new(Span::styled(
        "(←) restart / (→) new / (F2) stats / (F3) leaderboard / (esc)ape",
        Style::default().add_modifier(Modifier::ITALIC),
    ))
    .render(chunks[9], buf);
}

fn render_results(app: &App, area: Rect, buf: &mut Buffer) {
    let Some(finish) = app.session.finish() else {
        return render_typing(app, area, buf);
    };
    let record = &finish.record;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(1), // outcome
            Constraint::Length(1), // score
            Constraint::Length(1), // save status
            Constraint::Length(1),
            Constraint::Length(1), // summary
            Constraint::Min(0),    // history
            Constraint::Length(1), // padding
            Constraint::Length(1), // legend
        ])
        .split(area);

    let outcome = match finish.reason {
        FinishReason::Completed => "completed",
        FinishReason::TimedOut => "time's up",
    };
    Paragraph::new(Span::styled(outcome, bold().fg(Color::Cyan)))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);

    Paragraph::new(Line::from(vec![
        Span::styled(format!("{} wpm", record.wpm), bold()),
        Span::raw("   "),
        Span::styled(
            format!("{}% acc", record.accuracy),
            bold().fg(accuracy_color(record.accuracy)),
        ),
        Span::raw("   "),
        Span::styled(format!("{} cpm", record.cpm), bold()),
        Span::raw("   "),
        Span::styled(format!("{}s", record.time_taken_seconds), bold()),
    ]))
    .alignment(Alignment::Center)
    .render(chunks[1], buf);

    let (status, color) = match &app.save_status {
        Some(SaveStatus::Pending) | None => ("saving…".to_string(), Color::Gray),
        Some(SaveStatus::Saved) => ("saved".to_string(), Color::Green),
        Some(SaveStatus::Failed(err)) => (format!("not saved: {err}"), Color::Red),
    };
    Paragraph::new(Span::styled(
        status,
        Style::default().fg(color).add_modifier(Modifier::ITALIC),
    ))
    .alignment(Alignment::Center)
    .render(chunks[2], buf);

    if let Some(stats) = &app.statistics {
        Paragraph::new(tables::summary_line(stats))
            .alignment(Alignment::Center)
            .render(chunks[4], buf);
        tables::history_table(&stats.recent, SystemTime::now()).render(chunks[5], buf);
    }

    Paragraph::new(Span::styled(
        "(r)etry / (n)ew / (s)tats / (l)eaderboard / (esc)ape",
        Style::default().add_modifier(Modifier::ITALIC),
    ))
    .render(chunks[7], buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Settings;
    use ratatui::{backend::TestBackend, Terminal};
    use typepro::{
        catalog::{Language, LanguageFilter, Mode},
        clock::TimeBudget,
        diff,
        reporter::UserId,
        snippet::FallbackSnippets,
        timer::ManualScheduler,
    };

    fn create_test_app(prompt: &str) -> App {
        let fallback = FallbackSnippets::load().unwrap();
        App::new(
            Settings {
                budget: TimeBudget::normalize("30"),
                language: LanguageFilter::Only(Language::Js),
                mode: Mode::Normal,
                prompt: Some(prompt.to_string()),
            },
            UserId(1),
            "ada",
            &fallback,
        )
        .unwrap()
    }

    fn rendered(app: &App, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|f| draw(app, f)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_prompt_lines_follow_target_newlines() {
        let target = chars("ab\ncd");
        let typed = chars("ab\nc");
        let lines = prompt_lines(&target, &typed, &diff::classify(&target, &typed));
        assert_eq!(lines.len(), 2);
        assert_eq!(line_text(&lines[0]), "ab");
        assert_eq!(line_text(&lines[1]), "cd");
    }

    #[test]
    fn test_prompt_lines_mark_mistakes() {
        let target = chars("a\nb");
        let typed = chars("ax");
        let lines = prompt_lines(&target, &typed, &diff::classify(&target, &typed));
        assert_eq!(line_text(&lines[0]), "a↵");
        assert_eq!(lines[0].spans[1].style.fg, Some(Color::Red));
    }

    #[test]
    fn test_prompt_lines_show_overtype() {
        let target = chars("ab");
        let typed = chars("abzz");
        let lines = prompt_lines(&target, &typed, &diff::classify(&target, &typed));
        assert_eq!(line_text(&lines[0]), "abzz");
        assert_eq!(lines[0].spans[3].style.fg, Some(Color::Red));
    }

    #[test]
    fn test_wrong_space_shows_a_dot() {
        let target = chars("ab");
        let typed = chars(" ");
        let lines = prompt_lines(&target, &typed, &diff::classify(&target, &typed));
        assert_eq!(line_text(&lines[0]), "·b");
    }

    #[test]
    fn test_typing_screen_renders_prompt_and_timer() {
        let app = create_test_app("let x = 1;");
        let content = rendered(&app, 80, 24);
        assert!(content.contains("let x = 1;"));
        assert!(content.contains("30"));
        assert!(content.contains("start typing to begin"));
    }

    #[test]
    fn test_results_screen_shows_final_score() {
        let mut app = create_test_app("ab");
        let scheduler = ManualScheduler::new();
        let t0 = SystemTime::now();
        app.session.set_input("ab", t0, &scheduler);
        app.state = AppState::Results;
        app.save_status = Some(SaveStatus::Failed("disk full".into()));

        let content = rendered(&app, 80, 24);
        assert!(content.contains("completed"));
        assert!(content.contains("100% acc"));
        assert!(content.contains("not saved: disk full"));
    }

    #[test]
    fn test_small_and_extreme_sizes_do_not_panic() {
        let app = create_test_app("fn main() {\n    println!(\"hi\");\n}");
        for (w, h) in [(20, 5), (1, 1), (200, 60), (80, 3)] {
            rendered(&app, w, h);
        }
    }
}
