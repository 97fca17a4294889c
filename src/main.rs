mod ui;

use anyhow::Context;
use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    fs::{self, OpenOptions},
    io::{self, stdin, Read},
    path::PathBuf,
    process::ExitCode,
    sync::Mutex,
    time::{Duration, SystemTime},
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use unicode_width::UnicodeWidthStr;
use typepro::{
    app_dirs::AppDirs,
    catalog::{Language, LanguageFilter, Mode},
    clock::TimeBudget,
    config::{Config, ConfigStore, FileConfigStore},
    reporter::{self, LeaderboardRow, ResultRecord, StatsStore, Submitter, UserId, UserStatistics},
    runtime::{apply_key, apply_tick, CrosstermEventSource, EventSource, FixedTicker, Runner, Ticker, TypeEvent},
    session::{Session, Step},
    snippet::{FallbackSnippets, Snippet, SnippetProvider, StoredSnippets},
    store::SqliteStore,
    timer::Scheduler,
    wire::{self, LeaderboardResponse, ResultSubmission, StatsResponse, SubmitResponse},
};

const TICK_RATE_MS: u64 = 100;

/// timed code-typing trainer with live scoring, history and a leaderboard
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Type real code snippets against the clock. Speed and accuracy are scored live, every finished run is saved, and your history and the leaderboard are one key away."
)]
pub struct Cli {
    /// seconds per run: 15, 30, 60, 120, 300, 600 or full (no limit)
    #[clap(short = 't', long)]
    timer: Option<String>,

    /// snippet language: mixed, js, html, css, php, python, java or cpp
    #[clap(short = 'l', long)]
    language: Option<String>,

    /// difficulty: normal, pro or expert
    #[clap(short = 'm', long)]
    mode: Option<String>,

    /// name results are saved under
    #[clap(short = 'u', long)]
    user: Option<String>,

    /// results database to use instead of the default location
    #[clap(long)]
    db: Option<PathBuf>,

    /// custom text to type instead of a snippet
    #[clap(short = 'p', long)]
    prompt: Option<String>,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// print your statistics and recent history
    Stats {
        /// only count results of this difficulty
        #[clap(long)]
        mode: Option<String>,
        /// print the JSON statistics payload
        #[clap(long)]
        json: bool,
    },
    /// print the top results across all users
    Leaderboard {
        /// only rank results of this difficulty
        #[clap(long)]
        mode: Option<String>,
        /// print the JSON leaderboard payload
        #[clap(long)]
        json: bool,
    },
    /// save a JSON result submission read from stdin and print the acknowledgement
    Submit,
    /// add the code read from stdin to the snippet library
    AddSnippet {
        /// js, html, css, php, python, java or cpp
        language: String,
        /// difficulty the snippet is served at
        #[clap(long, default_value = "normal")]
        mode: String,
    },
}

impl Cli {
    fn has_setting_overrides(&self) -> bool {
        self.timer.is_some() || self.language.is_some() || self.mode.is_some() || self.user.is_some()
    }

    /// Command-line values win over the stored config.
    fn apply_to(&self, config: Config) -> Config {
        Config {
            timer: self.timer.clone().unwrap_or(config.timer),
            language: self.language.clone().unwrap_or(config.language),
            mode: self.mode.clone().unwrap_or(config.mode),
            user: self.user.clone().unwrap_or(config.user),
            log_level: config.log_level,
        }
        .normalized()
    }
}

/// Normalized choices for the next session.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub budget: TimeBudget,
    pub language: LanguageFilter,
    pub mode: Mode,
    pub prompt: Option<String>,
}

impl Settings {
    fn new(config: &Config, prompt: Option<String>) -> Self {
        Self {
            budget: config.budget(),
            language: config.language_filter(),
            mode: config.mode(),
            prompt,
        }
    }

    fn next_snippet(&self, provider: &dyn SnippetProvider) -> Snippet {
        match &self.prompt {
            Some(prompt) => {
                let language = match self.language {
                    LanguageFilter::Only(language) => language,
                    LanguageFilter::Mixed => Language::Js,
                };
                Snippet::custom(prompt.clone(), language)
            }
            None => provider.pick(self.language, self.mode),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppState {
    Typing,
    Results,
    Stats,
    Leaderboard,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveStatus {
    Pending,
    Saved,
    Failed(String),
}

/// What the event loop has to do after a key was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    None,
    Quit,
    Restart,
    Next,
    Finished(ResultRecord),
    LoadStats,
    LoadLeaderboard,
}

#[derive(Debug)]
pub struct App {
    pub settings: Settings,
    pub session: Session,
    pub state: AppState,
    /// Screen to go back to from statistics or the leaderboard.
    pub return_state: AppState,
    pub user: UserId,
    pub username: String,
    pub save_status: Option<SaveStatus>,
    pub statistics: Option<UserStatistics>,
    pub stats_filter: Option<Mode>,
    /// Why the last statistics fetch failed; cleared by the next success.
    pub stats_error: Option<String>,
    pub leaderboard: Vec<LeaderboardRow>,
    pub leaderboard_filter: Option<Mode>,
    pub leaderboard_error: Option<String>,
    pub scroll_offset: usize,
}

fn cycle_filter(filter: Option<Mode>) -> Option<Mode> {
    match filter {
        None => Some(Mode::Normal),
        Some(Mode::Normal) => Some(Mode::Pro),
        Some(Mode::Pro) => Some(Mode::Expert),
        Some(Mode::Expert) => None,
    }
}

impl App {
    pub fn new(
        settings: Settings,
        user: UserId,
        username: impl Into<String>,
        provider: &dyn SnippetProvider,
    ) -> anyhow::Result<Self> {
        let snippet = settings.next_snippet(provider);
        let session = Session::new(snippet, settings.budget, settings.mode)
            .context("cannot start a session with an empty prompt")?;

        Ok(Self {
            stats_filter: Some(settings.mode),
            leaderboard_filter: Some(settings.mode),
            settings,
            session,
            state: AppState::Typing,
            return_state: AppState::Typing,
            user,
            username: username.into(),
            save_status: None,
            statistics: None,
            stats_error: None,
            leaderboard: Vec::new(),
            leaderboard_error: None,
            scroll_offset: 0,
        })
    }

    fn replace_session(&mut self, snippet: Snippet) -> anyhow::Result<()> {
        self.session.close();
        self.session = Session::new(snippet, self.settings.budget, self.settings.mode)?;
        self.state = AppState::Typing;
        self.return_state = AppState::Typing;
        self.save_status = None;
        self.scroll_offset = 0;
        Ok(())
    }

    /// Same snippet, fresh session.
    pub fn restart(&mut self) -> anyhow::Result<()> {
        let snippet = self.session.snippet().clone();
        self.replace_session(snippet)
    }

    pub fn next(&mut self, provider: &dyn SnippetProvider) -> anyhow::Result<()> {
        let snippet = self.settings.next_snippet(provider);
        self.replace_session(snippet)
    }

    fn open_overlay(&mut self, state: AppState) {
        if !matches!(self.state, AppState::Stats | AppState::Leaderboard) {
            self.return_state = self.state;
        }
        self.state = state;
        self.scroll_offset = 0;
    }

    pub fn on_key(&mut self, key: KeyEvent, now: SystemTime, scheduler: &dyn Scheduler) -> Action {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Action::Quit;
        }

        match self.state {
            AppState::Typing => match key.code {
                KeyCode::Esc => Action::Quit,
                KeyCode::Left => Action::Restart,
                KeyCode::Right => Action::Next,
                KeyCode::F(2) => {
                    self.open_overlay(AppState::Stats);
                    Action::LoadStats
                }
                KeyCode::F(3) => {
                    self.open_overlay(AppState::Leaderboard);
                    Action::LoadLeaderboard
                }
                _ => match apply_key(&mut self.session, key, now, scheduler) {
                    Step::Finished(record) => {
                        self.state = AppState::Results;
                        self.save_status = Some(SaveStatus::Pending);
                        Action::Finished(record)
                    }
                    _ => Action::None,
                },
            },
            AppState::Results => match key.code {
                KeyCode::Esc | KeyCode::Char('q') => Action::Quit,
                KeyCode::Char('r') | KeyCode::Left => Action::Restart,
                KeyCode::Char('n') | KeyCode::Right => Action::Next,
                KeyCode::Char('s') => {
                    self.open_overlay(AppState::Stats);
                    Action::LoadStats
                }
                KeyCode::Char('l') => {
                    self.open_overlay(AppState::Leaderboard);
                    Action::LoadLeaderboard
                }
                _ => Action::None,
            },
            AppState::Stats => match key.code {
                KeyCode::Esc | KeyCode::Char('q') => Action::Quit,
                KeyCode::Char('r') => Action::Restart,
                KeyCode::Char('n') => Action::Next,
                KeyCode::Char('b') | KeyCode::Backspace => {
                    self.state = self.return_state;
                    Action::None
                }
                KeyCode::Char('l') => {
                    self.open_overlay(AppState::Leaderboard);
                    Action::LoadLeaderboard
                }
                KeyCode::Char('m') => {
                    self.stats_filter = cycle_filter(self.stats_filter);
                    Action::LoadStats
                }
                _ => Action::None,
            },
            AppState::Leaderboard => match key.code {
                KeyCode::Esc | KeyCode::Char('q') => Action::Quit,
                KeyCode::Char('r') => Action::Restart,
                KeyCode::Char('n') => Action::Next,
                KeyCode::Char('b') | KeyCode::Backspace => {
                    self.state = self.return_state;
                    Action::None
                }
                KeyCode::Char('s') => {
                    self.open_overlay(AppState::Stats);
                    Action::LoadStats
                }
                KeyCode::Char('m') => {
                    self.leaderboard_filter = cycle_filter(self.leaderboard_filter);
                    self.scroll_offset = 0;
                    Action::LoadLeaderboard
                }
                KeyCode::Up => {
                    self.scroll_offset = self.scroll_offset.saturating_sub(1);
                    Action::None
                }
                KeyCode::Down => {
                    // clamped while rendering
                    self.scroll_offset += 1;
                    Action::None
                }
                KeyCode::PageUp => {
                    self.scroll_offset = self.scroll_offset.saturating_sub(10);
                    Action::None
                }
                KeyCode::PageDown => {
                    self.scroll_offset += 10;
                    Action::None
                }
                KeyCode::Home => {
                    self.scroll_offset = 0;
                    Action::None
                }
                _ => Action::None,
            },
        }
    }

    /// Countdown or heartbeat tick. Returns the record if this tick finished the session.
    pub fn on_tick(&mut self, now: SystemTime) -> Option<ResultRecord> {
        if self.state != AppState::Typing {
            return None;
        }
        let record = apply_tick(&mut self.session, now).into_record()?;
        self.state = AppState::Results;
        self.save_status = Some(SaveStatus::Pending);
        Some(record)
    }

    pub fn on_ack(&mut self, ack: SubmitResponse) {
        self.save_status = Some(if ack.success {
            SaveStatus::Saved
        } else {
            SaveStatus::Failed(ack.error.unwrap_or_else(|| "unknown error".to_string()))
        });
    }

    pub fn refresh_statistics(&mut self, store: &dyn StatsStore) {
        match reporter::user_statistics(store, self.user, self.stats_filter.map(|m| m.as_str())) {
            Ok(stats) => {
                self.statistics = Some(stats);
                self.stats_error = None;
            }
            Err(err) => {
                warn!(error = %err, "failed to load statistics");
                // never show rows fetched under a different filter
                self.statistics = None;
                self.stats_error = Some(err.to_string());
            }
        }
    }

    pub fn refresh_leaderboard(&mut self, store: &dyn StatsStore) {
        match reporter::leaderboard(store, self.leaderboard_filter.map(|m| m.as_str())) {
            Ok(rows) => {
                self.leaderboard = rows;
                self.leaderboard_error = None;
            }
            Err(err) => {
                warn!(error = %err, "failed to load leaderboard");
                self.leaderboard.clear();
                self.leaderboard_error = Some(err.to_string());
            }
        }
    }
}

/// Long-lived collaborators of the interactive loop.
struct Services {
    store: SqliteStore,
    fallback: FallbackSnippets,
    submitter: Submitter,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .parse(level)
            .unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let Some(log_path) = AppDirs::log_path() else {
        return;
    };
    if let Some(parent) = log_path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) else {
        return;
    };

    // the terminal belongs to the TUI, so logs only go to the file
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_store = FileConfigStore::new();
    let config = cli.apply_to(config_store.load());
    init_tracing(&config.log_level);

    match run(cli, config, &config_store) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("typepro failed: {err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: Config, config_store: &dyn ConfigStore) -> anyhow::Result<()> {
    if cli.has_setting_overrides() {
        if let Err(err) = config_store.save(&config) {
            warn!(error = %err, "failed to save config");
        }
    }

    let db_path = cli.db.clone().unwrap_or_else(SqliteStore::default_path);
    let open_store = || {
        SqliteStore::open(&db_path)
            .with_context(|| format!("failed to open results database {}", db_path.display()))
    };

    match cli.command {
        Some(Command::Stats { mode, json }) => {
            let store = open_store()?;
            let user = store.ensure_user(&config.user)?;
            let stats = reporter::user_statistics(&store, user, mode.as_deref())?;
            print!("{}", render_stats(&config.user, &stats, json)?);
            Ok(())
        }
        Some(Command::Leaderboard { mode, json }) => {
            let store = open_store()?;
            let rows = reporter::leaderboard(&store, mode.as_deref())?;
            print!("{}", render_leaderboard(rows, json)?);
            Ok(())
        }
        Some(Command::Submit) => {
            let mut body = String::new();
            stdin().read_to_string(&mut body).context("failed to read submission")?;
            let store = open_store()?;
            let user = store.ensure_user(&config.user)?;
            let response = submit(&store, user, &body);
            println!("{}", serde_json::to_string(&response)?);
            Ok(())
        }
        Some(Command::AddSnippet { language, mode }) => {
            let language = Language::parse(&language)
                .with_context(|| format!("unknown snippet language {language:?}"))?;
            let mut text = String::new();
            stdin().read_to_string(&mut text).context("failed to read snippet")?;
            let store = open_store()?;
            println!("{}", add_snippet(&store, &text, language, Mode::normalize(&mode))?);
            Ok(())
        }
        None => {
            if !stdin().is_tty() {
                let mut cmd = Cli::command();
                cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
            }

            let store = open_store()?;
            let user = store.ensure_user(&config.user)?;
            let services = Services {
                submitter: Submitter::spawn(open_store()?),
                fallback: FallbackSnippets::load().context("built-in snippets are broken")?,
                store,
            };
            let settings = Settings::new(&config, cli.prompt.clone());
            let app = App::new(
                settings,
                user,
                config.user.clone(),
                &StoredSnippets::new(&services.store, &services.fallback),
            )?;
            info!(user = %config.user, timer = %config.timer, language = %config.language, mode = %config.mode, "starting");
            run_terminal(app, services)
        }
    }
}

/// Stores `text` without its trailing newlines and reports the library size.
fn add_snippet(store: &SqliteStore, text: &str, language: Language, mode: Mode) -> anyhow::Result<String> {
    let text = text.trim_end_matches(['\n', '\r']);
    if text.trim().is_empty() {
        anyhow::bail!("refusing to store an empty snippet");
    }
    let id = store.insert_snippet(text, language, mode)?;
    info!(id, %language, %mode, "snippet added");
    Ok(format!(
        "stored snippet {id} ({language}/{mode}, {} in library)",
        store.snippet_count()?
    ))
}

fn submit(sink: &dyn reporter::ResultSink, user: UserId, body: &str) -> SubmitResponse {
    let submission: ResultSubmission = wire::decode_submission(body);
    debug!(?submission, "decoded submission");
    sink.submit(user, &submission)
}

fn render_stats(username: &str, stats: &UserStatistics, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(&StatsResponse::from(stats))? + "\n");
    }

    let mut out = format!(
        "{} · {} · {} tests\n",
        username,
        stats.mode_filter.map(|m| m.as_str()).unwrap_or("all modes"),
        stats.totals.tests
    );
    if let Some(avg) = stats.averages {
        out += &format!(
            "average  {:.0} wpm  {:.1}% acc  {:.0}s\n",
            avg.wpm, avg.accuracy, avg.time_taken
        );
    }
    if let Some(best) = stats.best {
        out += &format!(
            "best     {} wpm  {:.1}% acc  {}s\n",
            best.wpm, best.accuracy, best.time_taken
        );
    }
    if let Some(delta) = stats.improvement {
        out += &format!("change   {:+} wpm  {:+.1}% acc\n", delta.wpm, delta.accuracy);
    }
    for row in &stats.recent {
        out += &format!(
            "{:>4} wpm  {:>5.1}%  {:>4}s  {:<6} {:<6}  {}\n",
            row.wpm,
            row.accuracy,
            row.time_taken,
            row.language,
            row.mode,
            row.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(out)
}

const NAME_COLUMN_WIDTH: usize = 16;

/// Pads by display columns so wide usernames keep the table aligned.
fn pad_to_width(text: &str, width: usize) -> String {
    let used = UnicodeWidthStr::width(text);
    format!("{text}{}", " ".repeat(width.saturating_sub(used)))
}

fn render_leaderboard(rows: Vec<LeaderboardRow>, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(&LeaderboardResponse::from(rows))? + "\n");
    }

    let mut out = String::new();
    for (rank, row) in rows.iter().enumerate() {
        out += &format!(
            "{:>3}. {} {:>4} wpm  {:>5.1}%  {:>4}s  {:<6} {}\n",
            rank + 1,
            pad_to_width(row.username.as_deref().unwrap_or("(deleted)"), NAME_COLUMN_WIDTH),
            row.wpm,
            row.accuracy,
            row.time_taken,
            row.language,
            row.mode
        );
    }
    Ok(out)
}

fn run_terminal(mut app: App, mut services: Services) -> anyhow::Result<()> {
    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    let result = start_tui(&mut terminal, &mut app, &runner, &mut services);

    app.session.close();
    services.submitter.shutdown();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend, E: EventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<E, T>,
    services: &mut Services,
) -> anyhow::Result<()> {
    let scheduler = runner.event_source().countdown_scheduler();
    terminal.draw(|f| ui::draw(app, f))?;

    loop {
        let now = SystemTime::now();
        let mut redraw = false;
        let mut finished = None;

        match runner.step() {
            TypeEvent::Tick => {
                if let Some(ack) = services.submitter.try_ack() {
                    app.on_ack(ack);
                    app.refresh_statistics(&services.store);
                    if app.state == AppState::Leaderboard {
                        app.refresh_leaderboard(&services.store);
                    }
                    redraw = true;
                }
                if app.state == AppState::Typing && app.session.has_started() {
                    finished = app.on_tick(now);
                    redraw = true;
                }
            }
            TypeEvent::Countdown => {
                finished = app.on_tick(now);
                redraw = true;
            }
            TypeEvent::Resize => redraw = true,
            TypeEvent::Key(key) => {
                redraw = true;
                match app.on_key(key, now, &scheduler) {
                    Action::None => {}
                    Action::Quit => break,
                    Action::Restart => app.restart()?,
                    Action::Next => {
                        app.next(&StoredSnippets::new(&services.store, &services.fallback))?
                    }
                    Action::Finished(record) => finished = Some(record),
                    Action::LoadStats => app.refresh_statistics(&services.store),
                    Action::LoadLeaderboard => app.refresh_leaderboard(&services.store),
                }
            }
        }

        if let Some(record) = finished {
            if let Err(err) = services.submitter.submit(app.user, &record) {
                warn!(error = %err, "could not queue result");
                app.save_status = Some(SaveStatus::Failed(err.to_string()));
            }
            app.refresh_statistics(&services.store);
        }

        if redraw {
            terminal.draw(|f| ui::draw(app, f))?;
        }
    }

    Ok(())
}
