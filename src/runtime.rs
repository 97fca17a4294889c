use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, SystemTime};

use crossterm::event::{self, Event as CtEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::session::{Session, Step};
use crate::timer::{ChannelScheduler, Scheduler};

/// Unified event type consumed by the app runner.
///
/// Everything that touches a session arrives through one channel, so keystrokes and
/// countdown ticks are applied strictly one after another.
#[derive(Clone, Debug)]
pub enum TypeEvent {
    Key(KeyEvent),
    Resize,
    /// Redraw heartbeat from the runner.
    Tick,
    /// Session countdown, delivered by a [`ChannelScheduler`].
    Countdown,
}

/// Source of terminal events (keyboard, resize, countdown)
pub trait EventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<TypeEvent, RecvTimeoutError>;

    /// Sender feeding this source, for schedulers that inject countdown ticks.
    fn sender(&self) -> Sender<TypeEvent>;

    /// Scheduler whose ticks arrive on this source as [`TypeEvent::Countdown`].
    fn countdown_scheduler(&self) -> ChannelScheduler<TypeEvent> {
        ChannelScheduler::new(self.sender(), TypeEvent::Countdown)
    }
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    tx: Sender<TypeEvent>,
    rx: Receiver<TypeEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let reader = tx.clone();

        std::thread::spawn(move || loop {
            let forwarded = match event::read() {
                Ok(CtEvent::Key(key)) if key.kind != KeyEventKind::Release => {
                    reader.send(TypeEvent::Key(key))
                }
                Ok(CtEvent::Resize(_, _)) => reader.send(TypeEvent::Resize),
                Ok(_) => Ok(()),
                Err(_) => break,
            };
            if forwarded.is_err() {
                break;
            }
        });

        Self { tx, rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<TypeEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    fn sender(&self) -> Sender<TypeEvent> {
        self.tx.clone()
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Event source fed by the test through its sender.
pub struct TestEventSource {
    tx: Sender<TypeEvent>,
    rx: Receiver<TypeEvent>,
}

impl TestEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }
}

impl Default for TestEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<TypeEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    fn sender(&self) -> Sender<TypeEvent> {
        self.tx.clone()
    }
}

/// Runner that advances the application one event/tick at a time
pub struct Runner<E: EventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: EventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    pub fn event_source(&self) -> &E {
        &self.event_source
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> TypeEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => TypeEvent::Tick,
        }
    }
}

/// Applies a typing key to the session. Keys that do not edit the buffer are ignored;
/// navigation and quitting belong to the caller.
pub fn apply_key(
    session: &mut Session,
    key: KeyEvent,
    now: SystemTime,
    scheduler: &dyn Scheduler,
) -> Step {
    // AltGr arrives as Ctrl+Alt and still types a character
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);
    if ctrl != alt {
        return Step::Ignored;
    }
    match key.code {
        KeyCode::Char(c) => session.type_char(c, now, scheduler),
        KeyCode::Enter => session.type_char('\n', now, scheduler),
        KeyCode::Backspace => session.backspace(now, scheduler),
        _ => Step::Ignored,
    }
}

/// Applies a scheduler or heartbeat tick to the session.
pub fn apply_tick(session: &mut Session, now: SystemTime) -> Step {
    session.on_tick(now)
}
