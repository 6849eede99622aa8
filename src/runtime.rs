use std::cell::Cell;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyCode, KeyEvent, KeyModifiers};
use rand::Rng;

use crate::error::KrResult;
use crate::session::{Answer, Session, SessionState};

/// Unified event type consumed by the app runner
#[derive(Clone, Debug)]
pub enum KrEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

/// Source of terminal events (keyboard, resize, etc.)
pub trait KrEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<KrEvent, RecvTimeoutError>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    rx: Receiver<KrEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            match event::read() {
                Ok(CtEvent::Key(key)) => {
                    if tx.send(KrEvent::Key(key)).is_err() {
                        break;
                    }
                }
                Ok(CtEvent::Resize(_, _)) => {
                    if tx.send(KrEvent::Resize).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl KrEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<KrEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Test event source fed from a channel
pub struct ChannelEventSource {
    rx: Receiver<KrEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<KrEvent>) -> Self {
        Self { rx }
    }
}

impl KrEventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<KrEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// The engine's clock: one tick per second.
    pub fn per_second() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Merges keystrokes and ticks into one serial stream. Ticks keep a fixed
/// cadence: a key arriving mid-interval does not push the next tick back.
pub struct Runner<E: KrEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
    next_tick: Cell<Instant>,
}

impl<E: KrEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        let next_tick = Cell::new(Instant::now() + ticker.interval());
        Self {
            event_source,
            ticker,
            next_tick,
        }
    }

    /// Restart the cadence, e.g. when a test starts or resumes.
    pub fn reset_clock(&self) {
        self.next_tick.set(Instant::now() + self.ticker.interval());
    }

    /// Blocks until the next event or the next tick deadline, whichever comes first.
    pub fn step(&self) -> KrEvent {
        let now = Instant::now();
        let deadline = self.next_tick.get();
        if now >= deadline {
            self.next_tick.set(deadline + self.ticker.interval());
            return KrEvent::Tick;
        }
        match self.event_source.recv_timeout(deadline - now) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) => {
                self.next_tick.set(deadline + self.ticker.interval());
                KrEvent::Tick
            }
            Err(RecvTimeoutError::Disconnected) => {
                // no more input; keep ticking at the same cadence
                std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                self.next_tick.set(deadline + self.ticker.interval());
                KrEvent::Tick
            }
        }
    }
}

/// A session operation decoded from a key in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Digit(char),
    TogglePause,
    RequestExit,
    ConfirmExit,
    CancelExit,
    Quit,
}

impl Command {
    pub fn from_key(key: &KeyEvent, state: SessionState) -> Option<Command> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(Command::Quit);
        }
        match state {
            SessionState::NotStarted | SessionState::ShowingInstructions => match key.code {
                KeyCode::Enter | KeyCode::Char(' ') => Some(Command::Start),
                KeyCode::Esc | KeyCode::Char('q') => Some(Command::Quit),
                _ => None,
            },
            SessionState::Running | SessionState::Paused => match key.code {
                KeyCode::Char(c) if c.is_ascii_digit() => Some(Command::Digit(c)),
                KeyCode::Char('p') => Some(Command::TogglePause),
                KeyCode::Esc => Some(Command::RequestExit),
                _ => None,
            },
            SessionState::ConfirmingExit => match key.code {
                KeyCode::Char('y') | KeyCode::Enter => Some(Command::ConfirmExit),
                KeyCode::Char('n') | KeyCode::Esc => Some(Command::CancelExit),
                _ => None,
            },
            SessionState::Finished => match key.code {
                KeyCode::Esc | KeyCode::Char('q') => Some(Command::Quit),
                _ => None,
            },
        }
    }
}

/// Applies one event to the session. Only a digit yields an `Answer`.
/// `Quit` is left to the host.
pub fn apply_event<R: Rng>(session: &mut Session<R>, event: &KrEvent) -> KrResult<Option<Answer>> {
    match event {
        KrEvent::Tick => match session.state() {
            SessionState::Running => session.tick().map(|_| None),
            _ => Ok(None),
        },
        KrEvent::Resize => Ok(None),
        KrEvent::Key(key) => match Command::from_key(key, session.state()) {
            Some(command) => apply_command(session, command),
            None => Ok(None),
        },
    }
}

pub fn apply_command<R: Rng>(session: &mut Session<R>, command: Command) -> KrResult<Option<Answer>> {
    match command {
        Command::Start => session.start().map(|_| None),
        Command::Digit(c) => session.submit_key(c).map(Some),
        Command::TogglePause => session.toggle_pause().map(|_| None),
        Command::RequestExit => session.request_exit().map(|_| None),
        Command::ConfirmExit => session.confirm_exit().map(|_| None),
        Command::CancelExit => session.cancel_exit().map(|_| None),
        Command::Quit => Ok(None),
    }
}
