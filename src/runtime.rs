use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent};

/// Unified event type consumed by the app loop
#[derive(Clone, Debug)]
pub enum ProctorEvent {
    Key(KeyEvent),
    /// Terminal window gained (true) or lost (false) focus.
    Focus(bool),
    Resize,
    /// One-second countdown tick, emitted by a CountdownTicker.
    CountdownTick,
    /// Sub-second compliance poll, synthesized by the Runner on recv
    /// timeout. Bounded detection latency: an unfocused terminal stops
    /// producing key events, so the timeout always fires.
    CompliancePoll,
}

/// Source of terminal events (keyboard, focus, resize, etc.)
pub trait EventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<ProctorEvent, RecvTimeoutError>;

    /// Sender half of the channel, for timers feeding the same loop.
    fn sender(&self) -> Sender<ProctorEvent>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    tx: Sender<ProctorEvent>,
    rx: Receiver<ProctorEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        let reader_tx = tx.clone();
        thread::spawn(move || loop {
            match event::read() {
                Ok(CtEvent::Key(key)) => {
                    if reader_tx.send(ProctorEvent::Key(key)).is_err() {
                        break;
                    }
                }
                Ok(CtEvent::FocusGained) => {
                    if reader_tx.send(ProctorEvent::Focus(true)).is_err() {
                        break;
                    }
                }
                Ok(CtEvent::FocusLost) => {
                    if reader_tx.send(ProctorEvent::Focus(false)).is_err() {
                        break;
                    }
                }
                Ok(CtEvent::Resize(_, _)) => {
                    if reader_tx.send(ProctorEvent::Resize).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
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
    fn recv_timeout(&self, timeout: Duration) -> Result<ProctorEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    fn sender(&self) -> Sender<ProctorEvent> {
        self.tx.clone()
    }
}

/// Configurable poll cadence interface
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

/// Cancellation handle for a countdown ticker thread. The session's
/// terminal transition cancels this explicitly; a cancelled ticker sends
/// nothing further, so no late tick reaches the loop after submission.
#[derive(Debug)]
pub struct TickerGuard {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TickerGuard {
    pub fn cancel(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

impl Drop for TickerGuard {
    fn drop(&mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Spawn the one-second countdown feeding CountdownTick into the loop's
/// channel. Returns the cancellation handle; the thread checks the flag
/// before every send.
pub fn spawn_countdown(tx: Sender<ProctorEvent>, period: Duration) -> TickerGuard {
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);

    let handle = thread::spawn(move || loop {
        thread::sleep(period);
        if thread_stop.load(Ordering::SeqCst) {
            break;
        }
        if tx.send(ProctorEvent::CountdownTick).is_err() {
            break;
        }
    });

    TickerGuard {
        stop,
        handle: Some(handle),
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    tx: Sender<ProctorEvent>,
    rx: Receiver<ProctorEvent>,
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
    fn recv_timeout(&self, timeout: Duration) -> Result<ProctorEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    fn sender(&self) -> Sender<ProctorEvent> {
        self.tx.clone()
    }
}

/// Runner that advances the application one event at a time
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

    pub fn sender(&self) -> Sender<ProctorEvent> {
        self.event_source.sender()
    }

    /// Blocks up to the poll interval and returns the next event, or
    /// CompliancePoll on timeout
    pub fn step(&self) -> ProctorEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                ProctorEvent::CompliancePoll
            }
        }
    }
}
