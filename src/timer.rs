use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Granularity of the session countdown.
pub const COUNTDOWN_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to a periodic task. Cancellation is explicit; a cancelled task never fires again.
#[derive(Debug)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl TimerHandle {
    /// A handle with no backing thread. Whoever holds the flag decides when ticks happen.
    pub fn detached(cancelled: Arc<AtomicBool>) -> Self {
        Self {
            cancelled,
            worker: None,
        }
    }

    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // not joined: the worker exits on its next wake-up
        self.worker.take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Arms periodic tasks for a session.
pub trait Scheduler {
    fn every(&self, interval: Duration) -> TimerHandle;
}

/// Delivers a clone of `event` on `tx` every interval until cancelled or the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelScheduler<E> {
    tx: Sender<E>,
    event: E,
}

impl<E: Clone + Send + 'static> ChannelScheduler<E> {
    pub fn new(tx: Sender<E>, event: E) -> Self {
        Self { tx, event }
    }
}

impl<E: Clone + Send + 'static> Scheduler for ChannelScheduler<E> {
    fn every(&self, interval: Duration) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let tx = self.tx.clone();
        let event = self.event.clone();

        let worker = thread::spawn(move || loop {
            thread::sleep(interval);
            if flag.load(Ordering::SeqCst) || tx.send(event.clone()).is_err() {
                break;
            }
        });

        TimerHandle {
            cancelled,
            worker: Some(worker),
        }
    }
}

/// Scheduler that spawns nothing and remembers what it armed.
///
/// Used for headless runs and tests where the caller delivers ticks itself.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    armed: Mutex<Vec<(Duration, Arc<AtomicBool>)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn armed_count(&self) -> usize {
        self.armed.lock().map(|armed| armed.len()).unwrap_or(0)
    }

    /// Number of armed tasks that have not been cancelled.
    pub fn active_count(&self) -> usize {
        self.armed
            .lock()
            .map(|armed| {
                armed
                    .iter()
                    .filter(|(_, flag)| !flag.load(Ordering::SeqCst))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn intervals(&self) -> Vec<Duration> {
        self.armed
            .lock()
            .map(|armed| armed.iter().map(|(interval, _)| *interval).collect())
            .unwrap_or_default()
    }
}

impl Scheduler for ManualScheduler {
    fn every(&self, interval: Duration) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        if let Ok(mut armed) = self.armed.lock() {
            armed.push((interval, Arc::clone(&cancelled)));
        }
        TimerHandle::detached(cancelled)
    }
}
