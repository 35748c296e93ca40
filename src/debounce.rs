//! Settle-window debouncing of short blinks into one gesture.
//!
//! The frame loop and the settle timer thread share one mutex. The timer
//! only fires the ticket that is pending at the moment it holds the lock, so
//! a cancelled ticket can never dispatch.

use log::{debug, error, info};
use serde::Serialize;
use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, Instant},
};

use crate::dispatch::{Action, ActionDispatcher, Gesture, Mode};
use crate::error::EngineError;
use crate::gestures::BlinkEvent;
use crate::media::MediaController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    deadline: Instant,
}

impl Ticket {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Blink count since the last dispatch plus at most one pending ticket.
#[derive(Debug, Default)]
pub struct GestureAccumulator {
    count: u32,
    generation: u64,
    pending: Option<Ticket>,
}

impl GestureAccumulator {
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn pending(&self) -> Option<Ticket> {
        self.pending
    }

    /// Count one short blink and re-arm; any earlier ticket goes stale.
    pub fn push_blink(&mut self, now: Instant, settle: Duration) -> Ticket {
        self.count += 1;
        self.generation += 1;
        let t = Ticket {
            generation: self.generation,
            deadline: now + settle,
        };
        self.pending = Some(t);
        t
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Cancel and forget the unsettled count.
    pub fn discard(&mut self) {
        self.cancel();
        self.count = 0;
    }

    /// Finalize if `ticket` is still the pending one. Returns the count and
    /// clears it; stale tickets return `None` and change nothing.
    pub fn fire(&mut self, ticket: Ticket) -> Option<u32> {
        match self.pending {
            Some(p) if p.generation == ticket.generation => {
                self.pending = None;
                Some(std::mem::take(&mut self.count))
            }
            _ => None,
        }
    }

    /// Long-blink interrupt: the override itself is the one gesture, whatever
    /// was accumulating is dropped with the pending ticket.
    pub fn take_override(&mut self) {
        if self.count > 0 {
            debug!("override: dropping {} unsettled blink(s)", self.count);
        }
        self.discard();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub mode: Mode,
    pub held: bool,
    pub enabled: bool,
    pub pending_blinks: u32,
    pub dispatched: u64,
    pub last_action: Option<String>,
}

struct Inner {
    acc: GestureAccumulator,
    dispatcher: ActionDispatcher,
    settle: Duration,
    dispatched: u64,
    last_action: Option<Action>,
    shutdown: bool,
}

impl Inner {
    fn finalize(&mut self, g: Gesture) {
        match self.dispatcher.dispatch(g) {
            Ok(Some(a)) => {
                self.dispatched += 1;
                self.last_action = Some(a);
            }
            Ok(None) => {}
            Err(e) => error!("dispatch of {g:?} failed: {e}"),
        }
    }
}

struct Shared {
    inner: Mutex<Inner>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the dispatcher and the settle timer thread. Cheap to share behind an
/// `Arc`; every entry point takes `&self`.
pub struct GestureDebouncer {
    shared: Arc<Shared>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl GestureDebouncer {
    pub fn start(dispatcher: ActionDispatcher, settle: Duration) -> Self {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                acc: GestureAccumulator::default(),
                dispatcher,
                settle,
                dispatched: 0,
                last_action: None,
                shutdown: false,
            }),
            wake: Condvar::new(),
        });
        let timer_shared = shared.clone();
        let handle = thread::Builder::new()
            .name("settle-timer".into())
            .spawn(move || run_timer(&timer_shared))
            .ok();
        if handle.is_none() {
            error!("failed to spawn settle timer thread; gestures will not finalize");
        }
        Self {
            shared,
            worker: Mutex::new(handle),
        }
    }

    pub fn on_blink(&self, ev: BlinkEvent) {
        let mut inner = self.shared.lock();
        match ev {
            BlinkEvent::ShortBlink => {
                let settle = inner.settle;
                inner.acc.push_blink(Instant::now(), settle);
                debug!("blink #{} armed, settling {settle:?}", inner.acc.count());
                self.shared.wake.notify_all();
            }
            BlinkEvent::LongBlinkOverride => {
                inner.acc.take_override();
                inner.finalize(Gesture::Override);
            }
        }
    }

    pub fn move_relative(&self, dx: i32, dy: i32) {
        if let Err(e) = self.shared.lock().dispatcher.move_relative(dx, dy) {
            error!("cursor move failed: {e}");
        }
    }

    /// Pending blinks stay pending and resolve against the new mode.
    pub fn toggle_mode(&self) -> Result<Mode, EngineError> {
        self.shared.lock().dispatcher.toggle_mode()
    }

    pub fn set_enabled(&self, en: bool) {
        if let Err(e) = self.shared.lock().dispatcher.set_enabled(en) {
            error!("failed to release held button: {e}");
        }
    }

    /// Takes effect from the next armed ticket.
    pub fn set_settle(&self, settle: Duration) {
        self.shared.lock().settle = settle;
    }

    pub fn set_media(&self, media: Box<dyn MediaController>) {
        self.shared.lock().dispatcher.set_media(media);
    }

    pub fn status(&self) -> EngineStatus {
        let inner = self.shared.lock();
        EngineStatus {
            mode: inner.dispatcher.mode(),
            held: inner.dispatcher.held(),
            enabled: inner.dispatcher.is_enabled(),
            pending_blinks: inner.acc.count(),
            dispatched: inner.dispatched,
            last_action: inner.last_action.map(|a| format!("{a:?}")),
        }
    }

    /// Stop the timer, drop any unsettled blinks, release a held button and
    /// close the media controller. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut inner = self.shared.lock();
            if inner.shutdown {
                return;
            }
            inner.shutdown = true;
            inner.acc.discard();
            if let Err(e) = inner.dispatcher.close() {
                error!("failed to release input on shutdown: {e}");
            }
            self.shared.wake.notify_all();
        }
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(h) = handle {
            let _ = h.join();
        }
        info!("gesture engine stopped");
    }
}

impl Drop for GestureDebouncer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_timer(shared: &Shared) {
    let mut inner = shared.lock();
    loop {
        if inner.shutdown {
            return;
        }
        let Some(ticket) = inner.acc.pending() else {
            inner = shared
                .wake
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
            continue;
        };
        let now = Instant::now();
        if now < ticket.deadline() {
            inner = shared
                .wake
                .wait_timeout(inner, ticket.deadline() - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
            continue;
        }
        if let Some(count) = inner.acc.fire(ticket) {
            inner.finalize(Gesture::Blinks(count));
        }
    }
}
