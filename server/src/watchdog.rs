//! Single-shot configuration timers, at most one per session.

use crate::tick::{TickJob, TickSender};
use log::{debug, error};
use shared::SessionId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct Watchdog {
    bound: Duration,
    tick_tx: TickSender,
    timers: Mutex<HashMap<SessionId, ArmedTimer>>,
    next_generation: AtomicU64,
}

impl Watchdog {
    pub fn new(bound: Duration, tick_tx: TickSender) -> Self {
        Self {
            bound,
            tick_tx,
            timers: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Time a session may configure before it is forced.
    pub fn bound(&self) -> Duration {
        self.bound
    }

    /// Starts the timer for a session. Returns false if one is already armed.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn arm(&self, session_id: SessionId) -> bool {
        let mut timers = self.lock();
        if timers.contains_key(&session_id) {
            debug!("Watchdog already armed for {}", session_id);
            return false;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let bound = self.bound;
        let tick_tx = self.tick_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(bound).await;
            if let Err(e) = tick_tx.send(TickJob::WatchdogExpired {
                session_id,
                generation,
            }) {
                error!("Failed to queue watchdog expiry for {}: {}", session_id, e);
            }
        });

        timers.insert(session_id, ArmedTimer { generation, handle });
        debug!("Watchdog armed for {} ({:?})", session_id, bound);
        true
    }

    /// Cancels the session's timer. Returns false if none was armed.
    pub fn disarm(&self, session_id: SessionId) -> bool {
        match self.lock().remove(&session_id) {
            Some(timer) => {
                timer.handle.abort();
                debug!("Watchdog disarmed for {}", session_id);
                true
            }
            None => false,
        }
    }

    /// Consumes an expiry on the tick thread.
    ///
    /// True only if the expiring timer is still the one armed for the session;
    /// a timer that was disarmed (or replaced) after it fired is stale.
    pub fn claim_expired(&self, session_id: SessionId, generation: u64) -> bool {
        let mut timers = self.lock();
        match timers.get(&session_id) {
            Some(timer) if timer.generation == generation => {
                timers.remove(&session_id);
                true
            }
            _ => false,
        }
    }

    /// Whether a timer is outstanding for the session. Expired timers stay
    /// armed until their job is claimed on the tick thread.
    pub fn is_armed(&self, session_id: SessionId) -> bool {
        self.lock().contains_key(&session_id)
    }

    pub fn armed_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, ArmedTimer>> {
        self.timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        for (_, timer) in self.lock().drain() {
            timer.handle.abort();
        }
    }
}
