//! Post-spawn state resynchronization for bridged sessions.
//!
//! After the phase switch the host considers the player spawned while the
//! bridge may still be waiting to forward its spawn acknowledgement. The
//! synchronizer sends the full resend sequence once, then a reduced subset at
//! each follow-up delay. Every resend overwrites client state, so running one
//! twice is harmless.

use crate::config::SpawnSyncConfig;
use crate::host::PlayerHost;
use crate::tick::{TickJob, TickSender};
use log::{debug, error, info};
use shared::{Resend, SessionId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// The one resend chain a session may have.
struct ResendChain {
    followups: Vec<JoinHandle<()>>,
    stages_run: usize,
}

pub struct SpawnSynchronizer {
    immediate: Vec<Resend>,
    followup: Vec<Resend>,
    delays: Vec<Duration>,
    tick_tx: TickSender,
    chains: Mutex<HashMap<SessionId, ResendChain>>,
}

impl SpawnSynchronizer {
    pub fn new(config: &SpawnSyncConfig, tick_tx: TickSender) -> Self {
        Self {
            immediate: config.immediate.clone(),
            followup: config.followup.clone(),
            delays: config
                .followup_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            tick_tx,
            chains: Mutex::new(HashMap::new()),
        }
    }

    /// Starts the chain for a session: schedules the follow-up stages, then
    /// sends the immediate sequence. Returns false if a chain already exists
    /// for this connection.
    pub fn begin<H: PlayerHost + ?Sized>(&self, host: &mut H, id: SessionId) -> bool {
        {
            let mut chains = self.lock();
            if chains.contains_key(&id) {
                debug!("Spawn sync already started for {}", id);
                return false;
            }
            let followups = self
                .delays
                .iter()
                .enumerate()
                .map(|(stage, delay)| self.schedule(id, stage, *delay))
                .collect();
            chains.insert(
                id,
                ResendChain {
                    followups,
                    stages_run: 0,
                },
            );
        }

        let sent = send_all(host, id, &self.immediate);
        info!(
            "Spawn sequence sent to {} ({}/{} resends)",
            id,
            sent,
            self.immediate.len()
        );
        true
    }

    /// Runs one follow-up stage on the tick thread. Returns false when the
    /// chain was cancelled in the meantime.
    pub fn on_followup<H: PlayerHost + ?Sized>(
        &self,
        host: &mut H,
        id: SessionId,
        stage: usize,
    ) -> bool {
        {
            let mut chains = self.lock();
            match chains.get_mut(&id) {
                Some(chain) => chain.stages_run += 1,
                None => {
                    debug!("Dropping follow-up {} for departed session {}", stage, id);
                    return false;
                }
            }
        }

        let sent = send_all(host, id, &self.followup);
        debug!(
            "Follow-up {} for {} resent {}/{}",
            stage,
            id,
            sent,
            self.followup.len()
        );
        true
    }

    /// Sends the reduced subset outside of any chain, e.g. after a respawn.
    pub fn resend_followup<H: PlayerHost + ?Sized>(&self, host: &mut H, id: SessionId) -> usize {
        send_all(host, id, &self.followup)
    }

    /// Aborts pending follow-ups and forgets the session.
    pub fn cancel(&self, id: SessionId) -> bool {
        match self.lock().remove(&id) {
            Some(chain) => {
                for handle in chain.followups {
                    handle.abort();
                }
                true
            }
            None => false,
        }
    }

    /// Whether this connection already has a resend chain.
    pub fn has_started(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Follow-up stages executed so far for the session's chain.
    pub fn stages_run(&self, id: SessionId) -> usize {
        self.lock().get(&id).map(|chain| chain.stages_run).unwrap_or(0)
    }

    pub fn followup_stages(&self) -> usize {
        self.delays.len()
    }

    fn schedule(&self, id: SessionId, stage: usize, delay: Duration) -> JoinHandle<()> {
        let tick_tx = self.tick_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = tick_tx.send(TickJob::SpawnFollowup {
                session_id: id,
                stage,
            }) {
                error!("Failed to queue spawn follow-up for {}: {}", id, e);
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, ResendChain>> {
        self.chains.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for SpawnSynchronizer {
    fn drop(&mut self) {
        for (_, chain) in self.lock().drain() {
            for handle in chain.followups {
                handle.abort();
            }
        }
    }
}

/// Sends each resend in order; a failing one is logged and skipped.
fn send_all<H: PlayerHost + ?Sized>(host: &mut H, id: SessionId, resends: &[Resend]) -> usize {
    let mut sent = 0;
    for resend in resends {
        match host.resend(id, *resend) {
            Ok(()) => sent += 1,
            Err(e) => debug!("Resend {:?} to {} failed: {}", resend, id, e),
        }
    }
    sent
}
