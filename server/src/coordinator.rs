//! Drives bridged sessions from configuration into the interactive phase.
//!
//! ```text
//! Configuring --(no bridge-compatible tasks left)--> AwaitingCompletion
//! AwaitingCompletion --(a strategy succeeds)------> Interactive
//! AwaitingCompletion --(every strategy fails)-----> AwaitingCompletion (watchdog)
//! any --(disconnect)------------------------------> Terminated
//! ```
//!
//! The coordinator is the single entry point for every hook the host fires
//! for a session. Hooks run on the tick thread and receive the host by
//! mutable reference; timers never touch the host and instead queue a
//! [`TickJob`] that the tick loop hands back through [`PhaseCoordinator::handle_tick_job`].

use crate::classifier::{DisconnectClassifier, DisconnectVerdict};
use crate::config::CoordinatorConfig;
use crate::detector::BridgeDetector;
use crate::error::{CompletionError, HostError, StrategyFailure, StrategyFailureCause};
use crate::host::{Advance, BridgeRegistry, ConfigPhaseHost, GameHost};
use crate::placement::{SafePlacementResolver, UnsafeReason};
use crate::session::{describe_tasks, Session, SessionRegistry};
use crate::spawn_sync::SpawnSynchronizer;
use crate::tick::{TickJob, TickSender};
use crate::watchdog::Watchdog;
use log::{debug, error, info, warn};
use shared::{Phase, Resend, SessionId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::task::JoinHandle;

/// Ways to move a session out of configuration, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionStrategy {
    FinishConfiguration,
    DirectAdvance,
    SyntheticClientFinish,
}

impl CompletionStrategy {
    pub const ORDER: [CompletionStrategy; 3] = [
        CompletionStrategy::FinishConfiguration,
        CompletionStrategy::DirectAdvance,
        CompletionStrategy::SyntheticClientFinish,
    ];

    fn invoke<H: ConfigPhaseHost + ?Sized>(
        self,
        host: &mut H,
        id: SessionId,
    ) -> Result<Advance, HostError> {
        match self {
            CompletionStrategy::FinishConfiguration => host.finish_configuration(id),
            CompletionStrategy::DirectAdvance => host.advance_phase(id),
            CompletionStrategy::SyntheticClientFinish => host.signal_client_finished(id),
        }
    }
}

impl fmt::Display for CompletionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompletionStrategy::FinishConfiguration => "finish-configuration",
            CompletionStrategy::DirectAdvance => "direct-advance",
            CompletionStrategy::SyntheticClientFinish => "synthetic-client-finish",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPath {
    /// Triggered by the task queue running empty
    Graceful,
    /// Triggered by the watchdog
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionRecord {
    pub path: CompletionPath,
    /// Strategy that moved the session; `None` while the round is still running
    pub strategy: Option<CompletionStrategy>,
}

/// Sessions the coordinator has already completed, or is completing right now.
///
/// Claiming is a compare-and-set on the session id, so only one caller can
/// run a completion round for a session no matter how many hooks fire.
#[derive(Debug, Default)]
pub struct CompletionRecords {
    records: Mutex<HashMap<SessionId, CompletionRecord>>,
}

impl CompletionRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the session for a completion round.
    ///
    /// Fails when another round already holds or has confirmed the record,
    /// so concurrent triggers run at most one round between them.
    pub fn try_claim(&self, id: SessionId, path: CompletionPath) -> bool {
        let mut records = self.lock();
        if records.contains_key(&id) {
            return false;
        }
        records.insert(
            id,
            CompletionRecord {
                path,
                strategy: None,
            },
        );
        true
    }

    /// Marks the claimed record as completed by `strategy`. A confirmed record
    /// is only removed on disconnect.
    pub fn confirm(&self, id: SessionId, strategy: CompletionStrategy) {
        if let Some(record) = self.lock().get_mut(&id) {
            record.strategy = Some(strategy);
        }
    }

    /// Drops a claim whose round did not complete. Confirmed records stay.
    pub fn release(&self, id: SessionId) -> bool {
        let mut records = self.lock();
        match records.get(&id) {
            Some(record) if record.strategy.is_none() => {
                records.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Snapshot of the session's record, if any.
    pub fn get(&self, id: SessionId) -> Option<CompletionRecord> {
        self.lock().get(&id).copied()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn remove(&self, id: SessionId) -> Option<CompletionRecord> {
        self.lock().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, CompletionRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// What one coordinator pass did for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    /// Not tracked, not bridged, or already past configuration
    Skipped,
    /// Another trigger already claimed completion
    AlreadyCompleted,
    /// Bridge-compatible tasks still have to run
    AwaitingTasks { remaining: usize },
    Completed { strategy: CompletionStrategy },
    /// The host accepted the call and waits for the client to confirm
    Pending { strategy: CompletionStrategy },
    /// No strategy worked; the watchdog is the backstop
    Stalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationDecision {
    Proceed,
    Suppress,
}

enum RoundEnd {
    Completed(CompletionStrategy),
    Pending(CompletionStrategy),
}

pub struct PhaseCoordinator {
    config: CoordinatorConfig,
    detector: Arc<BridgeDetector>,
    classifier: DisconnectClassifier,
    placement: SafePlacementResolver,
    sessions: Mutex<SessionRegistry>,
    records: Arc<CompletionRecords>,
    watchdog: Watchdog,
    spawn_sync: SpawnSynchronizer,
    tick_tx: TickSender,
    respawns: Mutex<HashMap<SessionId, JoinHandle<()>>>,
}

impl PhaseCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        registry: Option<Arc<dyn BridgeRegistry>>,
        tick_tx: TickSender,
    ) -> Self {
        if registry.is_none() {
            debug!("No bridge registry installed, detection relies on display names");
        }

        Self {
            detector: Arc::new(BridgeDetector::new(registry, &config.detector)),
            classifier: DisconnectClassifier::new(&config.disconnect),
            placement: SafePlacementResolver::new(config.placement.clone()),
            sessions: Mutex::new(SessionRegistry::new()),
            records: Arc::new(CompletionRecords::new()),
            watchdog: Watchdog::new(config.watchdog_timeout(), tick_tx.clone()),
            spawn_sync: SpawnSynchronizer::new(&config.spawn_sync, tick_tx.clone()),
            tick_tx,
            respawns: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Connection-accept hook. Classifies the session once and starts tracking it.
    ///
    /// Waits on the bridge registry for up to its configured bound. Hosts that
    /// cannot block their accept path classify through [`Self::detector`] on a
    /// task of their own and hand the answer to [`Self::admit_session`].
    pub async fn accept_session(&self, id: SessionId, display_name: &str) -> bool {
        let bridged = self.detector.is_bridged(id, display_name).await;
        self.admit_session(id, display_name, bridged)
    }

    /// Starts tracking a session that was already classified.
    pub fn admit_session(&self, id: SessionId, display_name: &str, bridged: bool) -> bool {
        self.lock_sessions()
            .insert(Session::new(id, display_name, bridged));
        debug!("Admitted session {} ({}), bridged: {}", id, display_name, bridged);
        bridged
    }

    /// Shared handle to the detector, for classifying off the tick thread.
    pub fn detector(&self) -> Arc<BridgeDetector> {
        Arc::clone(&self.detector)
    }

    /// Configuration-phase entry hook: arms the watchdog and runs the first pass.
    pub fn on_configuration_started<H: GameHost + ?Sized>(
        &self,
        host: &mut H,
        id: SessionId,
    ) -> DriveOutcome {
        let bridged = {
            let mut sessions = self.lock_sessions();
            match sessions.get_mut(id) {
                Some(session) => {
                    if session.config_started_at.is_none() {
                        session.config_started_at = Some(Instant::now());
                    }
                    session.is_bridged() && session.phase() < Phase::Interactive
                }
                None => return DriveOutcome::Skipped,
            }
        };

        if !bridged {
            return DriveOutcome::Skipped;
        }

        self.watchdog.arm(id);
        self.drive(host, id)
    }

    /// One graceful coordinator pass. Safe to call from any trigger point,
    /// e.g. whenever the host finishes a configuration task.
    pub fn drive<H: GameHost + ?Sized>(&self, host: &mut H, id: SessionId) -> DriveOutcome {
        if !self.is_configuring_bridged(id) {
            return DriveOutcome::Skipped;
        }
        if self.records.contains(id) {
            return DriveOutcome::AlreadyCompleted;
        }

        let remaining = match self.strip_incompatible(host, id) {
            Ok(remaining) => remaining,
            Err(e) => {
                debug!("Cannot inspect configuration tasks of {}: {}", id, e);
                return DriveOutcome::Skipped;
            }
        };
        if remaining > 0 {
            return DriveOutcome::AwaitingTasks { remaining };
        }

        self.begin_completion(host, id);

        {
            let mut sessions = self.lock_sessions();
            match sessions.get_mut(id) {
                Some(session) if !session.graceful_attempted => session.graceful_attempted = true,
                Some(_) => return DriveOutcome::Stalled,
                None => return DriveOutcome::Skipped,
            }
        }

        if !self.records.try_claim(id, CompletionPath::Graceful) {
            return DriveOutcome::AlreadyCompleted;
        }

        match self.run_round(host, id, CompletionPath::Graceful) {
            Ok(RoundEnd::Completed(strategy)) => {
                self.records.confirm(id, strategy);
                self.enter_interactive(host, id);
                DriveOutcome::Completed { strategy }
            }
            Ok(RoundEnd::Pending(strategy)) => {
                self.records.release(id);
                debug!("Session {} waits on the client after {}", id, strategy);
                DriveOutcome::Pending { strategy }
            }
            Err(e) => {
                self.records.release(id);
                warn!("{}; leaving session to the watchdog", e);
                DriveOutcome::Stalled
            }
        }
    }

    /// Drains every remaining task and runs the strategy sequence, treating
    /// an unconfirmed advance as a failure.
    pub fn force_completion<H: GameHost + ?Sized>(
        &self,
        host: &mut H,
        id: SessionId,
    ) -> Result<DriveOutcome, CompletionError> {
        if !self.is_configuring_bridged(id) {
            return Ok(DriveOutcome::Skipped);
        }
        if self.records.contains(id) {
            return Ok(DriveOutcome::AlreadyCompleted);
        }

        self.drain_tasks(host, id);
        self.begin_completion(host, id);

        if !self.records.try_claim(id, CompletionPath::Forced) {
            return Ok(DriveOutcome::AlreadyCompleted);
        }

        match self.run_round(host, id, CompletionPath::Forced) {
            Ok(RoundEnd::Completed(strategy)) => {
                self.records.confirm(id, strategy);
                info!("Forced completion of {} via {}", id, strategy);
                self.enter_interactive(host, id);
                Ok(DriveOutcome::Completed { strategy })
            }
            Ok(RoundEnd::Pending(strategy)) => {
                self.records.release(id);
                Ok(DriveOutcome::Pending { strategy })
            }
            Err(e) => {
                self.records.release(id);
                Err(e)
            }
        }
    }

    /// Host hook fired when the client confirmed the phase switch on its own.
    pub fn on_play_entered<H: GameHost + ?Sized>(&self, host: &mut H, id: SessionId) -> bool {
        self.enter_interactive(host, id)
    }

    /// Runs a job a timer queued for the tick thread.
    pub fn handle_tick_job<H: GameHost + ?Sized>(&self, host: &mut H, job: TickJob) {
        match job {
            TickJob::WatchdogExpired {
                session_id,
                generation,
            } => {
                self.on_watchdog_expired(host, session_id, generation);
            }
            TickJob::SpawnFollowup { session_id, stage } => {
                self.on_spawn_followup(host, session_id, stage);
            }
            TickJob::ForcedRespawn { session_id } => {
                self.on_forced_respawn(host, session_id);
            }
        }
    }

    /// Watchdog expiry, run on the tick thread.
    ///
    /// Ignores stale generations and sessions that already left or completed.
    /// Otherwise drains the task queue and forces completion; exhaustion is
    /// logged at error level and the session stays where it is.
    pub fn on_watchdog_expired<H: GameHost + ?Sized>(
        &self,
        host: &mut H,
        id: SessionId,
        generation: u64,
    ) -> DriveOutcome {
        if !self.watchdog.claim_expired(id, generation) {
            debug!("Ignoring stale watchdog expiry for {}", id);
            return DriveOutcome::Skipped;
        }
        if !host.is_connected(id) || !self.is_configuring_bridged(id) {
            return DriveOutcome::Skipped;
        }

        warn!(
            "Session {} still configuring after {:?}, forcing completion",
            id,
            self.watchdog.bound()
        );
        match self.force_completion(host, id) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{}; session left awaiting completion", e);
                DriveOutcome::Stalled
            }
        }
    }

    /// Delayed spawn-sync stage. The first stage also validates the player's
    /// position and moves an unsafe player to the spawn column.
    pub fn on_spawn_followup<H: GameHost + ?Sized>(
        &self,
        host: &mut H,
        id: SessionId,
        stage: usize,
    ) -> bool {
        if self.phase(id) != Some(Phase::Interactive) {
            return false;
        }
        let ran = self.spawn_sync.on_followup(host, id, stage);
        if ran && stage == 0 {
            self.validate_position(host, id);
        }
        ran
    }

    /// Moves the player to the safe default-spawn coordinate if it is below
    /// the level, in lava, or falling fast.
    pub fn validate_position<H: GameHost + ?Sized>(
        &self,
        host: &mut H,
        id: SessionId,
    ) -> Option<UnsafeReason> {
        let player = match host.player(id) {
            Ok(player) if !player.dead => player,
            Ok(_) => return None,
            Err(e) => {
                debug!("Cannot validate position of {}: {}", id, e);
                return None;
            }
        };

        let (reason, target) = match host.level_of(id) {
            Ok(level) => match self.placement.check(level, &player) {
                Some(reason) => (reason, self.placement.spawn_point(level)),
                None => return None,
            },
            Err(e) => {
                debug!("Cannot validate position of {}: {}", id, e);
                return None;
            }
        };

        warn!(
            "Session {} at unsafe position {:?}, moving to {}",
            id, reason, target
        );
        match host.teleport(id, target) {
            Ok(()) => {
                if let Err(e) = host.resend(id, Resend::Position) {
                    debug!("Position resend to {} failed: {}", id, e);
                }
            }
            Err(e) => debug!("Teleport of {} failed: {}", id, e),
        }
        Some(reason)
    }

    /// Death hook. Schedules a forced respawn when a bridged player died of
    /// something that points at a bad spawn position.
    pub fn on_death(&self, id: SessionId, cause: &str) -> bool {
        if !self.is_bridged(id) {
            return false;
        }
        let cause_lower = cause.to_lowercase();
        let spawn_related = self
            .config
            .respawn
            .spawn_death_causes
            .iter()
            .any(|keyword| !keyword.is_empty() && cause_lower.contains(&keyword.to_lowercase()));
        if !spawn_related {
            return false;
        }

        let mut respawns = self.lock_respawns();
        if respawns.contains_key(&id) {
            return false;
        }

        let delay = self.config.respawn_delay();
        let tick_tx = self.tick_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = tick_tx.send(TickJob::ForcedRespawn { session_id: id }) {
                error!("Failed to queue forced respawn for {}: {}", id, e);
            }
        });
        respawns.insert(id, handle);

        info!(
            "Bridged session {} died ({}), forcing respawn in {:?}",
            id, cause, delay
        );
        true
    }

    /// Scheduled respawn after a spawn-related death.
    ///
    /// Does nothing if the player already respawned. A failing host respawn
    /// falls back to recovering the existing player in place.
    pub fn on_forced_respawn<H: GameHost + ?Sized>(&self, host: &mut H, id: SessionId) -> bool {
        if self.lock_respawns().remove(&id).is_none() {
            return false;
        }
        if !host.is_connected(id) {
            return false;
        }

        match host.player(id) {
            Ok(player) if player.dead => {}
            Ok(_) => {
                debug!("Session {} already respawned", id);
                return false;
            }
            Err(e) => {
                debug!("Cannot respawn {}: {}", id, e);
                return false;
            }
        }

        if let Err(e) = host.respawn(id) {
            debug!("Host respawn of {} failed, recovering in place: {}", id, e);
        }
        self.recover(host, id)
    }

    /// Respawn hook: full vitals, safe default-spawn coordinate, state resend.
    pub fn on_respawned<H: GameHost + ?Sized>(&self, host: &mut H, id: SessionId) -> bool {
        if !self.is_bridged(id) {
            return false;
        }
        self.recover(host, id)
    }

    /// Termination hook. Cancels validation noise for bridged sessions.
    pub fn intercept_termination(&self, id: SessionId, reason: &str) -> TerminationDecision {
        if !self.is_bridged(id) {
            return TerminationDecision::Proceed;
        }

        match self.classifier.classify(reason) {
            DisconnectVerdict::Spurious { keyword } => {
                info!(
                    "Suppressed disconnect of bridged session {} ({:?}, matched {:?})",
                    id, reason, keyword
                );
                TerminationDecision::Suppress
            }
            DisconnectVerdict::Genuine { .. } | DisconnectVerdict::Unclassified => {
                TerminationDecision::Proceed
            }
        }
    }

    /// Packet-error hook. True when the error must not disconnect the session.
    pub fn intercept_packet_error(&self, id: SessionId, message: Option<&str>) -> bool {
        let suppress = self
            .classifier
            .should_suppress_packet_error(self.is_bridged(id), message);
        if suppress {
            debug!(
                "Ignoring packet error for bridged session {}: {}",
                id,
                message.unwrap_or("<no message>")
            );
        }
        suppress
    }

    /// Cancels every timer for the session and purges all tracking.
    pub fn on_disconnect(&self, id: SessionId) -> Option<Session> {
        let removed = {
            let mut sessions = self.lock_sessions();
            if let Some(session) = sessions.get_mut(id) {
                session.advance(Phase::Terminated);
            }
            sessions.remove(id)
        };

        self.watchdog.disarm(id);
        self.spawn_sync.cancel(id);
        if let Some(handle) = self.lock_respawns().remove(&id) {
            handle.abort();
        }
        self.records.remove(id);
        self.detector.forget(id);

        if let Some(session) = &removed {
            info!("Session {} ({}) terminated", id, session.display_name);
        }
        removed
    }

    pub fn phase(&self, id: SessionId) -> Option<Phase> {
        self.lock_sessions().get(id).map(Session::phase)
    }

    pub fn is_bridged(&self, id: SessionId) -> bool {
        self.lock_sessions().is_bridged(id)
    }

    /// Copy of the tracked session.
    pub fn session(&self, id: SessionId) -> Option<Session> {
        self.lock_sessions().get(id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.lock_sessions().len()
    }

    pub fn bridged_count(&self) -> usize {
        self.lock_sessions().bridged_count()
    }

    /// Diagnostic one-liner for a session, bounded against runaway nesting.
    pub fn describe_session(&self, id: SessionId) -> Option<String> {
        let depth = self.config.recursion.describe_depth;
        self.lock_sessions()
            .get(id)
            .map(|session| session.describe(depth))
    }

    pub fn records(&self) -> &CompletionRecords {
        &self.records
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    pub fn spawn_sync(&self) -> &SpawnSynchronizer {
        &self.spawn_sync
    }

    pub fn placement(&self) -> &SafePlacementResolver {
        &self.placement
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn is_configuring_bridged(&self, id: SessionId) -> bool {
        match self.lock_sessions().get(id) {
            Some(session) => session.is_bridged() && session.phase() < Phase::Interactive,
            None => false,
        }
    }

    /// Removes bridge-incompatible tasks and returns how many tasks remain.
    fn strip_incompatible<H: GameHost + ?Sized>(
        &self,
        host: &mut H,
        id: SessionId,
    ) -> Result<usize, HostError> {
        let tasks = host.pending_tasks(id)?;
        if tasks.is_empty() {
            return Ok(0);
        }
        debug!(
            "Session {} pending tasks: {}",
            id,
            describe_tasks(&tasks, self.config.recursion.concat_depth)
        );

        let markers = &self.config.completion.incompatible_task_markers;
        let mut remaining = 0;
        for task in &tasks {
            if !task.is_bridge_incompatible(markers) {
                remaining += 1;
                continue;
            }
            match host.remove_task(id, task.id) {
                Ok(_) => debug!("Skipped task #{} ({}) for {}", task.id, task.kind, id),
                Err(e) => {
                    debug!("Cannot skip task #{} for {}: {}", task.id, id, e);
                    remaining += 1;
                }
            }
        }
        Ok(remaining)
    }

    fn drain_tasks<H: GameHost + ?Sized>(&self, host: &mut H, id: SessionId) {
        let tasks = match host.pending_tasks(id) {
            Ok(tasks) => tasks,
            Err(e) => {
                debug!("Cannot drain tasks of {}: {}", id, e);
                return;
            }
        };
        for task in tasks {
            if let Err(e) = host.remove_task(id, task.id) {
                debug!("Cannot drain task #{} for {}: {}", task.id, id, e);
            }
        }
    }

    /// Enters `AwaitingCompletion` and, the first time, places the player on
    /// safe ground before any world data is sent.
    fn begin_completion<H: GameHost + ?Sized>(&self, host: &mut H, id: SessionId) {
        let entered = self
            .lock_sessions()
            .get_mut(id)
            .map(|session| session.advance(Phase::AwaitingCompletion))
            .unwrap_or(false);
        if !entered {
            return;
        }

        let target = match host.level_of(id) {
            Ok(level) => self.placement.initial_placement(level),
            Err(e) => {
                debug!("No level for initial placement of {}: {}", id, e);
                return;
            }
        };
        match host.teleport(id, target) {
            Ok(()) => debug!("Initial placement of {} at {}", id, target),
            Err(e) => debug!("Initial placement of {} failed: {}", id, e),
        }
    }

    fn run_round<H: GameHost + ?Sized>(
        &self,
        host: &mut H,
        id: SessionId,
        path: CompletionPath,
    ) -> Result<RoundEnd, CompletionError> {
        let mut failures = Vec::new();

        for strategy in CompletionStrategy::ORDER {
            match strategy.invoke(host, id) {
                Ok(Advance::Completed) => return Ok(RoundEnd::Completed(strategy)),
                Ok(Advance::Pending) if path == CompletionPath::Graceful => {
                    return Ok(RoundEnd::Pending(strategy));
                }
                Ok(Advance::Pending) => {
                    debug!("{} for {} unconfirmed, trying next", strategy, id);
                    failures.push(StrategyFailure {
                        strategy,
                        cause: StrategyFailureCause::Unconfirmed,
                    });
                }
                Err(e) => {
                    debug!("{} for {} failed: {}", strategy, id, e);
                    failures.push(StrategyFailure {
                        strategy,
                        cause: StrategyFailureCause::Host(e),
                    });
                }
            }
        }

        Err(CompletionError::Exhausted {
            session: id,
            failures,
        })
    }

    fn enter_interactive<H: GameHost + ?Sized>(&self, host: &mut H, id: SessionId) -> bool {
        let (bridged, elapsed) = {
            let mut sessions = self.lock_sessions();
            let session = match sessions.get_mut(id) {
                Some(session) => session,
                None => return false,
            };
            if !session.advance(Phase::Interactive) {
                return false;
            }
            (session.is_bridged(), session.configuring_for())
        };

        self.watchdog.disarm(id);
        match elapsed {
            Some(elapsed) => info!(
                "Session {} completed configuration in {} ms",
                id,
                elapsed.as_millis()
            ),
            None => info!("Session {} entered play", id),
        }

        if bridged {
            self.spawn_sync.begin(host, id);
        }
        true
    }

    fn recover<H: GameHost + ?Sized>(&self, host: &mut H, id: SessionId) -> bool {
        if let Err(e) = host.restore_vitals(id) {
            debug!("Cannot restore vitals of {}: {}", id, e);
        }

        let target = match host.level_of(id) {
            Ok(level) => self.placement.spawn_point(level),
            Err(e) => {
                debug!("No level to recover {} into: {}", id, e);
                return false;
            }
        };
        if let Err(e) = host.teleport(id, target) {
            debug!("Recovery teleport of {} failed: {}", id, e);
            return false;
        }

        self.spawn_sync.resend_followup(host, id);
        info!("Recovered bridged session {} at {}", id, target);
        true
    }

    fn lock_sessions(&self) -> MutexGuard<'_, SessionRegistry> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_respawns(&self) -> MutexGuard<'_, HashMap<SessionId, JoinHandle<()>>> {
        self.respawns.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for PhaseCoordinator {
    fn drop(&mut self) {
        for (_, handle) in self.lock_respawns().drain() {
            handle.abort();
        }
    }
}
