//! Integration tests for the phase coordinator
//!
//! These tests drive the coordinator end to end against an in-memory
//! recording host and against the demo host.

use server::config::CoordinatorConfig;
use server::coordinator::{CompletionPath, CompletionStrategy, DriveOutcome, PhaseCoordinator};
use server::error::HostError;
use server::host::{Advance, ConfigPhaseHost, ConfigTask, Level, PlayerHost, PlayerSnapshot};
use server::tick::{self, TickJob, TickReceiver};
use server::world::FlatLevel;
use shared::{Phase, Resend, SafeCoordinate, SessionId, Vec3};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Host that records every side effect the coordinator causes
struct RecordingHost {
    level: FlatLevel,
    tasks: HashMap<SessionId, Vec<ConfigTask>>,
    /// When set, finish-configuration is accepted but never confirmed
    hang_on_finish: bool,
    players: HashMap<SessionId, PlayerSnapshot>,
    in_play: HashMap<SessionId, bool>,
    advances: usize,
    resends: Vec<(SessionId, Resend)>,
}

impl RecordingHost {
    fn new() -> Self {
        Self {
            level: FlatLevel::new(63),
            tasks: HashMap::new(),
            hang_on_finish: false,
            players: HashMap::new(),
            in_play: HashMap::new(),
            advances: 0,
            resends: Vec::new(),
        }
    }

    fn connect(&mut self, id: SessionId, kinds: &[&str]) {
        let tasks = kinds
            .iter()
            .enumerate()
            .map(|(index, kind)| ConfigTask::new(index as u32, *kind))
            .collect();
        self.tasks.insert(id, tasks);
        self.in_play.insert(id, false);
        self.players.insert(
            id,
            PlayerSnapshot {
                position: Vec3::new(0.5, 64.0, 0.5),
                velocity: Vec3::default(),
                health: 20.0,
                max_health: 20.0,
                dead: false,
            },
        );
    }

    fn enter_play(&mut self, id: SessionId) -> Result<Advance, HostError> {
        match self.in_play.get_mut(&id) {
            Some(in_play) if !*in_play => {
                *in_play = true;
                self.advances += 1;
                Ok(Advance::Completed)
            }
            Some(_) => Err(HostError::Rejected {
                operation: "advance_phase",
                reason: "already in play".to_string(),
            }),
            None => Err(HostError::SessionGone(id)),
        }
    }
}

impl ConfigPhaseHost for RecordingHost {
    fn pending_tasks(&self, id: SessionId) -> Result<Vec<ConfigTask>, HostError> {
        self.tasks.get(&id).cloned().ok_or(HostError::SessionGone(id))
    }

    fn remove_task(&mut self, id: SessionId, task_id: u32) -> Result<bool, HostError> {
        let tasks = self.tasks.get_mut(&id).ok_or(HostError::SessionGone(id))?;
        let before = tasks.len();
        tasks.retain(|task| task.id != task_id);
        Ok(tasks.len() != before)
    }

    fn finish_configuration(&mut self, id: SessionId) -> Result<Advance, HostError> {
        if self.hang_on_finish {
            return Ok(Advance::Pending);
        }
        self.enter_play(id)
    }

    fn advance_phase(&mut self, id: SessionId) -> Result<Advance, HostError> {
        self.enter_play(id)
    }

    fn signal_client_finished(&mut self, id: SessionId) -> Result<Advance, HostError> {
        self.enter_play(id)
    }

    fn is_connected(&self, id: SessionId) -> bool {
        self.in_play.contains_key(&id)
    }
}

impl PlayerHost for RecordingHost {
    fn player(&self, id: SessionId) -> Result<PlayerSnapshot, HostError> {
        self.players.get(&id).copied().ok_or(HostError::SessionGone(id))
    }

    fn level_of(&self, _id: SessionId) -> Result<&dyn Level, HostError> {
        Ok(&self.level)
    }

    fn teleport(&mut self, id: SessionId, target: SafeCoordinate) -> Result<(), HostError> {
        let player = self.players.get_mut(&id).ok_or(HostError::SessionGone(id))?;
        player.position = target.as_vec3();
        Ok(())
    }

    fn resend(&mut self, id: SessionId, resend: Resend) -> Result<(), HostError> {
        self.resends.push((id, resend));
        Ok(())
    }

    fn restore_vitals(&mut self, _id: SessionId) -> Result<(), HostError> {
        Ok(())
    }

    fn respawn(&mut self, _id: SessionId) -> Result<(), HostError> {
        Ok(())
    }
}

const INCOMPATIBLE: [&str; 2] = ["neoforge:sync_registries", "neoforge:SyncConfig"];

fn coordinator() -> (PhaseCoordinator, TickReceiver) {
    let (tx, rx) = tick::tick_channel();
    (PhaseCoordinator::new(CoordinatorConfig::default(), None, tx), rx)
}

/// END-TO-END SCENARIOS
mod scenario_tests {
    use super::*;

    /// Two bridge-incompatible tasks are stripped and the session reaches
    /// play in a single pass, without the watchdog ever firing
    #[tokio::test(start_paused = true)]
    async fn bridged_session_completes_in_one_pass() {
        let (coordinator, mut rx) = coordinator();
        let mut host = RecordingHost::new();
        let id = SessionId(1);
        host.connect(id, &INCOMPATIBLE);

        assert!(coordinator.accept_session(id, ".Alex").await);
        let outcome = coordinator.on_configuration_started(&mut host, id);

        assert_eq!(
            outcome,
            DriveOutcome::Completed {
                strategy: CompletionStrategy::FinishConfiguration
            }
        );
        assert!(host.tasks[&id].is_empty());
        assert_eq!(coordinator.phase(id), Some(Phase::Interactive));
        assert_eq!(host.advances, 1);

        // Run every timer to completion; none of them may be the watchdog.
        tokio::time::sleep(Duration::from_secs(60)).await;
        let jobs = tick::drain(&mut rx);
        assert!(jobs
            .iter()
            .all(|job| !matches!(job, TickJob::WatchdogExpired { .. })));
        assert_eq!(jobs.len(), 2);
        for job in jobs {
            coordinator.handle_tick_job(&mut host, job);
        }

        let followup = CoordinatorConfig::default().spawn_sync.followup.len();
        let expected = Resend::FULL_SEQUENCE.len() + 2 * followup;
        assert_eq!(host.resends.len(), expected);
    }

    /// A session whose graceful finish hangs is forced at the watchdog bound,
    /// never earlier, and is advanced exactly once
    #[tokio::test(start_paused = true)]
    async fn hanging_finish_is_forced_at_the_bound() {
        let (coordinator, mut rx) = coordinator();
        let mut host = RecordingHost::new();
        host.hang_on_finish = true;
        let id = SessionId(2);
        host.connect(id, &INCOMPATIBLE);

        coordinator.accept_session(id, ".Alex").await;
        assert_eq!(
            coordinator.on_configuration_started(&mut host, id),
            DriveOutcome::Pending {
                strategy: CompletionStrategy::FinishConfiguration
            }
        );

        tokio::time::sleep(Duration::from_millis(29_900)).await;
        assert!(tick::drain(&mut rx).is_empty());
        assert_eq!(coordinator.phase(id), Some(Phase::AwaitingCompletion));

        tokio::time::sleep(Duration::from_millis(200)).await;
        let jobs = tick::drain(&mut rx);
        assert_eq!(jobs.len(), 1);
        for job in jobs {
            coordinator.handle_tick_job(&mut host, job);
        }

        assert_eq!(coordinator.phase(id), Some(Phase::Interactive));
        assert_eq!(coordinator.records().len(), 1);
        let record = coordinator.records().get(id).unwrap();
        assert_eq!(record.path, CompletionPath::Forced);
        assert_eq!(record.strategy, Some(CompletionStrategy::DirectAdvance));
        assert_eq!(host.advances, 1);
        assert!(!coordinator.watchdog().is_armed(id));
    }

    /// Concurrent forced completion of one session advances it once
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_forcing_advances_once() {
        let (coordinator, _rx) = coordinator();
        let coordinator = Arc::new(coordinator);
        let host = Arc::new(Mutex::new(RecordingHost::new()));
        let id = SessionId(3);
        host.lock().unwrap().connect(id, &INCOMPATIBLE);
        coordinator.accept_session(id, ".Alex").await;

        let runtime = tokio::runtime::Handle::current();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                let host = Arc::clone(&host);
                let runtime = runtime.clone();
                std::thread::spawn(move || {
                    let _guard = runtime.enter();
                    let mut host = host.lock().unwrap();
                    coordinator.force_completion(&mut *host, id)
                })
            })
            .collect();

        let completed = threads
            .into_iter()
            .map(|thread| thread.join().unwrap())
            .filter(|outcome| matches!(outcome, Ok(DriveOutcome::Completed { .. })))
            .count();

        assert_eq!(completed, 1);
        assert_eq!(coordinator.records().len(), 1);
        assert_eq!(host.lock().unwrap().advances, 1);
    }

    /// Disconnect mid-configuration cancels the watchdog and purges tracking
    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_work() {
        let (coordinator, mut rx) = coordinator();
        let mut host = RecordingHost::new();
        host.hang_on_finish = true;
        let id = SessionId(4);
        host.connect(id, &INCOMPATIBLE);

        coordinator.accept_session(id, ".Alex").await;
        coordinator.on_configuration_started(&mut host, id);
        coordinator.on_disconnect(id);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(tick::drain(&mut rx).is_empty());
        assert_eq!(coordinator.session_count(), 0);
        assert!(coordinator.records().is_empty());
    }
}

/// COMPONENT PROPERTIES
mod property_tests {
    use super::*;
    use server::classifier::DisconnectClassifier;
    use server::config::{DisconnectConfig, PlacementConfig};
    use server::detector::BridgeDetector;
    use server::error::RegistryError;
    use server::host::BridgeRegistry;
    use server::placement::SafePlacementResolver;
    use server::recursion_guard;
    use assert_approx_eq::assert_approx_eq;

    struct EveryoneIsBridged;

    impl BridgeRegistry for EveryoneIsBridged {
        fn lookup(&self, _id: SessionId) -> Result<bool, RegistryError> {
            Ok(true)
        }
    }

    /// Without a registry, unmarked names are never classified as bridged
    #[tokio::test]
    async fn detector_is_conservative_without_registry() {
        let config = CoordinatorConfig::default();
        let absent = BridgeDetector::new(None, &config.detector);
        let present = BridgeDetector::new(Some(Arc::new(EveryoneIsBridged)), &config.detector);

        for (index, name) in ["Alex", "Steve", "a.b", "_dot", ""].iter().enumerate() {
            let id = SessionId(index as u64);
            assert!(!absent.is_bridged(id, name).await, "{:?}", name);
            assert!(present.is_bridged(id, name).await, "{:?}", name);
        }
    }

    /// The first answer sticks for the lifetime of the session
    #[test]
    fn detector_caches_the_first_classification() {
        let config = CoordinatorConfig::default();
        let detector = BridgeDetector::new(None, &config.detector);
        let id = SessionId(7);

        assert!(tokio_test::block_on(detector.is_bridged(id, ".Steve")));
        assert!(tokio_test::block_on(detector.is_bridged(id, "Steve")));
        assert_eq!(detector.cached(id), Some(true));

        detector.forget(id);
        assert_eq!(detector.cached(id), None);
        assert!(!tokio_test::block_on(detector.is_bridged(id, "Steve")));
    }

    /// Any reason mixing allow and suppress keywords is let through
    #[test]
    fn allow_keywords_always_win() {
        let config = DisconnectConfig::default();
        let classifier = DisconnectClassifier::new(&config);

        for allow in &config.allow_keywords {
            for suppress in &config.suppress_keywords {
                let reason = format!("{} during {} check", allow, suppress);
                assert!(
                    !classifier.should_suppress(true, &reason),
                    "{:?} was suppressed",
                    reason
                );
            }
        }
        assert!(!classifier.should_suppress(true, "connection timeout during movement validation"));
    }

    #[test]
    fn safe_y_is_deterministic() {
        let resolver = SafePlacementResolver::new(PlacementConfig::default());

        let ground = FlatLevel::new(63);
        assert_approx_eq!(resolver.find_safe_y(&ground, 10.0, -4.0), 64.1);

        let void = FlatLevel::void();
        let expected = (void.sea_level() + 10) as f64;
        assert_approx_eq!(resolver.find_safe_y(&void, 10.0, -4.0), expected);
    }

    /// A list that contains itself still renders, truncated at the bound
    #[test]
    fn recursion_guard_terminates_on_cycles() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Dialog {
            children: RefCell<Vec<Rc<Dialog>>>,
        }

        fn describe(dialog: &Rc<Dialog>) -> String {
            recursion_guard::guarded(50, "Dialog", Rc::as_ptr(dialog) as usize, || {
                let children: Vec<String> = dialog.children.borrow().iter().map(describe).collect();
                format!("Dialog[{}]", children.join(","))
            })
        }

        let dialog = Rc::new(Dialog {
            children: RefCell::new(Vec::new()),
        });
        dialog.children.borrow_mut().push(Rc::clone(&dialog));

        let text = describe(&dialog);
        assert_eq!(text.matches("Dialog[").count(), 50);
        assert!(text.contains("[recursion prevented]"));
        assert_eq!(recursion_guard::current_depth(), 0);

        dialog.children.borrow_mut().clear();
    }
}

/// DEMO HOST
mod demo_host_tests {
    use super::*;
    use server::coordinator::TerminationDecision;
    use server::game::{GameState, MoveOutcome};

    /// The demo host only confirms finish-configuration on a client ack, so a
    /// silent bridged client reaches play through the watchdog
    #[tokio::test(start_paused = true)]
    async fn silent_bridged_client_is_forced_into_play() {
        let (coordinator, mut rx) = coordinator();
        let mut game = GameState::new(FlatLevel::new(63));
        let id = SessionId(10);

        game.add_session(id, ".Alex");
        coordinator.accept_session(id, ".Alex").await;
        assert_eq!(
            coordinator.on_configuration_started(&mut game, id),
            DriveOutcome::AwaitingTasks { remaining: 1 }
        );

        let vanilla = game.pending_tasks(id).unwrap()[0].id;
        assert!(game.complete_task(id, vanilla));
        assert!(matches!(
            coordinator.drive(&mut game, id),
            DriveOutcome::Pending { .. }
        ));

        let job = rx.recv().await.unwrap();
        assert!(matches!(job, TickJob::WatchdogExpired { .. }));
        coordinator.handle_tick_job(&mut game, job);

        assert_eq!(game.phase(id), Some(Phase::Interactive));
        assert_eq!(coordinator.phase(id), Some(Phase::Interactive));
    }

    /// A native client that acknowledges everything never involves the coordinator
    #[tokio::test(start_paused = true)]
    async fn native_client_plays_normally() {
        let (coordinator, _rx) = coordinator();
        let mut game = GameState::new(FlatLevel::new(63));
        let id = SessionId(11);

        game.add_session(id, "Sam");
        coordinator.accept_session(id, "Sam").await;
        assert_eq!(
            coordinator.on_configuration_started(&mut game, id),
            DriveOutcome::Skipped
        );

        for task in game.pending_tasks(id).unwrap() {
            game.complete_task(id, task.id);
        }
        assert!(game.client_finished(id));
        assert!(coordinator.on_play_entered(&mut game, id));
        assert!(!coordinator.watchdog().is_armed(id));

        let outcome = game.apply_move(id, Vec3::new(40.0, 64.0, 0.5), 0.0);
        let MoveOutcome::Rejected { reason } = outcome else {
            panic!("expected the move to be rejected");
        };
        assert_eq!(
            coordinator.intercept_termination(id, &reason),
            TerminationDecision::Proceed
        );
    }
}
