//! In-memory demo host: configuration task queues, players and a flat level.
//!
//! `GameState` implements the host traits so the coordinator can be driven
//! end to end without a real game server. Outbound packets are queued per
//! session and flushed by the network layer after every event.

use crate::error::HostError;
use crate::host::{Advance, ConfigPhaseHost, ConfigTask, Level, PlayerHost, PlayerSnapshot};
use crate::world::FlatLevel;
use log::{debug, info};
use shared::{
    GameMode, Packet, Phase, Resend, ResendPayload, SafeCoordinate, SessionId, Vec3, Weather,
};
use std::collections::HashMap;

/// Longest distance a single move packet may cover before validation rejects it.
pub const MAX_MOVE_DISTANCE: f64 = 10.0;

/// Task kinds every session receives, in queue order.
pub const DEFAULT_TASKS: [&str; 3] = [
    "minecraft:known_packs",
    "neoforge:sync_registries",
    "neoforge:SyncConfig",
];

const MAX_AIR: u32 = 300;
const MAX_FOOD: u8 = 20;
const TICKS_PER_DAY: u64 = 24_000;
/// View radius sent with the chunk cache centre.
const CHUNK_VIEW_RADIUS: u8 = 4;
const WORLD_BORDER_SIZE: f64 = 59_999_968.0;

#[derive(Debug, Clone)]
pub struct PlayerState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub health: f32,
    pub max_health: f32,
    pub dead: bool,
    pub on_fire: bool,
    pub air: u32,
    pub food: u8,
    pub saturation: f32,
    pub mode: GameMode,
    pub held_slot: u8,
    pub inventory: Vec<Option<u16>>,
}

impl PlayerState {
    fn new(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::default(),
            health: 20.0,
            max_health: 20.0,
            dead: false,
            on_fire: false,
            air: MAX_AIR,
            food: MAX_FOOD,
            saturation: 5.0,
            mode: GameMode::Survival,
            held_slot: 0,
            inventory: vec![None; 36],
        }
    }
}

#[derive(Debug, Clone)]
struct HostSession {
    display_name: String,
    phase: Phase,
    tasks: Vec<ConfigTask>,
    /// Finish-configuration was sent and the client has not acknowledged it yet
    finish_sent: bool,
    player: PlayerState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    Moved,
    /// Host validation refused the move and asks for termination
    Rejected { reason: String },
    Died { cause: String },
}

pub struct GameState {
    pub tick: u64,
    level: FlatLevel,
    sessions: HashMap<SessionId, HostSession>,
    outbox: Vec<(SessionId, Packet)>,
    next_task_id: u32,
    weather: Weather,
}

impl GameState {
    pub fn new(level: FlatLevel) -> Self {
        Self {
            tick: 0,
            level,
            sessions: HashMap::new(),
            outbox: Vec::new(),
            next_task_id: 1,
            weather: Weather::Clear,
        }
    }

    pub fn level_mut(&mut self) -> &mut FlatLevel {
        &mut self.level
    }

    /// Creates the host side of a connection with the default task queue.
    pub fn add_session(&mut self, id: SessionId, display_name: &str) {
        let (sx, sy, sz) = self.level.default_spawn();
        let tasks = DEFAULT_TASKS
            .iter()
            .map(|kind| {
                let task = ConfigTask::new(self.next_task_id, *kind);
                self.next_task_id += 1;
                task
            })
            .collect();

        self.sessions.insert(
            id,
            HostSession {
                display_name: display_name.to_string(),
                phase: Phase::Configuring,
                tasks,
                finish_sent: false,
                player: PlayerState::new(Vec3::new(sx as f64 + 0.5, sy as f64, sz as f64 + 0.5)),
            },
        );
        info!("Added session {} ({})", id, display_name);
    }

    /// Removes a session along with any packets still queued for it.
    pub fn remove_session(&mut self, id: SessionId) -> bool {
        self.outbox.retain(|(target, _)| *target != id);
        match self.sessions.remove(&id) {
            Some(session) => {
                info!("Removed session {} ({})", id, session.display_name);
                true
            }
            None => false,
        }
    }

    /// Sends every queued task to the client.
    pub fn announce_tasks(&mut self, id: SessionId) {
        let tasks = match self.sessions.get(&id) {
            Some(session) => session.tasks.clone(),
            None => return,
        };
        for task in tasks {
            self.queue(
                id,
                Packet::ConfigurationTask {
                    task_id: task.id,
                    kind: task.kind,
                },
            );
        }
    }

    /// The client reported a task as done.
    pub fn complete_task(&mut self, id: SessionId, task_id: u32) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                let before = session.tasks.len();
                session.tasks.retain(|task| task.id != task_id);
                session.tasks.len() != before
            }
            None => false,
        }
    }

    /// The client acknowledged finish-configuration. True if this moved it into play.
    pub fn client_finished(&mut self, id: SessionId) -> bool {
        let ready = match self.sessions.get(&id) {
            Some(session) => session.phase < Phase::Interactive && session.tasks.is_empty(),
            None => false,
        };
        if ready {
            self.enter_play(id);
        }
        ready
    }

    pub fn phase(&self, id: SessionId) -> Option<Phase> {
        self.sessions.get(&id).map(|session| session.phase)
    }

    pub fn player_state(&self, id: SessionId) -> Option<&PlayerState> {
        self.sessions.get(&id).map(|session| &session.player)
    }

    /// Applies a client move under host validation rules.
    pub fn apply_move(&mut self, id: SessionId, position: Vec3, vel_y: f64) -> MoveOutcome {
        let min_y = self.level.min_y();
        let session = match self.sessions.get_mut(&id) {
            Some(session) if session.phase == Phase::Interactive && !session.player.dead => session,
            _ => return MoveOutcome::Moved,
        };

        if session.player.position.distance(&position) > MAX_MOVE_DISTANCE {
            return MoveOutcome::Rejected {
                reason: "Invalid move player packet received".to_string(),
            };
        }

        session.player.position = position;
        session.player.velocity = Vec3::new(0.0, vel_y, 0.0);

        let cause = if position.y < (min_y - 64) as f64 {
            Some("death.attack.outOfWorld (void)")
        } else {
            let (bx, by, bz) = position.block();
            if self.level.block_state(bx, by, bz).is_hazardous() {
                Some("death.attack.lava")
            } else {
                None
            }
        };

        match cause {
            Some(cause) => {
                let player = &mut session.player;
                player.dead = true;
                player.health = 0.0;
                player.velocity = Vec3::default();
                debug!("Session {} died: {}", id, cause);
                MoveOutcome::Died {
                    cause: cause.to_string(),
                }
            }
            None => MoveOutcome::Moved,
        }
    }

    /// Advances world time by one tick.
    pub fn advance_tick(&mut self) {
        self.tick += 1;
    }

    /// Takes every packet queued since the last flush, in order.
    pub fn drain_outbox(&mut self) -> Vec<(SessionId, Packet)> {
        std::mem::take(&mut self.outbox)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn enter_play(&mut self, id: SessionId) {
        let position = match self.sessions.get_mut(&id) {
            Some(session) => {
                session.phase = Phase::Interactive;
                session.finish_sent = false;
                session.player.position
            }
            None => return,
        };
        self.queue(id, Packet::StartPlay { position });
        debug!("Session {} entered play at {:?}", id, position);
    }

    fn queue(&mut self, id: SessionId, packet: Packet) {
        self.outbox.push((id, packet));
    }

    fn session(&self, id: SessionId) -> Result<&HostSession, HostError> {
        self.sessions.get(&id).ok_or(HostError::SessionGone(id))
    }

    fn session_mut(&mut self, id: SessionId) -> Result<&mut HostSession, HostError> {
        self.sessions.get_mut(&id).ok_or(HostError::SessionGone(id))
    }

    fn configuring(&mut self, id: SessionId, operation: &'static str) -> Result<&mut HostSession, HostError> {
        let session = self.session_mut(id)?;
        if session.phase >= Phase::Interactive {
            return Err(HostError::Rejected {
                operation,
                reason: "session is already in play".to_string(),
            });
        }
        Ok(session)
    }

    fn payload(&self, resend: Resend, player: &PlayerState) -> ResendPayload {
        match resend {
            Resend::Abilities => ResendPayload::Abilities {
                may_fly: matches!(player.mode, GameMode::Creative | GameMode::Spectator),
                invulnerable: matches!(player.mode, GameMode::Creative),
            },
            Resend::Position => ResendPayload::Position {
                position: player.position,
                yaw: 0.0,
                pitch: 0.0,
            },
            Resend::GameMode => ResendPayload::GameMode { mode: player.mode },
            Resend::HeldItem => ResendPayload::HeldItem {
                slot: player.held_slot,
            },
            Resend::Inventory => ResendPayload::Inventory {
                slots: player.inventory.clone(),
            },
            Resend::Health => ResendPayload::Health {
                health: player.health,
                food: player.food,
                saturation: player.saturation,
            },
            Resend::ChunkCacheCenter => {
                let (bx, _, bz) = player.position.block();
                ResendPayload::ChunkCacheCenter {
                    chunk_x: bx >> 4,
                    chunk_z: bz >> 4,
                    radius: CHUNK_VIEW_RADIUS,
                }
            }
            Resend::WorldBorder => {
                let (sx, _, sz) = self.level.default_spawn();
                ResendPayload::WorldBorder {
                    center_x: sx as f64 + 0.5,
                    center_z: sz as f64 + 0.5,
                    size: WORLD_BORDER_SIZE,
                }
            }
            Resend::WorldTime => ResendPayload::WorldTime {
                game_time: self.tick,
                day_time: self.tick % TICKS_PER_DAY,
            },
            Resend::Weather => ResendPayload::Weather {
                weather: self.weather,
            },
            Resend::ChunkLoadStart => ResendPayload::ChunkLoadStart,
        }
    }
}

impl ConfigPhaseHost for GameState {
    fn pending_tasks(&self, id: SessionId) -> Result<Vec<ConfigTask>, HostError> {
        Ok(self.session(id)?.tasks.clone())
    }

    fn remove_task(&mut self, id: SessionId, task_id: u32) -> Result<bool, HostError> {
        let session = self.session_mut(id)?;
        let before = session.tasks.len();
        session.tasks.retain(|task| task.id != task_id);
        Ok(session.tasks.len() != before)
    }

    /// Native handshake: the host waits for the client to acknowledge.
    fn finish_configuration(&mut self, id: SessionId) -> Result<Advance, HostError> {
        let session = self.configuring(id, "finish_configuration")?;
        if !session.tasks.is_empty() {
            return Err(HostError::Rejected {
                operation: "finish_configuration",
                reason: format!("{} tasks still queued", session.tasks.len()),
            });
        }
        session.finish_sent = true;
        Ok(Advance::Pending)
    }

    fn advance_phase(&mut self, id: SessionId) -> Result<Advance, HostError> {
        self.configuring(id, "advance_phase")?;
        self.enter_play(id);
        Ok(Advance::Completed)
    }

    fn signal_client_finished(&mut self, id: SessionId) -> Result<Advance, HostError> {
        let session = self.configuring(id, "signal_client_finished")?;
        if !session.finish_sent {
            return Err(HostError::Rejected {
                operation: "signal_client_finished",
                reason: "finish-configuration was never sent".to_string(),
            });
        }
        self.enter_play(id);
        Ok(Advance::Completed)
    }

    fn is_connected(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }
}

impl PlayerHost for GameState {
    fn player(&self, id: SessionId) -> Result<PlayerSnapshot, HostError> {
        let player = &self.session(id)?.player;
        Ok(PlayerSnapshot {
            position: player.position,
            velocity: player.velocity,
            health: player.health,
            max_health: player.max_health,
            dead: player.dead,
        })
    }

    fn level_of(&self, id: SessionId) -> Result<&dyn Level, HostError> {
        self.session(id)?;
        Ok(&self.level)
    }

    fn teleport(&mut self, id: SessionId, target: SafeCoordinate) -> Result<(), HostError> {
        let player = &mut self.session_mut(id)?.player;
        player.position = target.as_vec3();
        player.velocity = Vec3::default();
        Ok(())
    }

    fn resend(&mut self, id: SessionId, resend: Resend) -> Result<(), HostError> {
        let payload = self.payload(resend, &self.session(id)?.player);
        self.queue(id, Packet::Resent { payload });
        Ok(())
    }

    fn restore_vitals(&mut self, id: SessionId) -> Result<(), HostError> {
        let player = &mut self.session_mut(id)?.player;
        player.health = player.max_health;
        player.on_fire = false;
        player.air = MAX_AIR;
        Ok(())
    }

    fn respawn(&mut self, id: SessionId) -> Result<(), HostError> {
        let (sx, sy, sz) = self.level.default_spawn();
        let player = &mut self.session_mut(id)?.player;
        if !player.dead {
            return Err(HostError::Rejected {
                operation: "respawn",
                reason: "player is alive".to_string(),
            });
        }
        *player = PlayerState {
            mode: player.mode,
            ..PlayerState::new(Vec3::new(sx as f64 + 0.5, sy as f64, sz as f64 + 0.5))
        };
        let position = player.position;
        self.queue(id, Packet::StartPlay { position });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::BlockState;

    fn game_with_session() -> (GameState, SessionId) {
        let mut game = GameState::new(FlatLevel::new(63));
        let id = SessionId(7);
        game.add_session(id, ".Alex");
        (game, id)
    }

    fn play(game: &mut GameState, id: SessionId) {
        for task in game.pending_tasks(id).unwrap() {
            game.remove_task(id, task.id).unwrap();
        }
        game.advance_phase(id).unwrap();
        game.drain_outbox();
    }

    #[test]
    fn sessions_start_with_the_default_task_queue() {
        let (mut game, id) = game_with_session();
        let kinds: Vec<_> = game
            .pending_tasks(id)
            .unwrap()
            .into_iter()
            .map(|task| task.kind)
            .collect();
        assert_eq!(kinds, DEFAULT_TASKS.to_vec());

        game.announce_tasks(id);
        assert_eq!(game.drain_outbox().len(), 3);
    }

    #[test]
    fn finish_configuration_waits_for_the_client() {
        let (mut game, id) = game_with_session();
        assert!(game.finish_configuration(id).is_err());

        for task in game.pending_tasks(id).unwrap() {
            assert!(game.complete_task(id, task.id));
        }
        assert_eq!(game.finish_configuration(id), Ok(Advance::Pending));
        assert_eq!(game.phase(id), Some(Phase::Configuring));

        assert!(game.client_finished(id));
        assert_eq!(game.phase(id), Some(Phase::Interactive));
        assert!(matches!(
            game.drain_outbox().as_slice(),
            [(_, Packet::StartPlay { .. })]
        ));
    }

    #[test]
    fn synthetic_finish_requires_a_sent_finish() {
        let (mut game, id) = game_with_session();
        for task in game.pending_tasks(id).unwrap() {
            game.remove_task(id, task.id).unwrap();
        }
        assert!(game.signal_client_finished(id).is_err());
        game.finish_configuration(id).unwrap();
        assert_eq!(game.signal_client_finished(id), Ok(Advance::Completed));
        assert!(game.advance_phase(id).is_err());
    }

    #[test]
    fn long_moves_are_rejected() {
        let (mut game, id) = game_with_session();
        play(&mut game, id);

        let outcome = game.apply_move(id, Vec3::new(0.5, 64.0, 30.0), 0.0);
        assert_eq!(
            outcome,
            MoveOutcome::Rejected {
                reason: "Invalid move player packet received".to_string()
            }
        );
        assert_eq!(game.apply_move(id, Vec3::new(0.5, 64.0, 3.0), 0.0), MoveOutcome::Moved);
    }

    #[test]
    fn stepping_into_lava_kills() {
        let (mut game, id) = game_with_session();
        game.level_mut().set_block(2, 64, 0, BlockState::Lava);
        play(&mut game, id);

        let outcome = game.apply_move(id, Vec3::new(2.5, 64.0, 0.5), 0.0);
        assert!(matches!(outcome, MoveOutcome::Died { .. }));
        assert!(game.player(id).unwrap().dead);

        game.respawn(id).unwrap();
        let player = game.player(id).unwrap();
        assert!(!player.dead);
        assert_eq!(player.health, player.max_health);
    }

    #[test]
    fn resend_queues_a_payload() {
        let (mut game, id) = game_with_session();
        game.resend(id, Resend::GameMode).unwrap();
        assert_eq!(
            game.drain_outbox(),
            vec![(
                id,
                Packet::Resent {
                    payload: ResendPayload::GameMode {
                        mode: GameMode::Survival
                    }
                }
            )]
        );
    }

    #[test]
    fn loading_screen_resends_follow_the_player() {
        let (mut game, id) = game_with_session();
        play(&mut game, id);
        game.teleport(id, SafeCoordinate { x: 40.5, y: 64.1, z: -20.5 })
            .unwrap();

        game.resend(id, Resend::ChunkCacheCenter).unwrap();
        game.resend(id, Resend::Health).unwrap();
        game.resend(id, Resend::ChunkLoadStart).unwrap();

        let payloads: Vec<_> = game
            .drain_outbox()
            .into_iter()
            .map(|(_, packet)| packet)
            .collect();
        assert_eq!(
            payloads,
            vec![
                Packet::Resent {
                    payload: ResendPayload::ChunkCacheCenter {
                        chunk_x: 2,
                        chunk_z: -2,
                        radius: CHUNK_VIEW_RADIUS,
                    }
                },
                Packet::Resent {
                    payload: ResendPayload::Health {
                        health: 20.0,
                        food: MAX_FOOD,
                        saturation: 5.0,
                    }
                },
                Packet::Resent {
                    payload: ResendPayload::ChunkLoadStart
                },
            ]
        );
    }

    #[test]
    fn unknown_sessions_are_reported() {
        let mut game = GameState::new(FlatLevel::new(63));
        assert_eq!(
            game.player(SessionId(1)).unwrap_err(),
            HostError::SessionGone(SessionId(1))
        );
        assert!(!game.is_connected(SessionId(1)));
        assert!(game.resend(SessionId(1), Resend::Position).is_err());
    }
}
