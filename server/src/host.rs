//! Narrow interfaces the coordinator drives.
//!
//! Each host-server version gets one adapter implementing these traits; the
//! coordinator never reaches into host internals itself.

use crate::error::{HostError, RegistryError};
use shared::{BlockState, Resend, SafeCoordinate, SessionId, Vec3};

/// A pluggable configuration-phase task as the host describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigTask {
    pub id: u32,
    /// Type name of the task, e.g. `neoforge:sync_registries`
    pub kind: String,
}

impl ConfigTask {
    pub fn new(id: u32, kind: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
        }
    }

    /// Whether the bridge protocol can process this task at all.
    pub fn is_bridge_incompatible(&self, markers: &[String]) -> bool {
        markers
            .iter()
            .any(|marker| !marker.is_empty() && self.kind.contains(marker.as_str()))
    }
}

/// Result of a phase-advance call the host accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The session is now in the interactive phase
    Completed,
    /// Accepted, but the transition waits on a client acknowledgement
    Pending,
}

pub trait ConfigPhaseHost {
    fn pending_tasks(&self, id: SessionId) -> Result<Vec<ConfigTask>, HostError>;

    /// Removes a queued task without running it. `Ok(false)` if it was not queued.
    fn remove_task(&mut self, id: SessionId, task_id: u32) -> Result<bool, HostError>;

    /// The host's standard "finish configuration" operation.
    fn finish_configuration(&mut self, id: SessionId) -> Result<Advance, HostError>;

    /// Moves the session straight into the interactive phase.
    fn advance_phase(&mut self, id: SessionId) -> Result<Advance, HostError>;

    /// Behaves as if the client had reported that it finished configuring.
    fn signal_client_finished(&mut self, id: SessionId) -> Result<Advance, HostError>;

    fn is_connected(&self, id: SessionId) -> bool;
}

/// Player state the coordinator needs to judge placement safety.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSnapshot {
    pub position: Vec3,
    pub velocity: Vec3,
    pub health: f32,
    pub max_health: f32,
    pub dead: bool,
}

pub trait PlayerHost {
    fn player(&self, id: SessionId) -> Result<PlayerSnapshot, HostError>;

    fn level_of(&self, id: SessionId) -> Result<&dyn Level, HostError>;

    fn teleport(&mut self, id: SessionId, target: SafeCoordinate) -> Result<(), HostError>;

    /// Re-sends one piece of state to the client with overwrite semantics.
    fn resend(&mut self, id: SessionId, resend: Resend) -> Result<(), HostError>;

    /// Full health, no fire, full air.
    fn restore_vitals(&mut self, id: SessionId) -> Result<(), HostError>;

    fn respawn(&mut self, id: SessionId) -> Result<(), HostError>;
}

/// Everything the coordinator drives on the host.
pub trait GameHost: ConfigPhaseHost + PlayerHost {}

impl<T: ConfigPhaseHost + PlayerHost> GameHost for T {}

/// World queries against one level/dimension.
pub trait Level {
    fn block_state(&self, x: i32, y: i32, z: i32) -> BlockState;

    fn min_y(&self) -> i32;

    /// Build-height ceiling, exclusive.
    fn max_y(&self) -> i32;

    fn sea_level(&self) -> i32;

    fn default_spawn(&self) -> (i32, i32, i32);
}

/// The translation bridge's own record of which sessions it relays.
pub trait BridgeRegistry: Send + Sync {
    fn lookup(&self, id: SessionId) -> Result<bool, RegistryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incompatible_tasks_match_by_kind() {
        let markers = vec!["neoforge".to_string(), "SyncConfig".to_string()];

        assert!(ConfigTask::new(1, "neoforge:sync_registries").is_bridge_incompatible(&markers));
        assert!(ConfigTask::new(2, "SyncConfigTask").is_bridge_incompatible(&markers));
        assert!(!ConfigTask::new(3, "minecraft:known_packs").is_bridge_incompatible(&markers));
    }

    #[test]
    fn empty_marker_matches_nothing() {
        let markers = vec![String::new()];
        assert!(!ConfigTask::new(1, "anything").is_bridge_incompatible(&markers));
    }
}
