use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_MIN_Y: i32 = -64;
pub const DEFAULT_MAX_Y: i32 = 320;
pub const DEFAULT_SEA_LEVEL: i32 = 63;
pub const BRIDGE_NAME_MARKER: &str = ".";

/// Stable identity of a connection, shared by the host and the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Connection lifecycle phase. Ordering follows the lifecycle, so phases only
/// ever move forward; `Terminated` is reachable from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Configuring,
    AwaitingCompletion,
    Interactive,
    Terminated,
}

impl Phase {
    pub fn can_advance_to(self, next: Phase) -> bool {
        next == Phase::Terminated || (self != Phase::Terminated && next > self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockState {
    Air,
    /// Non-occluding blocks a player can stand inside (grass, snow layers).
    Replaceable,
    Solid,
    Water,
    Lava,
}

impl BlockState {
    pub fn is_solid(self) -> bool {
        matches!(self, BlockState::Solid)
    }

    pub fn is_passable(self) -> bool {
        matches!(self, BlockState::Air | BlockState::Replaceable)
    }

    pub fn is_hazardous(self) -> bool {
        matches!(self, BlockState::Lava)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Integer block coordinates containing this point.
    pub fn block(&self) -> (i32, i32, i32) {
        (
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }
}

/// A validated stand-on-solid-ground position inside one level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafeCoordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl SafeCoordinate {
    pub fn as_vec3(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

impl fmt::Display for SafeCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameMode {
    Survival,
    Creative,
    Adventure,
    Spectator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weather {
    Clear,
    Rain,
    Thunder,
}

/// Idempotent state-resend operations. Each one overwrites client state and
/// never toggles it, so sending the same resend twice is harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resend {
    Abilities,
    Position,
    GameMode,
    HeldItem,
    Inventory,
    Health,
    /// Chunk cache centre and view radius around the player
    ChunkCacheCenter,
    WorldBorder,
    WorldTime,
    Weather,
    /// Level-chunks-load-start game event; releases the client's loading screen
    ChunkLoadStart,
}

impl Resend {
    pub const FULL_SEQUENCE: [Resend; 11] = [
        Resend::Abilities,
        Resend::Position,
        Resend::GameMode,
        Resend::HeldItem,
        Resend::Inventory,
        Resend::Health,
        Resend::ChunkCacheCenter,
        Resend::WorldBorder,
        Resend::WorldTime,
        Resend::Weather,
        Resend::ChunkLoadStart,
    ];
}

/// Wire payload of a resend as seen by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResendPayload {
    Abilities { may_fly: bool, invulnerable: bool },
    Position { position: Vec3, yaw: f32, pitch: f32 },
    GameMode { mode: GameMode },
    HeldItem { slot: u8 },
    Inventory { slots: Vec<Option<u16>> },
    Health { health: f32, food: u8, saturation: f32 },
    ChunkCacheCenter { chunk_x: i32, chunk_z: i32, radius: u8 },
    WorldBorder { center_x: f64, center_z: f64, size: f64 },
    WorldTime { game_time: u64, day_time: u64 },
    Weather { weather: Weather },
    ChunkLoadStart,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        display_name: String,
    },
    TaskDone {
        task_id: u32,
    },
    FinishConfiguration,
    Move {
        position: Vec3,
        vel_y: f64,
    },
    Heartbeat,
    Disconnect,

    Connected {
        session_id: SessionId,
    },
    ConfigurationTask {
        task_id: u32,
        kind: String,
    },
    StartPlay {
        position: Vec3,
    },
    Resent {
        payload: ResendPayload,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    /// Serializes the packet for a single datagram.
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Parses one datagram.
    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Whether a display name follows the bridge's reserved-prefix convention.
pub fn has_bridge_marker(display_name: &str, marker: &str) -> bool {
    !marker.is_empty() && display_name.starts_with(marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn phases_only_move_forward() {
        assert!(Phase::Configuring.can_advance_to(Phase::AwaitingCompletion));
        assert!(Phase::AwaitingCompletion.can_advance_to(Phase::Interactive));
        assert!(!Phase::Interactive.can_advance_to(Phase::Configuring));
        assert!(!Phase::AwaitingCompletion.can_advance_to(Phase::AwaitingCompletion));
    }

    #[test]
    fn terminated_is_reachable_from_any_phase() {
        for phase in [
            Phase::Configuring,
            Phase::AwaitingCompletion,
            Phase::Interactive,
            Phase::Terminated,
        ] {
            assert!(phase.can_advance_to(Phase::Terminated));
        }
        assert!(!Phase::Terminated.can_advance_to(Phase::Interactive));
    }

    #[test]
    fn block_classification() {
        assert!(BlockState::Solid.is_solid());
        assert!(!BlockState::Lava.is_solid());
        assert!(BlockState::Replaceable.is_passable());
        assert!(!BlockState::Water.is_passable());
        assert!(BlockState::Lava.is_hazardous());
    }

    #[test]
    fn vec3_block_floors_negative_coordinates() {
        let v = Vec3::new(-0.5, 64.9, 10.2);
        assert_eq!(v.block(), (-1, 64, 10));
        assert_approx_eq!(v.distance(&Vec3::new(-0.5, 64.9, 13.2)), 3.0);
    }

    #[test]
    fn bridge_marker_convention() {
        assert!(has_bridge_marker(".Steve", BRIDGE_NAME_MARKER));
        assert!(!has_bridge_marker("Steve", BRIDGE_NAME_MARKER));
        assert!(!has_bridge_marker("Steve", ""));
    }

    #[test]
    fn packet_survives_the_wire() {
        let packet = Packet::ConfigurationTask {
            task_id: 3,
            kind: "neoforge:sync_registries".to_string(),
        };
        let bytes = packet.encode().unwrap();
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }
}
