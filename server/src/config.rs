//! Tunable constants for the coordinator.
//!
//! Every value here was tuned empirically against one bridge/host pairing, so
//! all of them are configuration rather than code. Defaults reproduce the
//! reference behaviour.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use shared::{Resend, BRIDGE_NAME_MARKER};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub detector: DetectorConfig,
    pub completion: CompletionConfig,
    pub spawn_sync: SpawnSyncConfig,
    pub placement: PlacementConfig,
    pub disconnect: DisconnectConfig,
    pub recursion: RecursionConfig,
    pub respawn: RespawnConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Display-name prefix reserved for bridged players
    pub name_marker: String,
    /// Upper bound on a single bridge registry query
    pub registry_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Time a bridged session may spend configuring before forced completion
    pub watchdog_timeout_ms: u64,
    /// Task kinds containing any of these markers never run for bridged sessions
    pub incompatible_task_markers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnSyncConfig {
    pub immediate: Vec<Resend>,
    /// Delays after interactive entry for each follow-up stage, strictly increasing
    pub followup_delays_ms: Vec<u64>,
    pub followup: Vec<Resend>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Highest y the downward scan ever starts from
    pub scan_start_cap: i32,
    pub ceiling_margin: i32,
    pub floor_margin: i32,
    /// Added to sea level when no standable block is found
    pub fallback_offset: i32,
    /// Lift above the standing block so the player does not clip into it
    pub surface_offset: f64,
    /// Vertical velocity below which a player counts as falling into the void
    pub fall_velocity_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisconnectConfig {
    pub suppress_keywords: Vec<String>,
    pub allow_keywords: Vec<String>,
    pub packet_error_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecursionConfig {
    /// Bound for object self-description
    pub describe_depth: usize,
    /// Bound for string assembly helpers that nest descriptions
    pub concat_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RespawnConfig {
    /// Death causes that indicate a spawn-placement failure
    pub spawn_death_causes: Vec<String>,
    pub respawn_delay_ms: u64,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            completion: CompletionConfig::default(),
            spawn_sync: SpawnSyncConfig::default(),
            placement: PlacementConfig::default(),
            disconnect: DisconnectConfig::default(),
            recursion: RecursionConfig::default(),
            respawn: RespawnConfig::default(),
        }
    }
}

impl DetectorConfig {
    pub fn registry_timeout(&self) -> Duration {
        Duration::from_millis(self.registry_timeout_ms)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            name_marker: BRIDGE_NAME_MARKER.to_string(),
            registry_timeout_ms: 250,
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout_ms: 30_000,
            incompatible_task_markers: strings(&["neoforge", "SyncConfig"]),
        }
    }
}

impl Default for SpawnSyncConfig {
    fn default() -> Self {
        Self {
            immediate: Resend::FULL_SEQUENCE.to_vec(),
            followup_delays_ms: vec![250, 1000],
            followup: vec![Resend::Position, Resend::GameMode, Resend::ChunkLoadStart],
        }
    }
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            scan_start_cap: 120,
            ceiling_margin: 10,
            floor_margin: 2,
            fallback_offset: 10,
            surface_offset: 0.1,
            fall_velocity_threshold: -2.0,
        }
    }
}

impl Default for DisconnectConfig {
    fn default() -> Self {
        Self {
            suppress_keywords: strings(&[
                "invalid",
                "packet",
                "protocol",
                "movement",
                "move",
                "position",
                "teleport",
                "validation",
            ]),
            allow_keywords: strings(&[
                "quit",
                "left",
                "timeout",
                "timed out",
                "connection",
                "server closed",
                "server shutdown",
                "shutting down",
                "stopping",
            ]),
            packet_error_keywords: strings(&[
                "may not be sent to the client",
                "unsupportedoperation",
                "payload",
                "invalid move player",
                "invalid_player_movement",
            ]),
        }
    }
}

impl Default for RecursionConfig {
    fn default() -> Self {
        Self {
            describe_depth: 10,
            concat_depth: 50,
        }
    }
}

impl Default for RespawnConfig {
    fn default() -> Self {
        Self {
            spawn_death_causes: strings(&["fall", "void", "generic"]),
            respawn_delay_ms: 100,
        }
    }
}

impl CoordinatorConfig {
    /// Reads and validates a TOML config file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parses and validates config text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: CoordinatorConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the coordinator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detector.name_marker.is_empty() {
            return Err(ConfigError::Invalid {
                field: "detector.name_marker",
                reason: "must not be empty".to_string(),
            });
        }
        if self.completion.watchdog_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "completion.watchdog_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self
            .spawn_sync
            .followup_delays_ms
            .windows(2)
            .any(|pair| pair[0] >= pair[1])
        {
            return Err(ConfigError::Invalid {
                field: "spawn_sync.followup_delays_ms",
                reason: "delays must be strictly increasing".to_string(),
            });
        }
        if self.placement.ceiling_margin < 0 || self.placement.floor_margin < 1 {
            return Err(ConfigError::Invalid {
                field: "placement",
                reason: "ceiling margin must be >= 0 and floor margin >= 1".to_string(),
            });
        }
        if self.recursion.describe_depth == 0 || self.recursion.concat_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "recursion",
                reason: "depth bounds must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.completion.watchdog_timeout_ms)
    }

    pub fn respawn_delay(&self) -> Duration {
        Duration::from_millis(self.respawn.respawn_delay_ms)
    }
}
