//! Safe spawn and respawn placement.
//!
//! A bridged client that lands in the void or in lava dies before the bridge
//! forwards its spawn acknowledgement, and the death/respawn cycle then never
//! tells the bridge the client finished loading. Placement therefore always
//! targets solid ground with two passable blocks above it.

use crate::config::PlacementConfig;
use crate::host::{Level, PlayerSnapshot};
use log::{debug, warn};
use shared::SafeCoordinate;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnsafeReason {
    BelowMinHeight { y: f64, min_y: i32 },
    InHazard,
    Falling { vel_y: f64 },
}

#[derive(Debug, Clone)]
pub struct SafePlacementResolver {
    config: PlacementConfig,
}

impl SafePlacementResolver {
    pub fn new(config: PlacementConfig) -> Self {
        Self { config }
    }

    /// Scans the column at `(x, z)` downward for the first standable y.
    ///
    /// Falls back to `sea_level + fallback_offset` when the column has no
    /// solid block with two passable blocks above it.
    pub fn find_safe_y(&self, level: &dyn Level, x: f64, z: f64) -> f64 {
        let bx = x.floor() as i32;
        let bz = z.floor() as i32;
        let top = (level.max_y() - self.config.ceiling_margin).min(self.config.scan_start_cap);
        let bottom = level.min_y() + self.config.floor_margin;

        for y in (bottom..=top).rev() {
            let below = level.block_state(bx, y - 1, bz);
            if below.is_solid()
                && level.block_state(bx, y, bz).is_passable()
                && level.block_state(bx, y + 1, bz).is_passable()
            {
                debug!("Safe y at ({}, {}) is {}", bx, bz, y);
                return y as f64 + self.config.surface_offset;
            }
        }

        let fallback = level.sea_level() + self.config.fallback_offset;
        warn!(
            "No standable block in column ({}, {}), using fallback y {}",
            bx, bz, fallback
        );
        fallback as f64
    }

    /// Safe coordinate centred on the level's default spawn column.
    pub fn spawn_point(&self, level: &dyn Level) -> SafeCoordinate {
        let (sx, _, sz) = level.default_spawn();
        let x = sx as f64 + 0.5;
        let z = sz as f64 + 0.5;
        SafeCoordinate {
            x,
            y: self.find_safe_y(level, x, z),
            z,
        }
    }

    /// Where a session is placed before it receives any world data.
    pub fn initial_placement(&self, level: &dyn Level) -> SafeCoordinate {
        self.spawn_point(level)
    }

    /// Why the player's current position is not survivable, if it isn't.
    ///
    /// Checked in order: below the level's minimum height, standing in or on
    /// a hazard, falling faster than the configured threshold.
    pub fn check(&self, level: &dyn Level, player: &PlayerSnapshot) -> Option<UnsafeReason> {
        let position = player.position;
        if position.y < level.min_y() as f64 {
            return Some(UnsafeReason::BelowMinHeight {
                y: position.y,
                min_y: level.min_y(),
            });
        }

        let (bx, by, bz) = position.block();
        if level.block_state(bx, by, bz).is_hazardous()
            || level.block_state(bx, by - 1, bz).is_hazardous()
        {
            return Some(UnsafeReason::InHazard);
        }

        if player.velocity.y < self.config.fall_velocity_threshold {
            return Some(UnsafeReason::Falling {
                vel_y: player.velocity.y,
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::FlatLevel;
    use assert_approx_eq::assert_approx_eq;
    use shared::{BlockState, Vec3};

    fn resolver() -> SafePlacementResolver {
        SafePlacementResolver::new(PlacementConfig::default())
    }

    fn standing_at(position: Vec3) -> PlayerSnapshot {
        PlayerSnapshot {
            position,
            velocity: Vec3::default(),
            health: 20.0,
            max_health: 20.0,
            dead: false,
        }
    }

    #[test]
    fn lands_on_top_of_the_ground() {
        let level = FlatLevel::new(63);
        assert_approx_eq!(resolver().find_safe_y(&level, 0.5, 0.5), 64.1);
    }

    #[test]
    fn empty_column_falls_back_to_sea_level() {
        let level = FlatLevel::void();
        assert_approx_eq!(resolver().find_safe_y(&level, 0.5, 0.5), 73.0);
    }

    #[test]
    fn stands_on_the_highest_surface() {
        let mut level = FlatLevel::new(63);
        // Roof at 65 leaves one block of headroom under it, so the roof wins.
        level.set_block(0, 65, 0, BlockState::Solid);
        let y = resolver().find_safe_y(&level, 0.5, 0.5);
        assert_approx_eq!(y, 66.1);
    }

    #[test]
    fn lava_is_not_ground() {
        let mut level = FlatLevel::new(63);
        level.set_block(0, 63, 0, BlockState::Lava);
        assert_approx_eq!(resolver().find_safe_y(&level, 0.5, 0.5), 73.0);
    }

    #[test]
    fn headroom_is_required() {
        let mut level = FlatLevel::new(63);
        level.set_block(0, 65, 0, BlockState::Water);
        // Water above the only gap: the column has nowhere to stand.
        assert_approx_eq!(resolver().find_safe_y(&level, 0.5, 0.5), 73.0);
    }

    #[test]
    fn replaceable_blocks_count_as_passable() {
        let mut level = FlatLevel::new(63);
        level.set_block(0, 64, 0, BlockState::Replaceable);
        assert_approx_eq!(resolver().find_safe_y(&level, 0.5, 0.5), 64.1);
    }

    #[test]
    fn scan_starts_below_the_ceiling() {
        // Ground above the scan cap is never found.
        let level = FlatLevel::new(200);
        assert_approx_eq!(resolver().find_safe_y(&level, 0.5, 0.5), 73.0);
    }

    #[test]
    fn spawn_point_is_centred_on_the_default_column() {
        let level = FlatLevel::new(63).with_spawn(10, 70, -4);
        let point = resolver().spawn_point(&level);
        assert_approx_eq!(point.x, 10.5);
        assert_approx_eq!(point.z, -3.5);
        assert_approx_eq!(point.y, 64.1);
    }

    #[test]
    fn unsafe_positions() {
        let mut level = FlatLevel::new(63);
        level.set_block(5, 63, 5, BlockState::Lava);
        let resolver = resolver();

        assert_eq!(
            resolver.check(&level, &standing_at(Vec3::new(0.5, 64.0, 0.5))),
            None
        );
        assert!(matches!(
            resolver.check(&level, &standing_at(Vec3::new(0.5, -80.0, 0.5))),
            Some(UnsafeReason::BelowMinHeight { .. })
        ));
        assert_eq!(
            resolver.check(&level, &standing_at(Vec3::new(5.5, 64.0, 5.5))),
            Some(UnsafeReason::InHazard)
        );

        let mut falling = standing_at(Vec3::new(0.5, 90.0, 0.5));
        falling.velocity.y = -3.5;
        assert!(matches!(
            resolver.check(&level, &falling),
            Some(UnsafeReason::Falling { .. })
        ));
    }
}
