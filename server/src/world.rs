//! In-memory level used by the demo host and by tests.

use crate::host::Level;
use shared::{BlockState, DEFAULT_MAX_Y, DEFAULT_MIN_Y, DEFAULT_SEA_LEVEL};
use std::collections::HashMap;

/// Superflat level: solid up to `ground_y`, air above, with per-block overrides.
#[derive(Debug, Clone)]
pub struct FlatLevel {
    ground_y: Option<i32>,
    min_y: i32,
    max_y: i32,
    sea_level: i32,
    spawn: (i32, i32, i32),
    overrides: HashMap<(i32, i32, i32), BlockState>,
}

impl FlatLevel {
    pub fn new(ground_y: i32) -> Self {
        Self {
            ground_y: Some(ground_y),
            min_y: DEFAULT_MIN_Y,
            max_y: DEFAULT_MAX_Y,
            sea_level: DEFAULT_SEA_LEVEL,
            spawn: (0, ground_y + 1, 0),
            overrides: HashMap::new(),
        }
    }

    /// A level with no blocks at all.
    pub fn void() -> Self {
        Self {
            ground_y: None,
            spawn: (0, DEFAULT_SEA_LEVEL, 0),
            ..Self::new(DEFAULT_SEA_LEVEL)
        }
    }

    pub fn with_spawn(mut self, x: i32, y: i32, z: i32) -> Self {
        self.spawn = (x, y, z);
        self
    }

    pub fn set_block(&mut self, x: i32, y: i32, z: i32, state: BlockState) {
        self.overrides.insert((x, y, z), state);
    }
}

impl Level for FlatLevel {
    fn block_state(&self, x: i32, y: i32, z: i32) -> BlockState {
        if let Some(state) = self.overrides.get(&(x, y, z)) {
            return *state;
        }
        match self.ground_y {
            Some(ground) if y >= self.min_y && y <= ground => BlockState::Solid,
            _ => BlockState::Air,
        }
    }

    fn min_y(&self) -> i32 {
        self.min_y
    }

    fn max_y(&self) -> i32 {
        self.max_y
    }

    fn sea_level(&self) -> i32 {
        self.sea_level
    }

    fn default_spawn(&self) -> (i32, i32, i32) {
        self.spawn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ground_is_solid_down_to_min_y() {
        let level = FlatLevel::new(10);
        assert_eq!(level.block_state(0, 10, 0), BlockState::Solid);
        assert_eq!(level.block_state(0, DEFAULT_MIN_Y, 0), BlockState::Solid);
        assert_eq!(level.block_state(0, DEFAULT_MIN_Y - 1, 0), BlockState::Air);
        assert_eq!(level.block_state(0, 11, 0), BlockState::Air);
    }

    #[test]
    fn overrides_win() {
        let mut level = FlatLevel::new(10);
        level.set_block(3, 10, 3, BlockState::Lava);
        assert_eq!(level.block_state(3, 10, 3), BlockState::Lava);
        assert_eq!(level.block_state(4, 10, 3), BlockState::Solid);
    }

    #[test]
    fn void_level_has_no_blocks() {
        let level = FlatLevel::void();
        assert_eq!(level.block_state(0, 0, 0), BlockState::Air);
        assert_eq!(level.default_spawn(), (0, DEFAULT_SEA_LEVEL, 0));
    }
}
