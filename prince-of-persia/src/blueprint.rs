// Layout of a level blueprint file.  Every level file is the same size and
// carries the same regions in the same order.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FormatError;

pub const NUM_ROOMS: usize = 24;
pub const ROOM_WIDTH: usize = 10;
pub const ROOM_HEIGHT: usize = 3;
pub const TILES_PER_ROOM: usize = ROOM_WIDTH * ROOM_HEIGHT;
pub const NUM_DIRECTIONS: usize = 4;
pub const NUM_TRIGGERS: usize = 256;
pub const NUM_GUARDS: usize = NUM_ROOMS;

pub const TILE_TYPES_OFFSET: usize = 0x000;
pub const TILE_TYPES_SIZE: usize = NUM_ROOMS * TILES_PER_ROOM;
pub const TILE_MODIFIERS_OFFSET: usize = TILE_TYPES_OFFSET + TILE_TYPES_SIZE;
pub const TILE_MODIFIERS_SIZE: usize = NUM_ROOMS * TILES_PER_ROOM;
pub const LINK_LOCATIONS_OFFSET: usize = TILE_MODIFIERS_OFFSET + TILE_MODIFIERS_SIZE;
pub const LINK_LOCATIONS_SIZE: usize = NUM_TRIGGERS;
pub const LINK_MAP_OFFSET: usize = LINK_LOCATIONS_OFFSET + LINK_LOCATIONS_SIZE;
pub const LINK_MAP_SIZE: usize = NUM_TRIGGERS;
pub const ROOM_MAP_OFFSET: usize = LINK_MAP_OFFSET + LINK_MAP_SIZE;
pub const ROOM_MAP_SIZE: usize = NUM_ROOMS * NUM_DIRECTIONS;
pub const INFO_OFFSET: usize = ROOM_MAP_OFFSET + ROOM_MAP_SIZE;
pub const INFO_SIZE: usize = 0x100;

pub const BLUEPRINT_SIZE: usize = INFO_OFFSET + INFO_SIZE;

// Offsets inside the info region.
pub const INFO_KID_START_SCREEN: usize = 64;
pub const INFO_KID_START_BLOCK: usize = 65;
pub const INFO_KID_START_FACE: usize = 66;
pub const INFO_SWORD_START_SCREEN: usize = 68;
pub const INFO_SWORD_START_BLOCK: usize = 69;
pub const INFO_GUARD_BLOCK: usize = 71;
pub const INFO_GUARD_FACE: usize = INFO_GUARD_BLOCK + NUM_GUARDS;
pub const INFO_GUARD_X: usize = INFO_GUARD_FACE + NUM_GUARDS;
pub const INFO_GUARD_SEQ_LOW: usize = INFO_GUARD_X + NUM_GUARDS;
pub const INFO_GUARD_PROGRAM: usize = INFO_GUARD_SEQ_LOW + NUM_GUARDS;
pub const INFO_GUARD_SEQ_HIGH: usize = INFO_GUARD_PROGRAM + NUM_GUARDS;

/// Converts a stored 1-based screen number into a room id.  Screen 0 wraps
/// to an id that never validates.
#[macro_export]
macro_rules! screen_to_room {
    ($screen:expr) => {
        ($screen as u8).wrapping_sub(1)
    };
}

#[macro_export]
macro_rules! room_to_screen {
    ($room:expr) => {
        ($room as u8).wrapping_add(1)
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    TileTypes,
    TileModifiers,
    LinkLocations,
    LinkMap,
    RoomMap,
    Info,
}

impl Region {
    pub const ALL: [Region; 6] = [
        Region::TileTypes,
        Region::TileModifiers,
        Region::LinkLocations,
        Region::LinkMap,
        Region::RoomMap,
        Region::Info,
    ];

    pub fn offset(self) -> usize {
        match self {
            Region::TileTypes => TILE_TYPES_OFFSET,
            Region::TileModifiers => TILE_MODIFIERS_OFFSET,
            Region::LinkLocations => LINK_LOCATIONS_OFFSET,
            Region::LinkMap => LINK_MAP_OFFSET,
            Region::RoomMap => ROOM_MAP_OFFSET,
            Region::Info => INFO_OFFSET,
        }
    }

    pub fn len(self) -> usize {
        match self {
            Region::TileTypes => TILE_TYPES_SIZE,
            Region::TileModifiers => TILE_MODIFIERS_SIZE,
            Region::LinkLocations => LINK_LOCATIONS_SIZE,
            Region::LinkMap => LINK_MAP_SIZE,
            Region::RoomMap => ROOM_MAP_SIZE,
            Region::Info => INFO_SIZE,
        }
    }

    pub fn end(self) -> usize {
        self.offset() + self.len()
    }

    /// Borrows this region out of a blueprint buffer.
    pub fn slice(self, data: &[u8]) -> Result<&[u8], FormatError> {
        if data.len() < self.end() {
            return Err(FormatError::Truncated {
                region: self,
                offset: self.offset(),
                required: self.end(),
                actual: data.len(),
            });
        }
        Ok(&data[self.offset()..self.end()])
    }

    /// Mutable counterpart of `slice` used by the encoder.
    pub fn slice_mut(self, data: &mut [u8]) -> &mut [u8] {
        &mut data[self.offset()..self.end()]
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Region::TileTypes => "tile type",
            Region::TileModifiers => "tile modifier",
            Region::LinkLocations => "link location",
            Region::LinkMap => "link map",
            Region::RoomMap => "room map",
            Region::Info => "info",
        };
        f.write_str(name)
    }
}
