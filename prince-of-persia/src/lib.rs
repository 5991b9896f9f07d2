macro_rules! is_bit_set {
    ($value:expr, $test:expr) => {
        ($value & $test) == $test
    };
}

#[macro_use]
pub mod blueprint;
pub mod cache;
pub mod error;
pub mod info;
pub mod rooms;
pub mod sprites;
pub mod tiles;
mod util;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::TryFrom;
use tracing::debug;

use blueprint::{BLUEPRINT_SIZE, NUM_GUARDS, NUM_ROOMS, NUM_TRIGGERS, TILES_PER_ROOM};

pub use cache::{ContentKey, DecodeCache};
pub use error::{Decoded, Error, FormatError, UnknownValue, ValidationError, ValueKind};
pub use info::{Facing, GuardProgram, GuardSpawn, LevelInfo, StartPosition, SwordPosition};
pub use rooms::{Direction, Exits, RoomGraph, RoomLink, TriggerLink};
pub use sprites::{
    decode_sprite_sheet, Bitmap, BitmapParts, SpriteImage, SpriteSheet, SpriteSheetConfig,
};
pub use tiles::{Room, Tile, TileKind, TileType};

/// The three decoder outputs for one blueprint before any cross checks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelParts {
    pub rooms: Vec<Room>,
    pub graph: RoomGraph,
    pub info: LevelInfo,
}

impl LevelParts {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let num_rooms = self.rooms.len();
        if num_rooms != NUM_ROOMS {
            return Err(ValidationError::RoomCount {
                count: num_rooms,
                expected: NUM_ROOMS,
            });
        }
        for (index, room) in self.rooms.iter().enumerate() {
            if room.id as usize != index {
                return Err(ValidationError::RoomIdMismatch { index, id: room.id });
            }
            // Without a top bit set the raw byte re-decodes as a known kind.
            for (cell, tile) in room.tiles().iter().enumerate() {
                if let TileKind::Unknown(value) = tile.kind {
                    if value & tiles::UNKNOWN_MASK == 0 {
                        return Err(ValidationError::UnknownTile {
                            room: room.id,
                            cell,
                            value,
                        });
                    }
                }
            }
        }

        let exits = self.graph.exits().len();
        if exits != num_rooms {
            return Err(ValidationError::RoomGraphSize {
                count: exits,
                expected: num_rooms,
            });
        }
        let triggers = self.graph.triggers().len();
        if triggers != NUM_TRIGGERS {
            return Err(ValidationError::TriggerTableSize {
                count: triggers,
                expected: NUM_TRIGGERS,
            });
        }
        for (index, trigger) in self.graph.triggers().iter().enumerate() {
            if trigger.screen > rooms::FIELD_MASK
                || trigger.block > rooms::FIELD_MASK
                || trigger.timer > rooms::FIELD_MASK
            {
                return Err(ValidationError::TriggerField {
                    index,
                    screen: trigger.screen,
                    block: trigger.block,
                    timer: trigger.timer,
                });
            }
        }

        let start_room = self.info.start.room;
        if start_room as usize >= num_rooms {
            return Err(ValidationError::StartRoom { room: start_room });
        }

        if self.info.guards.len() != NUM_GUARDS {
            return Err(ValidationError::GuardCount {
                count: self.info.guards.len(),
                expected: NUM_GUARDS,
            });
        }
        for (guard, spawn) in self.info.guards.iter().enumerate() {
            if spawn.room as usize >= num_rooms {
                return Err(ValidationError::GuardRoom {
                    guard,
                    room: spawn.room,
                });
            }
            // Records are stored by room, so the record index is the room.
            if spawn.room as usize != guard {
                return Err(ValidationError::GuardSlot {
                    guard,
                    room: spawn.room,
                });
            }
            if spawn.is_active() && spawn.block as usize >= TILES_PER_ROOM {
                return Err(ValidationError::GuardBlock {
                    guard,
                    block: spawn.block,
                });
            }
        }

        for link in self.graph.links() {
            match link.target {
                Some(target) if target as usize >= num_rooms => {
                    return Err(ValidationError::LinkTarget {
                        room: link.room,
                        direction: link.direction,
                        target,
                    })
                }
                _ => (),
            }
        }

        Ok(())
    }

    pub fn assemble(self) -> Result<Level, ValidationError> {
        self.validate()?;
        Ok(Level {
            rooms: self.rooms,
            graph: self.graph,
            info: self.info,
        })
    }
}

/// A validated level.  Deserializing runs the same checks as decoding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LevelParts")]
pub struct Level {
    rooms: Vec<Room>,
    graph: RoomGraph,
    info: LevelInfo,
}

impl TryFrom<LevelParts> for Level {
    type Error = ValidationError;

    fn try_from(parts: LevelParts) -> Result<Level, ValidationError> {
        parts.assemble()
    }
}

impl From<Level> for LevelParts {
    fn from(level: Level) -> LevelParts {
        LevelParts {
            rooms: level.rooms,
            graph: level.graph,
            info: level.info,
        }
    }
}

impl Level {
    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn room(&self, id: u8) -> Option<&Room> {
        self.rooms.get(id as usize)
    }

    pub fn graph(&self) -> &RoomGraph {
        &self.graph
    }

    pub fn info(&self) -> &LevelInfo {
        &self.info
    }

    pub fn start_room(&self) -> &Room {
        // Assembly guarantees the start room exists.
        &self.rooms[self.info.start.room as usize]
    }

    pub fn neighbor(&self, room: u8, direction: Direction) -> Option<&Room> {
        self.graph
            .neighbor(room, direction)
            .and_then(|target| self.room(target))
    }

    /// Number of tiles of each kind across all rooms.
    pub fn tile_histogram(&self) -> BTreeMap<TileKind, usize> {
        let mut histogram = BTreeMap::new();
        for tile in self.rooms.iter().flat_map(|room| room.tiles().iter()) {
            *histogram.entry(tile.kind).or_insert(0) += 1;
        }
        histogram
    }

    pub fn count(&self, ty: TileType) -> usize {
        self.rooms.iter().map(|room| room.count(ty)).sum()
    }

    /// Trigger links fired by the button at `x`, `y` of `room`.  Empty for
    /// tiles that are not buttons.
    pub fn button_targets(&self, room: u8, x: usize, y: usize) -> Vec<TriggerLink> {
        match self.room(room).and_then(|r| r.tile(x, y)) {
            Some(tile) if tile.kind.known().map_or(false, TileType::is_button) => self
                .graph
                .trigger_chain(tile.modifier)
                .cloned()
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Runs the three level decoders without cross checking their output.
pub fn decode_parts(data: &[u8]) -> Result<Decoded<LevelParts>, FormatError> {
    let tiles = tiles::decode_tiles(data)?;
    let graph = rooms::decode_room_graph(data)?;
    let info = info::decode_info(data)?;

    let mut warnings = tiles.warnings;
    warnings.extend(info.warnings);
    Ok(Decoded::new(
        LevelParts {
            rooms: tiles.value,
            graph: graph,
            info: info.value,
        },
        warnings,
    ))
}

pub fn decode_level(data: &[u8]) -> Result<Decoded<Level>, Error> {
    let parts = decode_parts(data)?;
    let warnings = parts.warnings;
    let level = parts.value.assemble()?;

    debug!(
        start_room = level.info.start.room,
        warnings = warnings.len(),
        "assembled level"
    );
    Ok(Decoded::new(level, warnings))
}

/// Writes a level back out in blueprint form.
pub fn encode_level(level: &Level) -> Vec<u8> {
    let mut out = vec![0u8; BLUEPRINT_SIZE];
    tiles::encode_tiles(&level.rooms, &mut out);
    rooms::encode_room_graph(&level.graph, &mut out);
    info::encode_info(&level.info, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::blueprint::*;
    use super::*;

    fn put_tile(data: &mut [u8], room: usize, x: usize, y: usize, ty: TileType, modifier: u8) {
        let index = room * TILES_PER_ROOM + y * ROOM_WIDTH + x;
        data[TILE_TYPES_OFFSET + index] = ty as u8;
        data[TILE_MODIFIERS_OFFSET + index] = modifier;
    }

    // Rooms laid out eight wide and three high, like the demo level.
    fn grid_exits(data: &mut [u8]) {
        for room in 0..NUM_ROOMS {
            let entry = ROOM_MAP_OFFSET + room * NUM_DIRECTIONS;
            let screen = room as u8 + 1;
            if room % 8 > 0 {
                data[entry] = screen - 1;
            }
            if room % 8 < 7 {
                data[entry + 1] = screen + 1;
            }
            if room >= 8 {
                data[entry + 2] = screen - 8;
            }
            if room < 16 {
                data[entry + 3] = screen + 8;
            }
        }
    }

    fn demo_blueprint() -> Vec<u8> {
        let mut data = vec![0u8; BLUEPRINT_SIZE];

        for room in 0..NUM_ROOMS {
            for x in 0..ROOM_WIDTH {
                put_tile(&mut data, room, x, 2, TileType::Floor, 0);
            }
            put_tile(&mut data, room, 0, 0, TileType::Wall, 0);
        }
        for &(room, x) in [(1, 3), (1, 4), (6, 2), (13, 7), (20, 5)].iter() {
            put_tile(&mut data, room, x, 2, TileType::Spike, 0);
        }
        for room in [2, 4, 5, 9, 11, 12, 17, 19, 23].iter() {
            put_tile(&mut data, *room, 8, 1, TileType::Gate, 0);
        }
        put_tile(&mut data, 3, 5, 2, TileType::RaiseButton, 0x10);
        put_tile(&mut data, 3, 6, 2, TileType::DropButton, 0x12);

        // Raise button opens the gates in rooms 4 and 5, drop button closes
        // the one in room 9.
        let links: [(usize, u8, u8, bool); 3] =
            [(0x10, 5, 18, false), (0x11, 6, 18, true), (0x12, 10, 18, true)];
        for &(index, screen, block, last) in links.iter() {
            let (location, map) = TriggerLink {
                screen,
                block,
                timer: 0,
                last,
            }
            .to_bytes();
            data[LINK_LOCATIONS_OFFSET + index] = location;
            data[LINK_MAP_OFFSET + index] = map;
        }

        grid_exits(&mut data);

        let info = &mut data[INFO_OFFSET..];
        info[INFO_KID_START_SCREEN] = 1;
        info[INFO_KID_START_BLOCK] = 22;
        info[INFO_KID_START_FACE] = 1;
        info[INFO_SWORD_START_SCREEN] = 16;
        info[INFO_SWORD_START_BLOCK] = 24;
        for i in 0..NUM_GUARDS {
            info[INFO_GUARD_BLOCK + i] = INACTIVE;
        }
        for &(guard, block, program) in [(4, 27, 2), (11, 24, 5), (19, 21, 9)].iter() {
            info[INFO_GUARD_BLOCK + guard] = block;
            info[INFO_GUARD_PROGRAM + guard] = program;
            info[INFO_GUARD_X + guard] = 0x38;
        }

        data
    }

    const INACTIVE: u8 = info::INACTIVE_BLOCK;

    // Deterministic stand-in for arbitrary well formed blueprints.
    fn pseudo_random_blueprint(seed: u32) -> Vec<u8> {
        let mut state = seed.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
        let mut next = move || {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        };

        let mut data: Vec<u8> = (0..BLUEPRINT_SIZE).map(|_| next()).collect();
        for b in Region::RoomMap.slice_mut(&mut data) {
            *b %= NUM_ROOMS as u8 + 1;
        }
        let info = Region::Info.slice_mut(&mut data);
        info[INFO_KID_START_SCREEN] = info[INFO_KID_START_SCREEN] % NUM_ROOMS as u8 + 1;
        for i in 0..NUM_GUARDS {
            let block = &mut info[INFO_GUARD_BLOCK + i];
            if *block != INACTIVE {
                *block %= TILES_PER_ROOM as u8;
            }
        }
        data
    }

    #[test]
    fn demo_level_golden_counts() {
        let decoded = decode_level(&demo_blueprint()).unwrap();
        assert!(decoded.warnings.is_empty());
        let level = decoded.value;

        assert_eq!(level.rooms().len(), NUM_ROOMS);
        assert_eq!(level.start_room().id, 0);
        assert_eq!(level.info().guards.len(), 24);
        assert_eq!(level.info().active_guards().count(), 3);

        let histogram = level.tile_histogram();
        assert_eq!(histogram[&TileKind::Known(TileType::Spike)], 5);
        assert_eq!(histogram[&TileKind::Known(TileType::Gate)], 9);
        assert_eq!(level.count(TileType::Spike), 5);
        assert_eq!(level.count(TileType::Gate), 9);
        assert_eq!(histogram.values().sum::<usize>(), NUM_ROOMS * TILES_PER_ROOM);
    }

    #[test]
    fn demo_level_navigation() {
        let level = decode_level(&demo_blueprint()).unwrap().value;

        assert_eq!(level.neighbor(0, Direction::Right).map(|r| r.id), Some(1));
        assert_eq!(level.neighbor(0, Direction::Down).map(|r| r.id), Some(8));
        assert!(level.neighbor(0, Direction::Left).is_none());
        assert!(level.neighbor(7, Direction::Right).is_none());
        assert_eq!(level.neighbor(23, Direction::Up).map(|r| r.id), Some(15));

        let raised: Vec<Option<u8>> = level
            .button_targets(3, 5, 2)
            .iter()
            .map(|link| link.room())
            .collect();
        assert_eq!(raised, vec![Some(4), Some(5)]);
        assert_eq!(level.button_targets(3, 6, 2).len(), 1);
        assert!(level.button_targets(3, 0, 2).is_empty());
    }

    #[test]
    fn well_formed_inputs_hold_invariants() {
        for seed in 0..64 {
            let data = pseudo_random_blueprint(seed);
            let level = decode_level(&data).unwrap().value;

            assert_eq!(level.rooms().len(), NUM_ROOMS);
            for room in level.rooms() {
                assert_eq!(room.tiles().len(), TILES_PER_ROOM);
            }
            for link in level.graph().links() {
                if let Some(target) = link.target {
                    assert!((target as usize) < level.rooms().len());
                }
            }

            // Decoding is deterministic.
            assert_eq!(decode_level(&data).unwrap().value, level);
        }
    }

    #[test]
    fn encode_reproduces_tile_and_link_regions() {
        for seed in 0..32 {
            let data = pseudo_random_blueprint(seed);
            let level = decode_level(&data).unwrap().value;
            let out = encode_level(&level);

            assert_eq!(out.len(), BLUEPRINT_SIZE);
            for region in [
                Region::TileTypes,
                Region::TileModifiers,
                Region::LinkLocations,
                Region::LinkMap,
                Region::RoomMap,
            ]
            .iter()
            {
                assert_eq!(
                    region.slice(&out).unwrap(),
                    region.slice(&data).unwrap(),
                    "{} region differs",
                    region
                );
            }
            assert_eq!(decode_level(&out).unwrap().value, level);
        }
    }

    #[test]
    fn truncation_names_the_missing_region() {
        let data = demo_blueprint();
        for len in 0..BLUEPRINT_SIZE {
            let expected = *Region::ALL
                .iter()
                .find(|region| region.end() > len)
                .unwrap();
            match decode_level(&data[..len]) {
                Err(Error::Format(FormatError::Truncated { region, actual, .. })) => {
                    assert_eq!(region, expected);
                    assert_eq!(actual, len);
                }
                other => panic!("length {}: unexpected result {:?}", len, other),
            }
        }
    }

    #[test]
    fn longer_buffers_are_accepted() {
        let mut data = demo_blueprint();
        data.extend_from_slice(&[0xaa; 64]);
        assert!(decode_level(&data).is_ok());
    }

    #[test]
    fn start_room_must_exist() {
        let mut data = demo_blueprint();
        data[INFO_OFFSET + INFO_KID_START_SCREEN] = 0;
        assert_eq!(
            decode_level(&data).unwrap_err(),
            Error::Validation(ValidationError::StartRoom { room: 0xff })
        );

        data[INFO_OFFSET + INFO_KID_START_SCREEN] = 25;
        assert_eq!(
            decode_level(&data).unwrap_err(),
            Error::Validation(ValidationError::StartRoom { room: 24 })
        );
    }

    #[test]
    fn active_guard_must_stand_in_its_room() {
        let mut data = demo_blueprint();
        data[INFO_OFFSET + INFO_GUARD_BLOCK + 8] = 30;
        assert_eq!(
            decode_level(&data).unwrap_err(),
            Error::Validation(ValidationError::GuardBlock {
                guard: 8,
                block: 30,
            })
        );
    }

    #[test]
    fn parts_survive_failed_validation() {
        let mut data = demo_blueprint();
        data[INFO_OFFSET + INFO_KID_START_SCREEN] = 0;

        let parts = decode_parts(&data).unwrap().value;
        assert_eq!(parts.rooms.len(), NUM_ROOMS);
        assert!(parts.validate().is_err());
        assert!(parts.assemble().is_err());
    }

    #[test]
    fn assembler_rechecks_links_and_guards() {
        let parts = decode_parts(&demo_blueprint()).unwrap().value;

        let mut exits = parts.graph.exits().to_vec();
        exits[2].up = Some(40);
        let bad_links = LevelParts {
            graph: RoomGraph::new(exits, parts.graph.triggers().to_vec()),
            ..parts.clone()
        };
        assert_eq!(
            bad_links.assemble().unwrap_err(),
            ValidationError::LinkTarget {
                room: 2,
                direction: Direction::Up,
                target: 40,
            }
        );

        let mut bad_guard = parts.clone();
        bad_guard.info.guards[3].room = 24;
        assert_eq!(
            bad_guard.assemble().unwrap_err(),
            ValidationError::GuardRoom { guard: 3, room: 24 }
        );

        let mut short = parts.clone();
        short.rooms.pop();
        assert_eq!(
            short.assemble().unwrap_err(),
            ValidationError::RoomCount {
                count: 23,
                expected: 24,
            }
        );

        let mut too_many = parts;
        let extra = too_many.info.guards[0];
        too_many.info.guards.push(extra);
        assert_eq!(
            too_many.assemble().unwrap_err(),
            ValidationError::GuardCount {
                count: 25,
                expected: 24,
            }
        );
    }

    #[test]
    fn unknown_values_do_not_fail_decoding() {
        let mut data = demo_blueprint();
        data[TILE_TYPES_OFFSET + 40] = 0xc2;
        data[INFO_OFFSET + INFO_GUARD_PROGRAM + 4] = 0x63;

        let decoded = decode_level(&data).unwrap();
        assert_eq!(decoded.warnings.len(), 2);
        assert_eq!(
            decoded.value.rooms()[1].tiles()[10].kind,
            TileKind::Unknown(0xc2)
        );
        assert_eq!(encode_level(&decoded.value)[TILE_TYPES_OFFSET + 40], 0xc2);
    }

    #[test]
    fn structured_round_trip() {
        let level = decode_level(&demo_blueprint()).unwrap().value;
        let json = serde_json::to_string(&level).unwrap();
        let restored: Level = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, level);
        assert_eq!(encode_level(&restored), encode_level(&level));
    }

    #[test]
    fn imported_level_encodes_to_itself() {
        let mut data = demo_blueprint();
        data[TILE_TYPES_OFFSET + 40] = 0xc2;
        let level = decode_level(&data).unwrap().value;

        let json = serde_json::to_string(&level).unwrap();
        let restored: Level = serde_json::from_str(&json).unwrap();
        let redecoded = decode_level(&encode_level(&restored)).unwrap().value;
        assert_eq!(redecoded, restored);
    }

    #[test]
    fn rejects_parts_that_encode_differently() {
        let parts = LevelParts::from(decode_level(&demo_blueprint()).unwrap().value);

        let mut moved_guard = parts.clone();
        moved_guard.info.guards[3].room = 5;
        assert_eq!(
            moved_guard.validate().unwrap_err(),
            ValidationError::GuardSlot { guard: 3, room: 5 }
        );
        let json = serde_json::to_string(&moved_guard).unwrap();
        assert!(serde_json::from_str::<Level>(&json).is_err());

        let mut fake_unknown = parts.clone();
        let mut tiles = [Tile::default(); TILES_PER_ROOM];
        tiles.copy_from_slice(fake_unknown.rooms[0].tiles());
        tiles[0].kind = TileKind::Unknown(0x04);
        fake_unknown.rooms[0] = Room::new(0, tiles);
        assert_eq!(
            fake_unknown.validate().unwrap_err(),
            ValidationError::UnknownTile {
                room: 0,
                cell: 0,
                value: 0x04,
            }
        );
        let json = serde_json::to_string(&fake_unknown).unwrap();
        assert!(serde_json::from_str::<Level>(&json).is_err());

        let mut triggers = parts.graph.triggers().to_vec();
        triggers[7].block = 40;
        let wide_trigger = LevelParts {
            graph: RoomGraph::new(parts.graph.exits().to_vec(), triggers),
            ..parts.clone()
        };
        assert_eq!(
            wide_trigger.validate().unwrap_err(),
            ValidationError::TriggerField {
                index: 7,
                screen: 0,
                block: 40,
                timer: 0,
            }
        );

        let mut few_guards = parts;
        few_guards.info.guards.truncate(10);
        assert_eq!(
            few_guards.validate().unwrap_err(),
            ValidationError::GuardCount {
                count: 10,
                expected: 24,
            }
        );
    }

    #[test]
    fn deserializing_validates() {
        let level = decode_level(&demo_blueprint()).unwrap().value;
        let mut parts = LevelParts::from(level);
        parts.info.start.room = 30;

        let json = serde_json::to_string(&parts).unwrap();
        let err = serde_json::from_str::<Level>(&json).unwrap_err();
        assert!(err.to_string().contains("start room 30 does not exist"));
    }
}
