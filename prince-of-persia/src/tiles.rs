use num::FromPrimitive;
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::blueprint::{Region, NUM_ROOMS, ROOM_WIDTH, TILES_PER_ROOM};
use crate::error::{Decoded, FormatError, UnknownValue, ValueKind};

// The type byte carries the tile id in its low bits.  Bit 5 marks tiles that
// take part in a trigger link.  The top two bits are never set by known
// levels.  Older level tools read them as sword and special flags and mask
// them off; here a byte with either bit set is kept whole as an unknown kind
// so nothing is lost on re-encoding.
pub const ID_MASK: u8 = 0b0001_1111;
pub const LINKED_MASK: u8 = 0b0010_0000;
pub const UNKNOWN_MASK: u8 = 0b1100_0000;

#[derive(
    Clone, Copy, Debug, FromPrimitive, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum TileType {
    Empty = 0x00,
    Floor = 0x01,
    Spike = 0x02,
    Pillar = 0x03,
    Gate = 0x04,
    StuckButton = 0x05,
    DropButton = 0x06,
    Tapestry = 0x07,
    TapestryTop = 0x08,
    Potion = 0x09,
    LooseFloor = 0x0a,
    GateTop = 0x0b,
    Mirror = 0x0c,
    Debris = 0x0d,
    RaiseButton = 0x0e,
    ExitLeft = 0x0f,
    ExitRight = 0x10,
    Chomper = 0x11,
    Torch = 0x12,
    Wall = 0x13,
    Skeleton = 0x14,
    Sword = 0x15,
    BalconyLeft = 0x16,
    BalconyRight = 0x17,
    LatticePillar = 0x18,
    LatticeLeft = 0x19,
    LatticeRight = 0x1a,
    BigPillarBottom = 0x1b,
    BigPillarTop = 0x1c,
    SmallPillar = 0x1d,
    LatticeDown = 0x1e,
    TorchWithDebris = 0x1f,
}

impl TileType {
    pub fn is_solid(self) -> bool {
        match self {
            TileType::Wall
            | TileType::Pillar
            | TileType::BigPillarBottom
            | TileType::BigPillarTop
            | TileType::SmallPillar
            | TileType::Gate
            | TileType::GateTop => true,
            _ => false,
        }
    }

    pub fn is_dangerous(self) -> bool {
        self == TileType::Spike || self == TileType::Chomper
    }

    pub fn is_floor(self) -> bool {
        match self {
            TileType::Floor
            | TileType::LooseFloor
            | TileType::RaiseButton
            | TileType::DropButton
            | TileType::StuckButton => true,
            _ => false,
        }
    }

    /// Buttons keep the index of their first trigger link in the modifier
    /// byte.
    pub fn is_button(self) -> bool {
        match self {
            TileType::RaiseButton | TileType::DropButton | TileType::StuckButton => true,
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TileKind {
    Known(TileType),
    Unknown(u8),
}

impl TileKind {
    pub fn from_byte(b: u8) -> TileKind {
        if b & UNKNOWN_MASK != 0 {
            return TileKind::Unknown(b);
        }
        match TileType::from_u8(b & ID_MASK) {
            Some(ty) => TileKind::Known(ty),
            None => TileKind::Unknown(b),
        }
    }

    pub fn known(self) -> Option<TileType> {
        match self {
            TileKind::Known(ty) => Some(ty),
            TileKind::Unknown(_) => None,
        }
    }

    pub fn is(self, ty: TileType) -> bool {
        self == TileKind::Known(ty)
    }
}

impl Default for TileKind {
    fn default() -> Self {
        TileKind::Known(TileType::Empty)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub kind: TileKind,
    pub linked: bool,
    pub modifier: u8,
}

impl Tile {
    pub fn from_bytes(type_byte: u8, modifier: u8) -> Tile {
        Tile {
            kind: TileKind::from_byte(type_byte),
            linked: is_bit_set!(type_byte, LINKED_MASK),
            modifier: modifier,
        }
    }

    /// The byte this tile is stored as in the tile type region.  Unknown
    /// kinds already carry every bit of the original byte.
    pub fn type_byte(&self) -> u8 {
        match self.kind {
            TileKind::Known(ty) => ty as u8 | if self.linked { LINKED_MASK } else { 0 },
            TileKind::Unknown(raw) => raw,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: u8,
    // Row major, ROOM_WIDTH tiles per row.
    tiles: [Tile; TILES_PER_ROOM],
}

impl Room {
    pub fn new(id: u8, tiles: [Tile; TILES_PER_ROOM]) -> Room {
        Room { id, tiles }
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tile(&self, x: usize, y: usize) -> Option<&Tile> {
        if x >= ROOM_WIDTH {
            return None;
        }
        self.tiles.get(y * ROOM_WIDTH + x)
    }

    pub fn rows(&self) -> std::slice::Chunks<Tile> {
        self.tiles.chunks(ROOM_WIDTH)
    }

    pub fn count(&self, ty: TileType) -> usize {
        self.tiles.iter().filter(|t| t.kind.is(ty)).count()
    }
}

pub fn decode_tiles(data: &[u8]) -> Result<Decoded<Vec<Room>>, FormatError> {
    let types = Region::TileTypes.slice(data)?;
    let modifiers = Region::TileModifiers.slice(data)?;

    let mut rooms = Vec::with_capacity(NUM_ROOMS);
    let mut warnings = Vec::new();
    for room in 0..NUM_ROOMS {
        let start = room * TILES_PER_ROOM;
        let mut tiles = [Tile::default(); TILES_PER_ROOM];
        for (cell, tile) in tiles.iter_mut().enumerate() {
            let index = start + cell;
            *tile = Tile::from_bytes(types[index], modifiers[index]);

            if let TileKind::Unknown(raw) = tile.kind {
                let warning = UnknownValue {
                    kind: ValueKind::TileKind {
                        room: room as u8,
                        cell: cell as u8,
                    },
                    offset: Region::TileTypes.offset() + index,
                    value: raw,
                };
                warn!("{}", warning);
                warnings.push(warning);
            }
        }
        rooms.push(Room::new(room as u8, tiles));
    }

    debug!(rooms = rooms.len(), unknown = warnings.len(), "decoded tile table");
    Ok(Decoded::new(rooms, warnings))
}

pub fn encode_tiles(rooms: &[Room], out: &mut [u8]) {
    for room in rooms {
        let start = room.id as usize * TILES_PER_ROOM;
        for (cell, tile) in room.tiles().iter().enumerate() {
            Region::TileTypes.slice_mut(out)[start + cell] = tile.type_byte();
            Region::TileModifiers.slice_mut(out)[start + cell] = tile.modifier;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{BLUEPRINT_SIZE, TILE_MODIFIERS_OFFSET};

    #[test]
    fn kind_from_byte() {
        assert_eq!(TileKind::from_byte(0x02), TileKind::Known(TileType::Spike));
        assert_eq!(TileKind::from_byte(0x24), TileKind::Known(TileType::Gate));
        assert_eq!(
            TileKind::from_byte(0x1f),
            TileKind::Known(TileType::TorchWithDebris)
        );
        assert_eq!(TileKind::from_byte(0x41), TileKind::Unknown(0x41));
        assert_eq!(TileKind::from_byte(0xff), TileKind::Unknown(0xff));
    }

    #[test]
    fn tile_type_byte_round_trips() {
        for b in 0..=255u8 {
            assert_eq!(Tile::from_bytes(b, 0).type_byte(), b);
        }
    }

    #[test]
    fn linked_flag() {
        let tile = Tile::from_bytes(0x21, 0x07);
        assert_eq!(tile.kind, TileKind::Known(TileType::Floor));
        assert!(tile.linked);
        assert_eq!(tile.modifier, 0x07);
    }

    #[test]
    fn decodes_rooms_row_major() {
        let mut data = vec![0u8; BLUEPRINT_SIZE];
        // Room 2, column 3, row 1.
        let index = 2 * TILES_PER_ROOM + ROOM_WIDTH + 3;
        data[index] = TileType::Potion as u8;
        data[TILE_MODIFIERS_OFFSET + index] = 0x05;

        let decoded = decode_tiles(&data).unwrap();
        assert!(decoded.warnings.is_empty());

        let rooms = decoded.value;
        assert_eq!(rooms.len(), NUM_ROOMS);
        for (i, room) in rooms.iter().enumerate() {
            assert_eq!(room.id as usize, i);
            assert_eq!(room.tiles().len(), TILES_PER_ROOM);
            assert_eq!(room.rows().count(), 3);
        }

        let tile = rooms[2].tile(3, 1).unwrap();
        assert_eq!(tile.kind, TileKind::Known(TileType::Potion));
        assert_eq!(tile.modifier, 0x05);
        assert_eq!(rooms[2].rows().nth(1).unwrap()[3], *tile);
        assert!(rooms[2].tile(10, 0).is_none());
        assert!(rooms[2].tile(0, 3).is_none());
    }

    #[test]
    fn unknown_kind_is_reported() {
        let mut data = vec![0u8; BLUEPRINT_SIZE];
        data[TILES_PER_ROOM + 4] = 0x93;

        let decoded = decode_tiles(&data).unwrap();
        assert_eq!(
            decoded.warnings,
            vec![UnknownValue {
                kind: ValueKind::TileKind { room: 1, cell: 4 },
                offset: TILES_PER_ROOM + 4,
                value: 0x93,
            }]
        );
        assert_eq!(decoded.value[1].tiles()[4].kind, TileKind::Unknown(0x93));
    }

    #[test]
    fn truncated_modifier_region() {
        let data = vec![0u8; TILE_MODIFIERS_OFFSET + 100];
        match decode_tiles(&data) {
            Err(FormatError::Truncated {
                region, required, ..
            }) => {
                assert_eq!(region, Region::TileModifiers);
                assert_eq!(required, TILE_MODIFIERS_OFFSET + TILES_PER_ROOM * NUM_ROOMS);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn encode_writes_both_regions() {
        let mut data = vec![0u8; BLUEPRINT_SIZE];
        for i in 0..TILES_PER_ROOM * NUM_ROOMS {
            data[i] = (i % 64) as u8;
            data[TILE_MODIFIERS_OFFSET + i] = (i % 251) as u8;
        }
        let rooms = decode_tiles(&data).unwrap().value;

        let mut out = vec![0u8; BLUEPRINT_SIZE];
        encode_tiles(&rooms, &mut out);
        assert_eq!(
            Region::TileTypes.slice(&out).unwrap(),
            Region::TileTypes.slice(&data).unwrap()
        );
        assert_eq!(
            Region::TileModifiers.slice(&out).unwrap(),
            Region::TileModifiers.slice(&data).unwrap()
        );
    }

    #[test]
    fn tile_classes() {
        assert!(TileType::Gate.is_solid());
        assert!(TileType::Spike.is_dangerous());
        assert!(TileType::LooseFloor.is_floor());
        assert!(TileType::DropButton.is_button());
        assert!(!TileType::Torch.is_button());
    }
}
