use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::blueprint::*;
use crate::error::{Decoded, FormatError, UnknownValue, ValueKind};
use crate::rooms::block_position;

/// Guard records with this block have no guard in their room.
pub const INACTIVE_BLOCK: u8 = 0xff;
pub const MAX_GUARD_SKILL: u8 = 11;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Facing {
    Left,
    Right,
}

impl Facing {
    pub fn from_byte(b: u8) -> Option<Facing> {
        match b {
            0 => Some(Facing::Left),
            1 => Some(Facing::Right),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardProgram {
    Skill(u8),
    Unknown(u8),
}

impl GuardProgram {
    pub fn from_byte(b: u8) -> GuardProgram {
        if b <= MAX_GUARD_SKILL {
            GuardProgram::Skill(b)
        } else {
            GuardProgram::Unknown(b)
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            GuardProgram::Skill(b) | GuardProgram::Unknown(b) => b,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartPosition {
    pub room: u8,
    pub block: u8,
    pub face: u8,
}

impl StartPosition {
    pub fn position(&self) -> Option<(u8, u8)> {
        block_position(self.block)
    }

    pub fn facing(&self) -> Option<Facing> {
        Facing::from_byte(self.face)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwordPosition {
    pub room: u8,
    pub block: u8,
}

impl SwordPosition {
    /// Levels without a sword pickup store screen 0.
    pub fn is_placed(&self) -> bool {
        (self.room as usize) < NUM_ROOMS
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardSpawn {
    pub room: u8,
    pub block: u8,
    pub face: u8,
    // Pixel offset within the block.
    pub x: u8,
    pub sequence: u16,
    pub program: GuardProgram,
}

impl GuardSpawn {
    pub fn is_active(&self) -> bool {
        self.block != INACTIVE_BLOCK
    }

    /// Column and row of the starting tile.
    pub fn position(&self) -> Option<(u8, u8)> {
        block_position(self.block)
    }

    pub fn facing(&self) -> Option<Facing> {
        Facing::from_byte(self.face)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelInfo {
    pub start: StartPosition,
    pub sword: SwordPosition,
    pub guards: Vec<GuardSpawn>,
}

impl LevelInfo {
    pub fn active_guards<'a>(&'a self) -> impl Iterator<Item = &'a GuardSpawn> + 'a {
        self.guards.iter().filter(|g| g.is_active())
    }
}

pub fn decode_info(data: &[u8]) -> Result<Decoded<LevelInfo>, FormatError> {
    let info = Region::Info.slice(data)?;

    let start = StartPosition {
        room: screen_to_room!(info[INFO_KID_START_SCREEN]),
        block: info[INFO_KID_START_BLOCK],
        face: info[INFO_KID_START_FACE],
    };
    let sword = SwordPosition {
        room: screen_to_room!(info[INFO_SWORD_START_SCREEN]),
        block: info[INFO_SWORD_START_BLOCK],
    };

    let mut guards = Vec::with_capacity(NUM_GUARDS);
    let mut warnings = Vec::new();
    for i in 0..NUM_GUARDS {
        let guard = GuardSpawn {
            room: i as u8,
            block: info[INFO_GUARD_BLOCK + i],
            face: info[INFO_GUARD_FACE + i],
            x: info[INFO_GUARD_X + i],
            sequence: ((info[INFO_GUARD_SEQ_HIGH + i] as u16) << 8)
                | info[INFO_GUARD_SEQ_LOW + i] as u16,
            program: GuardProgram::from_byte(info[INFO_GUARD_PROGRAM + i]),
        };

        // Programs of empty records are leftovers and never run.
        if let (true, GuardProgram::Unknown(raw)) = (guard.is_active(), guard.program) {
            let warning = UnknownValue {
                kind: ValueKind::GuardProgram { guard: i as u8 },
                offset: INFO_OFFSET + INFO_GUARD_PROGRAM + i,
                value: raw,
            };
            warn!("{}", warning);
            warnings.push(warning);
        }
        guards.push(guard);
    }

    let level_info = LevelInfo {
        start,
        sword,
        guards,
    };
    debug!(
        start_room = level_info.start.room,
        active_guards = level_info.active_guards().count(),
        "decoded level info"
    );
    Ok(Decoded::new(level_info, warnings))
}

/// Writes every decoded field back.  Bytes of the info region that carry no
/// decoded field are left untouched.
pub fn encode_info(level_info: &LevelInfo, out: &mut [u8]) {
    let info = Region::Info.slice_mut(out);
    info[INFO_KID_START_SCREEN] = room_to_screen!(level_info.start.room);
    info[INFO_KID_START_BLOCK] = level_info.start.block;
    info[INFO_KID_START_FACE] = level_info.start.face;
    info[INFO_SWORD_START_SCREEN] = room_to_screen!(level_info.sword.room);
    info[INFO_SWORD_START_BLOCK] = level_info.sword.block;

    for (i, guard) in level_info.guards.iter().enumerate().take(NUM_GUARDS) {
        info[INFO_GUARD_BLOCK + i] = guard.block;
        info[INFO_GUARD_FACE + i] = guard.face;
        info[INFO_GUARD_X + i] = guard.x;
        info[INFO_GUARD_SEQ_LOW + i] = guard.sequence as u8;
        info[INFO_GUARD_SEQ_HIGH + i] = (guard.sequence >> 8) as u8;
        info[INFO_GUARD_PROGRAM + i] = guard.program.to_byte();
    }
}
