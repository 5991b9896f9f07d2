use failure::Fail;
use serde::Serialize;
use std::fmt;

use crate::blueprint::Region;
use crate::rooms::Direction;

/// Structural corruption.  Fatal to the decode call that raised it.
#[derive(Debug, Fail, PartialEq)]
pub enum FormatError {
    #[fail(
        display = "{} region at {:#06x} needs {} bytes of input, got {}",
        region, offset, required, actual
    )]
    Truncated {
        region: Region,
        offset: usize,
        required: usize,
        actual: usize,
    },

    #[fail(
        display = "room {} {} link at {:#06x} has invalid value {:#04x}",
        room, direction, offset, value
    )]
    BadRoomLink {
        room: u8,
        direction: Direction,
        offset: usize,
        value: u8,
    },

    #[fail(
        display = "sprite pointer table at {:#06x} needs {} bytes of input, got {}",
        offset, required, actual
    )]
    TruncatedPointerTable {
        offset: usize,
        required: usize,
        actual: usize,
    },

    #[fail(
        display = "sprite pointer {} ({:#06x}) resolves to offset {} outside a {} byte buffer",
        index, pointer, offset, len
    )]
    PointerOutOfRange {
        index: usize,
        pointer: u16,
        offset: i64,
        len: usize,
    },

    #[fail(
        display = "sprite pointer {} ({:#06x}) resolves to offset {:#06x} inside the pointer table",
        index, pointer, offset
    )]
    PointerIntoTable {
        index: usize,
        pointer: u16,
        offset: usize,
    },

    #[fail(
        display = "sprite {} header at {:#06x} runs past the end of a {} byte buffer",
        index, offset, actual
    )]
    TruncatedHeader {
        index: usize,
        offset: usize,
        actual: usize,
    },

    #[fail(
        display = "sprite {} at {:#06x} ({}x{}) needs {} bytes of input, got {}",
        index, offset, width, height, required, actual
    )]
    BitmapOverrun {
        index: usize,
        offset: usize,
        width: u8,
        height: u8,
        required: usize,
        actual: usize,
    },
}

/// Cross-referential problems found while assembling a level or bitmap.
#[derive(Debug, Fail, PartialEq)]
pub enum ValidationError {
    #[fail(display = "level has {} rooms, expected {}", count, expected)]
    RoomCount { count: usize, expected: usize },

    #[fail(display = "room at position {} claims id {}", index, id)]
    RoomIdMismatch { index: usize, id: u8 },

    #[fail(display = "room graph has {} entries, expected {}", count, expected)]
    RoomGraphSize { count: usize, expected: usize },

    #[fail(display = "trigger table has {} entries, expected {}", count, expected)]
    TriggerTableSize { count: usize, expected: usize },

    #[fail(display = "start room {} does not exist", room)]
    StartRoom { room: u8 },

    #[fail(display = "level has {} guard records, expected {}", count, expected)]
    GuardCount { count: usize, expected: usize },

    #[fail(display = "guard {} references room {} which does not exist", guard, room)]
    GuardRoom { guard: usize, room: u8 },

    #[fail(display = "guard record {} is stored for room {}", guard, room)]
    GuardSlot { guard: usize, room: u8 },

    #[fail(
        display = "room {} cell {} holds unknown tile kind {:#04x} with no unknown bits set",
        room, cell, value
    )]
    UnknownTile { room: u8, cell: usize, value: u8 },

    #[fail(
        display = "trigger {} has screen {} block {} timer {}, each must fit in 5 bits",
        index, screen, block, timer
    )]
    TriggerField {
        index: usize,
        screen: u8,
        block: u8,
        timer: u8,
    },

    #[fail(display = "guard {} starts at block {} outside its room", guard, block)]
    GuardBlock { guard: usize, block: u8 },

    #[fail(
        display = "room {} {} link targets room {} which does not exist",
        room, direction, target
    )]
    LinkTarget {
        room: u8,
        direction: Direction,
        target: u8,
    },

    #[fail(
        display = "{}x{} bitmap needs {} bytes of data, got {}",
        width, height, required, actual
    )]
    BitmapSize {
        width: u8,
        height: u8,
        required: usize,
        actual: usize,
    },
}

#[derive(Debug, Fail, PartialEq)]
pub enum Error {
    #[fail(display = "format error: {}", _0)]
    Format(#[cause] FormatError),

    #[fail(display = "validation error: {}", _0)]
    Validation(#[cause] ValidationError),
}

impl From<FormatError> for Error {
    fn from(err: FormatError) -> Self {
        Error::Format(err)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

/// Which field an unrecognized value was found in.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum ValueKind {
    TileKind { room: u8, cell: u8 },
    GuardProgram { guard: u8 },
}

/// A non-fatal diagnostic: the value was kept verbatim but has no known
/// meaning.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct UnknownValue {
    pub kind: ValueKind,
    pub offset: usize,
    pub value: u8,
}

impl fmt::Display for UnknownValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            ValueKind::TileKind { room, cell } => write!(
                f,
                "unknown tile kind {:#04x} in room {} cell {} at {:#06x}",
                self.value, room, cell, self.offset
            ),
            ValueKind::GuardProgram { guard } => write!(
                f,
                "unknown behavior program {} for guard {} at {:#06x}",
                self.value, guard, self.offset
            ),
        }
    }
}

/// A decoded value together with the diagnostics collected on the way.
#[derive(Debug)]
pub struct Decoded<T> {
    pub value: T,
    pub warnings: Vec<UnknownValue>,
}

impl<T> Decoded<T> {
    pub fn new(value: T, warnings: Vec<UnknownValue>) -> Decoded<T> {
        Decoded { value, warnings }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Decoded<U> {
        Decoded {
            value: f(self.value),
            warnings: self.warnings,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}
