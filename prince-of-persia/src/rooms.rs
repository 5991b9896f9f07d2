use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::blueprint::{Region, NUM_DIRECTIONS, NUM_ROOMS, NUM_TRIGGERS, ROOM_WIDTH, TILES_PER_ROOM};
use crate::error::FormatError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; NUM_DIRECTIONS] = [
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
    ];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Up => "up",
            Direction::Down => "down",
        };
        f.write_str(name)
    }
}

/// The four neighbours of one room.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exits {
    pub left: Option<u8>,
    pub right: Option<u8>,
    pub up: Option<u8>,
    pub down: Option<u8>,
}

impl Exits {
    pub fn get(&self, direction: Direction) -> Option<u8> {
        match direction {
            Direction::Left => self.left,
            Direction::Right => self.right,
            Direction::Up => self.up,
            Direction::Down => self.down,
        }
    }

    fn set(&mut self, direction: Direction, target: Option<u8>) {
        match direction {
            Direction::Left => self.left = target,
            Direction::Right => self.right = target,
            Direction::Up => self.up = target,
            Direction::Down => self.down = target,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RoomLink {
    pub room: u8,
    pub direction: Direction,
    pub target: Option<u8>,
}

// Link location byte:
// |7   |6  5 |4  3  2  1  0 |
// +----+-----+--------------+
// |last|s1 s0|b4 b3 b2 b1 b0|
//
// Link map byte:
// |7  6  5 |4  3  2  1  0 |
// +--------+--------------+
// |s4 s3 s2|t4 t3 t2 t1 t0|
//
// Where s[4..0] is the 1-based screen, b[4..0] the block within that screen
// and t[4..0] the gate timer.
const LAST_MASK: u8 = 0x80;
pub const FIELD_MASK: u8 = 0x1f;

/// One entry of the button to gate trigger table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerLink {
    pub screen: u8,
    pub block: u8,
    pub timer: u8,
    pub last: bool,
}

impl TriggerLink {
    pub fn from_bytes(location: u8, map: u8) -> TriggerLink {
        TriggerLink {
            screen: ((location >> 5) & 0x3) | ((map >> 5) << 2),
            block: location & FIELD_MASK,
            timer: map & FIELD_MASK,
            last: is_bit_set!(location, LAST_MASK),
        }
    }

    pub fn to_bytes(&self) -> (u8, u8) {
        let location = (if self.last { LAST_MASK } else { 0 })
            | ((self.screen & 0x3) << 5)
            | (self.block & FIELD_MASK);
        let map = ((self.screen >> 2) << 5) | (self.timer & FIELD_MASK);
        (location, map)
    }

    /// The room this entry targets, if the screen names one.
    pub fn room(&self) -> Option<u8> {
        match self.screen {
            0 => None,
            s if s as usize > NUM_ROOMS => None,
            s => Some(screen_to_room!(s)),
        }
    }
}

/// Walks one trigger chain, stopping after its last entry or at the end of
/// the table.
pub struct TriggerChain<'a> {
    triggers: &'a [TriggerLink],
    index: usize,
    done: bool,
}

impl<'a> Iterator for TriggerChain<'a> {
    type Item = &'a TriggerLink;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let link = match self.triggers.get(self.index) {
            Some(link) => link,
            None => {
                self.done = true;
                return None;
            }
        };
        self.index += 1;
        self.done = link.last;
        Some(link)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomGraph {
    exits: Vec<Exits>,
    triggers: Vec<TriggerLink>,
}

impl RoomGraph {
    pub fn new(exits: Vec<Exits>, triggers: Vec<TriggerLink>) -> RoomGraph {
        RoomGraph { exits, triggers }
    }

    pub fn exits(&self) -> &[Exits] {
        &self.exits
    }

    pub fn neighbor(&self, room: u8, direction: Direction) -> Option<u8> {
        self.exits
            .get(room as usize)
            .and_then(|exits| exits.get(direction))
    }

    /// Every directed link, four per room, in room order.
    pub fn links<'a>(&'a self) -> impl Iterator<Item = RoomLink> + 'a {
        self.exits.iter().enumerate().flat_map(|(room, exits)| {
            (0..NUM_DIRECTIONS).map(move |i| {
                let direction = Direction::ALL[i];
                RoomLink {
                    room: room as u8,
                    direction: direction,
                    target: exits.get(direction),
                }
            })
        })
    }

    pub fn triggers(&self) -> &[TriggerLink] {
        &self.triggers
    }

    pub fn trigger_chain(&self, start: u8) -> TriggerChain {
        TriggerChain {
            triggers: &self.triggers,
            index: start as usize,
            done: false,
        }
    }
}

fn decode_exits(map: &[u8]) -> Result<Vec<Exits>, FormatError> {
    let mut exits = Vec::with_capacity(NUM_ROOMS);
    for (room, entry) in map.chunks(NUM_DIRECTIONS).enumerate() {
        let mut room_exits = Exits::default();
        for (i, &value) in entry.iter().enumerate() {
            let direction = Direction::ALL[i];
            let target = match value as usize {
                0 => None,
                v if v <= NUM_ROOMS => Some(screen_to_room!(v)),
                _ => {
                    return Err(FormatError::BadRoomLink {
                        room: room as u8,
                        direction: direction,
                        offset: Region::RoomMap.offset() + room * NUM_DIRECTIONS + i,
                        value: value,
                    })
                }
            };
            room_exits.set(direction, target);
        }
        exits.push(room_exits);
    }
    Ok(exits)
}

pub fn decode_room_graph(data: &[u8]) -> Result<RoomGraph, FormatError> {
    let locations = Region::LinkLocations.slice(data)?;
    let map = Region::LinkMap.slice(data)?;
    let room_map = Region::RoomMap.slice(data)?;

    let exits = decode_exits(room_map)?;
    let triggers: Vec<TriggerLink> = locations
        .iter()
        .zip(map.iter())
        .map(|(&location, &map)| TriggerLink::from_bytes(location, map))
        .collect();

    debug!(
        links = exits.len() * NUM_DIRECTIONS,
        triggers = triggers.len(),
        "decoded room graph"
    );
    Ok(RoomGraph::new(exits, triggers))
}

pub fn encode_room_graph(graph: &RoomGraph, out: &mut [u8]) {
    for (room, exits) in graph.exits().iter().enumerate().take(NUM_ROOMS) {
        let room_map = Region::RoomMap.slice_mut(out);
        for (i, &direction) in Direction::ALL.iter().enumerate() {
            room_map[room * NUM_DIRECTIONS + i] = match exits.get(direction) {
                Some(target) => room_to_screen!(target),
                None => 0,
            };
        }
    }

    for (i, trigger) in graph.triggers().iter().enumerate().take(NUM_TRIGGERS) {
        let (location, map) = trigger.to_bytes();
        Region::LinkLocations.slice_mut(out)[i] = location;
        Region::LinkMap.slice_mut(out)[i] = map;
    }
}

/// Block index of a trigger target translated to column and row.
pub fn block_position(block: u8) -> Option<(u8, u8)> {
    if block as usize >= TILES_PER_ROOM {
        return None;
    }
    let width = ROOM_WIDTH as u8;
    Some((block % width, block / width))
}
