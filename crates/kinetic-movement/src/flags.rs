//! Ability flags codec: the per-move "wants" bits packed into one byte.
//!
//! Bit positions are part of the wire contract and are assigned in the
//! order the abilities were introduced. Reserved bits are always written as
//! zero and ignored when read, so older peers can decode newer packets.

use serde::{Deserialize, Serialize};

/// Bit 0: the character wants to teleport this move.
pub const FLAG_TELEPORT: u8 = 1 << 0;
/// Bit 1: the character wants to thrust with the jetpack.
pub const FLAG_JETPACK: u8 = 1 << 1;
/// Bit 2: the character wants to run along walls.
pub const FLAG_WALL_RUN: u8 = 1 << 2;

/// Every bit with a defined meaning. Bits 3-7 are reserved.
pub const DEFINED_FLAGS_MASK: u8 = FLAG_TELEPORT | FLAG_JETPACK | FLAG_WALL_RUN;

/// Decoded form of the flags byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbilityFlags {
    /// Teleport intent (edge: true only on the move that fires).
    pub wants_teleport: bool,
    /// Jetpack intent (held).
    pub wants_jetpack: bool,
    /// Wall-run intent (held).
    pub wants_wall_run: bool,
}

impl AbilityFlags {
    /// Packs the flags into a byte. Reserved bits are zero.
    pub fn encode(self) -> u8 {
        let mut byte = 0;
        if self.wants_teleport {
            byte |= FLAG_TELEPORT;
        }
        if self.wants_jetpack {
            byte |= FLAG_JETPACK;
        }
        if self.wants_wall_run {
            byte |= FLAG_WALL_RUN;
        }
        byte
    }

    /// Unpacks a byte. Reserved bits are ignored.
    pub fn decode(byte: u8) -> Self {
        Self {
            wants_teleport: byte & FLAG_TELEPORT != 0,
            wants_jetpack: byte & FLAG_JETPACK != 0,
            wants_wall_run: byte & FLAG_WALL_RUN != 0,
        }
    }

    /// Returns `true` if no ability is requested.
    pub fn is_empty(self) -> bool {
        self.encode() == 0
    }
}

impl From<u8> for AbilityFlags {
    fn from(byte: u8) -> Self {
        Self::decode(byte)
    }
}

impl From<AbilityFlags> for u8 {
    fn from(flags: AbilityFlags) -> Self {
        flags.encode()
    }
}
