//! Wire formats and the replication table.
//!
//! Moves travel client → authority in a hand-packed little-endian packet:
//!
//! ```text
//! [version: u8] [count: u8] count × move
//! move := tick u64 | flags u8 | delta_time f32 | move_direction 3×f32
//!       | facing 4×f32 | wall_jump tag u8 [+ 3×f32]
//!       | jetpack_fuel f32 (only if the jetpack flag is set)
//!       | client_position 3×f32
//! ```
//!
//! Commands and server messages are [`postcard`] bodies behind the same
//! version byte. [`MOVE_FIELDS`], [`COMMAND_FIELDS`] and [`SERVER_FIELDS`]
//! list every replicated field with its wire type and reliability class.

use glam::{Quat, Vec3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::abilities::{FreezeSnapshot, JetpackSnapshot, TeleportSnapshot, WallRunSnapshot};
use crate::authority::AuthoritativeCommand;
use crate::flags::{AbilityFlags, FLAG_JETPACK};
use crate::input::WallJumpRequest;
use crate::record::MoveRecord;
use crate::state::MovementState;

/// Current wire-protocol version. Prepended to every payload.
pub const PROTOCOL_VERSION: u8 = 1;

/// Most moves one packet can carry.
pub const MAX_MOVES_PER_PACKET: usize = u8::MAX as usize;

const WALL_JUMP_NONE: u8 = 0;
const WALL_JUMP_ALONG_NORMAL: u8 = 1;
const WALL_JUMP_DIRECTION: u8 = 2;

// ---------------------------------------------------------------------------
// Replication table
// ---------------------------------------------------------------------------

/// Delivery class of a replicated field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reliability {
    /// Delivered exactly once, in order. Used for one-shot commands.
    Reliable,
    /// Best effort. Used for continuous state that is re-sent anyway.
    Unreliable,
}

/// Encoding of a replicated field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    /// One byte flag.
    Bool,
    /// Packed [`AbilityFlags`] byte.
    Flags,
    /// Little-endian `u64`.
    U64,
    /// Little-endian `f32`.
    F32,
    /// Three `f32`.
    Vec3,
    /// Four `f32` (x, y, z, w).
    Quat,
    /// Tag byte, plus three `f32` for an explicit direction.
    WallJump,
    /// Full postcard-encoded [`MovementState`].
    State,
}

/// When a field is present on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Always written.
    Always,
    /// Only when the jetpack flag is set.
    JetpackFlag,
}

/// One row of the replication table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicatedField {
    /// Field name.
    pub name: &'static str,
    /// Encoding.
    pub wire_type: WireType,
    /// Delivery class.
    pub reliability: Reliability,
    /// Presence rule.
    pub presence: Presence,
}

const fn field(
    name: &'static str,
    wire_type: WireType,
    reliability: Reliability,
    presence: Presence,
) -> ReplicatedField {
    ReplicatedField {
        name,
        wire_type,
        reliability,
        presence,
    }
}

/// Per-move fields, in packet order.
pub const MOVE_FIELDS: &[ReplicatedField] = &[
    field("tick", WireType::U64, Reliability::Unreliable, Presence::Always),
    field("flags", WireType::Flags, Reliability::Unreliable, Presence::Always),
    field("delta_time", WireType::F32, Reliability::Unreliable, Presence::Always),
    field("move_direction", WireType::Vec3, Reliability::Unreliable, Presence::Always),
    field("facing", WireType::Quat, Reliability::Unreliable, Presence::Always),
    field("wall_jump", WireType::WallJump, Reliability::Unreliable, Presence::Always),
    field("jetpack_fuel", WireType::F32, Reliability::Unreliable, Presence::JetpackFlag),
    field("client_position", WireType::Vec3, Reliability::Unreliable, Presence::Always),
];

/// Client → authority commands.
pub const COMMAND_FIELDS: &[ReplicatedField] = &[
    field("set_frozen", WireType::Bool, Reliability::Reliable, Presence::Always),
    field("frozen_look_direction", WireType::Quat, Reliability::Reliable, Presence::Always),
    field("launch_character", WireType::Vec3, Reliability::Reliable, Presence::Always),
    field("move_direction", WireType::Vec3, Reliability::Unreliable, Presence::Always),
];

/// Authority → client messages.
pub const SERVER_FIELDS: &[ReplicatedField] = &[
    field("ack_tick", WireType::U64, Reliability::Unreliable, Presence::Always),
    field("correction_state", WireType::State, Reliability::Unreliable, Presence::Always),
    field("is_frozen", WireType::Bool, Reliability::Reliable, Presence::Always),
    field("frozen_look_direction", WireType::Quat, Reliability::Reliable, Presence::Always),
];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while encoding or decoding payloads.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The payload was empty (no version byte).
    #[error("empty payload, no version byte")]
    EmptyPayload,

    /// The version byte does not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The payload ended in the middle of a field.
    #[error("truncated payload: needed {needed} more bytes, {remaining} left")]
    Truncated {
        /// Bytes the next field needs.
        needed: usize,
        /// Bytes left in the payload.
        remaining: usize,
    },

    /// Unknown wall-jump tag byte.
    #[error("invalid wall jump tag: {0}")]
    InvalidWallJumpTag(u8),

    /// Bytes left over after the last move.
    #[error("{0} trailing bytes after last move")]
    TrailingBytes(usize),

    /// More moves than one packet can carry.
    #[error("too many moves for one packet: {0}")]
    TooManyMoves(usize),

    /// Postcard encoding or decoding failed.
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),
}

// ---------------------------------------------------------------------------
// WireMove
// ---------------------------------------------------------------------------

/// One move as it travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WireMove {
    /// Last tick covered by the move.
    pub tick: u64,
    /// Ability flags byte.
    pub flags: AbilityFlags,
    /// Seconds simulated by the move.
    pub delta_time: f32,
    /// Move direction.
    pub move_direction: Vec3,
    /// Facing.
    pub facing: Quat,
    /// Explicit wall jump.
    pub wall_jump: Option<WallJumpRequest>,
    /// Client's fuel at the start of the move; only sent while the jetpack
    /// flag is set.
    pub jetpack_fuel: Option<f32>,
    /// Client's predicted position after the move.
    pub client_position: Vec3,
}

impl WireMove {
    /// Packs a record with the position the client predicted for it.
    pub fn from_record(record: &MoveRecord, client_position: Vec3) -> Self {
        let flags = record.flags();
        Self {
            tick: record.tick,
            flags,
            delta_time: record.delta_time,
            move_direction: record.move_direction,
            facing: record.facing,
            wall_jump: record.wall_jump,
            jetpack_fuel: flags.wants_jetpack.then_some(record.jetpack.fuel),
            client_position,
        }
    }

    /// Rebuilds a record on the authority. Fields the wire does not carry
    /// are taken from the authority's own `state`.
    pub fn to_record(&self, state: &MovementState) -> MoveRecord {
        MoveRecord {
            first_tick: self.tick,
            tick: self.tick,
            delta_time: self.delta_time,
            move_direction: self.move_direction,
            facing: self.facing,
            wall_jump: self.wall_jump,
            teleport: TeleportSnapshot {
                wants: self.flags.wants_teleport,
                held: self.flags.wants_teleport,
            },
            jetpack: JetpackSnapshot {
                wants: self.flags.wants_jetpack,
                fuel: self.jetpack_fuel.unwrap_or(state.jetpack.fuel),
            },
            wall_run: WallRunSnapshot {
                wants: self.flags.wants_wall_run,
                is_running: state.wall_run.is_running,
            },
            freeze: FreezeSnapshot {
                is_frozen: state.freeze.is_frozen,
                look_direction: state.freeze.look_direction,
            },
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        let flags = self.flags.encode();
        out.extend_from_slice(&self.tick.to_le_bytes());
        out.push(flags);
        put_f32(out, self.delta_time);
        put_vec3(out, self.move_direction);
        for v in self.facing.to_array() {
            put_f32(out, v);
        }
        match self.wall_jump {
            None => out.push(WALL_JUMP_NONE),
            Some(WallJumpRequest::AlongWallNormal) => out.push(WALL_JUMP_ALONG_NORMAL),
            Some(WallJumpRequest::Direction(direction)) => {
                out.push(WALL_JUMP_DIRECTION);
                put_vec3(out, direction);
            }
        }
        if flags & FLAG_JETPACK != 0 {
            put_f32(out, self.jetpack_fuel.unwrap_or(0.0));
        }
        put_vec3(out, self.client_position);
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, WireError> {
        let tick = u64::from_le_bytes(reader.array()?);
        let raw_flags = reader.u8()?;
        let delta_time = reader.f32()?;
        let move_direction = reader.vec3()?;
        let facing = Quat::from_array([reader.f32()?, reader.f32()?, reader.f32()?, reader.f32()?]);
        let wall_jump = match reader.u8()? {
            WALL_JUMP_NONE => None,
            WALL_JUMP_ALONG_NORMAL => Some(WallJumpRequest::AlongWallNormal),
            WALL_JUMP_DIRECTION => Some(WallJumpRequest::Direction(reader.vec3()?)),
            tag => return Err(WireError::InvalidWallJumpTag(tag)),
        };
        let jetpack_fuel = if raw_flags & FLAG_JETPACK != 0 {
            Some(reader.f32()?)
        } else {
            None
        };
        let client_position = reader.vec3()?;
        Ok(Self {
            tick,
            flags: AbilityFlags::decode(raw_flags),
            delta_time,
            move_direction,
            facing,
            wall_jump,
            jetpack_fuel,
            client_position,
        })
    }
}

/// Packs moves into one versioned packet.
pub fn encode_moves(moves: &[WireMove]) -> Result<Vec<u8>, WireError> {
    if moves.len() > MAX_MOVES_PER_PACKET {
        return Err(WireError::TooManyMoves(moves.len()));
    }
    let mut out = Vec::with_capacity(2 + moves.len() * 64);
    out.push(PROTOCOL_VERSION);
    out.push(moves.len() as u8);
    for m in moves {
        m.write(&mut out);
    }
    Ok(out)
}

/// Unpacks a versioned move packet.
pub fn decode_moves(data: &[u8]) -> Result<Vec<WireMove>, WireError> {
    let mut reader = Reader::new(check_version(data)?);
    let count = reader.u8()?;
    let mut moves = Vec::with_capacity(count as usize);
    for _ in 0..count {
        moves.push(WireMove::read(&mut reader)?);
    }
    match reader.remaining() {
        0 => Ok(moves),
        n => Err(WireError::TrailingBytes(n)),
    }
}

fn put_f32(out: &mut Vec<u8>, v: f32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_vec3(out: &mut Vec<u8>, v: Vec3) {
    put_f32(out, v.x);
    put_f32(out, v.y);
    put_f32(out, v.z);
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let remaining = self.remaining();
        let bytes = self
            .data
            .get(self.pos..self.pos + N)
            .ok_or(WireError::Truncated {
                needed: N,
                remaining,
            })?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.pos += N;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.array::<1>()?[0])
    }

    fn f32(&mut self) -> Result<f32, WireError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn vec3(&mut self) -> Result<Vec3, WireError> {
        Ok(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }
}

// ---------------------------------------------------------------------------
// Server messages
// ---------------------------------------------------------------------------

/// Authority → client message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Every move up to `tick` matched.
    Ack {
        /// Last processed tick.
        tick: u64,
    },
    /// The authority's state after `tick` disagrees with the client.
    Correction {
        /// Last processed tick.
        tick: u64,
        /// Authoritative state after that tick.
        state: MovementState,
    },
    /// Freeze status changed.
    FreezeReplicated {
        /// Frozen.
        is_frozen: bool,
        /// Held orientation.
        look_direction: Quat,
    },
}

impl ServerMessage {
    /// Channel this message travels on.
    pub fn reliability(&self) -> Reliability {
        match self {
            Self::Ack { .. } | Self::Correction { .. } => Reliability::Unreliable,
            Self::FreezeReplicated { .. } => Reliability::Reliable,
        }
    }
}

// ---------------------------------------------------------------------------
// Postcard envelopes
// ---------------------------------------------------------------------------

/// Wire format: `[version: u8] [postcard-encoded value]`
fn encode_envelope<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    let body = postcard::to_allocvec(value)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

fn decode_envelope<T: DeserializeOwned>(data: &[u8]) -> Result<T, WireError> {
    Ok(postcard::from_bytes(check_version(data)?)?)
}

fn check_version(data: &[u8]) -> Result<&[u8], WireError> {
    let (&version, body) = data.split_first().ok_or(WireError::EmptyPayload)?;
    if version != PROTOCOL_VERSION {
        return Err(WireError::UnsupportedVersion(version));
    }
    Ok(body)
}

/// Serializes a command into a versioned payload.
pub fn encode_command(command: &AuthoritativeCommand) -> Result<Vec<u8>, WireError> {
    encode_envelope(command)
}

/// Deserializes a versioned command payload.
pub fn decode_command(data: &[u8]) -> Result<AuthoritativeCommand, WireError> {
    decode_envelope(data)
}

/// Serializes a server message into a versioned payload.
pub fn encode_server_message(message: &ServerMessage) -> Result<Vec<u8>, WireError> {
    encode_envelope(message)
}

/// Deserializes a versioned server message payload.
pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage, WireError> {
    decode_envelope(data)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
