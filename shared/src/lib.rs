//! Wire contract shared by the arena server and its clients.
//!
//! Holds the protocol constants both sides must agree on, the `Packet` enum
//! exchanged over TCP, and the versioned payload encoding. Frame boundaries
//! are handled by the [`framing`] module.

pub mod framing;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const FIELD_WIDTH: f32 = 800.0;
pub const FIELD_HEIGHT: f32 = 600.0;
pub const ROBOT_SIZE: f32 = 50.0;
pub const ARENA_CENTER_X: f32 = 400.0;
pub const ARENA_CENTER_Y: f32 = 300.0;
pub const ARENA_RADIUS: f32 = 250.0;
pub const MIN_ARENA_RADIUS: f32 = 50.0;
pub const PUSH_FORCE: f32 = 10.0;
pub const PUSH_THRESHOLD: f32 = 0.1;
pub const ROBOT1_START: (f32, f32) = (200.0, 300.0);
pub const ROBOT2_START: (f32, f32) = (600.0, 300.0);
pub const DEFAULT_PORT: u16 = 8080;

/// Bumped whenever the `Packet` layout changes.
pub const PROTOCOL_VERSION: u16 = 1;

/// Errors raised while reading, writing or decoding protocol frames
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame of {0} bytes exceeds limit of {max} bytes", max = framing::MAX_FRAME_SIZE)]
    FrameTooLarge(usize),
    #[error("malformed packet: {0}")]
    Decode(#[from] bincode::Error),
    #[error("protocol version {found} not supported (expected {expected})")]
    VersionMismatch { found: u16, expected: u16 },
    #[error("invalid robot id {0}")]
    InvalidRobotId(u8),
}

/// One of the two fixed player slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RobotId {
    One,
    Two,
}

impl RobotId {
    pub const ALL: [RobotId; 2] = [RobotId::One, RobotId::Two];

    pub fn opponent(self) -> RobotId {
        match self {
            RobotId::One => RobotId::Two,
            RobotId::Two => RobotId::One,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            RobotId::One => 1,
            RobotId::Two => 2,
        }
    }

    /// Slot index into two-element arrays
    pub fn index(self) -> usize {
        match self {
            RobotId::One => 0,
            RobotId::Two => 1,
        }
    }

    pub fn start_position(self) -> (f32, f32) {
        match self {
            RobotId::One => ROBOT1_START,
            RobotId::Two => ROBOT2_START,
        }
    }
}

impl TryFrom<u8> for RobotId {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RobotId::One),
            2 => Ok(RobotId::Two),
            other => Err(ProtocolError::InvalidRobotId(other)),
        }
    }
}

impl fmt::Display for RobotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct RobotPosition {
    pub x: f32,
    pub y: f32,
    pub alive: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    AssignIdentity {
        robot_id: u8,
    },
    PositionUpdate {
        robot_id: u8,
        x: f32,
        y: f32,
    },
    WorldSnapshot {
        robot1: RobotPosition,
        robot2: RobotPosition,
        arena_radius: f32,
    },
    GameOver {
        winner_id: u8,
        elapsed_ms: u64,
    },
}

impl Packet {
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::AssignIdentity { .. } => "AssignIdentity",
            Packet::PositionUpdate { .. } => "PositionUpdate",
            Packet::WorldSnapshot { .. } => "WorldSnapshot",
            Packet::GameOver { .. } => "GameOver",
        }
    }
}

/// Encodes a packet as a frame payload: big-endian protocol version, then
/// the bincode body.
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    let body = bincode::serialize(packet)?;
    let mut payload = Vec::with_capacity(2 + body.len());
    payload.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    payload.extend_from_slice(&body);
    Ok(payload)
}

/// Decodes a frame payload produced by [`encode_packet`].
///
/// The version is checked before the body is touched, so peers speaking a
/// different revision get a `VersionMismatch` instead of garbage.
pub fn decode_packet(payload: &[u8]) -> Result<Packet, ProtocolError> {
    if payload.len() < 2 {
        return Err(ProtocolError::Decode(Box::new(bincode::ErrorKind::Custom(
            "payload shorter than version header".to_string(),
        ))));
    }
    let found = u16::from_be_bytes([payload[0], payload[1]]);
    if found != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch {
            found,
            expected: PROTOCOL_VERSION,
        });
    }
    Ok(bincode::deserialize(&payload[2..])?)
}
