//! Wire protocol for the per-user WebSocket connection.
//!
//! Frames are JSON objects tagged with an integer `_type` discriminant.
//! Each variant has a typed struct that validates its own fields; frames
//! that fail decoding or validation never reach the engine.

pub mod codec;
pub mod messages;

use thiserror::Error;

/// Integer discriminant identifying each message variant on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    LocationUpdate = 1,
    ParkingRequest = 2,
    ParkingAllocation = 3,
    ParkingAcceptance = 4,
    ParkingRejection = 5,
    ParkingDeallocation = 6,
    ParkingCancellation = 7,
}

impl MessageType {
    pub fn from_discriminant(raw: i64) -> Option<Self> {
        match raw {
            1 => Some(Self::LocationUpdate),
            2 => Some(Self::ParkingRequest),
            3 => Some(Self::ParkingAllocation),
            4 => Some(Self::ParkingAcceptance),
            5 => Some(Self::ParkingRejection),
            6 => Some(Self::ParkingDeallocation),
            7 => Some(Self::ParkingCancellation),
            _ => None,
        }
    }

    pub fn discriminant(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    #[error("missing _type discriminant")]
    MissingDiscriminant,

    #[error("unknown _type discriminant: {0}")]
    UnknownDiscriminant(i64),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Error codes carried by a failed allocation reply.
pub mod error_codes {
    /// No candidate lot matched the request.
    pub const NO_AVAILABLE_LOT: i32 = 1;
    /// The accepted lot filled up before the commit landed.
    pub const LOT_FULL: i32 = 2;
    /// A rejection arrived on a session that never made a request.
    pub const NO_ACTIVE_REQUEST: i32 = 3;
}

/// Reason codes carried by a cancellation. Clients may send anything
/// non-negative; only `UNKNOWN` has meaning today.
pub mod cancel_reasons {
    pub const UNKNOWN: i32 = 0;
}
