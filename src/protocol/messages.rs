use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::location::Location;
use crate::models::lot::{LotId, ParkingLot};
use crate::protocol::{cancel_reasons, MessageType, ProtocolError};

fn non_negative(field: &str, value: i64) -> Result<(), ProtocolError> {
    if value < 0 {
        return Err(ProtocolError::Validation(format!(
            "{field} must be non-negative, got {value}"
        )));
    }
    Ok(())
}

fn finite(field: &str, location: &Location) -> Result<(), ProtocolError> {
    if !location.is_finite() {
        return Err(ProtocolError::Validation(format!(
            "{field} must have finite coordinates"
        )));
    }
    Ok(())
}

/// Structured error carried inside a failed allocation reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WsError {
    pub err_type: i32,
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationUpdateMessage {
    pub location: Location,
}

impl LocationUpdateMessage {
    pub fn new(location: Location) -> Result<Self, ProtocolError> {
        let message = Self { location };
        message.validate()?;
        Ok(message)
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        finite("location", &self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParkingRequestMessage {
    pub location: Location,
    /// Free-form preference data. Accepted and kept with the session but not
    /// yet interpreted by the engine.
    #[serde(default)]
    pub preferences: Map<String, Value>,
}

impl ParkingRequestMessage {
    pub fn new(location: Location) -> Result<Self, ProtocolError> {
        let message = Self {
            location,
            preferences: Map::new(),
        };
        message.validate()?;
        Ok(message)
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        finite("location", &self.location)
    }
}

/// Reply to a parking request: either the allocated lot or a structured
/// error explaining why no lot was handed out. Exactly one side is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParkingAllocationMessage {
    pub lot: Option<ParkingLot>,
    pub error: Option<WsError>,
}

impl ParkingAllocationMessage {
    pub fn offer(lot: ParkingLot) -> Self {
        Self {
            lot: Some(lot),
            error: None,
        }
    }

    pub fn refusal(error: WsError) -> Self {
        Self {
            lot: None,
            error: Some(error),
        }
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        match (&self.lot, &self.error) {
            (Some(lot), None) => {
                non_negative("lot.id", lot.id)?;
                finite("lot.location", &lot.location)
            }
            (None, Some(error)) => non_negative("error.err_type", i64::from(error.err_type)),
            _ => Err(ProtocolError::Validation(
                "exactly one of lot or error must be set".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParkingAcceptanceMessage {
    pub id: LotId,
}

impl ParkingAcceptanceMessage {
    pub fn new(id: LotId) -> Result<Self, ProtocolError> {
        let message = Self { id };
        message.validate()?;
        Ok(message)
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        non_negative("id", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParkingRejectionMessage {
    pub id: LotId,
}

impl ParkingRejectionMessage {
    pub fn new(id: LotId) -> Result<Self, ProtocolError> {
        let message = Self { id };
        message.validate()?;
        Ok(message)
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        non_negative("id", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParkingDeallocationMessage {
    pub id: LotId,
}

impl ParkingDeallocationMessage {
    pub fn new(id: LotId) -> Result<Self, ProtocolError> {
        let message = Self { id };
        message.validate()?;
        Ok(message)
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        non_negative("id", self.id)
    }
}

fn default_cancel_reason() -> i32 {
    cancel_reasons::UNKNOWN
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParkingCancellationMessage {
    pub id: LotId,
    #[serde(default = "default_cancel_reason")]
    pub reason: i32,
}

impl ParkingCancellationMessage {
    pub fn new(id: LotId, reason: i32) -> Result<Self, ProtocolError> {
        let message = Self { id, reason };
        message.validate()?;
        Ok(message)
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        non_negative("id", self.id)?;
        non_negative("reason", i64::from(self.reason))
    }
}

/// A decoded protocol frame.
#[derive(Debug, Clone, PartialEq)]
pub enum WsMessage {
    LocationUpdate(LocationUpdateMessage),
    ParkingRequest(ParkingRequestMessage),
    ParkingAllocation(ParkingAllocationMessage),
    ParkingAcceptance(ParkingAcceptanceMessage),
    ParkingRejection(ParkingRejectionMessage),
    ParkingDeallocation(ParkingDeallocationMessage),
    ParkingCancellation(ParkingCancellationMessage),
}

impl WsMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::LocationUpdate(_) => MessageType::LocationUpdate,
            Self::ParkingRequest(_) => MessageType::ParkingRequest,
            Self::ParkingAllocation(_) => MessageType::ParkingAllocation,
            Self::ParkingAcceptance(_) => MessageType::ParkingAcceptance,
            Self::ParkingRejection(_) => MessageType::ParkingRejection,
            Self::ParkingDeallocation(_) => MessageType::ParkingDeallocation,
            Self::ParkingCancellation(_) => MessageType::ParkingCancellation,
        }
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Self::LocationUpdate(inner) => inner.validate(),
            Self::ParkingRequest(inner) => inner.validate(),
            Self::ParkingAllocation(inner) => inner.validate(),
            Self::ParkingAcceptance(inner) => inner.validate(),
            Self::ParkingRejection(inner) => inner.validate(),
            Self::ParkingDeallocation(inner) => inner.validate(),
            Self::ParkingCancellation(inner) => inner.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_lot_id_fails_validation() {
        let err = ParkingAcceptanceMessage::new(-1).unwrap_err();
        assert!(matches!(err, ProtocolError::Validation(_)));
    }

    #[test]
    fn non_finite_location_fails_validation() {
        let err = LocationUpdateMessage::new(Location::new(f64::NAN, 0.0)).unwrap_err();
        assert!(matches!(err, ProtocolError::Validation(_)));
    }

    #[test]
    fn negative_cancellation_reason_fails_validation() {
        let err = ParkingCancellationMessage::new(1, -2).unwrap_err();
        assert!(matches!(err, ProtocolError::Validation(_)));
    }

    #[test]
    fn allocation_reply_requires_exactly_one_side() {
        let neither = ParkingAllocationMessage {
            lot: None,
            error: None,
        };
        assert!(matches!(
            neither.validate(),
            Err(ProtocolError::Validation(_))
        ));

        let refusal = ParkingAllocationMessage::refusal(WsError {
            err_type: 1,
            msg: "no parking available".to_string(),
        });
        assert!(refusal.validate().is_ok());
    }
}
