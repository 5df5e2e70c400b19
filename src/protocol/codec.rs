use serde_json::Value;

use crate::protocol::messages::{
    LocationUpdateMessage, ParkingAcceptanceMessage, ParkingAllocationMessage,
    ParkingCancellationMessage, ParkingDeallocationMessage, ParkingRejectionMessage,
    ParkingRequestMessage, WsMessage,
};
use crate::protocol::{MessageType, ProtocolError};

const TYPE_FIELD: &str = "_type";

/// Decode one frame into its message variant.
///
/// The frame must be a JSON object carrying an integer `_type` drawn from
/// the known discriminants; the remaining fields must deserialize into the
/// variant's struct and pass its validation.
pub fn decode_message(raw: &str) -> Result<WsMessage, ProtocolError> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(mut fields) = value else {
        return Err(ProtocolError::Malformed("frame is not a json object"));
    };

    let tag = fields
        .remove(TYPE_FIELD)
        .ok_or(ProtocolError::MissingDiscriminant)?;
    let Some(raw_type) = tag.as_i64() else {
        return Err(ProtocolError::Malformed("_type is not an integer"));
    };
    let message_type = MessageType::from_discriminant(raw_type)
        .ok_or(ProtocolError::UnknownDiscriminant(raw_type))?;

    let body = Value::Object(fields);
    let message = match message_type {
        MessageType::LocationUpdate => {
            WsMessage::LocationUpdate(serde_json::from_value::<LocationUpdateMessage>(body)?)
        }
        MessageType::ParkingRequest => {
            WsMessage::ParkingRequest(serde_json::from_value::<ParkingRequestMessage>(body)?)
        }
        MessageType::ParkingAllocation => {
            WsMessage::ParkingAllocation(serde_json::from_value::<ParkingAllocationMessage>(body)?)
        }
        MessageType::ParkingAcceptance => {
            WsMessage::ParkingAcceptance(serde_json::from_value::<ParkingAcceptanceMessage>(body)?)
        }
        MessageType::ParkingRejection => {
            WsMessage::ParkingRejection(serde_json::from_value::<ParkingRejectionMessage>(body)?)
        }
        MessageType::ParkingDeallocation => WsMessage::ParkingDeallocation(
            serde_json::from_value::<ParkingDeallocationMessage>(body)?,
        ),
        MessageType::ParkingCancellation => WsMessage::ParkingCancellation(
            serde_json::from_value::<ParkingCancellationMessage>(body)?,
        ),
    };
    message.validate()?;
    Ok(message)
}

/// Encode a message into its JSON frame, injecting the `_type` discriminant.
pub fn encode_message(message: &WsMessage) -> Result<String, ProtocolError> {
    let value = match message {
        WsMessage::LocationUpdate(inner) => serde_json::to_value(inner)?,
        WsMessage::ParkingRequest(inner) => serde_json::to_value(inner)?,
        WsMessage::ParkingAllocation(inner) => serde_json::to_value(inner)?,
        WsMessage::ParkingAcceptance(inner) => serde_json::to_value(inner)?,
        WsMessage::ParkingRejection(inner) => serde_json::to_value(inner)?,
        WsMessage::ParkingDeallocation(inner) => serde_json::to_value(inner)?,
        WsMessage::ParkingCancellation(inner) => serde_json::to_value(inner)?,
    };
    let Value::Object(mut fields) = value else {
        return Err(ProtocolError::Malformed("message is not a json object"));
    };
    fields.insert(
        TYPE_FIELD.to_string(),
        Value::from(message.message_type().discriminant()),
    );
    serde_json::to_string(&Value::Object(fields)).map_err(ProtocolError::from)
}
