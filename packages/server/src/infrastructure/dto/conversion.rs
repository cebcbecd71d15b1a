//! Conversion logic between DTOs and domain types.

use agora_shared::time::to_rfc3339_millis;

use crate::{
    domain::{
        ConversionError, Message, MessageBody, MessageKind, SignalPayload, StoredMessage,
        Username,
    },
    hub::RoomSnapshot,
    infrastructure::dto::{
        http::{HistoryEntryDto, RoomDto},
        websocket::{ClientFrame, WireMessage},
    },
};

// ========================================
// DTO → Domain
// ========================================

impl TryFrom<ClientFrame> for MessageBody {
    type Error = ConversionError;

    /// Participants may only originate chat and signaling messages.
    fn try_from(frame: ClientFrame) -> Result<Self, Self::Error> {
        let kind = frame.r#type.unwrap_or(MessageKind::Chat);
        match kind {
            MessageKind::Chat => Ok(MessageBody::Chat {
                content: frame.content,
            }),
            kind if kind.is_signal() => {
                let target = frame
                    .target_user
                    .filter(|target| !target.is_empty())
                    .ok_or(ConversionError::MissingTarget(kind))?;
                let target = Username::new(target)?;
                let raw = frame
                    .payload
                    .ok_or(ConversionError::MissingPayload(kind))?;
                let payload: SignalPayload = serde_json::from_value(raw)
                    .map_err(|source| ConversionError::InvalidPayload { kind, source })?;
                if payload.kind() != kind {
                    return Err(ConversionError::PayloadMismatch {
                        expected: kind,
                        actual: payload.kind(),
                    });
                }
                Ok(MessageBody::Signal { target, payload })
            }
            other => Err(ConversionError::UnsupportedKind(other)),
        }
    }
}

// ========================================
// Domain → DTO
// ========================================

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        let payload = match &message.body {
            MessageBody::Signal { payload, .. } => Some(payload.clone()),
            _ => None,
        };
        Self {
            r#type: message.kind(),
            id: message.id.to_string(),
            username: message.sender.clone(),
            content: message.content(),
            timestamp: message.timestamp,
            room_id: message.room.as_str().to_string(),
            target_user: message.body.target().map(|t| t.as_str().to_string()),
            payload,
        }
    }
}

impl From<RoomSnapshot> for RoomDto {
    fn from(snapshot: RoomSnapshot) -> Self {
        Self {
            id: snapshot.room.into_string(),
            participants: snapshot
                .members
                .into_iter()
                .map(Username::into_string)
                .collect(),
        }
    }
}

impl From<StoredMessage> for HistoryEntryDto {
    fn from(stored: StoredMessage) -> Self {
        Self {
            id: stored.id,
            username: stored.username,
            content: stored.content,
            created_at: to_rfc3339_millis(stored.created_at),
        }
    }
}
