//! The message model: every payload the hub moves.
//!
//! `MessageBody` is a closed sum type. A signaling message always names a
//! target, and its sub-kind (offer/answer/candidate) is fixed by the payload
//! variant, so "offer with an ICE candidate payload" is unrepresentable.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_object::{ConnectionId, RoomId, Username};

/// Sender name used for hub-synthesized roster snapshots.
pub const SYSTEM_SENDER: &str = "system";

/// Wire-level discriminator of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Chat,
    UserJoined,
    UserLeft,
    UsersList,
    WebrtcOffer,
    WebrtcAnswer,
    WebrtcCandidate,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::UserJoined => "user_joined",
            Self::UserLeft => "user_left",
            Self::UsersList => "users_list",
            Self::WebrtcOffer => "webrtc_offer",
            Self::WebrtcAnswer => "webrtc_answer",
            Self::WebrtcCandidate => "webrtc_candidate",
        }
    }

    /// Signaling kinds are delivered by unicast.
    pub fn is_signal(self) -> bool {
        matches!(
            self,
            Self::WebrtcOffer | Self::WebrtcAnswer | Self::WebrtcCandidate
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

/// Session description as produced by `RTCPeerConnection.createOffer/createAnswer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    #[serde(default)]
    pub sdp: String,
}

/// ICE candidate as produced by `RTCIceCandidate.toJSON()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Call-setup payload. Serialized without a tag; the enclosing frame's `type`
/// carries the discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalPayload {
    Offer { offer: SessionDescription },
    Answer { answer: SessionDescription },
    Candidate { candidate: IceCandidate },
}

impl SignalPayload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Offer { .. } => MessageKind::WebrtcOffer,
            Self::Answer { .. } => MessageKind::WebrtcAnswer,
            Self::Candidate { .. } => MessageKind::WebrtcCandidate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Chat {
        content: String,
    },
    UserJoined,
    UserLeft,
    /// Member names of the room, ascending.
    Roster {
        members: Vec<Username>,
    },
    Signal {
        target: Username,
        payload: SignalPayload,
    },
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Chat { .. } => MessageKind::Chat,
            Self::UserJoined => MessageKind::UserJoined,
            Self::UserLeft => MessageKind::UserLeft,
            Self::Roster { .. } => MessageKind::UsersList,
            Self::Signal { payload, .. } => payload.kind(),
        }
    }

    /// Recipient of a unicast message; `None` means room multicast.
    pub fn target(&self) -> Option<&Username> {
        match self {
            Self::Signal { target, .. } => Some(target),
            _ => None,
        }
    }
}

/// A message moving through the hub. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    /// Connection that produced the message; `None` for hub announcements.
    pub origin: Option<ConnectionId>,
    pub sender: String,
    pub room: RoomId,
    pub timestamp: DateTime<Utc>,
    pub body: MessageBody,
}

impl Message {
    /// Stamp a participant-originated body with the connection's own identity.
    pub fn from_participant(
        origin: ConnectionId,
        sender: &Username,
        room: &RoomId,
        timestamp: DateTime<Utc>,
        body: MessageBody,
    ) -> Self {
        Self {
            origin: Some(origin),
            ..Self::announcement(sender.as_str(), room, timestamp, body)
        }
    }

    pub fn user_joined(username: &Username, room: &RoomId, timestamp: DateTime<Utc>) -> Self {
        Self::announcement(username.as_str(), room, timestamp, MessageBody::UserJoined)
    }

    pub fn user_left(username: &Username, room: &RoomId, timestamp: DateTime<Utc>) -> Self {
        Self::announcement(username.as_str(), room, timestamp, MessageBody::UserLeft)
    }

    pub fn roster(room: &RoomId, members: Vec<Username>, timestamp: DateTime<Utc>) -> Self {
        Self::announcement(SYSTEM_SENDER, room, timestamp, MessageBody::Roster { members })
    }

    fn announcement(sender: &str, room: &RoomId, timestamp: DateTime<Utc>, body: MessageBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin: None,
            sender: sender.to_string(),
            room: room.clone(),
            timestamp,
            body,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Human-readable content as carried in the wire `content` field.
    pub fn content(&self) -> String {
        match &self.body {
            MessageBody::Chat { content } => content.clone(),
            MessageBody::UserJoined => format!("{} joined the chat", self.sender),
            MessageBody::UserLeft => format!("{} left the chat", self.sender),
            MessageBody::Roster { members } => {
                let names: Vec<&str> = members.iter().map(Username::as_str).collect();
                serde_json::to_string(&names).unwrap_or_else(|_| "[]".to_string())
            }
            MessageBody::Signal { .. } => String::new(),
        }
    }
}
