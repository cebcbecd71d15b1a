//! Domain layer: value objects, the message model and collaborator traits.
//!
//! Nothing in here knows about WebSocket frames or JSON; the transport maps
//! into these types at the edge (`infrastructure::dto`).

pub mod error;
pub mod message;
pub mod store;
pub mod value_object;

pub use error::{ConversionError, HubError, StoreError, ValueObjectError};
pub use message::{
    IceCandidate, Message, MessageBody, MessageKind, SdpType, SessionDescription, SignalPayload,
    SYSTEM_SENDER,
};
pub use store::{MessageStore, StoredMessage};
pub use value_object::{ConnectionId, RoomId, Username};
