//! Domain errors.

use thiserror::Error;

use super::message::MessageKind;

/// Validation failures for value objects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{field} must be at most {max} characters (got {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },
}

/// Errors returned by the hub's intakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HubError {
    /// The hub has been stopped and services no further intake.
    #[error("hub is stopped")]
    Stopped,

    /// The message intake is full; the message was dropped.
    #[error("hub intake is saturated")]
    IntakeSaturated,
}

/// Errors from the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("message store unavailable: {0}")]
    Unavailable(String),

    #[error("message store timed out")]
    Timeout,
}

/// Errors raised while turning a participant frame into a message body.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("participants cannot send '{0}' messages")]
    UnsupportedKind(MessageKind),

    #[error("'{0}' requires a target_user")]
    MissingTarget(MessageKind),

    #[error("invalid target_user: {0}")]
    InvalidTarget(#[from] ValueObjectError),

    #[error("'{0}' requires a payload")]
    MissingPayload(MessageKind),

    #[error("'{expected}' frame carries a '{actual}' payload")]
    PayloadMismatch {
        expected: MessageKind,
        actual: MessageKind,
    },

    #[error("malformed '{kind}' payload: {source}")]
    InvalidPayload {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },
}
