//! One admitted participant, split into the hub-side and transport-side halves.
//!
//! `Connection::open` creates both halves around a bounded outbound queue:
//!
//! - [`Connection`] is handed to the hub. It owns the only `Sender` of the
//!   queue. The hub closes it on removal, eviction or shutdown, which closes
//!   the queue and cancels the `closer`.
//! - [`Session`] stays with the transport. Its loops drain the queue and watch
//!   the `closer` token, so a closed connection always ends its transport.

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::domain::{ConnectionId, Message, RoomId, Username};

/// Immutable identity of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub username: Username,
    pub room: RoomId,
}

/// Hub-side half of a connection.
#[derive(Debug)]
pub struct Connection {
    info: ConnectionInfo,
    outbound: mpsc::Sender<Message>,
    closer: CancellationToken,
}

/// Transport-side half of a connection.
#[derive(Debug)]
pub struct Session {
    pub info: ConnectionInfo,
    pub outbound: mpsc::Receiver<Message>,
    pub closer: CancellationToken,
}

impl Connection {
    /// Create a connection whose outbound queue holds at most `capacity` messages.
    pub fn open(username: Username, room: RoomId, capacity: usize) -> (Connection, Session) {
        let info = ConnectionInfo {
            id: ConnectionId::generate(),
            username,
            room,
        };
        let (tx, rx) = mpsc::channel(capacity);
        let closer = CancellationToken::new();

        let connection = Connection {
            info: info.clone(),
            outbound: tx,
            closer: closer.clone(),
        };
        let session = Session {
            info,
            outbound: rx,
            closer,
        };
        (connection, session)
    }

    pub fn id(&self) -> ConnectionId {
        self.info.id
    }

    pub fn username(&self) -> &Username {
        &self.info.username
    }

    pub fn room(&self) -> &RoomId {
        &self.info.room
    }

    /// Non-blocking enqueue onto the outbound queue.
    pub(crate) fn try_deliver(&self, message: Message) -> Result<(), TrySendError<Message>> {
        self.outbound.try_send(message)
    }

    /// Close the outbound queue and force the transport shut.
    pub(crate) fn close(self) {
        self.closer.cancel();
    }
}
