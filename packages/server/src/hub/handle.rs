//! Cloneable front door to the hub's intakes.

use tokio::sync::{
    mpsc::{
        self,
        error::{SendError, TrySendError},
    },
    oneshot,
};

use crate::domain::{HubError, Message, RoomId, Username};

use super::{
    connection::{Connection, ConnectionInfo},
    shutdown::ShutdownController,
};

/// Members of one room at the moment the hub answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub room: RoomId,
    pub members: Vec<Username>,
}

pub(crate) enum Query {
    Roster {
        room: RoomId,
        reply: oneshot::Sender<Option<Vec<Username>>>,
    },
    Rooms {
        reply: oneshot::Sender<Vec<RoomSnapshot>>,
    },
}

/// Handle to a running [`Hub`](super::Hub).
///
/// Every request is queued on one of the hub's intakes and processed in order
/// by its single loop. None of the methods wait for delivery side effects.
#[derive(Debug, Clone)]
pub struct HubHandle {
    pub(crate) admissions: mpsc::Sender<Connection>,
    pub(crate) removals: mpsc::Sender<ConnectionInfo>,
    pub(crate) messages: mpsc::Sender<Message>,
    pub(crate) queries: mpsc::Sender<Query>,
    pub(crate) shutdown: ShutdownController,
}

impl HubHandle {
    /// Hand a freshly upgraded connection to the hub.
    ///
    /// The join announcement and roster broadcast happen later, on the hub's
    /// side. If the hub has stopped, the connection is closed and
    /// `HubError::Stopped` is returned.
    pub async fn admit(&self, connection: Connection) -> Result<(), HubError> {
        if self.shutdown.is_stopped() {
            connection.close();
            return Err(HubError::Stopped);
        }
        self.admissions
            .send(connection)
            .await
            .map_err(|SendError(connection)| {
                connection.close();
                HubError::Stopped
            })
    }

    /// Ask the hub to remove a connection. Removing a non-member is a no-op.
    pub async fn remove(&self, info: &ConnectionInfo) -> Result<(), HubError> {
        self.removals
            .send(info.clone())
            .await
            .map_err(|_| HubError::Stopped)
    }

    /// Queue a message for classification and delivery without waiting.
    ///
    /// A saturated intake drops the message and reports
    /// `HubError::IntakeSaturated`; there is no retry.
    pub fn submit(&self, message: Message) -> Result<(), HubError> {
        if self.shutdown.is_stopped() {
            return Err(HubError::Stopped);
        }
        self.messages.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => HubError::IntakeSaturated,
            TrySendError::Closed(_) => HubError::Stopped,
        })
    }

    /// Current members of `room`, sorted by name; `None` for a room that was
    /// never created.
    pub async fn roster(&self, room: &RoomId) -> Result<Option<Vec<Username>>, HubError> {
        let (reply, response) = oneshot::channel();
        self.query(Query::Roster {
            room: room.clone(),
            reply,
        })
        .await?;
        response.await.map_err(|_| HubError::Stopped)
    }

    /// Every known room with its members, sorted by room name.
    pub async fn rooms(&self) -> Result<Vec<RoomSnapshot>, HubError> {
        let (reply, response) = oneshot::channel();
        self.query(Query::Rooms { reply }).await?;
        response.await.map_err(|_| HubError::Stopped)
    }

    /// Raise the hub's cancellation signal. Idempotent.
    pub fn stop(&self) {
        self.shutdown.stop();
    }

    async fn query(&self, query: Query) -> Result<(), HubError> {
        self.queries
            .send(query)
            .await
            .map_err(|_| HubError::Stopped)
    }
}
