//! Hub processing loop.

use std::sync::Arc;

use agora_shared::time::Clock;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};

use crate::{
    config::HubConfig,
    domain::{ConnectionId, Message, RoomId, Username},
};

use super::{
    connection::{Connection, ConnectionInfo},
    handle::{HubHandle, Query, RoomSnapshot},
    room_directory::RoomDirectory,
    shutdown::ShutdownController,
};

/// Single-writer owner of the room directory.
///
/// Admissions, removals, messages and queries arrive on separate intakes and
/// are serviced one at a time by [`Hub::run`]. The directory is never shared,
/// so no lock guards it.
pub struct Hub {
    directory: RoomDirectory,
    admissions: mpsc::Receiver<Connection>,
    removals: mpsc::Receiver<ConnectionInfo>,
    messages: mpsc::Receiver<Message>,
    queries: mpsc::Receiver<Query>,
    /// Feeds synthesized join/leave/roster messages back into `messages`.
    announcer: mpsc::Sender<Message>,
    shutdown: ShutdownController,
    clock: Arc<dyn Clock>,
}

impl Hub {
    /// Build a hub and its handle without starting the loop.
    pub fn new(config: HubConfig, clock: Arc<dyn Clock>) -> (Hub, HubHandle) {
        let (admissions_tx, admissions) = mpsc::channel(config.intake_capacity);
        let (removals_tx, removals) = mpsc::channel(config.intake_capacity);
        let (messages_tx, messages) = mpsc::channel(config.intake_capacity);
        let (queries_tx, queries) = mpsc::channel(config.intake_capacity);
        let shutdown = ShutdownController::new();

        let hub = Hub {
            directory: RoomDirectory::new(),
            admissions,
            removals,
            messages,
            queries,
            announcer: messages_tx.clone(),
            shutdown: shutdown.clone(),
            clock,
        };
        let handle = HubHandle {
            admissions: admissions_tx,
            removals: removals_tx,
            messages: messages_tx,
            queries: queries_tx,
            shutdown,
        };
        (hub, handle)
    }

    /// Build a hub and run its loop on the tokio runtime.
    pub fn spawn(config: HubConfig, clock: Arc<dyn Clock>) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new(config, clock);
        (handle, tokio::spawn(hub.run()))
    }

    /// Service the intakes until the shutdown signal is raised or every handle
    /// is dropped, then close every live connection.
    pub async fn run(mut self) {
        tracing::info!("Hub started");
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.stopped() => break,
                admission = self.admissions.recv() => match admission {
                    Some(connection) => self.admit(connection),
                    None => {
                        tracing::info!("All hub handles dropped");
                        break;
                    }
                },
                Some(info) = self.removals.recv() => self.remove(&info.room, info.id),
                Some(message) = self.messages.recv() => self.deliver(message),
                Some(query) = self.queries.recv() => self.answer(query),
            }
        }

        self.close_all();
    }

    fn admit(&mut self, connection: Connection) {
        let username = connection.username().clone();
        let room = connection.room().clone();
        let id = connection.id();
        self.directory.insert(connection);

        let roster = self.directory.roster(&room);
        tracing::info!(
            "'{}' ({}) joined room '{}' ({} members)",
            username,
            id,
            room,
            roster.len()
        );

        let now = self.clock.now();
        self.announce(vec![
            Message::user_joined(&username, &room, now),
            Message::roster(&room, roster, now),
        ]);
    }

    fn remove(&mut self, room: &RoomId, id: ConnectionId) {
        let Some(connection) = self.directory.remove(room, id) else {
            tracing::debug!("Connection {} is not a member of '{}'; nothing to remove", id, room);
            return;
        };
        let username = connection.username().clone();
        connection.close();

        let roster = self.directory.roster(room);
        tracing::info!(
            "'{}' ({}) left room '{}' ({} members)",
            username,
            id,
            room,
            roster.len()
        );

        let now = self.clock.now();
        self.announce(vec![
            Message::user_left(&username, room, now),
            Message::roster(room, roster, now),
        ]);
    }

    /// Remove a member whose queue could not take a message.
    fn evict(&mut self, room: &RoomId, id: ConnectionId, error: &TrySendError<Message>) {
        let reason = match error {
            TrySendError::Full(_) => "outbound queue full",
            TrySendError::Closed(_) => "outbound queue closed",
        };
        tracing::warn!("Evicting connection {} from room '{}': {}", id, room, reason);
        self.remove(room, id);
    }

    fn deliver(&mut self, message: Message) {
        if !self.directory.contains_room(&message.room) {
            tracing::warn!(
                "Dropping '{}' from '{}': room '{}' does not exist",
                message.kind(),
                message.sender,
                message.room
            );
            return;
        }
        if let Some(origin) = message.origin
            && !self.directory.contains(&message.room, origin)
        {
            tracing::debug!(
                "Dropping '{}' from '{}': connection {} is no longer in '{}'",
                message.kind(),
                message.sender,
                origin,
                message.room
            );
            return;
        }
        match message.body.target().cloned() {
            Some(target) => self.unicast(target, message),
            None => self.multicast(message),
        }
    }

    fn unicast(&mut self, target: Username, message: Message) {
        let room = message.room.clone();
        let Some(connection) = self.directory.find(&room, &target) else {
            tracing::debug!(
                "Dropping '{}' from '{}': '{}' is not in room '{}'",
                message.kind(),
                message.sender,
                target,
                room
            );
            return;
        };

        let id = connection.id();
        let kind = message.kind();
        match connection.try_deliver(message) {
            Ok(()) => tracing::debug!("Delivered '{}' to '{}' in '{}'", kind, target, room),
            Err(e) => self.evict(&room, id, &e),
        }
    }

    /// Deliver to every member; slow members are evicted, the rest still receive it.
    fn multicast(&mut self, message: Message) {
        let room = message.room.clone();
        let mut delivered = 0;
        let mut failed = Vec::new();

        for connection in self.directory.members(&room) {
            match connection.try_deliver(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => failed.push((connection.id(), e)),
            }
        }
        tracing::debug!(
            "Multicast '{}' from '{}' to {} members of '{}'",
            message.kind(),
            message.sender,
            delivered,
            room
        );

        for (id, error) in failed {
            self.evict(&room, id, &error);
        }
    }

    fn answer(&self, query: Query) {
        match query {
            Query::Roster { room, reply } => {
                let roster = self
                    .directory
                    .contains_room(&room)
                    .then(|| self.directory.roster(&room));
                let _ = reply.send(roster);
            }
            Query::Rooms { reply } => {
                let rooms = self
                    .directory
                    .snapshot()
                    .into_iter()
                    .map(|(room, members)| RoomSnapshot { room, members })
                    .collect();
                let _ = reply.send(rooms);
            }
        }
    }

    /// Submit synthesized messages from a detached task so that admission and
    /// removal never wait on delivery. They may interleave with messages that
    /// reach the intake concurrently.
    fn announce(&self, messages: Vec<Message>) {
        let intake = self.announcer.clone();
        tokio::spawn(async move {
            for message in messages {
                if intake.send(message).await.is_err() {
                    tracing::debug!("Hub stopped before an announcement was queued");
                    break;
                }
            }
        });
    }

    /// Close every live connection exactly once and discard pending intake.
    fn close_all(&mut self) {
        self.admissions.close();
        self.removals.close();
        self.messages.close();
        self.queries.close();

        let connections = self.directory.drain();
        let count = connections.len();
        for connection in connections {
            connection.close();
        }

        // admissions queued between the stop signal and the intakes closing
        while let Ok(connection) = self.admissions.try_recv() {
            connection.close();
        }

        tracing::info!("Hub stopped, closed {} connections", count);
    }
}
