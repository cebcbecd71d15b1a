//! Membership index: room → connections registered there.
//!
//! Owned exclusively by the hub's processing loop, so it carries no locks.
//! Rooms are created on first admission and never pruned; an emptied room
//! just keeps an empty member list.

use std::collections::HashMap;

use crate::domain::{ConnectionId, RoomId, Username};

use super::connection::Connection;

#[derive(Debug, Default)]
pub struct RoomDirectory {
    /// Members per room, in admission order.
    rooms: HashMap<RoomId, Vec<Connection>>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection in its declared room, creating the room if needed.
    pub fn insert(&mut self, connection: Connection) {
        self.rooms
            .entry(connection.room().clone())
            .or_insert_with_key(|room| {
                tracing::info!("Room '{}' created", room);
                Vec::new()
            })
            .push(connection);
    }

    /// Remove a connection. Returns `None` when it is not a member (already
    /// removed, or never admitted).
    pub fn remove(&mut self, room: &RoomId, id: ConnectionId) -> Option<Connection> {
        let members = self.rooms.get_mut(room)?;
        let position = members.iter().position(|c| c.id() == id)?;
        Some(members.remove(position))
    }

    pub fn contains(&self, room: &RoomId, id: ConnectionId) -> bool {
        self.members(room).iter().any(|c| c.id() == id)
    }

    pub fn contains_room(&self, room: &RoomId) -> bool {
        self.rooms.contains_key(room)
    }

    /// Current members of a room; empty for unknown rooms.
    pub fn members(&self, room: &RoomId) -> &[Connection] {
        self.rooms.get(room).map(Vec::as_slice).unwrap_or_default()
    }

    /// Earliest-admitted member of `room` whose username is `username`.
    pub fn find(&self, room: &RoomId, username: &Username) -> Option<&Connection> {
        self.members(room).iter().find(|c| c.username() == username)
    }

    /// Member names of a room, sorted ascending.
    pub fn roster(&self, room: &RoomId) -> Vec<Username> {
        let mut names: Vec<Username> = self
            .members(room)
            .iter()
            .map(|c| c.username().clone())
            .collect();
        names.sort();
        names
    }

    /// Every known room with its roster, sorted by room name.
    pub fn snapshot(&self) -> Vec<(RoomId, Vec<Username>)> {
        let mut rooms: Vec<(RoomId, Vec<Username>)> = self
            .rooms
            .keys()
            .map(|room| (room.clone(), self.roster(room)))
            .collect();
        rooms.sort_by(|a, b| a.0.cmp(&b.0));
        rooms
    }

    /// Take every connection out of the directory. Rooms remain known.
    pub fn drain(&mut self) -> Vec<Connection> {
        self.rooms
            .values_mut()
            .flat_map(|members| members.drain(..))
            .collect()
    }
}
