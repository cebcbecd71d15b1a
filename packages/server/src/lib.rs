//! Agora relay server.
//!
//! Participants join a named room over WebSocket. Chat and presence messages
//! are multicast to the room; call-signaling messages (`webrtc_*`) are
//! unicast to a single named member. Every connection owns a bounded outbound
//! queue, and a member whose queue is full is evicted rather than allowed to
//! stall the room.

pub mod config;
pub mod domain;
pub mod hub;
pub mod infrastructure;
pub mod ui;
