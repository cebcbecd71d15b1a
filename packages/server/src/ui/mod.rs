//! WebSocket relay server implementation.

mod handler;
mod server;
pub mod session;
mod signal;
pub mod state;

pub use server::Server;
