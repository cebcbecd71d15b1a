//! The connection hub: the single authority over rooms and delivery.
//!
//! ```text
//! transport ──admit──▶ ┌──────────────┐ ──try_send──▶ Connection queues
//!           ──remove─▶ │  Hub (actor) │
//!           ──submit─▶ │ RoomDirectory│
//!           ──query──▶ └──────────────┘
//! ```
//!
//! All state lives in [`Hub`] and is touched only by its processing loop;
//! everything else talks to it through a [`HubHandle`].

pub mod connection;
#[allow(clippy::module_inception)]
pub mod hub;
pub mod room_directory;
pub mod shutdown;

mod handle;

pub use connection::{Connection, ConnectionInfo, Session};
pub use handle::{HubHandle, RoomSnapshot};
pub use hub::Hub;
pub use room_directory::RoomDirectory;
pub use shutdown::ShutdownController;
