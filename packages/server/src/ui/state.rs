//! Shared application state.

use std::sync::Arc;

use agora_shared::time::Clock;

use crate::{config::ConnectionConfig, domain::MessageStore, hub::HubHandle};

/// State handed to every handler.
pub struct AppState {
    /// Entry points into the connection hub
    pub hub: HubHandle,
    /// Chat history (best effort)
    pub store: Arc<dyn MessageStore>,
    pub clock: Arc<dyn Clock>,
    /// Per-connection limits and deadlines
    pub connection_config: ConnectionConfig,
}
