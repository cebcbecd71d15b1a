//! Shutdown controller: the single cancellation signal observed by the hub.

use tokio_util::sync::CancellationToken;

/// Cooperative stop signal shared by the hub and its handles.
///
/// `stop` only raises the signal; the hub closes connections in the background.
#[derive(Debug, Clone, Default)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the cancellation signal. Calling it more than once has no further effect.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("Hub shutdown requested");
        }
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once `stop` has been called.
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }
}
