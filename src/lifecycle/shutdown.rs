//! Shutdown coordination.
//!
//! One [`Shutdown`] per process. The accept loop, every HTTP connection and
//! every relay session hold a token derived from it; triggering it stops
//! accepts, starts graceful connection shutdown and closes open sessions.

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start shutting down. Repeated calls are no-ops.
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("Shutdown triggered");
        }
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The root token. Sessions derive child tokens from it.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Resolves once shutdown has been triggered.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_wakes_waiters_and_children() {
        let shutdown = Shutdown::new();
        let child = shutdown.token().child_token();

        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait().await })
        };

        shutdown.trigger();
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(child.is_cancelled());
        assert!(shutdown.is_triggered());
    }
}
