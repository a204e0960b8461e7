use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::handler::MessageHandler;

/// Publishes keyed payloads to a single topic.
///
/// All implementations must be safe for concurrent use.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Publishes synchronously, returning once the broker has acknowledged the
    /// record. Broker failures surface as errors; the transport never retries.
    async fn send(&self, key: &[u8], value: &[u8]) -> Result<()>;
}

/// Joins a consumer group and feeds delivered messages to a handler.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Consumes until `shutdown` is cancelled.
    ///
    /// Rebalances are absorbed by re-entering the join loop. Handler failures
    /// never end consumption. Returns `Ok` on cancellation and an error only
    /// when the group can no longer be consumed from.
    async fn consume(
        &self,
        handler: Arc<dyn MessageHandler>,
        shutdown: CancellationToken,
    ) -> Result<()>;
}
