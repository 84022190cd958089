use crate::error::SendError;
use crate::sink::{MessageSender, SourceMetadata};
use async_trait::async_trait;

/// A sender that reports ready and discards every batch.
///
/// Useful for measuring the overhead of the layer and the flushing task
/// without any external I/O, and for tests that don't care about delivery.
#[derive(Clone, Default)]
pub struct NoopSender;

#[async_trait]
impl MessageSender for NoopSender {
    fn can_try_send(&self) -> bool {
        true
    }

    async fn try_send(&self, _body: &str, _metadata: &SourceMetadata) -> Result<(), SendError> {
        Ok(())
    }
}
