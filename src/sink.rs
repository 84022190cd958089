use crate::error::SendError;
use async_trait::async_trait;
use std::sync::Arc;

/// Categorization metadata attached to every delivered batch.
///
/// The HTTP sender maps these onto the `X-Sumo-Name`, `X-Sumo-Category`
/// and `X-Sumo-Host` headers; empty values are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMetadata {
    pub name: String,
    pub category: String,
    pub host: String,
}

impl SourceMetadata {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            host: host.into(),
        }
    }
}

/// Asynchronous destination for assembled batch bodies.
///
/// Implementations transport one body per call to a concrete backend.
/// The flushing task is the only caller: it owns batching, retry and
/// backoff, so an implementation performs exactly one attempt and returns.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Whether the sender has enough configuration to attempt delivery.
    ///
    /// A sender that is not ready is not broken: batches offered while it
    /// reports `false` are dropped by the caller instead of retried.
    fn can_try_send(&self) -> bool;

    /// Perform one delivery attempt of `body`.
    ///
    /// **Parameters**
    /// - `body`: newline-terminated batch content, sent as-is.
    /// - `metadata`: source name, category and host for this batch.
    ///
    /// **Returns**
    /// - `Ok(())` if the backend accepted the batch.
    /// - `Err(..)` on timeout, transport error or a non-success response.
    ///   The caller decides whether to retry.
    ///
    /// Implementations must not keep `body` past the end of the call.
    async fn try_send(&self, body: &str, metadata: &SourceMetadata) -> Result<(), SendError>;
}

#[async_trait]
impl<S: MessageSender + ?Sized> MessageSender for Arc<S> {
    fn can_try_send(&self) -> bool {
        (**self).can_try_send()
    }

    async fn try_send(&self, body: &str, metadata: &SourceMetadata) -> Result<(), SendError> {
        (**self).try_send(body, metadata).await
    }
}
