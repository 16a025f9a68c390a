//! Call event publishing
//!
//! Polling is the synchronisation contract; events are an optional
//! notification channel for consumers that can subscribe.

mod messages;
mod nats;

pub use messages::{CallEventKind, CallEventMessage};
pub use nats::NatsEventPublisher;

use anyhow::Result;

use crate::call::CallRecord;

#[async_trait::async_trait]
pub trait CallEventPublisher: Send + Sync {
    async fn publish(&self, kind: CallEventKind, record: &CallRecord) -> Result<()>;
}

/// Publisher used when no event transport is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventPublisher;

#[async_trait::async_trait]
impl CallEventPublisher for NoopEventPublisher {
    async fn publish(&self, _kind: CallEventKind, _record: &CallRecord) -> Result<()> {
        Ok(())
    }
}
