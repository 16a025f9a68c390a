use anyhow::{Context, Result};
use async_nats::Client;
use tracing::{debug, info};

use super::messages::{CallEventKind, CallEventMessage};
use super::CallEventPublisher;
use crate::call::CallRecord;

pub struct NatsEventPublisher {
    client: Client,
}

impl NatsEventPublisher {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl CallEventPublisher for NatsEventPublisher {
    async fn publish(&self, kind: CallEventKind, record: &CallRecord) -> Result<()> {
        let message = CallEventMessage::from_record(kind, record);
        let subject = message.subject();
        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish call event")?;

        debug!(
            "Published {:?} event to {} (version={})",
            kind, subject, record.version
        );

        Ok(())
    }
}
