use anyhow::{Context, Result};

use crate::call::{CallId, CallRecord, GroupId};
use crate::service::CallService;

/// Read-only access to the authoritative call record
#[async_trait::async_trait]
pub trait CallSource: Send + Sync {
    /// Fetch one call through the group poll. `Ok(None)` means the poll
    /// succeeded but the call is no longer listed.
    async fn fetch(&self, group_id: &GroupId, call_id: &CallId) -> Result<Option<CallRecord>>;
}

/// Polls an in-process service (embedded clients and tests)
#[async_trait::async_trait]
impl CallSource for CallService {
    async fn fetch(&self, group_id: &GroupId, call_id: &CallId) -> Result<Option<CallRecord>> {
        let calls = self.poll_group(group_id).await?;
        Ok(calls.into_iter().find(|c| &c.call_id == call_id))
    }
}

/// Polls the HTTP API's group endpoint and filters by call locally
#[derive(Debug, Clone)]
pub struct HttpCallSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCallSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl CallSource for HttpCallSource {
    async fn fetch(&self, group_id: &GroupId, call_id: &CallId) -> Result<Option<CallRecord>> {
        let url = format!("{}/groups/{}/calls", self.base_url, group_id);
        let calls: Vec<CallRecord> = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to poll {}", url))?
            .error_for_status()
            .with_context(|| format!("Poll rejected by {}", url))?
            .json()
            .await
            .context("Failed to decode call list")?;

        Ok(calls.into_iter().find(|c| &c.call_id == call_id))
    }
}
