//! Webhook provider — delivers funnel-stage actions to operator-supplied
//! HTTP endpoints (notifications, CRM updates, inbound auto-response).

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info};

use cadence_core::error::{CadenceError, CadenceResult};
use cadence_core::types::Channel;

use crate::invoker::{ChannelInvoker, InvokeReceipt};

/// Delivers JSON payloads to registered endpoints, keyed by action id.
pub struct WebhookProvider {
    endpoints: DashMap<String, String>,
    deliveries: DashMap<String, u64>,
}

impl WebhookProvider {
    pub fn new() -> Self {
        info!("Webhook provider initialized");
        Self {
            endpoints: DashMap::new(),
            deliveries: DashMap::new(),
        }
    }

    pub fn register(&self, action_id: impl Into<String>, url: impl Into<String>) {
        self.endpoints.insert(action_id.into(), url.into());
    }

    pub fn delivery_count(&self, action_id: &str) -> u64 {
        self.deliveries.get(action_id).map(|c| *c).unwrap_or(0)
    }
}

impl Default for WebhookProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelInvoker for WebhookProvider {
    fn channel(&self) -> Channel {
        Channel::Webhook
    }

    async fn invoke(
        &self,
        action_id: &str,
        payload: &serde_json::Value,
    ) -> CadenceResult<InvokeReceipt> {
        let start = std::time::Instant::now();

        let url = self
            .endpoints
            .get(action_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| {
                CadenceError::PermanentChannel(format!(
                    "no endpoint registered for action {}",
                    action_id
                ))
            })?;

        debug!(action_id = %action_id, url = %url, payload = %payload, "Delivering webhook");
        metrics::counter!("webhook.deliveries").increment(1);

        *self.deliveries.entry(action_id.to_string()).or_insert(0) += 1;

        Ok(InvokeReceipt {
            action_id: action_id.to_string(),
            channel: Channel::Webhook,
            provider_message_id: Some(format!("wh-{}", uuid::Uuid::new_v4())),
            latency_ms: start.elapsed().as_millis() as u64,
            accepted_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivery_requires_registered_endpoint() {
        let provider = WebhookProvider::new();
        let payload = serde_json::json!({"lead_id": "lead-1"});

        let err = provider.invoke("notify-sales", &payload).await.unwrap_err();
        assert!(matches!(err, CadenceError::PermanentChannel(_)));

        provider.register("notify-sales", "https://crm.example.com/hooks/sales");
        provider.invoke("notify-sales", &payload).await.unwrap();
        assert_eq!(provider.delivery_count("notify-sales"), 1);
    }
}
