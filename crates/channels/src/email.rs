//! Outbound email provider with delivery analytics.
//!
//! Builds the provider API payload and tracks per-template send counts.
//! In production: POST to the email provider's send endpoint.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info};

use cadence_core::error::{CadenceError, CadenceResult};
use cadence_core::types::Channel;

use crate::invoker::{ChannelInvoker, InvokeReceipt};

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub from_email: String,
    pub from_name: String,
}

/// Per-template send analytics.
#[derive(Debug, Clone, Default)]
pub struct EmailAnalytics {
    pub total_sent: u64,
}

/// Email activation provider.
pub struct EmailProvider {
    config: EmailConfig,
    /// Send analytics keyed by template id.
    analytics: DashMap<String, EmailAnalytics>,
}

impl EmailProvider {
    pub fn new(config: EmailConfig) -> Self {
        info!(from = %config.from_email, "Email provider initialized");
        Self {
            config,
            analytics: DashMap::new(),
        }
    }

    pub fn sent_count(&self, template_id: &str) -> u64 {
        self.analytics
            .get(template_id)
            .map(|a| a.total_sent)
            .unwrap_or(0)
    }
}

#[async_trait]
impl ChannelInvoker for EmailProvider {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn invoke(
        &self,
        action_id: &str,
        payload: &serde_json::Value,
    ) -> CadenceResult<InvokeReceipt> {
        let start = std::time::Instant::now();

        let lead_id = payload
            .get("lead_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                CadenceError::PermanentChannel("email payload missing lead_id".into())
            })?;

        debug!(
            template_id = %action_id,
            lead_id = %lead_id,
            "Sending email"
        );

        metrics::counter!("email.sent", "template" => action_id.to_string()).increment(1);

        // Build the provider API payload (stub — in production, HTTP POST)
        let _api_payload = serde_json::json!({
            "from": {
                "email": self.config.from_email,
                "name": self.config.from_name,
            },
            "template_id": action_id,
            "custom_args": {
                "lead_id": lead_id,
            },
        });

        self.analytics
            .entry(action_id.to_string())
            .or_default()
            .total_sent += 1;

        Ok(InvokeReceipt {
            action_id: action_id.to_string(),
            channel: Channel::Email,
            provider_message_id: Some(format!("em-{}", uuid::Uuid::new_v4())),
            latency_ms: start.elapsed().as_millis() as u64,
            accepted_at: Utc::now(),
        })
    }
}
