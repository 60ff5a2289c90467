//! Analytics provider — forwards tracking events to the events API.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use cadence_core::error::CadenceResult;
use cadence_core::types::Channel;

use crate::invoker::{ChannelInvoker, InvokeReceipt};

/// Fire-and-forget tracking event provider.
#[derive(Default)]
pub struct AnalyticsProvider {
    forwarded: AtomicU64,
}

impl AnalyticsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forwarded_count(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChannelInvoker for AnalyticsProvider {
    fn channel(&self) -> Channel {
        Channel::Analytics
    }

    async fn invoke(
        &self,
        action_id: &str,
        payload: &serde_json::Value,
    ) -> CadenceResult<InvokeReceipt> {
        let start = std::time::Instant::now();

        debug!(event = %action_id, payload = %payload, "Forwarding analytics event");
        metrics::counter!("analytics.events_forwarded").increment(1);
        self.forwarded.fetch_add(1, Ordering::Relaxed);

        Ok(InvokeReceipt {
            action_id: action_id.to_string(),
            channel: Channel::Analytics,
            provider_message_id: None,
            latency_ms: start.elapsed().as_millis() as u64,
            accepted_at: Utc::now(),
        })
    }
}
