//! Social posting provider — publishes updates to connected networks.
//!
//! In production: POST to the network APIs (X, LinkedIn); both are rate
//! limited, so rejections surface as transient errors for backoff.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use cadence_core::error::{CadenceError, CadenceResult};
use cadence_core::types::Channel;

use crate::invoker::{ChannelInvoker, InvokeReceipt};

/// Social posting provider with a per-network post ledger.
pub struct SocialProvider {
    networks: Vec<String>,
    posts: DashMap<String, u64>,
}

impl SocialProvider {
    pub fn new(networks: Vec<String>) -> Self {
        info!(networks = ?networks, "Social provider initialized");
        Self {
            networks,
            posts: DashMap::new(),
        }
    }

    pub fn post_count(&self, network: &str) -> u64 {
        self.posts.get(network).map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl ChannelInvoker for SocialProvider {
    fn channel(&self) -> Channel {
        Channel::Social
    }

    async fn invoke(
        &self,
        action_id: &str,
        payload: &serde_json::Value,
    ) -> CadenceResult<InvokeReceipt> {
        let start = std::time::Instant::now();

        let network = payload
            .get("network")
            .and_then(|v| v.as_str())
            .unwrap_or("x");

        if !self.networks.iter().any(|n| n == network) {
            warn!(network = %network, "Post requested for unconnected network");
            return Err(CadenceError::PermanentChannel(format!(
                "network {} not connected",
                network
            )));
        }

        debug!(template_id = %action_id, network = %network, "Publishing social post");

        metrics::counter!("social.posts", "network" => network.to_string()).increment(1);

        *self.posts.entry(network.to_string()).or_insert(0) += 1;

        Ok(InvokeReceipt {
            action_id: action_id.to_string(),
            channel: Channel::Social,
            provider_message_id: Some(format!("so-{}", uuid::Uuid::new_v4())),
            latency_ms: start.elapsed().as_millis() as u64,
            accepted_at: Utc::now(),
        })
    }
}
