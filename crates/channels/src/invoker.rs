use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cadence_core::error::CadenceResult;
use cadence_core::types::Channel;

/// Acknowledgement returned by a provider for an accepted action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeReceipt {
    pub action_id: String,
    pub channel: Channel,
    pub provider_message_id: Option<String>,
    pub latency_ms: u64,
    pub accepted_at: DateTime<Utc>,
}

/// Action-invocation interface for a single external channel.
///
/// Failures are classified through the error taxonomy: providers return
/// `TransientChannel` for retryable conditions (network, timeout, rate
/// limit) and `PermanentChannel` for conditions no retry can fix
/// (invalid payload, unauthorized).
#[async_trait]
pub trait ChannelInvoker: Send + Sync {
    fn channel(&self) -> Channel;

    async fn invoke(&self, action_id: &str, payload: &serde_json::Value)
        -> CadenceResult<InvokeReceipt>;
}
