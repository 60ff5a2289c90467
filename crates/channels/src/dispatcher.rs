//! Channel dispatcher — routes an action to the provider registered for
//! its channel and emits `ActionInvoked` events.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use cadence_core::error::{CadenceError, CadenceResult};
use cadence_core::event_bus::{make_event, EventSink};
use cadence_core::types::{Channel, EventType};

use crate::invoker::{ChannelInvoker, InvokeReceipt};

/// Dispatches actions to the appropriate channel provider.
pub struct ChannelDispatcher {
    providers: HashMap<Channel, Arc<dyn ChannelInvoker>>,
    enabled_channels: Vec<Channel>,
    event_sink: Arc<dyn EventSink>,
}

impl ChannelDispatcher {
    pub fn new(enabled_channels: Vec<Channel>) -> Self {
        info!(channels = ?enabled_channels, "Channel dispatcher initialized");
        Self {
            providers: HashMap::new(),
            enabled_channels,
            event_sink: cadence_core::event_bus::noop_sink(),
        }
    }

    /// Attach an event sink for emitting orchestration events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Register a provider under the channel it reports.
    pub fn with_provider(mut self, provider: Arc<dyn ChannelInvoker>) -> Self {
        self.providers.insert(provider.channel(), provider);
        self
    }

    pub fn is_enabled(&self, channel: Channel) -> bool {
        self.enabled_channels.contains(&channel)
    }

    /// Dispatch an action to the target channel's provider.
    ///
    /// A disabled or unregistered channel is a permanent failure: retrying
    /// cannot fix a configuration gap.
    pub async fn dispatch(
        &self,
        channel: Channel,
        action_id: &str,
        payload: &serde_json::Value,
    ) -> CadenceResult<InvokeReceipt> {
        if !self.is_enabled(channel) {
            return Err(CadenceError::PermanentChannel(format!(
                "channel {} not enabled",
                channel.display_name()
            )));
        }

        let provider = self.providers.get(&channel).ok_or_else(|| {
            CadenceError::PermanentChannel(format!(
                "no provider registered for channel {}",
                channel.display_name()
            ))
        })?;

        let start = std::time::Instant::now();

        metrics::counter!("dispatch.invocations", "channel" => channel.display_name())
            .increment(1);

        let result = provider.invoke(action_id, payload).await;

        let latency_ms = start.elapsed().as_millis() as u64;
        metrics::histogram!("dispatch.latency_ms", "channel" => channel.display_name())
            .record(latency_ms as f64);

        match &result {
            Ok(receipt) => {
                debug!(
                    action_id = %action_id,
                    channel = %channel.display_name(),
                    provider_message_id = ?receipt.provider_message_id,
                    "Action accepted by provider"
                );
                let lead_id = payload
                    .get("lead_id")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                self.event_sink.emit(make_event(
                    EventType::ActionInvoked,
                    None,
                    lead_id,
                    Some(action_id.to_string()),
                ));
            }
            Err(e) => {
                metrics::counter!("dispatch.failures", "channel" => channel.display_name())
                    .increment(1);
                debug!(
                    action_id = %action_id,
                    channel = %channel.display_name(),
                    error = %e,
                    "Provider rejected action"
                );
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::{EmailConfig, EmailProvider};
    use cadence_core::event_bus::capture_sink;

    fn dispatcher() -> (ChannelDispatcher, Arc<cadence_core::event_bus::CaptureSink>) {
        let sink = capture_sink();
        let dispatcher = ChannelDispatcher::new(vec![Channel::Email])
            .with_event_sink(sink.clone())
            .with_provider(Arc::new(EmailProvider::new(EmailConfig {
                from_email: "outreach@example.com".into(),
                from_name: "Example".into(),
            })));
        (dispatcher, sink)
    }

    #[tokio::test]
    async fn test_dispatch_emits_action_invoked() {
        let (dispatcher, sink) = dispatcher();
        let payload = serde_json::json!({"lead_id": "lead-1"});

        dispatcher
            .dispatch(Channel::Email, "welcome_email", &payload)
            .await
            .unwrap();

        assert_eq!(sink.count_type(EventType::ActionInvoked), 1);
    }

    #[tokio::test]
    async fn test_disabled_channel_is_permanent() {
        let (dispatcher, _sink) = dispatcher();
        let payload = serde_json::json!({"lead_id": "lead-1"});

        let err = dispatcher
            .dispatch(Channel::Social, "launch_post", &payload)
            .await
            .unwrap_err();
        assert!(matches!(err, CadenceError::PermanentChannel(_)));
    }
}
