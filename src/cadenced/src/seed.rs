//! Demo data for development: one outbound email sequence, one signup
//! funnel, and a couple of leads moving through both.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use cadence_channels::webhook::WebhookProvider;
use cadence_core::types::{
    CampaignDefinition, CampaignStep, Channel, FunnelDefinition, FunnelEvent, Stage, StageAction,
};
use cadence_funnel::{EventIngest, FunnelEngine};
use cadence_scheduler::Scheduler;
use cadence_store::{MemoryStore, RunStore};

pub async fn seed_demo(
    store: &Arc<MemoryStore>,
    scheduler: &Arc<Scheduler>,
    funnel_engine: &Arc<FunnelEngine>,
    ingest: &Arc<EventIngest>,
    webhook: &Arc<WebhookProvider>,
) -> anyhow::Result<()> {
    info!("Seeding demo data");

    // ---- Outbound email sequence ----
    let sequence = CampaignDefinition::new(
        "Cold Outbound",
        vec![
            CampaignStep {
                delay_days: 0,
                template_id: "intro_email".into(),
                channel: Channel::Email,
            },
            CampaignStep {
                delay_days: 3,
                template_id: "case_study_email".into(),
                channel: Channel::Email,
            },
            CampaignStep {
                delay_days: 7,
                template_id: "social_touch".into(),
                channel: Channel::Social,
            },
            CampaignStep {
                delay_days: 14,
                template_id: "breakup_email".into(),
                channel: Channel::Email,
            },
        ],
    );
    let sequence_id = sequence.id;
    store.insert_definition(sequence)?;

    // ---- Signup funnel ----
    webhook.register("notify-sales", "https://crm.example.com/hooks/sales");
    let funnel = FunnelDefinition::new(
        "Signup Funnel",
        vec![
            Stage {
                name: "interest".into(),
                triggers: ["pricing-page-visit".to_string()].into_iter().collect(),
                actions: vec![StageAction {
                    action_id: "nurture_intro".into(),
                    channel: Channel::Email,
                    payload: serde_json::json!({}),
                }],
            },
            Stage {
                name: "trial".into(),
                triggers: ["trial-start".to_string()].into_iter().collect(),
                actions: vec![StageAction {
                    action_id: "notify-sales".into(),
                    channel: Channel::Webhook,
                    payload: serde_json::json!({"reason": "trial started"}),
                }],
            },
            Stage {
                name: "conversion".into(),
                triggers: ["plan-purchased".to_string()].into_iter().collect(),
                actions: vec![StageAction {
                    action_id: "conversion_tracked".into(),
                    channel: Channel::Analytics,
                    payload: serde_json::json!({"event": "conversion"}),
                }],
            },
        ],
    );
    let funnel_id = funnel_engine.register_funnel(funnel)?;

    // ---- Leads ----
    let now = Utc::now();
    for lead_id in ["lead-ada", "lead-grace"] {
        store.register_lead(lead_id);
        funnel_engine.assign_lead(lead_id, funnel_id);
        scheduler.start_run(&sequence_id, lead_id, now)?;
    }

    // One lead already showed intent.
    ingest
        .process(&FunnelEvent::new("lead-ada", "pricing-page-visit", now))
        .await?;

    info!(
        sequence_id = %sequence_id,
        funnel_id = %funnel_id,
        "Demo data seeded"
    );
    Ok(())
}
