//! End-to-end funnel flow: ingest -> match -> state write -> stage
//! actions.

use std::sync::Arc;

use chrono::{Duration, Utc};

use cadence_channels::email::{EmailConfig, EmailProvider};
use cadence_channels::webhook::WebhookProvider;
use cadence_channels::ChannelDispatcher;
use cadence_core::event_bus::capture_sink;
use cadence_core::types::{Channel, EventType, FunnelDefinition, FunnelEvent, Stage, StageAction};
use cadence_funnel::{EventIngest, FunnelEngine};
use cadence_store::MemoryStore;

fn signup_funnel() -> FunnelDefinition {
    FunnelDefinition::new(
        "signup",
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
                    action_id: "onboarding_email".into(),
                    channel: Channel::Email,
                    payload: serde_json::json!({}),
                }],
            },
        ],
    )
}

#[tokio::test]
async fn test_full_funnel_progression() {
    let store = Arc::new(MemoryStore::new());
    let sink = capture_sink();

    let email = Arc::new(EmailProvider::new(EmailConfig {
        from_email: "outreach@example.com".into(),
        from_name: "Example".into(),
    }));
    let webhook = Arc::new(WebhookProvider::new());
    webhook.register("notify-sales", "https://crm.example.com/hooks/sales");

    let dispatcher = Arc::new(
        ChannelDispatcher::new(vec![Channel::Email, Channel::Webhook])
            .with_provider(email.clone())
            .with_provider(webhook.clone()),
    );

    let engine = Arc::new(
        FunnelEngine::new(store.clone(), dispatcher).with_event_sink(sink.clone()),
    );
    let ingest = EventIngest::new(store.clone(), engine.clone()).with_event_sink(sink.clone());

    let funnel_id = engine.register_funnel(signup_funnel()).unwrap();
    engine.assign_lead("lead-1", funnel_id);

    let t0 = Utc::now();

    // First trigger match creates state at "interest" and runs its action.
    let visit = FunnelEvent::new("lead-1", "pricing-page-visit", t0);
    let entered = ingest.process(&visit).await.unwrap();
    assert_eq!(entered, Some("interest".into()));
    assert_eq!(email.sent_count("nurture_intro"), 1);

    // Exact redelivery is deduped before matching.
    let entered = ingest.process(&visit).await.unwrap();
    assert_eq!(entered, None);
    assert_eq!(sink.count_type(EventType::EventDeduped), 1);
    assert_eq!(email.sent_count("nurture_intro"), 1);

    // Forward to "trial": webhook action fires once.
    let trial = FunnelEvent::new("lead-1", "trial-start", t0 + Duration::minutes(5));
    assert_eq!(ingest.process(&trial).await.unwrap(), Some("trial".into()));
    assert_eq!(webhook.delivery_count("notify-sales"), 1);

    // A fresh "interest" event is now a backward no-op.
    let revisit = FunnelEvent::new("lead-1", "pricing-page-visit", t0 + Duration::minutes(10));
    assert_eq!(ingest.process(&revisit).await.unwrap(), None);
    assert_eq!(email.sent_count("nurture_intro"), 1);

    // Forward to "conversion".
    let purchase = FunnelEvent::new("lead-1", "plan-purchased", t0 + Duration::minutes(20));
    assert_eq!(
        ingest.process(&purchase).await.unwrap(),
        Some("conversion".into())
    );
    assert_eq!(email.sent_count("onboarding_email"), 1);

    // Three stage entries emitted, occupancy reflects the final stage.
    assert_eq!(sink.count_type(EventType::StageEntered), 3);
    let stats = engine.stats(&funnel_id);
    assert_eq!(stats.total_leads, 1);
    assert_eq!(stats.by_stage.get("conversion"), Some(&1));
}

#[tokio::test]
async fn test_unassigned_lead_events_are_noops() {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Arc::new(ChannelDispatcher::new(vec![]));
    let engine = Arc::new(FunnelEngine::new(store.clone(), dispatcher));
    let ingest = EventIngest::new(store, engine.clone());

    let funnel_id = engine.register_funnel(signup_funnel()).unwrap();

    let event = FunnelEvent::new("lead-unknown", "trial-start", Utc::now());
    assert_eq!(ingest.process(&event).await.unwrap(), None);
    assert_eq!(engine.stats(&funnel_id).total_leads, 0);
}
