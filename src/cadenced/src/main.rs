//! Cadence — multi-channel campaign and funnel orchestration engine.
//!
//! Main entry point: loads configuration, wires the store, channel
//! providers, funnel engine, and scheduler/executor pair, then runs the
//! worker pool until shutdown.

mod seed;

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use cadence_channels::analytics::AnalyticsProvider;
use cadence_channels::email::{EmailConfig, EmailProvider};
use cadence_channels::send_time::{ExactSchedule, FixedHourStrategy, SendTimeStrategy};
use cadence_channels::social::SocialProvider;
use cadence_channels::video::VideoProvider;
use cadence_channels::webhook::WebhookProvider;
use cadence_channels::ChannelDispatcher;
use cadence_core::config::AppConfig;
use cadence_core::types::Channel;
use cadence_funnel::{EventIngest, FunnelEngine};
use cadence_scheduler::{Executor, Scheduler, WorkerPool};
use cadence_store::MemoryStore;

#[derive(Parser, Debug)]
#[command(name = "cadenced")]
#[command(about = "Multi-channel campaign and funnel orchestration engine")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "CADENCE__NODE_ID")]
    node_id: Option<String>,

    /// Scheduler poll interval in milliseconds (overrides config)
    #[arg(long, env = "CADENCE__SCHEDULER__POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// Maximum concurrent channel dispatches (overrides config)
    #[arg(long, env = "CADENCE__SCHEDULER__MAX_CONCURRENT_DISPATCHES")]
    max_concurrent: Option<usize>,

    /// Hold sends until the configured hour instead of dispatching exactly
    /// when due
    #[arg(long, default_value_t = false)]
    optimize_send_time: bool,

    /// Seed demo campaigns, funnels, and leads for development
    #[arg(long, default_value_t = false)]
    seed_demo: bool,
}

fn parse_channel(name: &str) -> Option<Channel> {
    match name {
        "email" => Some(Channel::Email),
        "social" => Some(Channel::Social),
        "video" => Some(Channel::Video),
        "analytics" => Some(Channel::Analytics),
        "webhook" => Some(Channel::Webhook),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadenced=info,cadence_scheduler=info,cadence_funnel=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Cadence starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(interval) = cli.poll_interval_ms {
        config.scheduler.poll_interval_ms = interval;
    }
    if let Some(max) = cli.max_concurrent {
        config.scheduler.max_concurrent_dispatches = max;
    }

    // Configuration errors fail fast, not per-event.
    config.validate()?;

    info!(
        node_id = %config.node_id,
        poll_interval_ms = config.scheduler.poll_interval_ms,
        max_concurrent = config.scheduler.max_concurrent_dispatches,
        channels = ?config.channels.enabled,
        "Configuration loaded"
    );

    let store = Arc::new(MemoryStore::new());
    let event_sink = cadence_core::event_bus::log_sink();

    let enabled: Vec<Channel> = config
        .channels
        .enabled
        .iter()
        .filter_map(|name| parse_channel(name))
        .collect();

    let webhook = Arc::new(WebhookProvider::new());
    let dispatcher = Arc::new(
        ChannelDispatcher::new(enabled)
            .with_event_sink(event_sink.clone())
            .with_provider(Arc::new(EmailProvider::new(EmailConfig {
                from_email: config.channels.from_email.clone(),
                from_name: config.channels.from_name.clone(),
            })))
            .with_provider(Arc::new(SocialProvider::new(vec![
                "x".into(),
                "linkedin".into(),
            ])))
            .with_provider(Arc::new(VideoProvider::new()))
            .with_provider(Arc::new(AnalyticsProvider::new()))
            .with_provider(webhook.clone()),
    );

    let funnel_engine = Arc::new(
        FunnelEngine::new(store.clone(), dispatcher.clone()).with_event_sink(event_sink.clone()),
    );
    let ingest = Arc::new(
        EventIngest::new(store.clone(), funnel_engine.clone()).with_event_sink(event_sink.clone()),
    );

    let send_time: Arc<dyn SendTimeStrategy> = if cli.optimize_send_time {
        Arc::new(FixedHourStrategy {
            hour_utc: config.channels.send_hour_utc,
        })
    } else {
        Arc::new(ExactSchedule)
    };

    let scheduler = Arc::new(
        Scheduler::new(store.clone())
            .with_send_time(send_time)
            .with_event_sink(event_sink.clone()),
    );
    let executor = Arc::new(
        Executor::new(store.clone(), scheduler.clone(), dispatcher, &config.retry)
            .with_event_sink(event_sink),
    );

    if cli.seed_demo {
        seed::seed_demo(&store, &scheduler, &funnel_engine, &ingest, &webhook).await?;
    }

    let mut pool = WorkerPool::new(scheduler, executor, config.scheduler.clone());
    pool.start();

    info!("Cadence ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    pool.shutdown().await;

    Ok(())
}
