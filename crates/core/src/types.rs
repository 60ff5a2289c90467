use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An external delivery surface invoked by the executor. The actual
/// provider behind each channel is an opaque collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Social,
    Video,
    Analytics,
    Webhook,
}

impl Channel {
    pub fn display_name(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Social => "social",
            Channel::Video => "video",
            Channel::Analytics => "analytics",
            Channel::Webhook => "webhook",
        }
    }
}

/// A single step of a campaign sequence. Immutable once a run has started
/// executing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStep {
    /// Days to wait after the previous step before this one is due.
    pub delay_days: u32,
    pub template_id: String,
    pub channel: Channel,
}

/// A named multi-step, time-delayed sequence. Runs reference a definition
/// and never copy its steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignDefinition {
    pub id: Uuid,
    pub name: String,
    pub steps: Vec<CampaignStep>,
    pub created_at: DateTime<Utc>,
}

impl CampaignDefinition {
    pub fn new(name: impl Into<String>, steps: Vec<CampaignStep>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            steps,
            created_at: Utc::now(),
        }
    }

    /// Offset in whole days from `started_at` at which step `index` is due.
    pub fn due_offset_days(&self, index: usize) -> i64 {
        self.steps
            .iter()
            .take(index + 1)
            .map(|s| s.delay_days as i64)
            .sum()
    }
}

/// Lifecycle status of a campaign run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    /// Valid lifecycle transitions. Terminal states admit only the manual
    /// `Failed -> Running` retry path.
    pub fn can_transition(self, to: RunStatus) -> bool {
        matches!(
            (self, to),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Pending, RunStatus::Cancelled)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Cancelled)
                | (RunStatus::Running, RunStatus::Failed)
                | (RunStatus::Failed, RunStatus::Running)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Cancelled | RunStatus::Failed
        )
    }
}

/// One instance of a campaign sequence targeting a single lead.
///
/// `current_step_index` advances monotonically and only after the prior
/// step's dispatch has been acknowledged. `version` backs the store's
/// conditional writes (single-writer-per-key discipline).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRun {
    pub id: Uuid,
    pub definition_id: Uuid,
    pub lead_id: String,
    pub started_at: DateTime<Utc>,
    pub current_step_index: usize,
    pub status: RunStatus,
    /// Dispatch attempts for the current step. Reset on advance.
    pub attempts: u32,
    /// Operator-facing detail of the last failure, if any.
    pub last_error: Option<String>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl CampaignRun {
    pub fn new(definition_id: Uuid, lead_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition_id,
            lead_id: lead_id.into(),
            started_at: now,
            current_step_index: 0,
            status: RunStatus::Pending,
            attempts: 0,
            last_error: None,
            version: 1,
            updated_at: now,
        }
    }
}

/// An action attached to a funnel stage, invoked once per stage entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageAction {
    pub action_id: String,
    pub channel: Channel,
    pub payload: serde_json::Value,
}

/// A single funnel stage: the triggers that pull a lead into it and the
/// actions run on entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub triggers: HashSet<String>,
    pub actions: Vec<StageAction>,
}

/// An ordered sequence of stages through which a lead progresses based on
/// triggers. Stage names are unique within a funnel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelDefinition {
    pub id: Uuid,
    pub name: String,
    pub stages: Vec<Stage>,
}

impl FunnelDefinition {
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            stages,
        }
    }

    /// Position of a stage in definition order.
    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }

    /// First stage (in definition order) whose trigger set contains the
    /// given trigger. First match wins on overlapping trigger sets.
    pub fn matching_stage(&self, trigger_id: &str) -> Option<(usize, &Stage)> {
        self.stages
            .iter()
            .enumerate()
            .find(|(_, s)| s.triggers.contains(trigger_id))
    }
}

/// A lead's position within a funnel. Created on first trigger match,
/// never deleted (history retained for analytics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadFunnelState {
    pub lead_id: String,
    pub funnel_id: Uuid,
    pub current_stage: String,
    pub entered_at: DateTime<Utc>,
    pub version: u64,
    pub history: Vec<StageVisit>,
}

/// One past stage entry for a lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageVisit {
    pub stage: String,
    pub entered_at: DateTime<Utc>,
}

/// An incoming trigger occurrence for a lead. Ephemeral: retained only
/// long enough to dedupe repeats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelEvent {
    pub lead_id: String,
    pub trigger_id: String,
    pub occurred_at: DateTime<Utc>,
}

impl FunnelEvent {
    pub fn new(
        lead_id: impl Into<String>,
        trigger_id: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            lead_id: lead_id.into(),
            trigger_id: trigger_id.into(),
            occurred_at,
        }
    }

    /// Idempotency key for ingest dedupe.
    pub fn dedupe_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.lead_id,
            self.trigger_id,
            self.occurred_at.timestamp_millis()
        )
    }
}

/// A matched stage change, produced by the trigger matcher and applied by
/// the funnel state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTransition {
    pub lead_id: String,
    pub funnel_id: Uuid,
    pub from_stage: Option<String>,
    pub to_stage: String,
}

/// Orchestration event kinds emitted on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStarted,
    StepDispatched,
    StepRetried,
    RunCompleted,
    RunFailed,
    RunCancelled,
    StageEntered,
    ActionInvoked,
    EventDeduped,
}

/// An analytics event describing one orchestration occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub run_id: Option<Uuid>,
    pub lead_id: Option<String>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}
