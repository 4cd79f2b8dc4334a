use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::LockSet;
use crate::events::EventPublisher;
use crate::provider::VoiceProvider;
use crate::store::{AccountStore, AssignmentStore, CallRecordStore, LeadStore};
use crate::utils::DialPlan;

/// How often the execution poller asks the provider for status, and how long
/// it keeps trying before giving up on an execution.
#[derive(Clone, Copy, Debug)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_duration: Duration,
}

pub struct AppState {
    pub leads: Arc<dyn LeadStore>,
    pub calls: Arc<dyn CallRecordStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub assignments: Arc<dyn AssignmentStore>,
    pub provider: Arc<dyn VoiceProvider>,
    pub events: EventPublisher,
    /// Advisory per-lead guard so two concurrent triggers for the same lead
    /// don't both reach the store write.  Process-local; the conditional
    /// store update is the actual correctness guarantee.
    pub lead_guard: Arc<LockSet>,
    /// Advisory per-account guard serializing bulk auto-call sweeps.
    pub sweep_guard: Arc<LockSet>,
    pub dial_plan: DialPlan,
    pub poll: PollSettings,
}
