use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::db_types::{CallStatus, Disposition, LeadCallStatus};
use crate::utils::now_rfc3339;

/// Real-time events pushed to subscribed clients.  Delivery is best-effort;
/// a disconnected client misses events until its next state fetch.
#[derive(Serialize, Clone, Debug)]
#[serde(tag = "event")]
pub enum OutboundEvent {
    #[serde(rename = "call:started")]
    CallStarted {
        #[serde(rename = "leadId")]
        lead_id: Uuid,
        #[serde(rename = "executionId")]
        execution_id: String,
        status: CallStatus,
        timestamp: String,
    },
    #[serde(rename = "call:status_updated")]
    CallStatusUpdated {
        #[serde(rename = "leadId")]
        lead_id: Uuid,
        #[serde(rename = "callRecordId")]
        call_record_id: Uuid,
        status: CallStatus,
        timestamp: String,
    },
    #[serde(rename = "lead:status_changed")]
    LeadStatusChanged {
        #[serde(rename = "leadId")]
        lead_id: Uuid,
        status: LeadCallStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        disposition: Option<Disposition>,
        timestamp: String,
    },
}

impl OutboundEvent {
    pub fn call_started(lead_id: Uuid, execution_id: &str, status: CallStatus) -> Self {
        Self::CallStarted {
            lead_id,
            execution_id: execution_id.to_string(),
            status,
            timestamp: now_rfc3339(),
        }
    }

    pub fn call_status_updated(lead_id: Uuid, call_record_id: Uuid, status: CallStatus) -> Self {
        Self::CallStatusUpdated { lead_id, call_record_id, status, timestamp: now_rfc3339() }
    }

    pub fn lead_status_changed(
        lead_id: Uuid,
        status: LeadCallStatus,
        disposition: Option<Disposition>,
    ) -> Self {
        Self::LeadStatusChanged { lead_id, status, disposition, timestamp: now_rfc3339() }
    }
}

struct Subscriber {
    lead_id: Option<Uuid>,
    tx: mpsc::UnboundedSender<OutboundEvent>,
}

/// Fan-out of state transitions to websocket subscribers, scoped per account
/// and optionally narrowed to one lead.  Publishing never blocks the
/// mutation path; dead subscribers are pruned as a side effect.
#[derive(Default)]
pub struct EventPublisher {
    // account id => subscribers
    subscribers: Mutex<HashMap<Uuid, Vec<Subscriber>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        account_id: Uuid,
        lead_id: Option<Uuid>,
    ) -> mpsc::UnboundedReceiver<OutboundEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.entry(account_id).or_default().push(Subscriber { lead_id, tx });
        rx
    }

    pub fn publish(&self, account_id: Uuid, lead_id: Uuid, event: OutboundEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        let Some(account_subs) = subscribers.get_mut(&account_id) else {
            return;
        };
        account_subs.retain(|sub| {
            if sub.lead_id.is_some_and(|scope| scope != lead_id) {
                return true;
            }
            sub.tx.send(event.clone()).is_ok()
        });
        if account_subs.is_empty() {
            subscribers.remove(&account_id);
            debug!(account_id=%account_id, "last event subscriber gone");
        }
    }
}
