use serde::{Deserialize, Serialize};
use sqlx::types::time::OffsetDateTime;
use sqlx::types::Json;
use uuid::Uuid;

/// Sales outcome assigned to a lead, initially by intake and later by the
/// transcript analyzer.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "lead_disposition", rename_all = "snake_case")]
pub enum Disposition {
    Pending,
    Hot,
    Cold,
    Fake,
    Connected,
    NotInterested,
}

/// Coarse call progress as seen from the lead's side.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "lead_call_status", rename_all = "snake_case")]
pub enum LeadCallStatus {
    Pending,
    Connected,
    NotConnected,
    Callback,
    Completed,
    Scheduled,
}

/// Call record status lattice: `initiated → queued → ringing → connected →
/// in_progress → {completed | failed | cancelled}`.  The last three are
/// terminal and must never be overwritten by an earlier state.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "call_status", rename_all = "snake_case")]
pub enum CallStatus {
    Initiated,
    Queued,
    Ringing,
    Connected,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl CallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Map a provider-reported status string onto the lattice.  Providers are
    /// loose about spelling; unknown strings yield `None` and are ignored by
    /// the caller.
    pub fn from_provider(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "initiated" | "created" => Some(Self::Initiated),
            "queued" => Some(Self::Queued),
            "ringing" => Some(Self::Ringing),
            "connected" | "answered" => Some(Self::Connected),
            "in_progress" => Some(Self::InProgress),
            "completed" | "ended" => Some(Self::Completed),
            "failed" | "error" | "busy" | "no_answer" => Some(Self::Failed),
            "cancelled" | "canceled" | "stopped" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// One speaker turn of a parsed call transcript.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TranscriptMessage {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Lead {
    pub id: Uuid,
    pub account_id: Uuid,
    pub phone: String,
    pub name: String,
    pub project_name: Option<String>,
    pub disposition: Disposition,
    pub call_status: LeadCallStatus,
    pub has_been_called: bool,
    pub last_auto_call_attempt: Option<OffsetDateTime>,
    pub scheduled_call_time: Option<OffsetDateTime>,
    pub scheduled_call_reason: Option<String>,
    pub created: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct CallRecord {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub account_id: Uuid,
    pub agent_id: String,
    pub execution_id: Option<String>,
    pub provider_call_id: Option<String>,
    pub status: CallStatus,
    pub to_phone: String,
    pub from_phone: String,
    pub duration_secs: Option<i32>,
    pub recording_url: Option<String>,
    pub transcript: Option<String>,
    pub transcript_messages: Option<Json<Vec<TranscriptMessage>>>,
    pub transcript_analyzed: bool,
    pub created: OffsetDateTime,
    pub last_polled: Option<OffsetDateTime>,
}

/// Insert payload for a freshly submitted call.
#[derive(Clone, Debug)]
pub struct NewCallRecord {
    pub lead_id: Uuid,
    pub account_id: Uuid,
    pub agent_id: String,
    pub execution_id: String,
    pub to_phone: String,
    pub from_phone: String,
}
