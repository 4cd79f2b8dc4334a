use std::sync::Arc;

use sqlx::types::time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::analyzer;
use crate::db_types::{CallRecord, CallStatus, LeadCallStatus};
use crate::error::AppError;
use crate::events::OutboundEvent;
use crate::provider_types::{parse_transcript_messages, ExecutionSnapshot, WebhookEvent};
use crate::store::CompletionFields;
use crate::types::AppState;

/// Everything a poll result or webhook may carry for one call.  Both
/// notification paths are reduced to this before touching the store, so the
/// monotonic-status and upsert rules live in exactly one place.
#[derive(Clone, Debug, Default)]
pub struct SnapshotUpdate {
    pub status: Option<String>,
    pub fields: CompletionFields,
}

fn completion_fields(
    duration: Option<f64>,
    recording_url: Option<String>,
    transcript: Option<String>,
    messages: Option<Vec<crate::db_types::TranscriptMessage>>,
) -> CompletionFields {
    let transcript_messages = messages.or_else(|| {
        transcript.as_deref().map(parse_transcript_messages).filter(|m| !m.is_empty())
    });
    CompletionFields {
        duration_secs: duration.map(|d| d.round() as i32),
        recording_url,
        transcript,
        transcript_messages,
    }
}

impl From<&ExecutionSnapshot> for SnapshotUpdate {
    fn from(snapshot: &ExecutionSnapshot) -> Self {
        Self {
            status: Some(snapshot.status.clone()),
            fields: completion_fields(
                snapshot.conversation_duration,
                snapshot.recording_url.clone(),
                snapshot.transcript.clone(),
                snapshot.transcript_messages.clone(),
            ),
        }
    }
}

impl From<&WebhookEvent> for SnapshotUpdate {
    fn from(event: &WebhookEvent) -> Self {
        Self {
            status: event.status.clone(),
            fields: completion_fields(
                event.conversation_duration,
                event.recording_url.clone(),
                event.transcript.clone(),
                event.transcript_messages.clone(),
            ),
        }
    }
}

/// Fold one observation into the call record and its lead.  Safe to call
/// concurrently from the poller and the webhook for the same record, and
/// safe to replay: the status write is monotonic, field upserts are
/// last-write-wins, and analysis runs behind a conditional claim.
pub async fn apply_snapshot(
    state: &Arc<AppState>,
    record: &CallRecord,
    update: SnapshotUpdate,
) -> Result<CallRecord, AppError> {
    let prior_status = record.status;
    let mut current = record.clone();

    if let Some(raw) = update.status.as_deref() {
        match CallStatus::from_provider(raw) {
            Some(next) => {
                current = state.calls.update_status_monotonic(record.id, next).await?;
            }
            None => {
                if !raw.is_empty() {
                    warn!(record_id=%record.id, status=%raw, "ignoring unknown provider status");
                }
            }
        }
    }

    if !update.fields.is_empty() {
        current = state.calls.fold_completion_fields(record.id, update.fields).await?;
    }

    if current.status != prior_status {
        let lead_status = match current.status {
            CallStatus::Completed => LeadCallStatus::Completed,
            CallStatus::Failed | CallStatus::Cancelled => LeadCallStatus::NotConnected,
            _ => LeadCallStatus::Connected,
        };
        state.leads.set_call_status(current.lead_id, lead_status).await?;
        state.events.publish(
            current.account_id,
            current.lead_id,
            OutboundEvent::call_status_updated(current.lead_id, current.id, current.status),
        );
        state.events.publish(
            current.account_id,
            current.lead_id,
            OutboundEvent::lead_status_changed(current.lead_id, lead_status, None),
        );
    }

    if current.status.is_terminal() {
        match run_transcript_analysis(state, &current).await {
            Ok(()) => {}
            Err(AppError::AnalysisSkipped(reason)) => {
                debug!(record_id=%current.id, reason, "transcript analysis skipped");
            }
            Err(e) => {
                // Availability over strictness: the record stays usable and
                // the provider will often resend.
                warn!(record_id=%current.id, error=%e, "transcript analysis failed");
            }
        }
        // reflect the analyzed flag in the returned record
        if let Some(refreshed) = state.calls.get(current.id).await? {
            current = refreshed;
        }
    }

    Ok(current)
}

async fn run_transcript_analysis(
    state: &Arc<AppState>,
    record: &CallRecord,
) -> Result<(), AppError> {
    let Some(transcript) = record.transcript.as_deref() else {
        return Err(AppError::AnalysisSkipped("no transcript"));
    };
    if record.transcript_analyzed || !state.calls.claim_transcript_analysis(record.id).await? {
        return Err(AppError::AnalysisSkipped("already analyzed"));
    }

    let analysis = analyzer::analyze(transcript, OffsetDateTime::now_utc());
    info!(
        record_id=%record.id, lead_id=%record.lead_id, disposition=?analysis.disposition,
        scheduled=analysis.follow_up.is_some(), "transcript analyzed"
    );
    state.leads.set_disposition(record.lead_id, analysis.disposition).await?;
    if let Some(follow_up) = analysis.follow_up {
        state.leads.record_follow_up(record.lead_id, follow_up.at, &follow_up.reason).await?;
    }

    if let Some(lead) = state.leads.get(record.lead_id).await? {
        state.events.publish(
            record.account_id,
            record.lead_id,
            OutboundEvent::lead_status_changed(
                record.lead_id,
                lead.call_status,
                Some(lead.disposition),
            ),
        );
    }
    Ok(())
}

/// Handle one provider push notification.  An unknown call is acknowledged
/// and dropped: the record may not exist yet, or the event belongs to a
/// different environment.
pub async fn reconcile_webhook(
    state: &Arc<AppState>,
    event: &WebhookEvent,
) -> Result<Option<CallRecord>, AppError> {
    let mut record = match event.call_id.as_deref() {
        Some(call_id) => state.calls.find_by_provider_call_id(call_id).await?,
        None => None,
    };
    if record.is_none() {
        if let Some(execution_id) = event.execution_id.as_deref() {
            record = state.calls.find_by_execution_id(execution_id).await?;
        }
    }
    let Some(record) = record else {
        info!(
            call_id=?event.call_id, execution_id=?event.execution_id,
            "webhook matches no call record, dropping"
        );
        return Ok(None);
    };

    if record.provider_call_id.is_none() {
        if let Some(call_id) = event.call_id.as_deref() {
            state.calls.set_provider_call_id(record.id, call_id).await?;
        }
    }

    let updated = apply_snapshot(state, &record, SnapshotUpdate::from(event)).await?;
    Ok(Some(updated))
}
