use std::sync::Arc;

use tracing::{debug, info};

use crate::db_types::{CallRecord, Lead, NewCallRecord};
use crate::error::AppError;
use crate::events::OutboundEvent;
use crate::provider_types::{CallMetadata, SubmitCallRequest};
use crate::tasks;
use crate::types::AppState;

#[derive(Debug)]
pub struct InitiatedCall {
    pub call_record: CallRecord,
    pub execution_id: String,
}

/// Turn a granted lead into a provider call: resolve the project assignment
/// and credential, normalize the numbers, submit, persist the call record,
/// then start watching the execution.
///
/// On any failure the lead stays spent — `has_been_called` was flipped by
/// the dispatch gate and nothing here reverts it; retries require an
/// explicit reschedule.
pub async fn initiate(state: &Arc<AppState>, lead: &Lead) -> Result<InitiatedCall, AppError> {
    let project = lead
        .project_name
        .as_deref()
        .ok_or(AppError::MissingAssignment("lead has no project"))?;
    let assignment = state
        .assignments
        .get(lead.account_id, project)
        .await?
        .ok_or(AppError::MissingAssignment("project has no dialing assignment"))?;
    let agent_id = assignment
        .agent_id
        .ok_or(AppError::MissingAssignment("project has no agent configured"))?;
    let origin_number = assignment
        .origin_number
        .ok_or(AppError::MissingAssignment("project has no origin number"))?;
    let credential = state
        .accounts
        .credential(lead.account_id)
        .await?
        .ok_or(AppError::MissingAssignment("account has no provider credential"))?;

    let to_phone = state.dial_plan.normalize(&lead.phone);
    let from_phone = state.dial_plan.normalize(&origin_number);
    debug!(lead_id=%lead.id, to=%to_phone, from=%from_phone, "submitting call");

    let request = SubmitCallRequest {
        agent_id: agent_id.clone(),
        recipient_phone_number: to_phone.clone(),
        from_phone_number: from_phone.clone(),
        metadata: Some(CallMetadata {
            lead_id: lead.id.to_string(),
            account_id: lead.account_id.to_string(),
        }),
    };
    // No call record exists unless the provider accepted the submission.
    let response = state.provider.submit_call(&request, &credential).await?;

    let call_record = state
        .calls
        .insert(NewCallRecord {
            lead_id: lead.id,
            account_id: lead.account_id,
            agent_id,
            execution_id: response.execution_id.clone(),
            to_phone,
            from_phone,
        })
        .await?;
    info!(
        lead_id=%lead.id, execution_id=%response.execution_id,
        provider_status=?response.status, "call initiated"
    );

    state.events.publish(
        lead.account_id,
        lead.id,
        OutboundEvent::call_started(lead.id, &response.execution_id, call_record.status),
    );

    tokio::spawn(tasks::watch_execution(
        state.clone(),
        response.execution_id.clone(),
        call_record.id,
        lead.id,
        credential,
        state.poll.max_duration,
    ));

    Ok(InitiatedCall { call_record, execution_id: response.execution_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db_types::CallStatus;
    use crate::dispatch;
    use crate::testutil::{make_lead, TestHarness};

    #[tokio::test]
    async fn missing_project_leaves_lead_spent_and_no_record() {
        let harness = TestHarness::new();
        let lead = make_lead(harness.account_id, "9876543210", None);
        let lead_id = lead.id;
        harness.leads.insert(lead);

        let (lead, _guard) = dispatch::try_acquire(&harness.state, lead_id).await.unwrap();
        match initiate(&harness.state, &lead).await {
            Err(AppError::MissingAssignment(_)) => {}
            other => panic!("expected MissingAssignment, got {other:?}"),
        }

        // Counter-intuitive but deliberate: acquisition succeeded before the
        // assignment lookup failed, so the lead stays spent.
        assert!(harness.leads.get_sync(lead_id).has_been_called);
        assert_eq!(harness.calls.record_count(), 0);
        assert_eq!(harness.provider.submitted_count(), 0);
    }

    #[tokio::test]
    async fn unconfigured_assignment_is_missing_assignment() {
        let harness = TestHarness::new();
        harness.add_partial_assignment("skyline", Some("agent-1"), None);
        let lead = make_lead(harness.account_id, "9876543210", Some("skyline"));
        harness.leads.insert(lead.clone());

        match initiate(&harness.state, &lead).await {
            Err(AppError::MissingAssignment(reason)) => {
                assert!(reason.contains("origin number"), "got: {reason}")
            }
            other => panic!("expected MissingAssignment, got {other:?}"),
        }
        assert_eq!(harness.calls.record_count(), 0);
    }

    #[tokio::test]
    async fn provider_rejection_creates_no_record() {
        let harness = TestHarness::new();
        harness.add_assignment("skyline", "agent-1", "+911234567890");
        harness.provider.fail_next_submit();
        let lead = make_lead(harness.account_id, "9876543210", Some("skyline"));
        let lead_id = lead.id;
        harness.leads.insert(lead);

        let (lead, _guard) = dispatch::try_acquire(&harness.state, lead_id).await.unwrap();
        match initiate(&harness.state, &lead).await {
            Err(AppError::ProviderRejected { .. }) => {}
            other => panic!("expected ProviderRejected, got {other:?}"),
        }
        assert_eq!(harness.calls.record_count(), 0);
        assert!(harness.leads.get_sync(lead_id).has_been_called);
    }

    #[tokio::test]
    async fn successful_initiation_persists_record_and_publishes() {
        let harness = TestHarness::new();
        harness.add_assignment("skyline", "agent-1", "1234567890");
        let mut rx = harness.state.events.subscribe(harness.account_id, None);
        let lead = make_lead(harness.account_id, "98765 43210", Some("skyline"));
        harness.leads.insert(lead.clone());

        let initiated = initiate(&harness.state, &lead).await.unwrap();
        assert_eq!(initiated.call_record.status, CallStatus::Initiated);
        assert_eq!(initiated.call_record.to_phone, "+919876543210");
        assert_eq!(initiated.call_record.from_phone, "+911234567890");
        assert_eq!(initiated.call_record.execution_id.as_deref(), Some(initiated.execution_id.as_str()));

        match rx.try_recv() {
            Ok(OutboundEvent::CallStarted { lead_id, .. }) => assert_eq!(lead_id, lead.id),
            other => panic!("expected CallStarted, got {other:?}"),
        }
    }
}
