//! In-memory doubles for the store and provider seams, mirroring the SQL
//! semantics of the Postgres implementations closely enough for the
//! concurrency and idempotence tests to be meaningful.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::types::time::OffsetDateTime;
use sqlx::types::Json;
use uuid::Uuid;

use crate::db_types::{
    CallRecord, CallStatus, Disposition, Lead, LeadCallStatus, NewCallRecord,
};
use crate::dispatch::LockSet;
use crate::error::{AppError, RejectKind};
use crate::events::EventPublisher;
use crate::provider::VoiceProvider;
use crate::provider_types::{ExecutionSnapshot, SubmitCallRequest, SubmitCallResponse};
use crate::store::{
    AccountStore, AssignmentStore, CallRecordStore, CompletionFields, LeadStore, ProjectAssignment,
};
use crate::types::{AppState, PollSettings};
use crate::utils::DialPlan;

pub fn make_lead(account_id: Uuid, phone: &str, project: Option<&str>) -> Lead {
    Lead {
        id: Uuid::new_v4(),
        account_id,
        phone: phone.to_string(),
        name: "Test Lead".to_string(),
        project_name: project.map(str::to_string),
        disposition: Disposition::Pending,
        call_status: LeadCallStatus::Pending,
        has_been_called: false,
        last_auto_call_attempt: None,
        scheduled_call_time: None,
        scheduled_call_reason: None,
        created: OffsetDateTime::now_utc(),
    }
}

pub fn snapshot(status: &str) -> ExecutionSnapshot {
    ExecutionSnapshot {
        status: status.to_string(),
        conversation_duration: None,
        recording_url: None,
        transcript: None,
        transcript_messages: None,
    }
}

#[derive(Default)]
pub struct MemLeadStore {
    leads: Mutex<HashMap<Uuid, Lead>>,
}

impl MemLeadStore {
    pub fn insert(&self, lead: Lead) {
        self.leads.lock().unwrap().insert(lead.id, lead);
    }

    pub fn get_sync(&self, id: Uuid) -> Lead {
        self.leads.lock().unwrap().get(&id).expect("lead exists").clone()
    }

    pub fn set_disposition_sync(&self, id: Uuid, disposition: Disposition) {
        self.leads.lock().unwrap().get_mut(&id).expect("lead exists").disposition = disposition;
    }
}

#[async_trait]
impl LeadStore for MemLeadStore {
    async fn get(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        Ok(self.leads.lock().unwrap().get(&id).cloned())
    }

    async fn acquire_for_dispatch(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        let mut leads = self.leads.lock().unwrap();
        match leads.get_mut(&id) {
            Some(lead) if !lead.has_been_called => {
                lead.has_been_called = true;
                lead.last_auto_call_attempt = Some(OffsetDateTime::now_utc());
                Ok(Some(lead.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_uncalled(&self, account_id: Uuid) -> Result<Vec<Lead>, AppError> {
        let leads = self.leads.lock().unwrap();
        let mut eligible: Vec<Lead> = leads
            .values()
            .filter(|l| {
                l.account_id == account_id && !l.has_been_called && l.scheduled_call_time.is_none()
            })
            .cloned()
            .collect();
        eligible.sort_by_key(|l| l.created);
        Ok(eligible)
    }

    async fn set_call_status(&self, id: Uuid, status: LeadCallStatus) -> Result<(), AppError> {
        if let Some(lead) = self.leads.lock().unwrap().get_mut(&id) {
            lead.call_status = status;
        }
        Ok(())
    }

    async fn set_disposition(&self, id: Uuid, disposition: Disposition) -> Result<(), AppError> {
        if let Some(lead) = self.leads.lock().unwrap().get_mut(&id) {
            lead.disposition = disposition;
        }
        Ok(())
    }

    async fn record_follow_up(
        &self,
        id: Uuid,
        at: OffsetDateTime,
        reason: &str,
    ) -> Result<(), AppError> {
        if let Some(lead) = self.leads.lock().unwrap().get_mut(&id) {
            lead.scheduled_call_time = Some(at);
            lead.scheduled_call_reason = Some(reason.to_string());
            lead.call_status = LeadCallStatus::Scheduled;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemCallRecordStore {
    records: Mutex<HashMap<Uuid, CallRecord>>,
}

impl MemCallRecordStore {
    pub fn get_sync(&self, id: Uuid) -> CallRecord {
        self.records.lock().unwrap().get(&id).expect("record exists").clone()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl CallRecordStore for MemCallRecordStore {
    async fn insert(&self, new: NewCallRecord) -> Result<CallRecord, AppError> {
        let record = CallRecord {
            id: Uuid::new_v4(),
            lead_id: new.lead_id,
            account_id: new.account_id,
            agent_id: new.agent_id,
            execution_id: Some(new.execution_id),
            provider_call_id: None,
            status: CallStatus::Initiated,
            to_phone: new.to_phone,
            from_phone: new.from_phone,
            duration_secs: None,
            recording_url: None,
            transcript: None,
            transcript_messages: None,
            transcript_analyzed: false,
            created: OffsetDateTime::now_utc(),
            last_polled: None,
        };
        self.records.lock().unwrap().insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<CallRecord>, AppError> {
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_provider_call_id(
        &self,
        call_id: &str,
    ) -> Result<Option<CallRecord>, AppError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|r| r.provider_call_id.as_deref() == Some(call_id))
            .cloned())
    }

    async fn find_by_execution_id(
        &self,
        execution_id: &str,
    ) -> Result<Option<CallRecord>, AppError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|r| r.execution_id.as_deref() == Some(execution_id))
            .cloned())
    }

    async fn update_status_monotonic(
        &self,
        id: Uuid,
        status: CallStatus,
    ) -> Result<CallRecord, AppError> {
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&id).ok_or(AppError::ReconciliationMiss)?;
        if !record.status.is_terminal() {
            record.status = status;
        }
        Ok(record.clone())
    }

    async fn fold_completion_fields(
        &self,
        id: Uuid,
        fields: CompletionFields,
    ) -> Result<CallRecord, AppError> {
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&id).ok_or(AppError::ReconciliationMiss)?;
        if let Some(duration) = fields.duration_secs {
            record.duration_secs = Some(duration);
        }
        if let Some(url) = fields.recording_url {
            record.recording_url = Some(url);
        }
        if let Some(transcript) = fields.transcript {
            record.transcript = Some(transcript);
        }
        if let Some(messages) = fields.transcript_messages {
            record.transcript_messages = Some(Json(messages));
        }
        Ok(record.clone())
    }

    async fn set_provider_call_id(&self, id: Uuid, call_id: &str) -> Result<(), AppError> {
        if let Some(record) = self.records.lock().unwrap().get_mut(&id) {
            if record.provider_call_id.is_none() {
                record.provider_call_id = Some(call_id.to_string());
            }
        }
        Ok(())
    }

    async fn touch_last_polled(&self, id: Uuid) -> Result<(), AppError> {
        if let Some(record) = self.records.lock().unwrap().get_mut(&id) {
            record.last_polled = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn claim_transcript_analysis(&self, id: Uuid) -> Result<bool, AppError> {
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&id).ok_or(AppError::ReconciliationMiss)?;
        if record.transcript_analyzed {
            Ok(false)
        } else {
            record.transcript_analyzed = true;
            Ok(true)
        }
    }
}

pub struct MemAccountStore;

#[async_trait]
impl AccountStore for MemAccountStore {
    async fn credential(&self, _account_id: Uuid) -> Result<Option<String>, AppError> {
        Ok(Some("test-key".to_string()))
    }
}

#[derive(Default)]
pub struct MemAssignmentStore {
    assignments: Mutex<HashMap<(Uuid, String), ProjectAssignment>>,
}

#[async_trait]
impl AssignmentStore for MemAssignmentStore {
    async fn get(
        &self,
        account_id: Uuid,
        project_name: &str,
    ) -> Result<Option<ProjectAssignment>, AppError> {
        Ok(self
            .assignments
            .lock()
            .unwrap()
            .get(&(account_id, project_name.to_string()))
            .cloned())
    }
}

/// Scripted provider: submissions are recorded, execution snapshots are
/// served from a queue.  The last snapshot repeats forever, modelling a
/// provider in steady state.
#[derive(Default)]
pub struct FakeProvider {
    submitted: Mutex<Vec<SubmitCallRequest>>,
    snapshots: Mutex<VecDeque<ExecutionSnapshot>>,
    submit_counter: AtomicUsize,
    fail_submit: AtomicBool,
    fail_fetch: AtomicBool,
}

impl FakeProvider {
    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn push_snapshot(&self, snapshot: ExecutionSnapshot) {
        self.snapshots.lock().unwrap().push_back(snapshot);
    }

    pub fn fail_next_submit(&self) {
        self.fail_submit.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_fetch(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl VoiceProvider for FakeProvider {
    async fn submit_call(
        &self,
        request: &SubmitCallRequest,
        _credential: &str,
    ) -> Result<SubmitCallResponse, AppError> {
        if self.fail_submit.swap(false, Ordering::SeqCst) {
            return Err(AppError::ProviderRejected { kind: RejectKind::BadRequest, code: 400 });
        }
        self.submitted.lock().unwrap().push(request.clone());
        let n = self.submit_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SubmitCallResponse { execution_id: format!("exec-{n}"), status: Some("queued".to_string()) })
    }

    async fn get_execution(
        &self,
        _execution_id: &str,
        _credential: &str,
    ) -> Result<ExecutionSnapshot, AppError> {
        if self.fail_fetch.swap(false, Ordering::SeqCst) {
            return Err(AppError::ProviderUnavailable);
        }
        let mut snapshots = self.snapshots.lock().unwrap();
        match snapshots.len() {
            0 => Err(AppError::ProviderUnavailable),
            1 => Ok(snapshots.front().unwrap().clone()),
            _ => Ok(snapshots.pop_front().unwrap()),
        }
    }
}

pub struct TestHarness {
    pub state: Arc<AppState>,
    pub account_id: Uuid,
    pub leads: Arc<MemLeadStore>,
    pub calls: Arc<MemCallRecordStore>,
    pub assignments: Arc<MemAssignmentStore>,
    pub provider: Arc<FakeProvider>,
}

impl TestHarness {
    pub fn new() -> Self {
        let leads = Arc::new(MemLeadStore::default());
        let calls = Arc::new(MemCallRecordStore::default());
        let assignments = Arc::new(MemAssignmentStore::default());
        let provider = Arc::new(FakeProvider::default());
        let state = Arc::new(AppState {
            leads: leads.clone(),
            calls: calls.clone(),
            accounts: Arc::new(MemAccountStore),
            assignments: assignments.clone(),
            provider: provider.clone(),
            events: EventPublisher::new(),
            lead_guard: LockSet::new(),
            sweep_guard: LockSet::new(),
            dial_plan: DialPlan::new("+91"),
            poll: PollSettings {
                interval: Duration::from_millis(10),
                max_duration: Duration::from_secs(2),
            },
        });
        Self { state, account_id: Uuid::new_v4(), leads, calls, assignments, provider }
    }

    pub fn add_assignment(&self, project: &str, agent_id: &str, origin_number: &str) {
        self.add_partial_assignment(project, Some(agent_id), Some(origin_number));
    }

    pub fn add_partial_assignment(
        &self,
        project: &str,
        agent_id: Option<&str>,
        origin_number: Option<&str>,
    ) {
        self.assignments.assignments.lock().unwrap().insert(
            (self.account_id, project.to_string()),
            ProjectAssignment {
                agent_id: agent_id.map(str::to_string),
                origin_number: origin_number.map(str::to_string),
            },
        );
    }

    pub async fn insert_record(&self, lead: &Lead, execution_id: &str) -> CallRecord {
        self.calls
            .insert(NewCallRecord {
                lead_id: lead.id,
                account_id: lead.account_id,
                agent_id: "agent-1".to_string(),
                execution_id: execution_id.to_string(),
                to_phone: "+919876543210".to_string(),
                from_phone: "+911234567890".to_string(),
            })
            .await
            .expect("insert record")
    }
}
