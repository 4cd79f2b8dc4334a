use async_trait::async_trait;
use sqlx::types::time::OffsetDateTime;
use sqlx::types::Json;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::db_types::{
    CallRecord, CallStatus, Disposition, Lead, LeadCallStatus, NewCallRecord, TranscriptMessage,
};
use crate::error::AppError;

/// Completion data folded into a call record by the poller or the webhook.
/// Every field is upserted last-write-wins; `None` leaves the stored value
/// untouched, so replays and racing writers converge.
#[derive(Clone, Debug, Default)]
pub struct CompletionFields {
    pub duration_secs: Option<i32>,
    pub recording_url: Option<String>,
    pub transcript: Option<String>,
    pub transcript_messages: Option<Vec<TranscriptMessage>>,
}

impl CompletionFields {
    pub fn is_empty(&self) -> bool {
        self.duration_secs.is_none()
            && self.recording_url.is_none()
            && self.transcript.is_none()
            && self.transcript_messages.is_none()
    }
}

/// Project-level dialing assignment.  Either field may be unset if the
/// project was never fully configured.
#[derive(Clone, Debug)]
pub struct ProjectAssignment {
    pub agent_id: Option<String>,
    pub origin_number: Option<String>,
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Lead>, AppError>;

    /// The dispatch gate's conditional write: flip `has_been_called` and
    /// stamp the attempt time in one atomic statement.  Returns the
    /// post-update lead only when this caller won the flip.
    async fn acquire_for_dispatch(&self, id: Uuid) -> Result<Option<Lead>, AppError>;

    /// Leads eligible for an auto-call sweep: never called, nothing scheduled.
    async fn list_uncalled(&self, account_id: Uuid) -> Result<Vec<Lead>, AppError>;

    async fn set_call_status(&self, id: Uuid, status: LeadCallStatus) -> Result<(), AppError>;

    async fn set_disposition(&self, id: Uuid, disposition: Disposition) -> Result<(), AppError>;

    /// Record a follow-up schedule extracted from the transcript; also moves
    /// `call_status` to `scheduled`.
    async fn record_follow_up(
        &self,
        id: Uuid,
        at: OffsetDateTime,
        reason: &str,
    ) -> Result<(), AppError>;
}

#[async_trait]
pub trait CallRecordStore: Send + Sync {
    async fn insert(&self, new: NewCallRecord) -> Result<CallRecord, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<CallRecord>, AppError>;

    async fn find_by_provider_call_id(&self, call_id: &str)
        -> Result<Option<CallRecord>, AppError>;

    async fn find_by_execution_id(
        &self,
        execution_id: &str,
    ) -> Result<Option<CallRecord>, AppError>;

    /// The one status write path both the poller and the webhook reconciler
    /// funnel through.  A terminal status already on the record is never
    /// replaced; the returned record is the post-write state either way.
    async fn update_status_monotonic(
        &self,
        id: Uuid,
        status: CallStatus,
    ) -> Result<CallRecord, AppError>;

    async fn fold_completion_fields(
        &self,
        id: Uuid,
        fields: CompletionFields,
    ) -> Result<CallRecord, AppError>;

    async fn set_provider_call_id(&self, id: Uuid, call_id: &str) -> Result<(), AppError>;

    async fn touch_last_polled(&self, id: Uuid) -> Result<(), AppError>;

    /// Conditional flip of `transcript_analyzed`.  True means this caller
    /// won and must run the analyzer; false means someone already did.
    async fn claim_transcript_analysis(&self, id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn credential(&self, account_id: Uuid) -> Result<Option<String>, AppError>;
}

#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn get(
        &self,
        account_id: Uuid,
        project_name: &str,
    ) -> Result<Option<ProjectAssignment>, AppError>;
}

// --- Postgres implementations ---

pub struct PgLeadStore {
    pool: Pool<Postgres>,
}

impl PgLeadStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn get(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(lead)
    }

    async fn acquire_for_dispatch(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<_, Lead>(
            "UPDATE leads
             SET has_been_called = TRUE, last_auto_call_attempt = now()
             WHERE id = $1 AND has_been_called = FALSE
             RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(lead)
    }

    async fn list_uncalled(&self, account_id: Uuid) -> Result<Vec<Lead>, AppError> {
        let leads = sqlx::query_as::<_, Lead>(
            "SELECT * FROM leads
             WHERE account_id = $1
               AND has_been_called = FALSE
               AND scheduled_call_time IS NULL
             ORDER BY created",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(leads)
    }

    async fn set_call_status(&self, id: Uuid, status: LeadCallStatus) -> Result<(), AppError> {
        sqlx::query("UPDATE leads SET call_status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_disposition(&self, id: Uuid, disposition: Disposition) -> Result<(), AppError> {
        sqlx::query("UPDATE leads SET disposition = $2 WHERE id = $1")
            .bind(id)
            .bind(disposition)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_follow_up(
        &self,
        id: Uuid,
        at: OffsetDateTime,
        reason: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE leads
             SET scheduled_call_time = $2, scheduled_call_reason = $3, call_status = 'scheduled'
             WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PgCallRecordStore {
    pool: Pool<Postgres>,
}

impl PgCallRecordStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallRecordStore for PgCallRecordStore {
    async fn insert(&self, new: NewCallRecord) -> Result<CallRecord, AppError> {
        let record = sqlx::query_as::<_, CallRecord>(
            "INSERT INTO call_records
                 (id, lead_id, account_id, agent_id, execution_id, status, to_phone, from_phone)
             VALUES ($1, $2, $3, $4, $5, 'initiated', $6, $7)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.lead_id)
        .bind(new.account_id)
        .bind(new.agent_id)
        .bind(new.execution_id)
        .bind(new.to_phone)
        .bind(new.from_phone)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<CallRecord>, AppError> {
        let record = sqlx::query_as::<_, CallRecord>("SELECT * FROM call_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn find_by_provider_call_id(
        &self,
        call_id: &str,
    ) -> Result<Option<CallRecord>, AppError> {
        let record = sqlx::query_as::<_, CallRecord>(
            "SELECT * FROM call_records WHERE provider_call_id = $1",
        )
        .bind(call_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn find_by_execution_id(
        &self,
        execution_id: &str,
    ) -> Result<Option<CallRecord>, AppError> {
        let record =
            sqlx::query_as::<_, CallRecord>("SELECT * FROM call_records WHERE execution_id = $1")
                .bind(execution_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record)
    }

    async fn update_status_monotonic(
        &self,
        id: Uuid,
        status: CallStatus,
    ) -> Result<CallRecord, AppError> {
        let updated = sqlx::query_as::<_, CallRecord>(
            "UPDATE call_records
             SET status = $2
             WHERE id = $1 AND status NOT IN ('completed', 'failed', 'cancelled')
             RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;
        match updated {
            Some(record) => Ok(record),
            // Guard held: the record is already terminal.  Hand back the
            // stored state so the caller sees what won.
            None => self.get(id).await?.ok_or(AppError::ReconciliationMiss),
        }
    }

    async fn fold_completion_fields(
        &self,
        id: Uuid,
        fields: CompletionFields,
    ) -> Result<CallRecord, AppError> {
        let record = sqlx::query_as::<_, CallRecord>(
            "UPDATE call_records
             SET duration_secs = COALESCE($2, duration_secs),
                 recording_url = COALESCE($3, recording_url),
                 transcript = COALESCE($4, transcript),
                 transcript_messages = COALESCE($5, transcript_messages)
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(fields.duration_secs)
        .bind(fields.recording_url)
        .bind(fields.transcript)
        .bind(fields.transcript_messages.map(Json))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::ReconciliationMiss)?;
        Ok(record)
    }

    async fn set_provider_call_id(&self, id: Uuid, call_id: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE call_records SET provider_call_id = $2
             WHERE id = $1 AND provider_call_id IS NULL",
        )
        .bind(id)
        .bind(call_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn touch_last_polled(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE call_records SET last_polled = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn claim_transcript_analysis(&self, id: Uuid) -> Result<bool, AppError> {
        let claimed = sqlx::query(
            "UPDATE call_records SET transcript_analyzed = TRUE
             WHERE id = $1 AND transcript_analyzed = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(claimed.rows_affected() > 0)
    }
}

pub struct PgAccountStore {
    pool: Pool<Postgres>,
}

impl PgAccountStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn credential(&self, account_id: Uuid) -> Result<Option<String>, AppError> {
        let key: Option<(String,)> =
            sqlx::query_as("SELECT provider_api_key FROM accounts WHERE id = $1")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(key.map(|(k,)| k))
    }
}

pub struct PgAssignmentStore {
    pool: Pool<Postgres>,
}

impl PgAssignmentStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssignmentStore for PgAssignmentStore {
    async fn get(
        &self,
        account_id: Uuid,
        project_name: &str,
    ) -> Result<Option<ProjectAssignment>, AppError> {
        let row: Option<(Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT agent_id, origin_number FROM project_assignments
             WHERE account_id = $1 AND project_name = $2",
        )
        .bind(account_id)
        .bind(project_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(agent_id, origin_number)| ProjectAssignment { agent_id, origin_number }))
    }
}
