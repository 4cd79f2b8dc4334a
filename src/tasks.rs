use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::reconcile::{self, SnapshotUpdate};
use crate::types::AppState;

/// Background task that follows one provider execution to a terminal state.
///
/// Spawned at submission time, one task per execution, uncoordinated with
/// any other task.  Every observation funnels through the same
/// `apply_snapshot` path as the webhook, so the two may race freely.  When
/// `max_duration` passes without a terminal status the task stops silently —
/// the record keeps its last observed status and the webhook may still
/// finish the job later.
pub async fn watch_execution(
    state: Arc<AppState>,
    execution_id: String,
    call_record_id: Uuid,
    lead_id: Uuid,
    credential: String,
    max_duration: Duration,
) {
    let deadline = Instant::now() + max_duration;
    let mut ticker = interval(state.poll.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(execution_id=%execution_id, lead_id=%lead_id, "watching execution");

    loop {
        ticker.tick().await;
        if Instant::now() >= deadline {
            info!(execution_id=%execution_id, "poll window elapsed without terminal state, giving up");
            break;
        }

        let snapshot = match state.provider.get_execution(&execution_id, &credential).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Transient by assumption; the next tick retries.
                warn!(execution_id=%execution_id, error=%e, "execution poll failed");
                continue;
            }
        };

        if let Err(e) = state.calls.touch_last_polled(call_record_id).await {
            warn!(execution_id=%execution_id, error=%e, "failed to stamp poll time");
        }
        let record = match state.calls.get(call_record_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(execution_id=%execution_id, "call record vanished, stopping poller");
                break;
            }
            Err(e) => {
                warn!(execution_id=%execution_id, error=%e, "failed to load call record");
                continue;
            }
        };

        match reconcile::apply_snapshot(&state, &record, SnapshotUpdate::from(&snapshot)).await {
            Ok(updated) if updated.status.is_terminal() => {
                info!(execution_id=%execution_id, status=?updated.status, "execution reached terminal state");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(execution_id=%execution_id, error=%e, "failed to apply execution snapshot");
            }
        }
    }
}
