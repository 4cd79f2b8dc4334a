use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, trace};
use uuid::Uuid;

use crate::db_types::CallStatus;
use crate::dispatch;
use crate::error::AppError;
use crate::gateway;
use crate::provider_types::WebhookEvent;
use crate::reconcile;
use crate::types::AppState;

#[derive(Deserialize, Debug)]
pub struct TriggerCallRequest {
    #[serde(rename = "leadId")]
    pub lead_id: Uuid,
}

#[derive(Serialize, Debug)]
pub struct TriggerCallResponse {
    #[serde(rename = "executionId")]
    pub execution_id: String,
    pub status: CallStatus,
    #[serde(rename = "leadName")]
    pub lead_name: String,
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
}

/// Manual call trigger.  The dispatch guard is held until submission
/// finishes so a double-click cannot race itself to the store.
pub async fn trigger_call(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TriggerCallRequest>,
) -> Result<Json<TriggerCallResponse>, AppError> {
    let (lead, _dialing) = dispatch::try_acquire(&state, body.lead_id).await?;
    let initiated = gateway::initiate(&state, &lead).await?;
    Ok(Json(TriggerCallResponse {
        execution_id: initiated.execution_id,
        status: initiated.call_record.status,
        lead_name: lead.name,
        phone_number: initiated.call_record.to_phone,
    }))
}

/// Kick off an auto-call sweep over an account's uncalled leads.  Runs in
/// the background; a sweep already in flight makes this a no-op.
pub async fn sweep_account(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<Uuid>,
) -> impl IntoResponse {
    tokio::spawn(dispatch::sweep_leads(state, account_id));
    (StatusCode::ACCEPTED, Json(json!({ "started": true })))
}

/// Provider status webhook.  Always acknowledged with 200 — the provider
/// does not interpret failure responses, so internal problems are logged
/// and left to the poller and the audit trail.
pub async fn provider_webhook(
    State(state): State<Arc<AppState>>,
    body: String,
) -> impl IntoResponse {
    trace!(body=%body, "webhook body");
    match serde_json::from_str::<WebhookEvent>(&body) {
        Ok(event) => {
            if let Err(e) = reconcile::reconcile_webhook(&state, &event).await {
                error!(error=%e, "webhook reconciliation failed");
            }
        }
        Err(e) => {
            error!(error=%e, "failed to deserialize webhook payload");
        }
    }
    Json(json!({ "received": true }))
}

#[derive(Deserialize, Debug)]
pub struct SubscribeParams {
    #[serde(rename = "accountId", alias = "account_id")]
    pub account_id: Uuid,
    #[serde(default, rename = "leadId", alias = "lead_id")]
    pub lead_id: Option<Uuid>,
}

/// Real-time subscription channel: one websocket per client, scoped to an
/// account and optionally to a single lead.
pub async fn subscribe_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<SubscribeParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| subscriber_loop(socket, state, params))
}

async fn subscriber_loop(socket: WebSocket, state: Arc<AppState>, params: SubscribeParams) {
    debug!(account_id=%params.account_id, lead_id=?params.lead_id, "event subscriber connected");
    let mut events = state.events.subscribe(params.account_id, params.lead_id);
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        error!(error=%e, "failed to serialize outbound event");
                        continue;
                    }
                };
                if sink.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(error=%e, "subscriber socket error");
                        break;
                    }
                }
            }
        }
    }
    debug!(account_id=%params.account_id, "event subscriber disconnected");
}
