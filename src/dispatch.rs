use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db_types::Lead;
use crate::error::AppError;
use crate::gateway;
use crate::types::AppState;

/// Advisory in-process mutual exclusion over a set of ids.  Holding a key is
/// RAII: dropping the `HeldKey` releases it.  Process-local and fail-open —
/// the store's conditional write remains the source of truth after a
/// restart.
#[derive(Debug, Default)]
pub struct LockSet {
    held: Mutex<HashSet<Uuid>>,
}

impl LockSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn try_hold(self: &Arc<Self>, key: Uuid) -> Option<HeldKey> {
        let mut held = self.held.lock().unwrap();
        if held.insert(key) {
            Some(HeldKey { set: self.clone(), key })
        } else {
            None
        }
    }
}

#[derive(Debug)]
pub struct HeldKey {
    set: Arc<LockSet>,
    key: Uuid,
}

impl Drop for HeldKey {
    fn drop(&mut self) {
        self.set.held.lock().unwrap().remove(&self.key);
    }
}

/// Decide whether a call to this lead may proceed.  The store's atomic
/// conditional write is what actually grants; the in-memory key keeps
/// concurrent requests in this process from both reaching the store.  Keep
/// the returned `HeldKey` alive until call submission finishes.
pub async fn try_acquire(state: &AppState, lead_id: Uuid) -> Result<(Lead, HeldKey), AppError> {
    let held = state.lead_guard.try_hold(lead_id).ok_or(AppError::AlreadyCalled)?;
    match state.leads.acquire_for_dispatch(lead_id).await? {
        Some(lead) => {
            debug!(lead_id=%lead_id, "dispatch granted");
            Ok((lead, held))
        }
        None => match state.leads.get(lead_id).await? {
            Some(_) => Err(AppError::AlreadyCalled),
            None => Err(AppError::LeadNotFound),
        },
    }
}

/// Auto-call every eligible lead of an account, one at a time.  At most one
/// sweep per account runs in this process; a trigger arriving while one is
/// in flight returns without doing anything.
pub async fn sweep_leads(state: Arc<AppState>, account_id: Uuid) {
    let Some(_sweeping) = state.sweep_guard.try_hold(account_id) else {
        info!(account_id=%account_id, "sweep already running for account, skipping");
        return;
    };

    let leads = match state.leads.list_uncalled(account_id).await {
        Ok(leads) => leads,
        Err(e) => {
            error!(account_id=%account_id, error=%e, "failed to list leads for sweep");
            return;
        }
    };
    info!(account_id=%account_id, count = leads.len(), "starting auto-call sweep");

    for lead in leads {
        let lead_id = lead.id;
        let (lead, _dialing) = match try_acquire(&state, lead_id).await {
            Ok(granted) => granted,
            Err(AppError::AlreadyCalled) => continue,
            Err(e) => {
                warn!(lead_id=%lead_id, error=%e, "skipping lead, dispatch failed");
                continue;
            }
        };
        match gateway::initiate(&state, &lead).await {
            Ok(initiated) => {
                info!(lead_id=%lead_id, execution_id=%initiated.execution_id, "auto-call placed");
            }
            Err(e) => {
                // The lead stays spent; retries only happen via explicit
                // reschedule.
                warn!(lead_id=%lead_id, error=%e, "auto-call failed");
            }
        }
    }
}
