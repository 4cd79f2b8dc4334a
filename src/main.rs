mod analyzer;
mod db_types;
mod dispatch;
mod error;
mod events;
mod gateway;
mod handlers;
mod provider;
mod provider_types;
mod reconcile;
mod store;
mod tasks;
#[cfg(test)]
mod testutil;
mod types;
mod utils;

use crate::dispatch::LockSet;
use crate::events::EventPublisher;
use crate::provider::HttpVoiceProvider;
use crate::store::{PgAccountStore, PgAssignmentStore, PgCallRecordStore, PgLeadStore};
use crate::types::{AppState, PollSettings};
use crate::utils::DialPlan;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::prelude::*;

pub mod consts {
    /// Country code applied to phone numbers lacking one; see
    /// `utils::DialPlan`.
    pub const DEFAULT_DIAL_PREFIX: &str = "+91";
    pub const POLL_INTERVAL_SECS: u64 = 10;
    pub const POLL_MAX_DURATION_SECS: u64 = 600;
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(true)
                .with_line_number(true),
        )
        .with(tracing_subscriber::filter::Targets::new().with_targets([
            ("hyper", tracing_subscriber::filter::LevelFilter::OFF),
            ("leadcall_rs", tracing_subscriber::filter::LevelFilter::DEBUG),
        ]));
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL not set!");
    let provider_base_url = env::var("PROVIDER_BASE_URL").expect("PROVIDER_BASE_URL not set!");
    let dial_prefix = env::var("DEFAULT_DIAL_PREFIX")
        .unwrap_or_else(|_| consts::DEFAULT_DIAL_PREFIX.to_string());
    let poll_interval = env::var("POLL_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(consts::POLL_INTERVAL_SECS);
    let poll_max_duration = env::var("POLL_MAX_DURATION_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(consts::POLL_MAX_DURATION_SECS);

    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("failed to connect to postgres");
    sqlx::migrate!().run(&db_pool).await.expect("failed to run migrations");

    let http_client = reqwest::Client::new();
    let app_state = Arc::new(AppState {
        leads: Arc::new(PgLeadStore::new(db_pool.clone())),
        calls: Arc::new(PgCallRecordStore::new(db_pool.clone())),
        accounts: Arc::new(PgAccountStore::new(db_pool.clone())),
        assignments: Arc::new(PgAssignmentStore::new(db_pool)),
        provider: Arc::new(HttpVoiceProvider::new(provider_base_url, http_client)),
        events: EventPublisher::new(),
        lead_guard: LockSet::new(),
        sweep_guard: LockSet::new(),
        dial_plan: DialPlan::new(dial_prefix),
        poll: PollSettings {
            interval: Duration::from_secs(poll_interval),
            max_duration: Duration::from_secs(poll_max_duration),
        },
    });

    let app = Router::new()
        .route("/calls", post(handlers::trigger_call))
        .route("/accounts/:account_id/calls/sweep", post(handlers::sweep_account))
        .route("/provider/webhook", post(handlers::provider_webhook))
        .route("/subscribe", get(handlers::subscribe_handler))
        .route("/", get(|| async { "Hello, World!" }))
        .with_state(app_state);

    axum::Server::bind(&"0.0.0.0:3000".parse().unwrap())
        .serve(app.into_make_service())
        .await
        .unwrap();
}
