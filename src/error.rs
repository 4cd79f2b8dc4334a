use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// Why the provider refused a call submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    Unauthorized,
    BadRequest,
    RateLimited,
    Unknown,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Dispatch gate declined: the lead was already acquired for a call.
    /// A normal outcome, not a failure.
    #[error("lead has already been called")]
    AlreadyCalled,

    #[error("lead not found")]
    LeadNotFound,

    /// Configuration gap the user can correct (missing project, agent or
    /// origin number).  The lead stays spent.
    #[error("missing assignment: {0}")]
    MissingAssignment(&'static str),

    /// The provider answered the submission with a non-success code.  No
    /// call record exists for this attempt.
    #[error("provider rejected call submission (http {code})")]
    ProviderRejected { kind: RejectKind, code: u16 },

    /// Could not reach the provider at all, or it answered 5xx.
    #[error("call provider unavailable")]
    ProviderUnavailable,

    /// A poll or webhook referenced an execution we have no record for.
    /// Logged and dropped, never surfaced over HTTP.
    #[error("no call record matches the notification")]
    ReconciliationMiss,

    /// Benign: no transcript yet, or analysis already ran.
    #[error("transcript analysis skipped: {0}")]
    AnalysisSkipped(&'static str),

    #[error("storage error: {0}")]
    Store(#[from] sqlx::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AlreadyCalled => StatusCode::CONFLICT,
            Self::LeadNotFound => StatusCode::NOT_FOUND,
            Self::MissingAssignment(_) => StatusCode::BAD_REQUEST,
            Self::ProviderRejected { kind: RejectKind::RateLimited, .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            Self::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            // Unauthorized / BadRequest provider rejections are our
            // misconfiguration, not the caller's.
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error=%self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
