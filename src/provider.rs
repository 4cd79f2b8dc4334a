use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, error};

use crate::error::{AppError, RejectKind};
use crate::provider_types::{ExecutionSnapshot, SubmitCallRequest, SubmitCallResponse};

#[async_trait]
pub trait VoiceProvider: Send + Sync {
    async fn submit_call(
        &self,
        request: &SubmitCallRequest,
        credential: &str,
    ) -> Result<SubmitCallResponse, AppError>;

    async fn get_execution(
        &self,
        execution_id: &str,
        credential: &str,
    ) -> Result<ExecutionSnapshot, AppError>;
}

/// REST client for the voice-agent provider.  One shared `reqwest::Client`,
/// bearer credential per account.
pub struct HttpVoiceProvider {
    base_url: String,
    client: reqwest::Client,
}

impl HttpVoiceProvider {
    pub fn new(base_url: String, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

fn rejection(status: StatusCode) -> AppError {
    if status.is_server_error() {
        return AppError::ProviderUnavailable;
    }
    let kind = match status.as_u16() {
        401 | 403 => RejectKind::Unauthorized,
        400 | 422 => RejectKind::BadRequest,
        429 => RejectKind::RateLimited,
        _ => RejectKind::Unknown,
    };
    AppError::ProviderRejected { kind, code: status.as_u16() }
}

#[async_trait]
impl VoiceProvider for HttpVoiceProvider {
    async fn submit_call(
        &self,
        request: &SubmitCallRequest,
        credential: &str,
    ) -> Result<SubmitCallResponse, AppError> {
        let url = format!("{}/v2/agent/call", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(credential)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, "failed to reach call provider");
                AppError::ProviderUnavailable
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status=%status, body=%body, "provider rejected call submission");
            return Err(rejection(status));
        }

        response.json::<SubmitCallResponse>().await.map_err(|e| {
            error!(error=%e, "failed to parse provider submit response");
            AppError::ProviderUnavailable
        })
    }

    async fn get_execution(
        &self,
        execution_id: &str,
        credential: &str,
    ) -> Result<ExecutionSnapshot, AppError> {
        let url = format!("{}/v2/executions/{}", self.base_url, execution_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(credential)
            .send()
            .await
            .map_err(|e| {
                debug!(error=%e, execution_id, "execution fetch failed");
                AppError::ProviderUnavailable
            })?;

        let status = response.status();
        if !status.is_success() {
            debug!(status=%status, execution_id, "execution fetch returned non-success");
            return Err(rejection(status));
        }

        response.json::<ExecutionSnapshot>().await.map_err(|e| {
            error!(error=%e, execution_id, "failed to parse execution snapshot");
            AppError::ProviderUnavailable
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert!(matches!(
            rejection(StatusCode::UNAUTHORIZED),
            AppError::ProviderRejected { kind: RejectKind::Unauthorized, code: 401 }
        ));
        assert!(matches!(
            rejection(StatusCode::FORBIDDEN),
            AppError::ProviderRejected { kind: RejectKind::Unauthorized, .. }
        ));
        assert!(matches!(
            rejection(StatusCode::UNPROCESSABLE_ENTITY),
            AppError::ProviderRejected { kind: RejectKind::BadRequest, .. }
        ));
        assert!(matches!(
            rejection(StatusCode::TOO_MANY_REQUESTS),
            AppError::ProviderRejected { kind: RejectKind::RateLimited, .. }
        ));
        assert!(matches!(rejection(StatusCode::BAD_GATEWAY), AppError::ProviderUnavailable));
        assert!(matches!(
            rejection(StatusCode::IM_A_TEAPOT),
            AppError::ProviderRejected { kind: RejectKind::Unknown, .. }
        ));
    }
}
