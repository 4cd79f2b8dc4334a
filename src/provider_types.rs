use serde::{Deserialize, Serialize};

use crate::db_types::TranscriptMessage;

/// Body we POST to the provider to place an outbound agent call.
#[derive(Serialize, Clone, Debug)]
pub struct SubmitCallRequest {
    pub agent_id: String,
    pub recipient_phone_number: String,
    pub from_phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CallMetadata>,
}

#[derive(Serialize, Clone, Debug)]
pub struct CallMetadata {
    pub lead_id: String,
    pub account_id: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SubmitCallResponse {
    #[serde(alias = "executionId")]
    pub execution_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Provider-side view of one execution, returned by the status endpoint.
/// Transient; folded into the call record, never stored as-is.
#[derive(Deserialize, Clone, Debug)]
pub struct ExecutionSnapshot {
    pub status: String,
    #[serde(default, alias = "conversationDuration")]
    pub conversation_duration: Option<f64>,
    #[serde(default, alias = "recordingUrl")]
    pub recording_url: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default, alias = "transcriptMessages")]
    pub transcript_messages: Option<Vec<TranscriptMessage>>,
}

/// Push notification from the provider.  The two notification paths populate
/// different identifier fields at different times, so everything is optional
/// and several spellings are accepted.
#[derive(Deserialize, Clone, Debug)]
pub struct WebhookEvent {
    #[serde(default, alias = "callId", alias = "id")]
    pub call_id: Option<String>,
    #[serde(default, alias = "executionId")]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "conversationDuration")]
    pub conversation_duration: Option<f64>,
    #[serde(default, alias = "recordingUrl")]
    pub recording_url: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default, alias = "transcriptMessages")]
    pub transcript_messages: Option<Vec<TranscriptMessage>>,
}

/// Fold raw `speaker: text` transcript lines into speaker turns.  Lines
/// without a speaker tag continue the previous turn.
pub fn parse_transcript_messages(raw: &str) -> Vec<TranscriptMessage> {
    let mut messages: Vec<TranscriptMessage> = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some((speaker, text))
                if !speaker.trim().is_empty() && !speaker.trim().contains(' ') =>
            {
                messages.push(TranscriptMessage {
                    role: speaker.trim().to_ascii_lowercase(),
                    content: text.trim().to_string(),
                });
            }
            _ => {
                if let Some(last) = messages.last_mut() {
                    last.content.push(' ');
                    last.content.push_str(line);
                } else {
                    messages.push(TranscriptMessage {
                        role: "unknown".to_string(),
                        content: line.to_string(),
                    });
                }
            }
        }
    }
    messages
}
