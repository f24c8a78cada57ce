//! HTTP client for the TextRPG backend REST endpoints
//!
//! The stream itself is handled by [`crate::stream::HttpTransport`]; this
//! client covers the request/response collaborators around it:
//!
//! - `GET  /health`: reachability probe
//! - `POST /chat/session`: create a fresh session
//! - `GET  /chat/session/{session_id}`: session summary and message history

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::types::{Message, Role};

/// Session operations the reducer needs from the backend.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// True when the backend answers its health endpoint.
    async fn health_check(&self) -> Result<bool>;

    /// Ask the backend for a fresh session id.
    async fn create_session(&self) -> Result<String>;

    /// Load a session's history as the server sees it.
    async fn fetch_session(&self, session_id: &str) -> Result<SessionHistory>;
}

/// Response from POST /chat/session
#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    session_id: String,
    #[serde(default)]
    status: Option<String>,
}

/// Response from GET /chat/session/{session_id}
#[derive(Debug, Clone, Deserialize)]
pub struct SessionHistory {
    pub session_id: String,
    /// Server-side session summary (message count, timestamps, ...)
    #[serde(default)]
    pub session_info: Option<serde_json::Value>,
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
}

/// One message as stored by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl SessionHistory {
    /// Convert the server history into client messages.
    pub fn into_messages(self) -> Vec<Message> {
        let session_id = self.session_id;
        self.messages
            .into_iter()
            .map(|m| m.into_message(&session_id))
            .collect()
    }
}

impl HistoryMessage {
    fn into_message(self, session_id: &str) -> Message {
        let mut message = Message::new(self.role, self.content, Some(session_id.to_string()));
        if let Some(id) = self.id {
            message.id = id;
        }
        if let Some(created_at) = self.timestamp.as_deref().and_then(parse_timestamp) {
            message.created_at = created_at;
        }
        if let Some(metadata) = self.metadata {
            message.extra = metadata;
        }
        message
    }
}

/// Parse RFC 3339, or a naive ISO timestamp taken as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// HTTP client for the TextRPG backend
pub struct BackendClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// Create a new backend client from configuration
    pub fn new(config: &BackendConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.trimmed_base_url().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl SessionApi for BackendClient {
    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);

        match self.http_client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::debug!(error = %e, "health check failed");
                Ok(false)
            }
        }
    }

    async fn create_session(&self) -> Result<String> {
        let url = format!("{}/chat/session", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            let result: CreateSessionResponse = response
                .json()
                .await
                .map_err(|e| Error::Backend(format!("failed to parse response: {}", e)))?;
            tracing::info!(
                session_id = %result.session_id,
                status = result.status.as_deref().unwrap_or("created"),
                "Created session"
            );
            Ok(result.session_id)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Backend(format!(
                "Failed to create session ({}): {}",
                status, error_text
            )))
        }
    }

    async fn fetch_session(&self, session_id: &str) -> Result<SessionHistory> {
        let url = format!(
            "{}/chat/session/{}",
            self.base_url,
            urlencoding::encode(session_id)
        );

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| Error::Backend(format!("failed to parse response: {}", e)))
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Err(Error::SessionNotFound(session_id.to_string()))
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Backend(format!(
                "API error ({}): {}",
                status, error_text
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_rejects_invalid_base_url() {
        let config = BackendConfig {
            base_url: "localhost:8000".to_string(),
            ..Default::default()
        };
        assert!(BackendClient::new(&config).is_err());
    }

    #[test]
    fn test_client_trims_base_url() {
        let config = BackendConfig {
            base_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        };
        let client = BackendClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_history_conversion() {
        let history: SessionHistory = serde_json::from_str(
            r#"{
                "session_id": "s1",
                "session_info": {"message_count": 2},
                "messages": [
                    {"id": "m1", "type": "human", "content": "Hello", "timestamp": "2025-03-01T10:00:00.123456", "metadata": {}},
                    {"id": "m2", "type": "ai", "content": "Welcome, traveler.", "timestamp": "2025-03-01T10:00:02+00:00", "metadata": {"agent": "setup_agent"}}
                ]
            }"#,
        )
        .unwrap();

        let messages = history.into_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "m1");
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].session_id.as_deref(), Some("s1"));
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].extra["agent"], "setup_agent");
        assert!(messages[0].created_at < messages[1].created_at);
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert!(parse_timestamp("2025-03-01T10:00:00Z").is_some());
        assert!(parse_timestamp("2025-03-01T10:00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
