//! REST collaborator wrapper.
//!
//! The marketplace backend persists conversations; this wrapper covers the
//! three calls the messaging core consumes. All requests carry the bearer
//! credential. The backend's semantics are not redefined here.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use tradewire_protocol::{ClientError, CredentialStore, Message};

/// Default per-request deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageBody<'a> {
    content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadBody<'a> {
    message_ids: &'a [i64],
}

/// Typed client for the conversation endpoints.
#[derive(Clone)]
pub struct MessagesApi {
    http: reqwest::Client,
    base_url: String,
    credentials: CredentialStore,
}

impl MessagesApi {
    pub fn new(base_url: impl Into<String>, credentials: CredentialStore) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    /// Fetch the persisted message page for a conversation. An empty page
    /// is `Ok(vec![])`; an undecodable body is a `Decode` error so callers
    /// can tell "no messages yet" from "server broken".
    pub async fn history(&self, conversation_id: i64) -> Result<Vec<Message>, ClientError> {
        let url = format!("{}/conversations/{conversation_id}/messages", self.base_url);
        debug!(conversation_id, "loading message history");
        let response = self.request(self.http.get(&url)).await?;
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Submit a new message. The created record is returned, but the
    /// authoritative copy is expected over the push channel.
    pub async fn send(&self, conversation_id: i64, content: &str) -> Result<Message, ClientError> {
        let url = format!("{}/conversations/{conversation_id}/messages", self.base_url);
        debug!(conversation_id, "submitting message");
        let response = self
            .request(self.http.post(&url).json(&SendMessageBody { content }))
            .await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Acknowledge a batch of messages as read.
    pub async fn mark_read(
        &self,
        conversation_id: i64,
        message_ids: &[i64],
    ) -> Result<(), ClientError> {
        let url = format!(
            "{}/conversations/{conversation_id}/messages/read",
            self.base_url
        );
        debug!(conversation_id, count = message_ids.len(), "acknowledging reads");
        self.request(self.http.post(&url).json(&MarkReadBody { message_ids }))
            .await?;
        Ok(())
    }

    async fn request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        let builder = match self.credentials.token() {
            Some(token) => builder.bearer_auth(token),
            None => return Err(ClientError::Authentication("no credential present".into())),
        };
        let response = builder.send().await.map_err(map_http_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            401 | 403 => ClientError::Authentication(message),
            408 => ClientError::Timeout(message),
            code => ClientError::Api {
                status: code,
                message,
            },
        })
    }
}

fn map_http_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout(err.to_string())
    } else {
        ClientError::Connection(err.to_string())
    }
}
