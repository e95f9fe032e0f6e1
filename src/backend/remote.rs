use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BackendKind, InferenceBackend, InferenceError};
use crate::conversation::prompt::{HistoryEntry, InferenceOutput, InferenceRequest};

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    history: &'a [HistoryEntry],
}

#[derive(Deserialize)]
struct ChatResponse {
    reply: String,
}

/// HTTP chat endpoint speaking `{message, history} -> {reply}`
#[derive(Clone)]
pub struct RemoteApiBackend {
    client: Client,
    endpoint: String,
}

impl RemoteApiBackend {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl InferenceBackend for RemoteApiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn describe(&self) -> String {
        format!("remote endpoint {}", self.endpoint)
    }

    async fn initialize(&self) -> Result<(), InferenceError> {
        Ok(())
    }

    async fn generate(&self, request: &InferenceRequest) -> Result<InferenceOutput, InferenceError> {
        let InferenceRequest::Chat { message, history } = request else {
            return Err(InferenceError::Generation(
                "the chat endpoint takes a structured request".to_string(),
            ));
        };

        debug!(endpoint = %self.endpoint, history = history.len(), "posting chat request");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ChatRequest { message, history })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status { status, body });
        }

        let body = response.text().await?;
        let chat: ChatResponse =
            serde_json::from_str(&body).map_err(|e| InferenceError::Decode(e.to_string()))?;
        Ok(InferenceOutput::Reply(chat.reply))
    }
}
