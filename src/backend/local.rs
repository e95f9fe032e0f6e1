//! Locally served model.
//!
//! The model handle is loaded once through a [`GeneratorLoader`] and then
//! owned by the backend. [`OllamaLoader`] is the loader used by the binary.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{BackendKind, GENERATION_PARAMS, GenerationParams, InferenceBackend, InferenceError};
use crate::conversation::prompt::{InferenceOutput, InferenceRequest};

/// Where model weights may come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSource {
    /// Reuse a model that is already present on the serving host
    pub allow_local_models: bool,
    /// Fetch the model from its registry when needed
    pub allow_remote_models: bool,
}

impl Default for ModelSource {
    fn default() -> Self {
        Self {
            allow_local_models: false,
            allow_remote_models: true,
        }
    }
}

/// A loaded text-generation model
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the prompt followed by the generated continuation.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, InferenceError>;
}

/// Fetches and prepares a model
#[async_trait]
pub trait GeneratorLoader: Send + Sync {
    async fn load(&self, model_id: &str, source: ModelSource) -> Result<Box<dyn TextGenerator>, InferenceError>;
}

pub struct LocalModelBackend {
    model_id: String,
    source: ModelSource,
    loader: Box<dyn GeneratorLoader>,
    generator: OnceCell<Box<dyn TextGenerator>>,
}

impl LocalModelBackend {
    pub fn new(model_id: impl Into<String>, source: ModelSource, loader: Box<dyn GeneratorLoader>) -> Self {
        Self {
            model_id: model_id.into(),
            source,
            loader,
            generator: OnceCell::new(),
        }
    }
}

#[async_trait]
impl InferenceBackend for LocalModelBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn describe(&self) -> String {
        format!("local model {}", self.model_id)
    }

    async fn initialize(&self) -> Result<(), InferenceError> {
        self.generator
            .get_or_try_init(|| self.loader.load(&self.model_id, self.source))
            .await?;
        info!(model = %self.model_id, "local model loaded");
        Ok(())
    }

    async fn generate(&self, request: &InferenceRequest) -> Result<InferenceOutput, InferenceError> {
        let generator = self.generator.get().ok_or(InferenceError::NotReady)?;

        let InferenceRequest::Transcript(prompt) = request else {
            return Err(InferenceError::Generation(
                "local models take a transcript prompt".to_string(),
            ));
        };

        let text = generator.generate(prompt, &GENERATION_PARAMS).await?;
        Ok(InferenceOutput::Extended(text))
    }
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
}

impl From<&GenerationParams> for OllamaOptions {
    fn from(params: &GenerationParams) -> Self {
        Self {
            num_predict: params.max_new_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            repeat_penalty: params.repetition_penalty,
        }
    }
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    raw: bool,
    options: OllamaOptions,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct OllamaPullRequest<'a> {
    name: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

/// Loads models from an Ollama server
#[derive(Clone)]
pub struct OllamaLoader {
    client: Client,
    base_url: String,
}

impl OllamaLoader {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await?;
        let response = check_status(response).await?;

        let models: OllamaModelsResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Decode(e.to_string()))?;
        Ok(models.models.into_iter().map(|m| m.name).collect())
    }

    pub async fn has_model(&self, name: &str) -> Result<bool, InferenceError> {
        let models = self.list_models().await?;
        // Ollama reports untagged models as "<name>:latest".
        Ok(models
            .iter()
            .any(|m| m == name || m.strip_suffix(":latest") == Some(name)))
    }

    async fn pull(&self, name: &str) -> Result<(), InferenceError> {
        let url = format!("{}/api/pull", self.base_url);
        info!(model = %name, "pulling model");
        let response = self
            .client
            .post(&url)
            .json(&OllamaPullRequest { name, stream: false })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl GeneratorLoader for OllamaLoader {
    async fn load(&self, model_id: &str, source: ModelSource) -> Result<Box<dyn TextGenerator>, InferenceError> {
        let present = if source.allow_local_models {
            self.has_model(model_id).await?
        } else {
            false
        };

        if present {
            debug!(model = %model_id, "using locally available model");
        } else if source.allow_remote_models {
            self.pull(model_id).await?;
        } else {
            return Err(InferenceError::ModelUnavailable(model_id.to_string()));
        }

        Ok(Box::new(OllamaGenerator {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            model: model_id.to_string(),
        }))
    }
}

struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, InferenceError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            raw: true,
            options: params.into(),
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let response = check_status(response).await?;
        let body: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Decode(e.to_string()))?;

        // Raw mode returns only the continuation; re-attach the prompt.
        Ok(format!("{}{}", prompt, body.response))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, InferenceError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(InferenceError::Status { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoGenerator {
        completion: String,
    }

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, InferenceError> {
            assert_eq!(*params, GENERATION_PARAMS);
            Ok(format!("{}{}", prompt, self.completion))
        }
    }

    struct CountingLoader {
        loads: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl GeneratorLoader for CountingLoader {
        async fn load(&self, model_id: &str, _source: ModelSource) -> Result<Box<dyn TextGenerator>, InferenceError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(InferenceError::ModelUnavailable(model_id.to_string()));
            }
            Ok(Box::new(EchoGenerator {
                completion: " Hello there".to_string(),
            }))
        }
    }

    fn backend(fail: bool) -> (LocalModelBackend, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let loader = CountingLoader {
            loads: Arc::clone(&loads),
            fail,
        };
        (
            LocalModelBackend::new("tiny", ModelSource::default(), Box::new(loader)),
            loads,
        )
    }

    #[tokio::test]
    async fn test_generate_before_initialize_is_not_ready() {
        let (backend, _) = backend(false);
        let request = InferenceRequest::Transcript("You: Hi\nAssistant:".to_string());
        let err = backend.generate(&request).await.unwrap_err();
        assert!(matches!(err, InferenceError::NotReady));
    }

    #[tokio::test]
    async fn test_generate_returns_prompt_and_completion() {
        let (backend, loads) = backend(false);
        backend.initialize().await.unwrap();
        backend.initialize().await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        let request = InferenceRequest::Transcript("You: Hi\nAssistant:".to_string());
        let output = backend.generate(&request).await.unwrap();
        assert_eq!(
            output,
            InferenceOutput::Extended("You: Hi\nAssistant: Hello there".to_string())
        );
    }

    #[tokio::test]
    async fn test_failed_load_keeps_backend_unloaded() {
        let (backend, _) = backend(true);
        assert!(backend.initialize().await.is_err());

        let request = InferenceRequest::Transcript("You: Hi\nAssistant:".to_string());
        assert!(matches!(
            backend.generate(&request).await,
            Err(InferenceError::NotReady)
        ));
    }

    #[tokio::test]
    async fn test_chat_request_is_rejected() {
        let (backend, _) = backend(false);
        backend.initialize().await.unwrap();

        let request = InferenceRequest::Chat {
            message: "Hi".to_string(),
            history: Vec::new(),
        };
        assert!(matches!(
            backend.generate(&request).await,
            Err(InferenceError::Generation(_))
        ));
    }

    #[test]
    fn test_ollama_options_map_generation_params() {
        let options = OllamaOptions::from(&GENERATION_PARAMS);
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["num_predict"], 120);
        assert_eq!(json["top_p"].as_f64().map(|v| (v * 100.0).round()), Some(95.0));
    }

    #[test]
    fn test_default_source_prefers_remote() {
        let source = ModelSource::default();
        assert!(!source.allow_local_models);
        assert!(source.allow_remote_models);
    }
}
