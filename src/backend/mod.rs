//! Inference backends the conversation controller can drive.
//!
//! The controller only ever sees `Arc<dyn InferenceBackend>`; the concrete
//! variants live in [`local`] and [`remote`].

pub mod local;
pub mod remote;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conversation::prompt::{InferenceOutput, InferenceRequest, PromptStyle};

pub use local::{GeneratorLoader, LocalModelBackend, ModelSource, OllamaLoader, TextGenerator};
pub use remote::RemoteApiBackend;

/// Errors raised by a backend while initializing or generating
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("model is not loaded yet")]
    NotReady,

    #[error("model '{0}' is not available with the configured model sources")]
    ModelUnavailable(String),

    #[error("generation failed: {0}")]
    Generation(String),
}

/// Which family a backend belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Remote,
}

impl BackendKind {
    /// How conversation history is linearized for this family.
    pub fn prompt_style(&self) -> PromptStyle {
        match self {
            BackendKind::Local => PromptStyle::Transcript,
            BackendKind::Remote => PromptStyle::RoleList,
        }
    }

    /// Assistant text recorded in place of a reply when generation fails.
    pub fn failure_placeholder(&self) -> &'static str {
        match self {
            BackendKind::Local => "(Local model error)",
            BackendKind::Remote => "(Error contacting server)",
        }
    }
}

/// Sampling settings for local generation. Fixed; callers cannot override them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

pub const GENERATION_PARAMS: GenerationParams = GenerationParams {
    max_new_tokens: 120,
    temperature: 0.9,
    top_p: 0.95,
    repetition_penalty: 1.1,
};

/// Capability that turns a request into generated text
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Human-readable description for status lines and logs.
    fn describe(&self) -> String;

    /// Prepare the backend. Called once per session.
    async fn initialize(&self) -> Result<(), InferenceError>;

    async fn generate(&self, request: &InferenceRequest) -> Result<InferenceOutput, InferenceError>;
}
