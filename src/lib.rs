//! Terminal chat client for small language models.
//!
//! A [`ConversationController`] keeps the turn history and talks to an
//! [`InferenceBackend`]: either a locally served model or a remote HTTP chat
//! endpoint.

pub mod app;
pub mod backend;
pub mod config;
pub mod conversation;
pub mod events;
pub mod logging;
pub mod tui;
pub mod ui;

pub use backend::{BackendKind, InferenceBackend, InferenceError};
pub use config::Config;
pub use conversation::ConversationController;
pub use events::{Speaker, Turn};
