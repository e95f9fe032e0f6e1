use chrono::{DateTime, Utc};

use crate::conversation::{GenerationOutcome, InitializationOutcome};

/// Internal application events delivered to the owning event loop
#[derive(Debug)]
pub enum AppEvent {
    /// Backend initialization finished (successfully or not)
    Initialized(InitializationOutcome),

    /// A generation started by `begin_send` finished
    Generated(GenerationOutcome),

    /// Request to exit the application
    ExitRequest,
}

/// TUI-specific events (keyboard, paste, resize, ticks)
#[derive(Debug, Clone)]
pub enum TuiEvent {
    /// Key press event
    Key(crossterm::event::KeyEvent),

    /// Paste event
    Paste(String),

    /// Terminal resize
    Resize(u16, u16),

    /// Periodic redraw so the "thinking" indicator animates
    Tick,
}

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    /// Label used when linearizing history into a transcript prompt.
    pub fn transcript_label(&self) -> &'static str {
        match self {
            Speaker::User => "You",
            Speaker::Assistant => "Assistant",
        }
    }

    /// Role name on the remote chat wire format.
    pub fn wire_role(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Assistant => "assistant",
        }
    }
}

/// One message in the conversation
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Speaker::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Speaker::Assistant, text)
    }

    fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            at: Utc::now(),
        }
    }
}
