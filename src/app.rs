use std::time::Duration;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyModifiers};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::conversation::ConversationController;
use crate::events::{AppEvent, TuiEvent};
use crate::tui::{EventHandler, Tui};
use crate::ui::{self, ComposerResult, ConversationComposer, Notice, SlashCommand, get_help_text};

/// Interactive chat session: owns the controller and drives it from terminal input
pub struct App {
    controller: ConversationController,
    composer: ConversationComposer,
    notices: Vec<Notice>,
    should_quit: bool,
    tx: mpsc::UnboundedSender<AppEvent>,
    rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl App {
    pub fn new(controller: ConversationController) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut app = Self {
            controller,
            composer: ConversationComposer::new(),
            notices: Vec::new(),
            should_quit: false,
            tx,
            rx,
        };
        app.sync_composer();
        app
    }

    pub fn controller(&self) -> &ConversationController {
        &self.controller
    }

    pub fn composer(&self) -> &ConversationComposer {
        &self.composer
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Kick off backend initialization in the background.
    pub fn start(&mut self) {
        if let Some(pending) = self.controller.begin_initialize() {
            let tx = self.tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(AppEvent::Initialized(pending.run().await));
            });
        }
    }

    /// Wait for the next event produced by background work.
    pub async fn next_app_event(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }

    pub fn handle_app_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Initialized(outcome) => self.controller.finish_initialize(outcome),
            AppEvent::Generated(outcome) => {
                self.controller.finish_send(outcome);
            }
            AppEvent::ExitRequest => self.should_quit = true,
        }
        self.sync_composer();
    }

    pub fn handle_tui_event(&mut self, event: TuiEvent) {
        match event {
            TuiEvent::Key(key) => {
                let quit = key.code == KeyCode::Esc
                    || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL));
                if quit {
                    let _ = self.tx.send(AppEvent::ExitRequest);
                    return;
                }

                match self.composer.handle_key(key) {
                    ComposerResult::Submitted(text) => self.submit(&text),
                    ComposerResult::Command(command) => self.run_command(command),
                    ComposerResult::None => {}
                }
            }
            TuiEvent::Paste(text) => self.composer.insert_str(&text),
            TuiEvent::Resize(..) | TuiEvent::Tick => {}
        }
        self.controller.set_pending_input(self.composer.content());
        self.sync_composer();
    }

    fn submit(&mut self, text: &str) {
        self.controller.set_pending_input(text);
        let Some(pending) = self.controller.submit_pending() else {
            return;
        };

        let tx = self.tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(AppEvent::Generated(pending.run().await));
        });
    }

    fn run_command(&mut self, command: SlashCommand) {
        debug!(command = command.command(), "slash command");
        match command {
            SlashCommand::Help => self.push_notice(get_help_text()),
            SlashCommand::Status => {
                let readiness = if self.controller.is_backend_ready() { "ready" } else { "not ready" };
                let status = format!(
                    "{} · {} · {} turns",
                    self.controller.describe_backend(),
                    readiness,
                    self.controller.turns().len()
                );
                self.push_notice(status);
            }
            SlashCommand::Bye => {
                let _ = self.tx.send(AppEvent::ExitRequest);
            }
        }
    }

    fn push_notice(&mut self, text: String) {
        self.notices.push(Notice {
            after_turn: self.controller.turns().len(),
            text,
        });
    }

    fn sync_composer(&mut self) {
        self.composer
            .set_status(self.controller.is_backend_ready(), self.controller.is_sending());
    }

    /// Run the interactive loop until the user quits.
    pub async fn run(mut self, terminal: &mut Tui, tick_rate: Duration) -> Result<()> {
        let mut events = EventHandler::new(tick_rate);
        self.start();
        info!(session = %self.controller.session_id(), "chat session started");

        while !self.should_quit {
            terminal.draw(|frame| ui::draw(frame, &self))?;

            tokio::select! {
                Some(event) = events.next() => self.handle_tui_event(event),
                Some(event) = self.rx.recv() => self.handle_app_event(event),
                else => break,
            }
        }

        self.controller.shutdown();
        Ok(())
    }
}
