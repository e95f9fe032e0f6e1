//! Single-line message composer

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

use crate::ui::commands::{SlashCommand, parse_slash_command};

/// Result returned when the user interacts with the composer
#[derive(Debug, PartialEq)]
pub enum ComposerResult {
    Submitted(String),
    Command(SlashCommand),
    None,
}

/// Text entry at the bottom of the chat view
#[derive(Debug, Clone, Default)]
pub struct ConversationComposer {
    content: String,
    /// Byte offset into `content`, always on a char boundary
    cursor: usize,
    enabled: bool,
    sending: bool,
    ready: bool,
}

impl ConversationComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Sync with controller flags. Editing is only possible while ready and idle.
    pub fn set_status(&mut self, ready: bool, sending: bool) {
        self.ready = ready;
        self.sending = sending;
        self.enabled = ready && !sending;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn insert_str(&mut self, text: &str) {
        if !self.enabled {
            return;
        }
        let text: String = text
            .chars()
            .filter(|c| *c != '\r')
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect();
        self.content.insert_str(self.cursor, &text);
        self.cursor += text.len();
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> ComposerResult {
        if key.kind != KeyEventKind::Press || !self.enabled {
            return ComposerResult::None;
        }

        match key.code {
            KeyCode::Enter => {
                if self.content.trim().is_empty() {
                    return ComposerResult::None;
                }
                let content = std::mem::take(&mut self.content);
                self.cursor = 0;
                if let Some(command) = parse_slash_command(&content) {
                    return ComposerResult::Command(command);
                }
                return ComposerResult::Submitted(content);
            }
            KeyCode::Char(c) => {
                self.content.insert(self.cursor, c);
                self.cursor += c.len_utf8();
            }
            KeyCode::Backspace => {
                if let Some(prev) = self.prev_boundary() {
                    self.content.replace_range(prev..self.cursor, "");
                    self.cursor = prev;
                }
            }
            KeyCode::Delete => {
                if let Some(next) = self.next_boundary() {
                    self.content.replace_range(self.cursor..next, "");
                }
            }
            KeyCode::Left => {
                if let Some(prev) = self.prev_boundary() {
                    self.cursor = prev;
                }
            }
            KeyCode::Right => {
                if let Some(next) = self.next_boundary() {
                    self.cursor = next;
                }
            }
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.content.len(),
            _ => {}
        }

        ComposerResult::None
    }

    fn prev_boundary(&self) -> Option<usize> {
        self.content[..self.cursor].char_indices().next_back().map(|(i, _)| i)
    }

    fn next_boundary(&self) -> Option<usize> {
        self.content[self.cursor..]
            .chars()
            .next()
            .map(|c| self.cursor + c.len_utf8())
    }

    fn title(&self) -> &'static str {
        if self.sending { " Sending… " } else { " Send " }
    }

    fn placeholder(&self) -> &'static str {
        if self.ready { "Type a message…" } else { "Loading model…" }
    }
}

impl Widget for &ConversationComposer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(self.title())
            .style(if self.enabled {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::DarkGray)
            });

        let inner = block.inner(area);
        block.render(area, buf);

        let line = if self.content.is_empty() {
            Line::from(Span::styled(self.placeholder(), Style::default().fg(Color::DarkGray)))
        } else {
            let (before, after) = self.content.split_at(self.cursor);
            let mut spans = vec![Span::raw(before.to_string())];
            if self.enabled {
                spans.push(Span::styled("▌", Style::default().fg(Color::Yellow)));
            }
            spans.push(Span::raw(after.to_string()));
            Line::from(spans)
        };
        buf.set_line(inner.x, inner.y, &line, inner.width);
    }
}
