//! Message list, always scrolled to the newest line

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

use crate::events::{Speaker, Turn};

/// UI-only text shown between turns (help output, status). Never sent to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    /// Number of turns that existed when the notice was raised
    pub after_turn: usize,
    pub text: String,
}

/// Borrowed view over the conversation for one frame
pub struct ConversationHistory<'a> {
    turns: &'a [Turn],
    notices: &'a [Notice],
    ready: bool,
    sending: bool,
}

impl<'a> ConversationHistory<'a> {
    pub fn new(turns: &'a [Turn], notices: &'a [Notice], ready: bool, sending: bool) -> Self {
        Self {
            turns,
            notices,
            ready,
            sending,
        }
    }

    /// All lines of the conversation at `width`, oldest first.
    pub fn lines(&self, width: u16) -> Vec<Line<'static>> {
        let width = width.saturating_sub(2) as usize;
        let mut lines = Vec::new();

        if self.turns.is_empty() && self.notices.is_empty() && !self.sending {
            let hint = if self.ready { "Ask me anything…" } else { "Loading model…" };
            lines.push(Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))));
            return lines;
        }

        let mut notices = self.notices.iter().peekable();
        for (index, turn) in self.turns.iter().enumerate() {
            while let Some(notice) = notices.next_if(|n| n.after_turn <= index) {
                push_notice(&mut lines, notice, width);
            }
            push_turn(&mut lines, turn, width);
        }
        for notice in notices {
            push_notice(&mut lines, notice, width);
        }

        if self.sending {
            lines.push(header(Speaker::Assistant, None));
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled("Thinking…", Style::default().fg(Color::DarkGray)),
            ]));
        }

        lines
    }
}

impl Widget for ConversationHistory<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let title = if self.ready {
            " Assistant ".to_string()
        } else {
            " Assistant · loading model… ".to_string()
        };
        let block = Block::default().borders(Borders::ALL).title(title);
        let inner = block.inner(area);
        block.render(area, buf);

        let lines = self.lines(inner.width);
        let height = inner.height as usize;
        let start = lines.len().saturating_sub(height);

        for (i, line) in lines[start..].iter().enumerate() {
            buf.set_line(inner.x, inner.y + i as u16, line, inner.width);
        }
    }
}

fn header(speaker: Speaker, at: Option<&chrono::DateTime<chrono::Utc>>) -> Line<'static> {
    let (label, color) = match speaker {
        Speaker::User => ("YOU", Color::Blue),
        Speaker::Assistant => ("AI", Color::Green),
    };
    let mut spans = vec![Span::styled(
        label,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )];
    if let Some(at) = at {
        spans.push(Span::styled(
            format!(" {}", at.with_timezone(&chrono::Local).format("%H:%M")),
            Style::default().fg(Color::DarkGray),
        ));
    }
    Line::from(spans)
}

fn push_turn(lines: &mut Vec<Line<'static>>, turn: &Turn, width: usize) {
    lines.push(header(turn.speaker, Some(&turn.at)));
    let style = match turn.speaker {
        Speaker::User => Style::default().fg(Color::Cyan),
        Speaker::Assistant => Style::default(),
    };
    for text in wrap_text(&turn.text, width) {
        lines.push(Line::from(vec![Span::raw("  "), Span::styled(text, style)]));
    }
    lines.push(Line::default());
}

fn push_notice(lines: &mut Vec<Line<'static>>, notice: &Notice, width: usize) {
    let style = Style::default().fg(Color::Yellow);
    for text in notice.text.lines().flat_map(|l| wrap_text(l, width)) {
        lines.push(Line::from(Span::styled(text, style)));
    }
    lines.push(Line::default());
}

/// Greedy word wrap. Paragraph breaks in `text` are kept; words longer
/// than `width` are split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_width = 0;

        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();

            while word.len() > width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                    current_width = 0;
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let needed = if current.is_empty() { word.len() } else { current_width + 1 + word.len() };
            if needed > width {
                lines.push(std::mem::take(&mut current));
                current_width = 0;
            }
            if !current.is_empty() {
                current.push(' ');
                current_width += 1;
            }
            current.extend(word.iter());
            current_width += word.len();
        }

        lines.push(current);
    }

    lines
}
