//! Chat screen: message list, composer and a footer line

pub mod commands;
pub mod composer;
pub mod history;

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::Paragraph,
};

use crate::app::App;

pub use commands::{SlashCommand, get_help_text, parse_slash_command};
pub use composer::{ComposerResult, ConversationComposer};
pub use history::{ConversationHistory, Notice};

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),    // History
            Constraint::Length(3), // Composer
            Constraint::Length(1), // Footer
        ])
        .split(frame.size());

    let controller = app.controller();
    let history = ConversationHistory::new(
        controller.turns(),
        app.notices(),
        controller.is_backend_ready(),
        controller.is_sending(),
    );
    frame.render_widget(history, chunks[0]);
    frame.render_widget(app.composer(), chunks[1]);

    let footer = Line::from(vec![
        Span::styled(controller.describe_backend(), Style::default().fg(Color::DarkGray)),
        Span::styled("  •  /help for commands, Esc to quit", Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(footer), chunks[2]);
}
