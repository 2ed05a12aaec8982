//! Terminal UI rendering.
//!
//! All drawing logic lives here, separated from application state ([`App`])
//! and input handling ([`crate::input`]). The layout is a scrollable list of
//! tailed lines on top and a one-line status bar at the bottom.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use crate::app::App;

/// Draw the complete UI for one frame.
pub fn draw(app: &mut App, frame: &mut Frame) {
    let [main_area, status_area] = Layout::vertical([
        Constraint::Min(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    draw_lines(app, frame, main_area);
    draw_status_bar(app, frame, status_area);
}

/// Render the tailed lines, prefixed by their line numbers.
fn draw_lines(app: &mut App, frame: &mut Frame, area: Rect) {
    let list_items: Vec<ListItem> = app
        .lines
        .iter()
        .map(|(number, text)| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{number:>6} "),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(text.as_str()),
            ]))
        })
        .collect();

    let title = if app.follow {
        format!(" {} (following) ", app.source)
    } else {
        format!(" {} ", app.source)
    };

    let list = List::new(list_items)
        .block(Block::default().title(title).borders(Borders::ALL))
        .highlight_style(Style::default().add_modifier(Modifier::BOLD).bg(Color::DarkGray));

    frame.render_stateful_widget(list, area, &mut app.list_state);
}

/// Render the bottom status bar.
fn draw_status_bar(app: &App, frame: &mut Frame, area: Rect) {
    let (state, state_color) = if app.running {
        ("running", Color::Green)
    } else {
        ("stopped", Color::Red)
    };
    let updated = app
        .last_update
        .map(|t| format!("updated {}", t.format("%H:%M:%S")))
        .unwrap_or_else(|| "no lines yet".into());
    let polls = app
        .iterations
        .map(|n| format!("{n} polls"))
        .unwrap_or_default();

    let status = Paragraph::new(Line::from(vec![
        Span::raw(" "),
        Span::styled(state, Style::default().fg(state_color)),
        Span::raw("  "),
        Span::styled(&app.status, Style::default().fg(Color::Yellow)),
        Span::raw("  "),
        Span::styled(
            format!("{} lines", app.lines.len()),
            Style::default().fg(Color::Green),
        ),
        Span::raw("  "),
        Span::styled(polls, Style::default().fg(Color::Cyan)),
        Span::raw("  "),
        Span::styled(updated, Style::default().fg(Color::DarkGray)),
        Span::raw("  q: quit  p: pause  ↑/↓: scroll  End: follow"),
    ]));
    frame.render_widget(status, area);
}
