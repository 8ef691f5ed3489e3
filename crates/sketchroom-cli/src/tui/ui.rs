//! UI rendering

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Line as CanvasLine, Points},
        Block, Borders, List, ListItem, Paragraph,
    },
    Frame,
};
use sketchroom_core::session::latest_per_id;
use sketchroom_core::{ChatEntry, ConnectionState, Tool};

use super::app::{App, InputMode, CANVAS_HEIGHT, CANVAS_WIDTH};

/// Main UI rendering function
///
/// Takes the app mutably to record where the canvas landed, so mouse
/// events can be mapped back to canvas coordinates.
pub fn draw(frame: &mut Frame, app: &mut App) {
    let outer_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let pane_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(outer_chunks[0]);

    draw_canvas_pane(frame, app, pane_chunks[0]);
    draw_chat_pane(frame, app, pane_chunks[1]);
    draw_input(frame, app, outer_chunks[1]);
    draw_status_bar(frame, app, outer_chunks[2]);
}

/// Draw the shared canvas (left)
fn draw_canvas_pane(frame: &mut Frame, app: &mut App, area: Rect) {
    let title = format!(
        " Canvas - {} {} w{} ",
        app.tool,
        if app.tool == Tool::Pen { app.color_name() } else { "" },
        app.width
    );
    let block = Block::default().borders(Borders::ALL).title(title);
    app.canvas_area = block.inner(area);

    let strokes = latest_per_id(&app.strokes);
    let canvas = Canvas::default()
        .block(block)
        .marker(Marker::Braille)
        .x_bounds([0.0, CANVAS_WIDTH])
        .y_bounds([0.0, CANVAS_HEIGHT])
        .paint(|ctx| {
            for stroke in &strokes {
                // The eraser paints in the background color
                let color = match stroke.tool {
                    Tool::Pen => parse_color(&stroke.color),
                    Tool::Eraser => Color::Black,
                };

                if let [only] = stroke.points.as_slice() {
                    let coords = [(only.x, flip_y(only.y))];
                    ctx.draw(&Points {
                        coords: &coords,
                        color,
                    });
                }
                for pair in stroke.points.windows(2) {
                    ctx.draw(&CanvasLine::new(
                        pair[0].x,
                        flip_y(pair[0].y),
                        pair[1].x,
                        flip_y(pair[1].y),
                        color,
                    ));
                }
            }
        });

    frame.render_widget(canvas, area);
}

/// Draw the chat log (right)
fn draw_chat_pane(frame: &mut Frame, app: &App, area: Rect) {
    let pending = app.chat.iter().filter(|e| e.pending).count();
    let title = if pending > 0 {
        format!(" Chat ({} pending) ", pending)
    } else {
        " Chat ".to_string()
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    // Newest at the bottom; only what fits
    let visible = block.inner(area).height as usize;
    let skip = app.chat.len().saturating_sub(visible);
    let items: Vec<ListItem> = app.chat.iter().skip(skip).map(chat_line).collect();

    frame.render_widget(List::new(items).block(block), area);
}

fn chat_line(entry: &ChatEntry) -> ListItem<'static> {
    if entry.is_system() {
        return ListItem::new(Line::from(Span::styled(
            format!("* {}", entry.text),
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )));
    }

    // Marker goes first so a long line cannot push it out of the pane
    let mut spans = Vec::with_capacity(3);
    if entry.pending {
        spans.push(Span::styled("(pending) ", Style::default().fg(Color::Yellow)));
    }
    spans.push(Span::styled(
        format!("{}: ", entry.sender),
        Style::default().add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::raw(entry.text.clone()));
    ListItem::new(Line::from(spans))
}

/// Draw the chat input line
fn draw_input(frame: &mut Frame, app: &App, area: Rect) {
    let active = app.input_mode == InputMode::Chat;
    let (title, border_style) = if active {
        (
            " Message (Enter send, Esc back to drawing) ",
            Style::default().fg(Color::Cyan),
        )
    } else {
        (" Message (i to type) ", Style::default())
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(title);
    let input = Paragraph::new(app.input.as_str()).block(block);
    frame.render_widget(input, area);

    if active {
        let x = area.x + 1 + app.input.chars().count() as u16;
        let x = x.min(area.x + area.width.saturating_sub(2));
        frame.set_cursor_position((x, area.y + 1));
    }
}

/// Draw the status bar at the bottom
fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let status_style = Style::default().fg(status_color(app.status.state));

    let line = Line::from(vec![
        Span::styled(format!(" {} ", app.status), status_style),
        Span::raw(format!("| {} ", app.display_name)),
        Span::styled(
            "| p/e tool  1-6 color  +/- width  u/r undo/redo  c clear  R reconnect  q quit",
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn status_color(state: ConnectionState) -> Color {
    match state {
        ConnectionState::Open => Color::Green,
        ConnectionState::Connecting | ConnectionState::ReconnectWait => Color::Yellow,
        ConnectionState::Closing | ConnectionState::Failed => Color::Red,
        ConnectionState::Idle => Color::DarkGray,
    }
}

/// Canvas y grows downwards; ratatui's grows upwards
fn flip_y(y: f64) -> f64 {
    CANVAS_HEIGHT - y
}

/// Parse `#rrggbb` or `#rgb`; anything else renders white
fn parse_color(css: &str) -> Color {
    let hex = css.trim().trim_start_matches('#');
    if !hex.is_ascii() {
        return Color::White;
    }

    let rgb = match hex.len() {
        6 => hex_channels(hex, 2),
        3 => hex_channels(hex, 1).map(|(r, g, b)| (r * 17, g * 17, b * 17)),
        _ => None,
    };

    match rgb {
        Some((r, g, b)) => Color::Rgb(r, g, b),
        None => Color::White,
    }
}

fn hex_channels(hex: &str, digits: usize) -> Option<(u8, u8, u8)> {
    let channel = |i: usize| u8::from_str_radix(&hex[i * digits..(i + 1) * digits], 16).ok();
    Some((channel(0)?, channel(1)?, channel(2)?))
}
