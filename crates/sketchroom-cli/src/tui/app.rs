//! Application state

use std::sync::Arc;

use crossterm::event::{KeyCode, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use sketchroom_core::session::SessionCommand;
use sketchroom_core::{ChatEntry, Point, SessionHandle, SessionStatus, Stroke, StrokeId, Tool};

/// Logical canvas size shared by all participants; y grows downwards
pub const CANVAS_WIDTH: f64 = 800.0;
pub const CANVAS_HEIGHT: f64 = 600.0;

/// Pen colors selectable with 1-6
pub const PALETTE: [(&str, &str); 6] = [
    ("black", "#000000"),
    ("red", "#e53935"),
    ("green", "#43a047"),
    ("blue", "#1e88e5"),
    ("yellow", "#fdd835"),
    ("white", "#ffffff"),
];

const MIN_WIDTH: f64 = 1.0;
const MAX_WIDTH: f64 = 40.0;

/// Input modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Keys are drawing shortcuts
    Draw,
    /// Keys go to the chat input line
    Chat,
}

/// Application state
pub struct App {
    pub display_name: String,
    pub input_mode: InputMode,
    pub tool: Tool,
    pub color_index: usize,
    pub width: f64,
    /// Chat input buffer
    pub input: String,
    pub status: SessionStatus,
    pub strokes: Arc<Vec<Stroke>>,
    pub chat: Arc<Vec<ChatEntry>>,
    /// Inner area of the canvas pane from the last draw
    pub canvas_area: Rect,
    pub should_quit: bool,
    drawing: Option<StrokeId>,
    last_point: Option<Point>,
}

impl App {
    pub fn new(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            input_mode: InputMode::Draw,
            tool: Tool::Pen,
            color_index: 0,
            width: 3.0,
            input: String::new(),
            status: SessionStatus::default(),
            strokes: Arc::new(Vec::new()),
            chat: Arc::new(Vec::new()),
            canvas_area: Rect::default(),
            should_quit: false,
            drawing: None,
            last_point: None,
        }
    }

    /// Pull the latest snapshots published by the session
    pub fn refresh(&mut self, handle: &SessionHandle) {
        self.status = handle.status_rx.borrow().clone();
        self.strokes = handle.canvas_rx.borrow().clone();
        self.chat = handle.chat_rx.borrow().clone();
    }

    pub fn color(&self) -> &'static str {
        PALETTE[self.color_index].1
    }

    pub fn color_name(&self) -> &'static str {
        PALETTE[self.color_index].0
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing.is_some()
    }

    /// Handle a key press, returning the command it maps to
    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Option<SessionCommand> {
        if code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return None;
        }

        match self.input_mode {
            InputMode::Draw => self.handle_draw_key(code),
            InputMode::Chat => self.handle_chat_key(code),
        }
    }

    fn handle_draw_key(&mut self, code: KeyCode) -> Option<SessionCommand> {
        match code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                None
            }
            KeyCode::Char('i') => {
                self.input_mode = InputMode::Chat;
                None
            }
            KeyCode::Char('p') => {
                self.tool = Tool::Pen;
                None
            }
            KeyCode::Char('e') => {
                self.tool = Tool::Eraser;
                None
            }
            KeyCode::Char(c @ '1'..='6') => {
                self.color_index = (c as usize) - ('1' as usize);
                self.tool = Tool::Pen;
                None
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.width = (self.width + 1.0).min(MAX_WIDTH);
                None
            }
            KeyCode::Char('-') => {
                self.width = (self.width - 1.0).max(MIN_WIDTH);
                None
            }
            KeyCode::Char('u') => Some(SessionCommand::Undo),
            KeyCode::Char('r') => Some(SessionCommand::Redo),
            KeyCode::Char('c') => Some(SessionCommand::Clear),
            KeyCode::Char('R') => Some(SessionCommand::ForceReconnect),
            _ => None,
        }
    }

    fn handle_chat_key(&mut self, code: KeyCode) -> Option<SessionCommand> {
        match code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Draw;
                None
            }
            KeyCode::Enter => {
                if self.input.trim().is_empty() {
                    return None;
                }
                let text = std::mem::take(&mut self.input);
                Some(SessionCommand::SendChat(text))
            }
            KeyCode::Backspace => {
                self.input.pop();
                None
            }
            KeyCode::Char(c) => {
                self.input.push(c);
                None
            }
            _ => None,
        }
    }

    /// Handle a mouse event: left-button drags draw strokes
    pub fn handle_mouse(&mut self, mouse: MouseEvent) -> Option<SessionCommand> {
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                let point = self.to_canvas_point(mouse.column, mouse.row)?;
                let stroke = Stroke::begin(self.tool, self.color(), self.width, point);
                self.drawing = Some(stroke.id.clone());
                self.last_point = Some(point);
                Some(SessionCommand::BeginStroke(stroke))
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                let id = self.drawing.clone()?;
                let point = self.clamp_to_canvas(mouse.column, mouse.row)?;
                if self.last_point == Some(point) {
                    return None;
                }
                self.last_point = Some(point);
                Some(SessionCommand::ExtendStroke {
                    id,
                    points: vec![point],
                })
            }
            MouseEventKind::Up(MouseButton::Left) => {
                self.last_point = None;
                let id = self.drawing.take()?;
                Some(SessionCommand::EndStroke { id })
            }
            _ => None,
        }
    }

    /// Map a terminal cell inside the canvas pane to canvas coordinates
    pub fn to_canvas_point(&self, column: u16, row: u16) -> Option<Point> {
        let area = self.canvas_area;
        if area.width == 0 || area.height == 0 {
            return None;
        }
        let inside = column >= area.x
            && column < area.x + area.width
            && row >= area.y
            && row < area.y + area.height;
        if !inside {
            return None;
        }

        let x = (f64::from(column - area.x) + 0.5) / f64::from(area.width) * CANVAS_WIDTH;
        let y = (f64::from(row - area.y) + 0.5) / f64::from(area.height) * CANVAS_HEIGHT;
        Some(Point::new(x, y))
    }

    /// Like [`App::to_canvas_point`], but cells outside snap to the edge
    fn clamp_to_canvas(&self, column: u16, row: u16) -> Option<Point> {
        let area = self.canvas_area;
        if area.width == 0 || area.height == 0 {
            return None;
        }
        let column = column.clamp(area.x, area.x + area.width - 1);
        let row = row.clamp(area.y, area.y + area.height - 1);
        self.to_canvas_point(column, row)
    }
}
