//! Data models for Sketchroom
//!
//! Defines the core data structures: Stroke, Point, and ChatEntry.
//! Strokes are serialized as-is onto the wire, so field names here are
//! part of the relay protocol.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};

/// Opaque stroke identifier
pub type StrokeId = String;

/// Sender name shown for system notifications
pub const SYSTEM_SENDER: &str = "System";

/// Generate a fresh stroke identifier
pub fn new_stroke_id() -> StrokeId {
    Uuid::new_v4().to_string()
}

/// A sampled pointer position in canvas coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Drawing tool
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Pen,
    Eraser,
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tool::Pen => write!(f, "pen"),
            Tool::Eraser => write!(f, "eraser"),
        }
    }
}

/// One continuous drawn gesture
///
/// Once a stroke id has been broadcast its point sequence only grows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stroke {
    /// Unique identifier
    pub id: StrokeId,
    /// Pen or eraser
    #[serde(default)]
    pub tool: Tool,
    /// CSS-style color, e.g. `#1e90ff`
    pub color: String,
    /// Brush width in canvas units
    pub width: f64,
    /// Sampled points in draw order
    #[serde(default)]
    pub points: Vec<Point>,
}

impl Stroke {
    /// Start a new stroke at the given point with a fresh id
    pub fn begin(tool: Tool, color: impl Into<String>, width: f64, at: Point) -> Self {
        Self::with_id(new_stroke_id(), tool, color, width, at)
    }

    /// Start a stroke with a specific id
    pub fn with_id(
        id: impl Into<StrokeId>,
        tool: Tool,
        color: impl Into<String>,
        width: f64,
        at: Point,
    ) -> Self {
        Self {
            id: id.into(),
            tool,
            color: color.into(),
            width,
            points: vec![at],
        }
    }

    /// Append points to the end of the stroke
    pub fn extend(&mut self, points: impl IntoIterator<Item = Point>) {
        self.points.extend(points);
    }
}

/// Kind of chat log entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    User,
    System,
}

/// A line in the chat log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatEntry {
    /// Who sent it ("System" for notifications)
    pub sender: String,
    /// Message body
    pub text: String,
    /// User message or system notification
    pub kind: ChatKind,
    /// Composed while disconnected and not yet handed to a connection
    pub pending: bool,
    /// When the entry was added locally
    pub created_at: DateTime<Utc>,
}

impl ChatEntry {
    /// A chat message from a participant
    pub fn user(sender: impl Into<String>, text: impl Into<String>, pending: bool) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            kind: ChatKind::User,
            pending,
            created_at: Utc::now(),
        }
    }

    /// A system notification
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            sender: SYSTEM_SENDER.to_string(),
            text: text.into(),
            kind: ChatKind::System,
            pending: false,
            created_at: Utc::now(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.kind == ChatKind::System
    }
}

/// Validate a display name, returning it trimmed
pub fn validate_name(name: &str) -> SessionResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SessionError::EmptyName);
    }
    Ok(name.to_string())
}

/// Validate a chat message, returning it trimmed
pub fn validate_message(text: &str) -> SessionResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SessionError::EmptyMessage);
    }
    Ok(text.to_string())
}
