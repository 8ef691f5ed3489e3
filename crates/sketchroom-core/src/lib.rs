//! Sketchroom Core Library
//!
//! This crate provides the session synchronization core for Sketchroom,
//! a shared canvas and chat room kept in sync through a single relay
//! connection.
//!
//! # Architecture
//!
//! - **Session**: sans-I/O state machine owning the connection lifecycle,
//!   the outbound queue, the stroke log, local history and the chat log
//! - **Driver**: tokio task that runs the session's event loop, owning the
//!   WebSocket connection, the backoff timer and the heartbeat interval
//!
//! Renderers never touch session state directly. They read snapshots
//! published through `tokio::sync::watch` channels on the [`SessionHandle`].
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let handle = spawn_session(config.session_config())?;
//!
//! handle.send_chat("hello")?;
//! let strokes = handle.canvas_rx.borrow().clone();
//! ```
//!
//! # Modules
//!
//! - `session`: lifecycle state machine, its components and the driver
//! - `protocol`: wire messages exchanged with the relay
//! - `endpoint`: relay endpoints and rotation
//! - `models`: strokes, points and chat entries
//! - `config`: application configuration

pub mod config;
pub mod endpoint;
pub mod error;
pub mod models;
pub mod protocol;
pub mod session;

pub use config::Config;
pub use endpoint::{Endpoint, EndpointError, EndpointSelector, Scheme};
pub use error::{SessionError, SessionResult};
pub use models::{ChatEntry, ChatKind, Point, Stroke, StrokeId, Tool};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use session::{
    spawn_session, ConnectionState, Session, SessionConfig, SessionHandle, SessionStatus,
};
