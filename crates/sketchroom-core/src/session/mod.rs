//! Session synchronization
//!
//! Keeps one relay connection alive and the shared canvas and chat
//! consistent across drops and retries.
//!
//! ## Lifecycle
//!
//! ```text
//! IDLE -> CONNECTING -> OPEN -> {CLOSING, FAILED} -> RECONNECT_WAIT -> CONNECTING -> ...
//! ```
//!
//! There is no terminal state while the session runs: every close or error
//! schedules a reconnect with exponential backoff. Only `dispose` stops it.
//!
//! ## Usage
//!
//! ```ignore
//! let handle = spawn_session(config)?;
//! handle.begin_stroke(stroke)?;
//! handle.send_chat("hello")?;
//! handle.shutdown().await;
//! ```

mod backoff;
mod canvas;
mod chat;
mod driver;
mod heartbeat;
mod history;
mod machine;
mod queue;

pub use backoff::BackoffPolicy;
pub use canvas::{latest_per_id, SharedCanvas};
pub use chat::ChatLog;
pub use driver::{spawn_session, SessionCommand, SessionHandle};
pub use heartbeat::{HeartbeatCheck, HeartbeatMonitor};
pub use history::{HistorySnapshot, HistoryStack};
pub use machine::{
    ConnectionId, ConnectionState, Effect, Event, Session, SessionConfig, SessionStatus, TimerId,
};
pub use queue::{Delivery, OutboundQueue, QueuedMessage};
