//! Session state machine
//!
//! `Session` owns all session state and performs no I/O. Every input
//! (connection event, timer fire, user action) is a method call that
//! mutates state and returns the side effects the driver must carry out.
//!
//! Connections and backoff timers carry generation ids. An event for a
//! connection or timer that has since been superseded is ignored, which is
//! what keeps at most one live connection and one pending timer.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::backoff::BackoffPolicy;
use super::canvas::SharedCanvas;
use super::chat::ChatLog;
use super::heartbeat::{HeartbeatCheck, HeartbeatMonitor};
use super::history::{HistorySnapshot, HistoryStack};
use super::queue::OutboundQueue;
use crate::endpoint::{Endpoint, EndpointSelector};
use crate::error::SessionResult;
use crate::models::{validate_message, validate_name, Point, Stroke, StrokeId};
use crate::protocol::{split_lines, ClientMessage, ServerMessage};

/// Identifies one connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Identifies one scheduled backoff timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started, or disposed
    Idle,
    /// Waiting for a connection attempt to open
    Connecting,
    /// Connected
    Open,
    /// Connection closed or being closed
    Closing,
    /// Connection errored
    Failed,
    /// Backoff timer pending
    ReconnectWait,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Failed => "failed",
            ConnectionState::ReconnectWait => "reconnect-wait",
        };
        f.write_str(name)
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Name sent with chat messages
    pub display_name: String,
    /// Rotation candidates, in order
    pub endpoints: Vec<Endpoint>,
    /// Pins every attempt to one endpoint
    pub endpoint_override: Option<Endpoint>,
    pub backoff: BackoffPolicy,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    /// Attempts that have not opened by then count as failed
    pub connect_timeout: Duration,
    /// Send a SYSTEM join notice after each open
    pub announce_join: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            display_name: "Guest".to_string(),
            endpoints: vec![Endpoint::default()],
            endpoint_override: None,
            backoff: BackoffPolicy::default(),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            announce_join: true,
        }
    }
}

/// Inputs from the network and timers
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Connection attempt succeeded
    Opened(ConnectionId),
    /// A text frame arrived
    Frame(ConnectionId, String),
    /// Connection attempt or live connection failed
    Error(ConnectionId, String),
    /// Connection closed, with the close reason if any
    Closed(ConnectionId, Option<String>),
    /// A backoff timer fired
    BackoffElapsed(TimerId),
    /// Heartbeat interval ticked
    HeartbeatTick,
}

/// Side effects requested by the session
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open a new connection
    Connect { id: ConnectionId, endpoint: Endpoint },
    /// Send on the current connection
    Send(ClientMessage),
    /// Tear down a connection
    Close(ConnectionId),
    /// Arm the single-shot backoff timer
    ScheduleReconnect { timer: TimerId, delay: Duration },
    /// Disarm a pending backoff timer
    CancelReconnect(TimerId),
    /// Start ticking the heartbeat
    StartHeartbeat { interval: Duration },
    /// Stop ticking the heartbeat
    StopHeartbeat,
}

/// Snapshot of the connection for status display
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: ConnectionState,
    /// Consecutive failed attempts since the last successful open
    pub attempts: u32,
    /// Endpoint of the current or last attempt
    pub endpoint: Option<Endpoint>,
    /// Messages waiting for a connection
    pub queued: usize,
    /// Scheduled retry delay while waiting to reconnect
    pub retry_in: Option<Duration>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            attempts: 0,
            endpoint: None,
            queued: 0,
            retry_in: None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoint = self
            .endpoint
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "relay".to_string());

        match self.state {
            ConnectionState::Idle => write!(f, "Offline")?,
            ConnectionState::Connecting if self.attempts > 0 => {
                write!(f, "Connecting to {} (attempt {})", endpoint, self.attempts + 1)?
            }
            ConnectionState::Connecting => write!(f, "Connecting to {}", endpoint)?,
            ConnectionState::Open => write!(f, "Connected to {}", endpoint)?,
            ConnectionState::Closing => write!(f, "Closing connection to {}", endpoint)?,
            ConnectionState::Failed => write!(f, "Connection to {} failed", endpoint)?,
            ConnectionState::ReconnectWait => match self.retry_in {
                Some(delay) => write!(
                    f,
                    "Reconnecting in {:.1}s (attempt {})",
                    delay.as_secs_f64(),
                    self.attempts
                )?,
                None => write!(f, "Waiting to reconnect (attempt {})", self.attempts)?,
            },
        }

        if self.queued > 0 {
            write!(f, ", {} queued", self.queued)?;
        }
        Ok(())
    }
}

/// Local stroke between pointer-down and pointer-up
#[derive(Debug)]
struct StrokeInProgress {
    id: StrokeId,
    /// Canvas before the stroke began, committed to history on pointer-up
    prior: HistorySnapshot,
}

/// The session: connection lifecycle plus shared and local state
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    selector: EndpointSelector,

    state: ConnectionState,
    connection: Option<ConnectionId>,
    endpoint: Option<Endpoint>,
    next_connection: u64,

    pending_timer: Option<TimerId>,
    next_timer: u64,
    retry_in: Option<Duration>,

    /// Drives the backoff delay; reset on open
    backoff_attempts: u32,
    /// Drives endpoint rotation; never reset
    rotation_attempts: u64,

    heartbeat: HeartbeatMonitor,
    queue: OutboundQueue,
    canvas: SharedCanvas,
    history: HistoryStack,
    chat: ChatLog,
    in_progress: Option<StrokeInProgress>,

    canvas_revision: u64,
    chat_revision: u64,

    effects: Vec<Effect>,
}

impl Session {
    /// Create an idle session
    ///
    /// Fails if the display name is empty.
    pub fn new(mut config: SessionConfig) -> SessionResult<Self> {
        config.display_name = validate_name(&config.display_name)?;
        let selector = EndpointSelector::new(config.endpoints.clone());
        let heartbeat = HeartbeatMonitor::new(config.heartbeat_interval, config.heartbeat_timeout);

        Ok(Self {
            config,
            selector,
            state: ConnectionState::Idle,
            connection: None,
            endpoint: None,
            next_connection: 0,
            pending_timer: None,
            next_timer: 0,
            retry_in: None,
            backoff_attempts: 0,
            rotation_attempts: 0,
            heartbeat,
            queue: OutboundQueue::new(),
            canvas: SharedCanvas::new(),
            history: HistoryStack::new(),
            chat: ChatLog::new(),
            in_progress: None,
            canvas_revision: 0,
            chat_revision: 0,
            effects: Vec::new(),
        })
    }

    // --- lifecycle -------------------------------------------------------

    /// Begin connecting. No-op unless idle.
    pub fn start(&mut self) -> Vec<Effect> {
        if self.state == ConnectionState::Idle {
            self.connect();
        } else {
            debug!(state = %self.state, "Session already started");
        }
        self.take_effects()
    }

    /// Drop the current connection and any pending retry, and connect now
    pub fn force_reconnect(&mut self) -> Vec<Effect> {
        info!(state = %self.state, "Forcing reconnect");
        self.stop_heartbeat();
        self.connect();
        self.take_effects()
    }

    /// Tear down the session. Nothing reconnects afterwards.
    pub fn dispose(&mut self) -> Vec<Effect> {
        info!("Disposing session");
        self.cancel_reconnect();
        self.stop_heartbeat();
        self.close_connection();
        self.transition(ConnectionState::Idle);
        self.take_effects()
    }

    /// Handle a network or timer event
    pub fn handle(&mut self, event: Event, now: Instant) -> Vec<Effect> {
        match event {
            Event::Opened(id) if self.is_current(id) => self.on_open(now),
            Event::Opened(id) => {
                debug!(?id, "Superseded connection opened, closing it");
                self.effects.push(Effect::Close(id));
            }
            Event::Frame(id, text) if self.is_current(id) => self.on_frame(&text, now),
            Event::Error(id, reason) if self.is_current(id) => {
                self.on_connection_lost(ConnectionState::Failed, &reason)
            }
            Event::Closed(id, reason) if self.is_current(id) => {
                let reason = reason
                    .as_deref()
                    .filter(|r| !r.is_empty())
                    .unwrap_or("closed by relay");
                self.on_connection_lost(ConnectionState::Closing, reason)
            }
            Event::Frame(id, _) | Event::Error(id, _) | Event::Closed(id, _) => {
                debug!(?id, "Ignoring event from superseded connection");
            }
            Event::BackoffElapsed(timer) if self.pending_timer == Some(timer) => {
                self.pending_timer = None;
                self.retry_in = None;
                self.connect();
            }
            Event::BackoffElapsed(timer) => {
                debug!(?timer, "Ignoring cancelled backoff timer");
            }
            Event::HeartbeatTick => self.on_heartbeat(now),
        }
        self.take_effects()
    }

    // --- user actions ----------------------------------------------------

    /// Pointer-down: append a new local stroke and transmit it
    pub fn begin_stroke(&mut self, stroke: Stroke) -> Vec<Effect> {
        if let Some(unfinished) = self.in_progress.take() {
            debug!(id = %unfinished.id, "Previous stroke never ended, committing it");
            self.history.commit(unfinished.prior);
        }

        self.in_progress = Some(StrokeInProgress {
            id: stroke.id.clone(),
            prior: self.canvas.snapshot(),
        });
        self.canvas.append_own(stroke.clone());
        self.canvas_revision += 1;
        self.transmit(ClientMessage::draw(stroke));
        self.take_effects()
    }

    /// Pointer-move: extend the stroke being drawn and retransmit it whole
    ///
    /// Points for any stroke other than the one in progress are ignored;
    /// finished strokes are frozen.
    pub fn extend_stroke(&mut self, id: &str, points: Vec<Point>) -> Vec<Effect> {
        let drawing = matches!(&self.in_progress, Some(p) if p.id == id);
        if !drawing || points.is_empty() {
            debug!(id, "Ignoring points for a stroke that is not being drawn");
            return self.take_effects();
        }

        let stroke = match self.canvas.extend_own(id, points) {
            Some(stroke) => stroke.clone(),
            None => {
                // Replaced away underneath us, e.g. by an INIT snapshot
                debug!(id, "Stroke in progress is no longer on the canvas");
                return self.take_effects();
            }
        };
        self.canvas_revision += 1;
        self.transmit(ClientMessage::draw(stroke));
        self.take_effects()
    }

    /// Pointer-up: freeze the stroke and commit the prior canvas to history
    pub fn end_stroke(&mut self, id: &str) -> bool {
        match self.in_progress.take() {
            Some(progress) if progress.id == id => {
                self.history.commit(progress.prior);
                true
            }
            other => {
                self.in_progress = other;
                false
            }
        }
    }

    /// Send a chat message, queueing it while disconnected
    pub fn send_chat(&mut self, text: &str) -> SessionResult<Vec<Effect>> {
        let text = validate_message(text)?;
        Ok(self.post_chat(text))
    }

    /// Append and send chat text that has already been validated
    pub(crate) fn post_chat(&mut self, text: String) -> Vec<Effect> {
        let open = self.state == ConnectionState::Open;
        let name = self.config.display_name.clone();

        let index = self.chat.append_user(&name, &text, !open);
        self.chat_revision += 1;

        let effects = &mut self.effects;
        let delivery = self.queue.try_send(
            open,
            ClientMessage::chat(&name, &text),
            Some(index),
            |message| effects.push(Effect::Send(message)),
        );
        debug!(?delivery, "Chat message");

        self.take_effects()
    }

    /// Clear the canvas locally and record it in history
    ///
    /// Not broadcast: the relay protocol has no clear message.
    pub fn clear(&mut self) {
        let prior = self.canvas.snapshot();
        self.in_progress = None;
        self.canvas.clear();
        self.history.commit(prior);
        self.canvas_revision += 1;
    }

    /// Restore the previous local snapshot. Returns false if there is none.
    pub fn undo(&mut self) -> bool {
        match self.history.undo(self.canvas.strokes()) {
            Some(previous) => {
                self.restore(previous);
                true
            }
            None => false,
        }
    }

    /// Re-apply an undone snapshot. Returns false if there is none.
    pub fn redo(&mut self) -> bool {
        match self.history.redo(self.canvas.strokes()) {
            Some(next) => {
                self.restore(next);
                true
            }
            None => false,
        }
    }

    // --- accessors -------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state,
            attempts: self.backoff_attempts,
            endpoint: self.endpoint.clone(),
            queued: self.queue.len(),
            retry_in: self.retry_in,
        }
    }

    pub fn canvas(&self) -> &SharedCanvas {
        &self.canvas
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn pending_timer(&self) -> Option<TimerId> {
        self.pending_timer
    }

    /// Total connection attempts made, across the session's lifetime
    pub fn rotation_attempts(&self) -> u64 {
        self.rotation_attempts
    }

    /// Bumped on every canvas change
    pub fn canvas_revision(&self) -> u64 {
        self.canvas_revision
    }

    /// Bumped on every chat log change
    pub fn chat_revision(&self) -> u64 {
        self.chat_revision
    }

    // --- internals -------------------------------------------------------

    fn is_current(&self, id: ConnectionId) -> bool {
        self.connection == Some(id)
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "Session state transition");
            self.state = next;
        }
    }

    fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    fn connect(&mut self) {
        self.cancel_reconnect();
        self.close_connection();

        let endpoint = self
            .selector
            .next(self.rotation_attempts, self.config.endpoint_override.as_ref())
            .clone();
        self.rotation_attempts += 1;
        self.next_connection += 1;
        let id = ConnectionId(self.next_connection);

        self.connection = Some(id);
        self.endpoint = Some(endpoint.clone());
        self.transition(ConnectionState::Connecting);

        info!(%endpoint, attempt = self.backoff_attempts + 1, "Connecting");
        self.effects.push(Effect::Connect { id, endpoint });
    }

    fn close_connection(&mut self) {
        if let Some(id) = self.connection.take() {
            self.transition(ConnectionState::Closing);
            self.effects.push(Effect::Close(id));
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.pending_timer.take() {
            self.effects.push(Effect::CancelReconnect(timer));
        }
        self.retry_in = None;
    }

    fn schedule_reconnect(&mut self, delay: Duration) {
        self.cancel_reconnect();
        self.next_timer += 1;
        let timer = TimerId(self.next_timer);
        self.pending_timer = Some(timer);
        self.retry_in = Some(delay);
        self.effects.push(Effect::ScheduleReconnect { timer, delay });
    }

    fn stop_heartbeat(&mut self) {
        if self.heartbeat.is_running() {
            self.heartbeat.stop();
            self.effects.push(Effect::StopHeartbeat);
        }
    }

    fn on_open(&mut self, now: Instant) {
        self.transition(ConnectionState::Open);
        self.backoff_attempts = 0;
        self.retry_in = None;

        let flushed = self.flush_queue();

        self.heartbeat.start(now);
        self.effects.push(Effect::StartHeartbeat {
            interval: self.heartbeat.interval(),
        });

        if self.config.announce_join {
            let notice = format!("{} joined", self.config.display_name);
            self.effects.push(Effect::Send(ClientMessage::system(notice)));
        }

        let endpoint = self
            .endpoint
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        info!(%endpoint, flushed, "Connected");
        self.push_system(format!("Connected to {}", endpoint));
    }

    fn flush_queue(&mut self) -> usize {
        let effects = &mut self.effects;
        let chat = &mut self.chat;
        let mut marked = false;

        let flushed = self.queue.flush(|queued| {
            effects.push(Effect::Send(queued.payload));
            if let Some(index) = queued.chat_entry {
                marked |= chat.mark_sent(index);
            }
        });

        if marked {
            self.chat_revision += 1;
        }
        flushed
    }

    fn on_frame(&mut self, text: &str, now: Instant) {
        if self.state != ConnectionState::Open {
            debug!(state = %self.state, "Dropping frame received before open");
            return;
        }

        for line in split_lines(text) {
            match ServerMessage::decode(line) {
                Ok(message) => self.dispatch(message, now),
                Err(e) => warn!(error = %e, "Dropping inbound message"),
            }
        }
    }

    fn dispatch(&mut self, message: ServerMessage, now: Instant) {
        debug!(kind = message.kind(), "Inbound message");
        match message {
            ServerMessage::Init { data } => {
                info!(strokes = data.len(), "Received canvas snapshot");
                self.canvas.replace_all(data);
                self.canvas_revision += 1;
            }
            ServerMessage::Draw { data } => {
                self.canvas.apply_remote(data);
                self.canvas_revision += 1;
            }
            ServerMessage::Chat { name, res } => {
                self.chat.append_user(&name, &res, false);
                self.chat_revision += 1;
            }
            ServerMessage::System { message } => self.push_system(message),
            ServerMessage::Pong => self.heartbeat.record_liveness(now),
        }
    }

    fn on_connection_lost(&mut self, via: ConnectionState, reason: &str) {
        self.connection = None;
        self.transition(via);
        self.stop_heartbeat();

        let delay = self.config.backoff.jittered_delay(self.backoff_attempts);
        self.backoff_attempts = self.backoff_attempts.saturating_add(1);
        self.schedule_reconnect(delay);
        self.transition(ConnectionState::ReconnectWait);

        warn!(
            reason,
            attempt = self.backoff_attempts,
            delay_ms = delay.as_millis() as u64,
            "Connection lost, scheduling reconnect"
        );
        self.push_system(format!(
            "Disconnected ({}). Reconnecting in {:.1}s (attempt {})",
            reason,
            delay.as_secs_f64(),
            self.backoff_attempts
        ));
    }

    fn on_heartbeat(&mut self, now: Instant) {
        if self.state != ConnectionState::Open {
            return;
        }

        match self.heartbeat.check(now) {
            Some(HeartbeatCheck::Probe) => self.effects.push(Effect::Send(ClientMessage::Ping)),
            Some(HeartbeatCheck::Expired { silent_for }) => {
                warn!(
                    silent_ms = silent_for.as_millis() as u64,
                    "No heartbeat response, closing connection"
                );
                if let Some(id) = self.connection {
                    self.effects.push(Effect::Close(id));
                }
                self.on_connection_lost(ConnectionState::Closing, "heartbeat timeout");
            }
            None => {}
        }
    }

    fn transmit(&mut self, message: ClientMessage) {
        let open = self.state == ConnectionState::Open;
        let effects = &mut self.effects;
        self.queue
            .try_send(open, message, None, |message| effects.push(Effect::Send(message)));
    }

    fn push_system(&mut self, text: impl Into<String>) {
        self.chat.append_system(text);
        self.chat_revision += 1;
    }

    fn restore(&mut self, strokes: HistorySnapshot) {
        self.in_progress = None;
        self.canvas.replace_all(strokes);
        self.canvas_revision += 1;
    }
}
