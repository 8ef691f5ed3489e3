//! Session driver
//!
//! Runs a [`Session`] on a tokio task. Commands from the handle, connection
//! events, the backoff timer and the heartbeat interval all feed one
//! `select!` loop, so the session is only ever touched from one place.
//! State is published back to the handle through watch channels.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, Interval, MissedTickBehavior, Sleep};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::machine::{ConnectionId, Effect, Event, Session, SessionConfig, SessionStatus, TimerId};
use crate::endpoint::Endpoint;
use crate::error::{SessionError, SessionResult};
use crate::models::{validate_message, ChatEntry, Point, Stroke, StrokeId};
use crate::protocol::ClientMessage;

const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Commands sent to the session task
#[derive(Debug, Clone)]
pub enum SessionCommand {
    BeginStroke(Stroke),
    ExtendStroke { id: StrokeId, points: Vec<Point> },
    EndStroke { id: StrokeId },
    SendChat(String),
    Clear,
    Undo,
    Redo,
    ForceReconnect,
    Shutdown,
}

/// Handle to a running session
pub struct SessionHandle {
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    /// Watch connection status
    pub status_rx: watch::Receiver<SessionStatus>,
    /// Watch the stroke log
    pub canvas_rx: watch::Receiver<Arc<Vec<Stroke>>>,
    /// Watch the chat log
    pub chat_rx: watch::Receiver<Arc<Vec<ChatEntry>>>,
    display_name: String,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn begin_stroke(&self, stroke: Stroke) -> SessionResult<()> {
        self.send(SessionCommand::BeginStroke(stroke))
    }

    pub fn extend_stroke(&self, id: &str, points: Vec<Point>) -> SessionResult<()> {
        self.send(SessionCommand::ExtendStroke {
            id: id.to_string(),
            points,
        })
    }

    pub fn end_stroke(&self, id: &str) -> SessionResult<()> {
        self.send(SessionCommand::EndStroke { id: id.to_string() })
    }

    /// Send a chat message
    ///
    /// Empty or whitespace-only text is rejected here, before it reaches
    /// the session.
    pub fn send_chat(&self, text: &str) -> SessionResult<()> {
        let text = validate_message(text)?;
        self.send(SessionCommand::SendChat(text))
    }

    pub fn clear(&self) -> SessionResult<()> {
        self.send(SessionCommand::Clear)
    }

    pub fn undo(&self) -> SessionResult<()> {
        self.send(SessionCommand::Undo)
    }

    pub fn redo(&self) -> SessionResult<()> {
        self.send(SessionCommand::Redo)
    }

    pub fn force_reconnect(&self) -> SessionResult<()> {
        self.send(SessionCommand::ForceReconnect)
    }

    /// Dispose the session and wait for the task to finish
    pub async fn shutdown(self) {
        let _ = self.command_tx.send(SessionCommand::Shutdown);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Session task ended abnormally");
        }
    }

    fn send(&self, command: SessionCommand) -> SessionResult<()> {
        self.command_tx
            .send(command)
            .map_err(|_| SessionError::SessionClosed)
    }
}

/// Spawn a session task and start connecting
///
/// Must be called from within a tokio runtime.
pub fn spawn_session(config: SessionConfig) -> SessionResult<SessionHandle> {
    let session = Session::new(config)?;
    let display_name = session.config().display_name.clone();

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(session.status());
    let (canvas_tx, canvas_rx) = watch::channel(Arc::new(Vec::new()));
    let (chat_tx, chat_rx) = watch::channel(Arc::new(Vec::new()));

    let driver = Driver::new(session, command_rx, status_tx, canvas_tx, chat_tx);
    let task = tokio::spawn(driver.run());

    Ok(SessionHandle {
        command_tx,
        status_rx,
        canvas_rx,
        chat_rx,
        display_name,
        task,
    })
}

/// Messages from the driver to a connection task
#[derive(Debug)]
enum Outgoing {
    Message(ClientMessage),
    Close,
}

struct Connection {
    id: ConnectionId,
    outgoing_tx: mpsc::UnboundedSender<Outgoing>,
    task: JoinHandle<()>,
}

enum Step {
    Command(SessionCommand),
    Event(Event),
    Shutdown,
}

struct Driver {
    session: Session,
    command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,

    connection: Option<Connection>,
    /// Connection tasks still sending their close frame
    retiring: Vec<JoinHandle<()>>,
    backoff: Option<(TimerId, Pin<Box<Sleep>>)>,
    heartbeat: Option<Interval>,

    status_tx: watch::Sender<SessionStatus>,
    canvas_tx: watch::Sender<Arc<Vec<Stroke>>>,
    chat_tx: watch::Sender<Arc<Vec<ChatEntry>>>,
    canvas_revision: u64,
    chat_revision: u64,
}

impl Driver {
    fn new(
        session: Session,
        command_rx: mpsc::UnboundedReceiver<SessionCommand>,
        status_tx: watch::Sender<SessionStatus>,
        canvas_tx: watch::Sender<Arc<Vec<Stroke>>>,
        chat_tx: watch::Sender<Arc<Vec<ChatEntry>>>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            session,
            command_rx,
            events_tx,
            events_rx,
            connection: None,
            retiring: Vec::new(),
            backoff: None,
            heartbeat: None,
            status_tx,
            canvas_tx,
            chat_tx,
            canvas_revision: 0,
            chat_revision: 0,
        }
    }

    async fn run(mut self) {
        let effects = self.session.start();
        self.apply(effects);
        self.publish();

        loop {
            let step = tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => Step::Shutdown,
                    Some(command) => Step::Command(command),
                },
                Some(event) = self.events_rx.recv() => Step::Event(event),
                timer = backoff_elapsed(&mut self.backoff) => Step::Event(Event::BackoffElapsed(timer)),
                _ = heartbeat_tick(&mut self.heartbeat) => Step::Event(Event::HeartbeatTick),
            };

            match step {
                Step::Command(command) => self.on_command(command),
                Step::Event(event) => {
                    if matches!(event, Event::BackoffElapsed(_)) {
                        self.backoff = None;
                    }
                    let effects = self.session.handle(event, Instant::now());
                    self.apply(effects);
                }
                Step::Shutdown => break,
            }
            self.publish();
        }

        let effects = self.session.dispose();
        self.apply(effects);
        self.publish();

        for task in self.retiring.drain(..) {
            let _ = timeout(Duration::from_secs(1), task).await;
        }
        info!("Session stopped");
    }

    fn on_command(&mut self, command: SessionCommand) {
        let effects = match command {
            SessionCommand::BeginStroke(stroke) => self.session.begin_stroke(stroke),
            SessionCommand::ExtendStroke { id, points } => self.session.extend_stroke(&id, points),
            SessionCommand::EndStroke { id } => {
                self.session.end_stroke(&id);
                Vec::new()
            }
            // Validated by the handle before it was sent
            SessionCommand::SendChat(text) => self.session.post_chat(text),
            SessionCommand::Clear => {
                self.session.clear();
                Vec::new()
            }
            SessionCommand::Undo => {
                if !self.session.undo() {
                    debug!("Nothing to undo");
                }
                Vec::new()
            }
            SessionCommand::Redo => {
                if !self.session.redo() {
                    debug!("Nothing to redo");
                }
                Vec::new()
            }
            SessionCommand::ForceReconnect => self.session.force_reconnect(),
            // Handled by the run loop
            SessionCommand::Shutdown => Vec::new(),
        };
        self.apply(effects);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Connect { id, endpoint } => {
                    self.retire_connection();
                    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
                    let task = tokio::spawn(run_connection(
                        id,
                        endpoint,
                        self.session.config().connect_timeout,
                        outgoing_rx,
                        self.events_tx.clone(),
                    ));
                    self.connection = Some(Connection {
                        id,
                        outgoing_tx,
                        task,
                    });
                }
                Effect::Send(message) => match &self.connection {
                    Some(connection) => {
                        if connection.outgoing_tx.send(Outgoing::Message(message)).is_err() {
                            debug!("Connection task already gone, message dropped");
                        }
                    }
                    None => warn!("Send requested with no connection"),
                },
                Effect::Close(id) => {
                    if self.connection.as_ref().map(|c| c.id) == Some(id) {
                        self.retire_connection();
                    }
                }
                Effect::ScheduleReconnect { timer, delay } => {
                    self.backoff = Some((timer, Box::pin(sleep(delay))));
                }
                Effect::CancelReconnect(timer) => {
                    if matches!(&self.backoff, Some((pending, _)) if *pending == timer) {
                        self.backoff = None;
                    }
                }
                Effect::StartHeartbeat { interval } => {
                    // interval_at panics on a zero period
                    let interval = interval.max(MIN_HEARTBEAT_INTERVAL);
                    let mut ticker = interval_at(Instant::now() + interval, interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.heartbeat = Some(ticker);
                }
                Effect::StopHeartbeat => self.heartbeat = None,
            }
        }
    }

    fn retire_connection(&mut self) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.outgoing_tx.send(Outgoing::Close);
            self.retiring.retain(|task| !task.is_finished());
            self.retiring.push(connection.task);
        }
    }

    fn publish(&mut self) {
        let status = self.session.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });

        if self.session.canvas_revision() != self.canvas_revision {
            self.canvas_revision = self.session.canvas_revision();
            self.canvas_tx
                .send_replace(Arc::new(self.session.canvas().snapshot()));
        }

        if self.session.chat_revision() != self.chat_revision {
            self.chat_revision = self.session.chat_revision();
            self.chat_tx
                .send_replace(Arc::new(self.session.chat().entries().to_vec()));
        }
    }
}

async fn backoff_elapsed(backoff: &mut Option<(TimerId, Pin<Box<Sleep>>)>) -> TimerId {
    match backoff {
        Some((timer, delay)) => {
            delay.as_mut().await;
            *timer
        }
        None => pending().await,
    }
}

async fn heartbeat_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => pending().await,
    }
}

/// One WebSocket connection, from connect to close
///
/// Reports everything back as [`Event`]s tagged with `id`. Exits quietly
/// when told to close, since the session has already moved on.
async fn run_connection(
    id: ConnectionId,
    endpoint: Endpoint,
    connect_timeout: Duration,
    mut outgoing_rx: mpsc::UnboundedReceiver<Outgoing>,
    events: mpsc::UnboundedSender<Event>,
) {
    let url = endpoint.url();
    debug!(?id, %url, "Opening connection");

    let connecting = tokio::select! {
        result = timeout(connect_timeout, connect_async(url.as_str())) => result,
        _ = outgoing_rx.recv() => {
            debug!(?id, "Connection abandoned before open");
            return;
        }
    };

    let ws_stream = match connecting {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(e)) => {
            let _ = events.send(Event::Error(id, e.to_string()));
            return;
        }
        Err(_) => {
            let reason = format!("connect timed out after {}s", connect_timeout.as_secs());
            let _ = events.send(Event::Error(id, reason));
            return;
        }
    };

    let _ = events.send(Event::Opened(id));
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            outgoing = outgoing_rx.recv() => match outgoing {
                Some(Outgoing::Message(message)) => {
                    let text = match message.encode() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode outbound message");
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::Text(text)).await {
                        let _ = events.send(Event::Error(id, e.to_string()));
                        return;
                    }
                }
                Some(Outgoing::Close) | None => {
                    write.send(Message::Close(None)).await.ok();
                    return;
                }
            },

            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(Event::Frame(id, text));
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => {
                        let _ = events.send(Event::Frame(id, text));
                    }
                    Err(_) => warn!(?id, "Dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| f.reason.into_owned());
                    let _ = events.send(Event::Closed(id, reason));
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(Event::Error(id, e.to_string()));
                    return;
                }
                None => {
                    let _ = events.send(Event::Closed(id, None));
                    return;
                }
            },
        }
    }
}
