//! Outbound queue for messages composed while disconnected
//!
//! Queued messages are replayed in enqueue order once a connection opens.
//! There is no acknowledgment tracking: a message handed to the connection
//! counts as delivered.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::protocol::ClientMessage;

/// A message waiting for a connection
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub payload: ClientMessage,
    pub enqueued_at: DateTime<Utc>,
    /// Chat log entry to mark sent when this message is flushed
    pub chat_entry: Option<usize>,
}

/// What happened to a message passed to `try_send`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Queued,
}

/// FIFO of messages waiting for a connection
#[derive(Debug, Default)]
pub struct OutboundQueue {
    queue: VecDeque<QueuedMessage>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message for later replay
    pub fn enqueue(&mut self, payload: ClientMessage, chat_entry: Option<usize>) {
        self.queue.push_back(QueuedMessage {
            payload,
            enqueued_at: Utc::now(),
            chat_entry,
        });
    }

    /// Hand every queued message to `send` in enqueue order, leaving the
    /// queue empty. Returns how many were flushed.
    pub fn flush(&mut self, mut send: impl FnMut(QueuedMessage)) -> usize {
        let count = self.queue.len();
        for queued in self.queue.drain(..) {
            send(queued);
        }
        count
    }

    /// Send immediately when `open`, otherwise queue
    pub fn try_send(
        &mut self,
        open: bool,
        payload: ClientMessage,
        chat_entry: Option<usize>,
        send: impl FnOnce(ClientMessage),
    ) -> Delivery {
        if open {
            send(payload);
            Delivery::Sent
        } else {
            self.enqueue(payload, chat_entry);
            Delivery::Queued
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Iterate queued messages oldest first
    pub fn iter(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.queue.iter()
    }
}
