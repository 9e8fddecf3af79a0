// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory pub/sub message bus for inter-agent communication.
//!
//! Single-process and synchronous: publish stores the message under its
//! session and dispatches to matching subscribers in subscription order.
//! Every consumer receives an owned clone, so mutation by one handler is
//! invisible to the store and to other handlers. A failing handler is
//! logged and never blocks delivery to the rest.

use nw_core::{AgentMessage, AgentType, MessageType};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

/// Outcome of a message handler.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Handler = Arc<dyn Fn(AgentMessage) -> HandlerResult + Send + Sync>;

struct Subscription {
    id: String,
    recipient: AgentType,
    message_type: Option<MessageType>,
    handler: Handler,
}

/// Typed pub/sub with per-session message backlogs.
#[derive(Default)]
pub struct MessageBus {
    subscribers: Mutex<Vec<Subscription>>,
    messages: Mutex<HashMap<String, Vec<AgentMessage>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a recipient. `message_type = None` subscribes to all
    /// types. Returns the subscription id.
    pub fn subscribe<F>(
        &self,
        recipient: AgentType,
        message_type: Option<MessageType>,
        handler: F,
    ) -> String
    where
        F: Fn(AgentMessage) -> HandlerResult + Send + Sync + 'static,
    {
        let id = Uuid::new_v4().to_string();
        self.subscribers.lock().push(Subscription {
            id: id.clone(),
            recipient,
            message_type,
            handler: Arc::new(handler),
        });
        id
    }

    pub fn unsubscribe(&self, subscription_id: &str) {
        self.subscribers.lock().retain(|s| s.id != subscription_id);
    }

    /// Publish to the targeted agent, or to everyone when `to_agent` is
    /// unset.
    pub fn publish(&self, message: AgentMessage) {
        self.messages
            .lock()
            .entry(message.session_id.clone())
            .or_default()
            .push(message.clone());

        // Snapshot matching handlers so a handler that publishes again
        // does not re-enter the subscriber lock.
        let handlers: Vec<Handler> = {
            let subscribers = self.subscribers.lock();
            subscribers
                .iter()
                .filter(|sub| {
                    message
                        .to_agent
                        .map(|target| target == sub.recipient)
                        .unwrap_or(true)
                })
                .filter(|sub| {
                    sub.message_type
                        .map(|t| t == message.message_type)
                        .unwrap_or(true)
                })
                .map(|sub| Arc::clone(&sub.handler))
                .collect()
        };

        for handler in handlers {
            if let Err(e) = handler(message.clone()) {
                error!(error = %e, message_type = ?message.message_type, "message handler failed");
            }
        }
    }

    /// Publish with the target cleared, reaching every subscriber.
    pub fn broadcast(&self, mut message: AgentMessage) {
        message.to_agent = None;
        self.publish(message);
    }

    /// All messages stored for a session, in insertion order.
    pub fn get_messages(&self, session_id: &str) -> Vec<AgentMessage> {
        self.messages
            .lock()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Session messages sorted by priority, HIGH first. The sort is
    /// stable, so insertion order breaks ties.
    pub fn get_messages_by_priority(&self, session_id: &str) -> Vec<AgentMessage> {
        let mut messages = self.get_messages(session_id);
        messages.sort_by_key(|m| m.priority);
        messages
    }

    pub fn clear_session(&self, session_id: &str) {
        self.messages.lock().remove(session_id);
    }

    pub fn clear_all(&self) {
        self.subscribers.lock().clear();
        self.messages.lock().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
