// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inter-agent message types for pipeline orchestration.

use crate::agent::AgentType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of message flowing over the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    TaskAssigned,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    ErrorsReady,
    TracesReady,
    AnalysisReady,
    PatternsReady,
    ValidationComplete,
    PhaseComplete,
    IterationNeeded,
}

impl MessageType {
    /// Task lifecycle messages.
    pub fn is_task(self) -> bool {
        matches!(
            self,
            MessageType::TaskAssigned
                | MessageType::TaskStarted
                | MessageType::TaskCompleted
                | MessageType::TaskFailed
        )
    }

    /// Data-ready messages.
    pub fn is_data(self) -> bool {
        matches!(
            self,
            MessageType::ErrorsReady
                | MessageType::TracesReady
                | MessageType::AnalysisReady
                | MessageType::PatternsReady
                | MessageType::ValidationComplete
        )
    }

    /// Control-flow messages.
    pub fn is_control(self) -> bool {
        matches!(self, MessageType::PhaseComplete | MessageType::IterationNeeded)
    }
}

/// Delivery priority. Lower value sorts first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    High = 0,
    #[default]
    Medium = 1,
    Low = 2,
}

/// A message passed between agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_agent: Option<AgentType>,
    /// None means broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_agent: Option<AgentType>,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub priority: MessagePriority,
    #[serde(default)]
    pub session_id: String,
}

impl AgentMessage {
    pub fn new(message_type: MessageType, payload: Value, session_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from_agent: None,
            to_agent: None,
            message_type,
            payload,
            timestamp: Utc::now(),
            priority: MessagePriority::Medium,
            session_id: session_id.into(),
        }
    }

    pub fn from(mut self, agent: AgentType) -> Self {
        self.from_agent = Some(agent);
        self
    }

    pub fn to(mut self, agent: AgentType) -> Self {
        self.to_agent = Some(agent);
        self
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
