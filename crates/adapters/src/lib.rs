// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nw-adapters: Capability interfaces to the external collaborators.
//!
//! The engine depends on the traits in this crate, never on the wire
//! protocols behind them. Each collaborator gets a narrow trait and one
//! concrete client; the `test-support` feature adds in-memory fakes.

pub mod chat;
pub mod code_host;
pub mod llm;
pub mod observability;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use chat::{ChatError, ChatNotifier, SlackClient};
pub use code_host::{
    CodeHost, CodeHostError, DirEntry, ExistingIssue, GitHubClient, SearchHit,
};
pub use llm::{
    AnthropicClient, BatchHandle, BatchRequest, BatchResultItem, BatchResultValue, ChatMessage,
    ContentBlock, ContextManagement, LlmApi, LlmError, MessageContent, MessageRequest,
    MessageResponse, RequestCounts, Role, StopReason, SystemBlock, ThinkingConfig, ToolSpec, Usage,
};
pub use observability::{NewRelicClient, ObservabilityApi, ObservabilityError};

#[cfg(any(test, feature = "test-support"))]
pub use test_support::{FakeCodeHost, FakeLlm, FakeNotifier, FakeObservability};
