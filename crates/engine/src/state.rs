// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session pipeline state with immutable snapshots.
//!
//! Writers publish a fresh `Arc<PipelineState>` per update; readers
//! holding an older snapshot never observe later changes. No locks are
//! held across reads.

use nw_core::{Clock, ExecutionPhase, PipelineState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("no state for session: {0}")]
    NotFound(String),
}

/// Manages one immutable state snapshot per session.
pub struct StateManager {
    states: Mutex<HashMap<String, Arc<PipelineState>>>,
    clock: Arc<dyn Clock>,
}

impl StateManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Create and store a fresh state in the INGESTION phase.
    pub fn initialize_state(&self, session_id: &str) -> Arc<PipelineState> {
        let state = Arc::new(PipelineState::new(session_id, self.clock.now()));
        self.states
            .lock()
            .insert(session_id.to_string(), Arc::clone(&state));
        debug!(session_id, "initialized pipeline state");
        state
    }

    /// Current snapshot for a session.
    pub fn get_state(&self, session_id: &str) -> Result<Arc<PipelineState>, StateError> {
        self.states
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| StateError::NotFound(session_id.to_string()))
    }

    /// Apply `update` to a copy of the current snapshot and publish the
    /// result. `last_updated` always advances.
    pub fn update_state(
        &self,
        session_id: &str,
        update: impl FnOnce(&mut PipelineState),
    ) -> Result<Arc<PipelineState>, StateError> {
        let mut states = self.states.lock();
        let current = states
            .get(session_id)
            .ok_or_else(|| StateError::NotFound(session_id.to_string()))?;

        let mut next = current.as_ref().clone();
        update(&mut next);
        next.timestamps.last_updated = Some(self.clock.now());

        let next = Arc::new(next);
        states.insert(session_id.to_string(), Arc::clone(&next));
        Ok(next)
    }

    /// Transition to a new phase, stamping `phase_started`.
    pub fn set_phase(
        &self,
        session_id: &str,
        phase: ExecutionPhase,
    ) -> Result<Arc<PipelineState>, StateError> {
        let now = self.clock.now();
        self.update_state(session_id, |state| {
            state.current_phase = phase;
            state.timestamps.phase_started = Some(now);
        })
    }

    /// Bump the iteration counter by one.
    pub fn increment_iteration(&self, session_id: &str) -> Result<Arc<PipelineState>, StateError> {
        self.update_state(session_id, |state| {
            state.iteration_count += 1;
        })
    }

    /// Transition to the terminal COMPLETE phase.
    pub fn complete(&self, session_id: &str) -> Result<Arc<PipelineState>, StateError> {
        let now = self.clock.now();
        self.update_state(session_id, |state| {
            state.current_phase = ExecutionPhase::Complete;
            state.timestamps.completed = Some(now);
        })
    }

    /// Discard the snapshot for a session.
    pub fn remove_state(&self, session_id: &str) {
        self.states.lock().remove(session_id);
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
