// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registry: type tag → constructor.
//!
//! Re-registration warns and overwrites; creating an unknown type is an
//! error. `builtin` wires the five standard agents to the pipeline's
//! dependencies.

use crate::agent::Agent;
use crate::agents::{
    AnalyzerAgent, PatternDetectorAgent, ReporterAgent, ResearcherAgent, ValidatorAgent,
};
use crate::pipeline::PipelineDeps;
use crate::settings::RunSettings;
use nw_core::AgentType;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no agent registered for type: {0}")]
    NotFound(AgentType),
}

/// Constructor for an agent instance.
pub type AgentCtor = Arc<dyn Fn() -> Box<dyn Agent> + Send + Sync>;

/// Mapping from agent type to constructor.
#[derive(Default)]
pub struct AgentRegistry {
    ctors: Mutex<HashMap<AgentType, AgentCtor>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the five built-in agents bound to `deps`.
    pub fn builtin(deps: Arc<PipelineDeps>, settings: &RunSettings) -> Self {
        let registry = Self::new();

        {
            let deps = Arc::clone(&deps);
            let analyzer = settings.analyzer.clone();
            registry.register(
                AgentType::Analyzer,
                Arc::new(move || {
                    Box::new(AnalyzerAgent::new(
                        Arc::clone(&deps.llm),
                        Arc::clone(&deps.code_host),
                        analyzer.clone(),
                    ))
                }),
            );
        }
        {
            let code_host = Arc::clone(&deps.code_host);
            registry.register(
                AgentType::Researcher,
                Arc::new(move || Box::new(ResearcherAgent::new(Arc::clone(&code_host)))),
            );
        }
        {
            let knowledge = deps.knowledge.clone();
            registry.register(
                AgentType::PatternDetector,
                Arc::new(move || Box::new(PatternDetectorAgent::new(knowledge.clone()))),
            );
        }
        {
            let notifier = Arc::clone(&deps.notifier);
            registry.register(
                AgentType::Reporter,
                Arc::new(move || Box::new(ReporterAgent::new(Arc::clone(&notifier)))),
            );
        }
        {
            let gate = settings.gate;
            registry.register(
                AgentType::Validator,
                Arc::new(move || Box::new(ValidatorAgent::new(gate))),
            );
        }

        registry
    }

    pub fn register(&self, agent_type: AgentType, ctor: AgentCtor) {
        let mut ctors = self.ctors.lock();
        if ctors.contains_key(&agent_type) {
            warn!(%agent_type, "overwriting agent registration");
        }
        ctors.insert(agent_type, ctor);
    }

    pub fn create_agent(&self, agent_type: AgentType) -> Result<Box<dyn Agent>, RegistryError> {
        let ctors = self.ctors.lock();
        let ctor = ctors
            .get(&agent_type)
            .ok_or(RegistryError::NotFound(agent_type))?;
        Ok(ctor())
    }

    pub fn registered(&self) -> Vec<AgentType> {
        self.ctors.lock().keys().copied().collect()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
