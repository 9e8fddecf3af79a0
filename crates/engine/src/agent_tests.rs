// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nw_core::AgentOutput;

struct ScriptedAgent {
    core: AgentCore,
    delay: Duration,
    fail: bool,
}

impl ScriptedAgent {
    fn new(timeout_seconds: u64) -> Self {
        let mut config = AgentConfig::named("scripted");
        config.timeout_seconds = timeout_seconds;
        Self {
            core: AgentCore::new(config),
            delay: Duration::from_millis(0),
            fail: false,
        }
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Validator
    }

    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn run(&mut self, _ctx: &AgentContext) -> Result<AgentResult, AgentRunError> {
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(AgentRunError::Other("scripted failure".to_string()));
        }
        Ok(AgentResult::ok(AgentOutput::Report { summary_sent: false }))
    }
}

fn ctx() -> AgentContext {
    AgentContext {
        session_id: "s1".to_string(),
        run_id: "s1".to_string(),
        dry_run: true,
        input: AgentInput::Research { hours: 24 },
    }
}

#[tokio::test]
async fn successful_run_completes_with_timing() {
    let mut agent = ScriptedAgent::new(5);
    let result = agent.execute(&ctx()).await;
    assert!(result.success);
    assert_eq!(agent.core().status(), AgentStatus::Completed);
}

#[tokio::test]
async fn error_becomes_recoverable_execution_error() {
    let mut agent = ScriptedAgent::new(5);
    agent.fail = true;
    let result = agent.execute(&ctx()).await;
    assert!(!result.success);
    assert_eq!(result.error_code, Some(AgentErrorCode::ExecutionError));
    assert!(result.recoverable);
    assert_eq!(agent.core().status(), AgentStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn deadline_expiry_times_out() {
    let mut agent = ScriptedAgent::new(1);
    agent.delay = Duration::from_secs(10);
    let result = agent.execute(&ctx()).await;
    assert!(!result.success);
    assert_eq!(result.error_code, Some(AgentErrorCode::Timeout));
    assert!(result.recoverable);
    assert!(result
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("timed out after 1s"));
    assert_eq!(agent.core().status(), AgentStatus::Failed);
}

#[test]
fn lifecycle_attaches_and_detaches_bus() {
    let mut core = AgentCore::new(AgentConfig::named("x"));
    let bus = Arc::new(MessageBus::new());
    core.initialize(Some(Arc::clone(&bus)));
    assert_eq!(core.status(), AgentStatus::Idle);

    core.send_message(
        AgentType::Analyzer,
        MessageType::AnalysisReady,
        serde_json::json!({}),
        None,
        "s1",
    );
    assert_eq!(bus.get_messages("s1").len(), 1);

    core.cleanup();
    // With no bus attached the send is silently dropped.
    core.send_message(
        AgentType::Analyzer,
        MessageType::AnalysisReady,
        serde_json::json!({}),
        None,
        "s1",
    );
    assert_eq!(bus.get_messages("s1").len(), 1);
}

#[test]
fn confidence_mapping() {
    assert_eq!(confidence_score(Confidence::High), 0.9);
    assert_eq!(confidence_score(Confidence::Medium), 0.6);
    assert_eq!(confidence_score(Confidence::Low), 0.3);
}
