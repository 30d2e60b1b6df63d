//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供 ReAct 循环决定是回灌纠正提示还是终止。
//! 可恢复：解析歧义、校验拒绝、工具错误；终止：模型提供方错误、取消、配置与计划格式错误。

use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::ParseFailure { observation, .. } => {
                RecoveryAction::RetryWithPrompt(observation.clone())
            }
            AgentError::AnswerRejected(correction) => {
                RecoveryAction::RetryWithPrompt(correction.clone())
            }
            AgentError::ToolExecutionFailed(msg) => {
                RecoveryAction::RetryWithPrompt(format!("Error: {msg}"))
            }
            AgentError::ToolTimeout(tool) => RecoveryAction::RetryWithPrompt(format!(
                "Error: tool '{tool}' timed out. Try a narrower request or a different tool."
            )),
            AgentError::UnknownTool(name) => RecoveryAction::RetryWithPrompt(format!(
                "Error: Unknown action '{name}'. Available: semantic_search, sql_query, crawl_web"
            )),
            AgentError::Storage(e) => RecoveryAction::RetryWithPrompt(format!("Error: {e}")),
            AgentError::Llm(_)
            | AgentError::InvalidPlan(_)
            | AgentError::Config(_)
            | AgentError::Cancelled => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    #[test]
    fn test_recovery_parse_failure_feeds_observation_back() {
        let engine = RecoveryEngine::new();
        let err = AgentError::ParseFailure {
            reason: "no action".to_string(),
            observation: "No valid action found. Please specify an Action.".to_string(),
        };
        match engine.handle(&err) {
            RecoveryAction::RetryWithPrompt(msg) => assert!(msg.contains("specify an Action")),
            other => panic!("Expected RetryWithPrompt, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_rejection_is_retried() {
        let engine = RecoveryEngine::new();
        let err = AgentError::AnswerRejected("use a tool first".to_string());
        assert_eq!(
            engine.handle(&err),
            RecoveryAction::RetryWithPrompt("use a tool first".to_string())
        );
    }

    #[test]
    fn test_recovery_tool_error_renders_error_prefix() {
        let engine = RecoveryEngine::new();
        let err = AgentError::ToolExecutionFailed("no such table: foo".to_string());
        match engine.handle(&err) {
            RecoveryAction::RetryWithPrompt(msg) => assert!(msg.starts_with("Error: ")),
            other => panic!("Expected RetryWithPrompt, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_provider_error_aborts() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Llm(LlmError::RateLimited("429".to_string()));
        assert_eq!(engine.handle(&err), RecoveryAction::Abort);
    }

    #[test]
    fn test_recovery_cancelled_aborts() {
        let engine = RecoveryEngine::new();
        assert_eq!(engine.handle(&AgentError::Cancelled), RecoveryAction::Abort);
    }
}
