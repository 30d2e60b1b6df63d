//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时。execute(&Action) 永不失败：超时、工具错误、未知工具
//! 都经 RecoveryEngine 渲染为 `Error: …` 观察返回给循环；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::react::Action;
use crate::tools::{ToolRegistry, ToolSpec};

/// 一次工具调用的观察结果
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub text: String,
    pub success: bool,
}

impl Observation {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: true,
        }
    }

    pub fn failed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: false,
        }
    }
}

pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
    recovery: RecoveryEngine,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            recovery: RecoveryEngine::new(),
        }
    }

    /// 分派动作并返回观察；失败被渲染为 `Error: …`
    pub async fn execute(&self, action: &Action) -> Observation {
        let Some((tool, args)) = action.tool_call() else {
            return Observation::failed("Error: a final answer is not a tool call.");
        };
        match self.execute_tool(tool, args).await {
            Ok(text) => Observation::ok(text),
            Err(e) => match self.recovery.handle(&e) {
                RecoveryAction::RetryWithPrompt(text) => Observation::failed(text),
                RecoveryAction::Abort => Observation::failed(format!("Error: {e}")),
            },
        }
    }

    /// 执行指定工具；超时返回 ToolTimeout，工具返回 Err 则转为 ToolExecutionFailed；输出 JSON 审计日志
    pub async fn execute_tool(&self, tool_name: &str, args: Value) -> Result<String, AgentError> {
        let Some(tool) = self.registry.get(tool_name) else {
            return Err(AgentError::UnknownTool(tool_name.to_string()));
        };

        let start = Instant::now();
        let preview = args_preview(&args);
        let result = timeout(self.timeout, tool.execute(args)).await;

        let (ok, outcome) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(e)),
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }

    pub fn catalogue(&self) -> Vec<ToolSpec> {
        self.registry.catalogue()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;

    struct FakeSql {
        delay: Duration,
    }

    #[async_trait]
    impl Tool for FakeSql {
        fn name(&self) -> &str {
            "sql_query"
        }
        fn description(&self) -> &str {
            "fake"
        }
        async fn execute(&self, args: Value) -> Result<String, String> {
            tokio::time::sleep(self.delay).await;
            match args["sql"].as_str() {
                Some(sql) if sql.starts_with("SELECT") => Ok(r#"{"results":[],"count":0}"#.into()),
                _ => Err("near \"DROP\": syntax error".into()),
            }
        }
    }

    fn executor(delay: Duration, timeout_secs: u64) -> ToolExecutor {
        let mut reg = ToolRegistry::new();
        reg.register(FakeSql { delay });
        ToolExecutor::new(reg, timeout_secs)
    }

    #[tokio::test]
    async fn test_success_observation() {
        let ex = executor(Duration::ZERO, 5);
        let obs = ex
            .execute(&Action::StructuredQuery {
                query: "SELECT 1".into(),
            })
            .await;
        assert!(obs.success);
        assert!(obs.text.contains("\"count\":0"));
    }

    #[tokio::test]
    async fn test_tool_error_rendered() {
        let ex = executor(Duration::ZERO, 5);
        let obs = ex
            .execute(&Action::StructuredQuery {
                query: "DROP x".into(),
            })
            .await;
        assert!(!obs.success);
        assert!(obs.text.starts_with("Error: "));
        assert!(obs.text.contains("syntax error"));
    }

    #[tokio::test]
    async fn test_unregistered_tool_rendered() {
        let ex = executor(Duration::ZERO, 5);
        let obs = ex
            .execute(&Action::CrawlWeb {
                url: "https://example.com".into(),
            })
            .await;
        assert!(!obs.success);
        assert!(obs.text.starts_with("Error: Unknown action 'crawl_web'"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rendered() {
        let ex = executor(Duration::from_secs(60), 1);
        let obs = ex
            .execute(&Action::StructuredQuery {
                query: "SELECT 1".into(),
            })
            .await;
        assert!(!obs.success);
        assert!(obs.text.contains("timed out"));
    }

    #[tokio::test]
    async fn test_final_answer_is_not_dispatched() {
        let ex = executor(Duration::ZERO, 5);
        let obs = ex
            .execute(&Action::FinalAnswer { text: "done".into() })
            .await;
        assert!(!obs.success);
    }
}
