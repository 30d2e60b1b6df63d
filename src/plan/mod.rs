//! 计划执行模式（Plan-and-Execute）
//!
//! 1. Orchestrator 角色一次性输出专家调用序列
//! 2. 按顺序执行每个调用（每次执行前从存储刷新角色模板）
//! 3. 用全部子结果与原始问题做一次综合，得到最终回复
//!
//! 计划无法解析时直接返回失败，不重试、不部分执行。

pub mod commands;
pub mod experts;
pub mod parser;

use std::sync::Arc;

use serde::Serialize;

pub use commands::{CommandError, ExperienceRef, WriteCommand};
pub use experts::{extract_read_only_sql, ExpertResult, ExpertRunner};
pub use parser::{parse_plan, ExpertCall};

use crate::broadcast::Broadcaster;
use crate::core::{AgentError, PageContext};
use crate::llm::{complete_with_role, LlmClient, RoleRegistry};
use crate::memory::{Message, Role};
use crate::storage::RoleSource;

const ORCHESTRATOR_ROLE: &str = "Orchestrator";

pub const INVALID_PLAN_RESPONSE: &str =
    "Invalid orchestrator format: no expert calls could be extracted from the plan.";

/// 一次计划执行的结果
#[derive(Debug, Clone, Serialize)]
pub struct PlanOutcome {
    pub success: bool,
    pub response: String,
    pub expert_results: Vec<ExpertResult>,
    pub call_count: usize,
}

pub struct PlanExecutor {
    llm: Arc<dyn LlmClient>,
    runner: ExpertRunner,
    roles: Arc<RoleRegistry>,
    role_source: Option<Arc<dyn RoleSource>>,
    broadcaster: Option<Arc<dyn Broadcaster>>,
    room: String,
}

impl PlanExecutor {
    pub fn new(llm: Arc<dyn LlmClient>, runner: ExpertRunner, roles: Arc<RoleRegistry>) -> Self {
        Self {
            llm,
            runner,
            roles,
            role_source: None,
            broadcaster: None,
            room: "main".to_string(),
        }
    }

    /// 每个专家调用前从该来源刷新角色
    pub fn with_role_source(mut self, source: Arc<dyn RoleSource>) -> Self {
        self.role_source = Some(source);
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>, room: impl Into<String>) -> Self {
        self.broadcaster = Some(broadcaster);
        self.room = room.into();
        self
    }

    /// 执行计划；只有模型提供方错误返回 Err
    pub async fn run(
        &self,
        question: &str,
        page: Option<&PageContext>,
        history: &[Message],
    ) -> Result<PlanOutcome, AgentError> {
        let orchestrator = self.roles.snapshot().resolve(ORCHESTRATOR_ROLE);
        let request = plan_request(question, history);
        let plan = complete_with_role(self.llm.as_ref(), &request, Some(&orchestrator)).await?;
        tracing::debug!(%plan, "orchestrator plan");

        let calls = parse_plan(&plan);
        if calls.is_empty() {
            let err = AgentError::InvalidPlan(plan.chars().take(200).collect());
            tracing::warn!(error = %err, "rejecting orchestrator output");
            return Ok(PlanOutcome {
                success: false,
                response: INVALID_PLAN_RESPONSE.to_string(),
                expert_results: Vec::new(),
                call_count: 0,
            });
        }
        tracing::info!(calls = calls.len(), "executing plan");

        let mut results = Vec::with_capacity(calls.len());
        for call in &calls {
            self.refresh_roles().await;
            let roles = self.roles.snapshot();
            let result = self.runner.run(&roles, call, page).await;
            tracing::info!(role = %call.role, success = result.success, "expert call finished");
            results.push(result);
        }

        let prompt = synthesis_prompt(question, &results);
        let response = self.llm.complete(&[Message::user(prompt)]).await?;
        let response = response.trim().to_string();

        if let Some(b) = &self.broadcaster {
            if let Err(e) = b.emit(&response, "ai", &self.room) {
                tracing::warn!(error = %e, "broadcast failed");
            }
        }

        Ok(PlanOutcome {
            success: true,
            response,
            call_count: results.len(),
            expert_results: results,
        })
    }

    async fn refresh_roles(&self) {
        if let Some(source) = &self.role_source {
            if let Err(e) = self.roles.refresh_from(source.as_ref()).await {
                tracing::warn!(error = %e, "role refresh failed, keeping current roles");
            }
        }
    }
}

/// 规划请求：最近的对话历史 + 当前问题
fn plan_request(question: &str, history: &[Message]) -> String {
    if history.is_empty() {
        return question.to_string();
    }
    let mut out = String::from("Conversation so far:\n");
    for m in history {
        let who = match m.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        };
        out.push_str(&format!("{who}: {}\n", m.content));
    }
    out.push_str(&format!("\nCurrent question: {question}"));
    out
}

/// 综合 prompt：结构化子结果 + 原始问题
pub fn synthesis_prompt(question: &str, results: &[ExpertResult]) -> String {
    let results_json =
        serde_json::to_string_pretty(results).unwrap_or_else(|_| format!("{results:?}"));
    format!(
        "You are a response synthesizer. Several experts worked on parts of the user's question.\n\n\
         Expert results:\n{results_json}\n\n\
         Original question: {question}\n\n\
         Write one direct, concise final answer for the user based only on these results. \
         If an expert failed, say what could not be completed."
    )
}
