//! 请求入口：风险确认流程 + 按编排模式分派
//!
//! handle_message 先处理挂起的确认（yes / no / 其他），再对新消息做风险评估；
//! 高风险消息挂起等待确认，低风险消息交给 handle_request（ReAct 或计划执行）。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::agent::AgentComponents;
use crate::config::OrchestrationMode;
use crate::core::risk::ConfirmationReply;
use crate::core::AgentError;
use crate::crawler::clean_page_content;
use crate::memory::{Message, PendingAction, SessionState};
use crate::plan::ExpertResult;
use crate::react::{react_loop, ReactEvent, ReactSession};

pub const PROVIDER_ERROR_RESPONSE: &str =
    "I'm sorry, I'm having trouble right now. Please try again later.";
pub const CANCELLED_RESPONSE: &str = "Action cancelled.";
pub const CONFIRM_PROMPT: &str = "Please respond with 'yes' to proceed or 'no' to cancel.";

/// 用户当前浏览的页面
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    pub title: String,
    pub url: String,
    pub content: String,
}

impl PageContext {
    /// 内容经 HTML 清洗后的副本
    pub fn cleaned(&self) -> Self {
        Self {
            content: clean_page_content(&self.content),
            ..self.clone()
        }
    }
}

/// 一次请求的回复
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub response: String,
    /// 回复是一个 yes/no 确认提示
    pub requires_confirmation: bool,
    /// 计划执行模式的子结果
    pub expert_results: Vec<ExpertResult>,
    pub iterations: usize,
}

impl ChatResponse {
    fn text(success: bool, response: impl Into<String>) -> Self {
        Self {
            success,
            response: response.into(),
            ..Self::default()
        }
    }

    fn confirmation(response: impl Into<String>) -> Self {
        Self {
            success: true,
            requires_confirmation: true,
            ..Self::text(true, response)
        }
    }
}

/// 对话服务：共享组件，按会话处理消息
pub struct ChatService {
    components: Arc<AgentComponents>,
    event_tx: Option<UnboundedSender<ReactEvent>>,
    cancel_token: Option<CancellationToken>,
}

impl ChatService {
    pub fn new(components: Arc<AgentComponents>) -> Self {
        Self {
            components,
            event_tx: None,
            cancel_token: None,
        }
    }

    /// ReAct 过程事件推送
    pub fn with_event_tx(mut self, tx: UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn components(&self) -> &AgentComponents {
        &self.components
    }

    /// 处理一条用户消息（含风险确认流程），并写入会话历史
    pub async fn handle_message(
        &self,
        session: &mut SessionState,
        message: &str,
        page: Option<&PageContext>,
    ) -> ChatResponse {
        if session.pending.is_some() {
            return match self.components.risk.classify_reply(message) {
                ConfirmationReply::Confirm => {
                    let Some(pending) = session.take_pending() else {
                        return ChatResponse::text(false, CONFIRM_PROMPT);
                    };
                    tracing::info!(session = %session.id, "pending action confirmed");
                    self.answer(session, &pending.message, page).await
                }
                ConfirmationReply::Cancel => {
                    session.take_pending();
                    tracing::info!(session = %session.id, "pending action cancelled");
                    ChatResponse::text(true, CANCELLED_RESPONSE)
                }
                ConfirmationReply::Unclear => ChatResponse::confirmation(CONFIRM_PROMPT),
            };
        }

        let assessment = self.components.risk.assess(message);
        if assessment.is_high() {
            tracing::warn!(
                session = %session.id,
                keywords = ?assessment.keywords,
                "high-risk message held for confirmation"
            );
            session.pending = Some(PendingAction::new(message));
            return ChatResponse::confirmation(format!(
                "Warning: {}\n\nDo you want to proceed? (yes/no)",
                assessment.explanation
            ));
        }

        self.answer(session, message, page).await
    }

    async fn answer(
        &self,
        session: &mut SessionState,
        message: &str,
        page: Option<&PageContext>,
    ) -> ChatResponse {
        let history = session.history.messages().to_vec();
        let response = self.handle_request(message, page, &history).await;
        session.history.push_exchange(message, response.response.clone());
        response
    }

    /// 按配置的编排模式处理请求；不做风险评估，不写历史
    pub async fn handle_request(
        &self,
        question: &str,
        page: Option<&PageContext>,
        history: &[Message],
    ) -> ChatResponse {
        let c = &self.components;
        let mode = c.config.app.mode;
        tracing::info!(?mode, question_chars = question.len(), "orchestration started");

        let result = match mode {
            OrchestrationMode::React => self.run_react(question).await,
            OrchestrationMode::PlanExecute => {
                let page = page.map(PageContext::cleaned);
                c.plan_executor
                    .run(question, page.as_ref(), history)
                    .await
                    .map(|out| ChatResponse {
                        success: out.success,
                        response: out.response,
                        requires_confirmation: false,
                        iterations: out.call_count,
                        expert_results: out.expert_results,
                    })
            }
        };

        match result {
            Ok(resp) => {
                tracing::info!(success = resp.success, iterations = resp.iterations, "orchestration finished");
                resp
            }
            Err(AgentError::Cancelled) => ChatResponse::text(false, CANCELLED_RESPONSE),
            Err(e) => {
                tracing::warn!(error = %e, "orchestration failed");
                ChatResponse::text(false, PROVIDER_ERROR_RESPONSE)
            }
        }
    }

    async fn run_react(&self, question: &str) -> Result<ChatResponse, AgentError> {
        let c = &self.components;
        let mut session = ReactSession::new(
            &c.planner,
            &c.executor,
            &c.critic,
            &c.recovery,
            c.config.react.max_iterations,
        )
        .with_append_trace(c.config.react.append_trace)
        .with_broadcaster(c.broadcaster.as_ref(), &c.config.app.room);
        if let Some(tx) = &self.event_tx {
            session = session.with_event_tx(tx);
        }
        if let Some(token) = &self.cancel_token {
            session = session.with_cancel_token(token.clone());
        }

        let outcome = react_loop(&session, question).await?;
        Ok(ChatResponse {
            success: outcome.success,
            response: outcome.response,
            requires_confirmation: false,
            expert_results: Vec::new(),
            iterations: outcome.iterations_used,
        })
    }
}
