//! ReAct 主循环
//!
//! Reason -> Parse -> Act (Tool) -> Observe -> 下一轮，直到 Critic 接受最终答案或达到最大轮数。
//! 解析失败、答案被拒、工具错误都经 RecoveryEngine 变成纠正性 Observation 写回 transcript；
//! 模型提供方错误与取消直接返回 Err。

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::broadcast::Broadcaster;
use crate::core::{AgentError, LoopPhase, RecoveryAction, RecoveryEngine};
use crate::react::{
    parse_action, Action, AnswerCritic, CriticResult, Planner, ReactEvent, ReasoningTranscript,
    TranscriptStep,
};
use crate::tools::ToolExecutor;

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;
/// 思考内容展示最大字符数
const THINKING_PREVIEW_CHARS: usize = 800;

/// 一次 ReAct 运行的结果
#[derive(Debug)]
pub struct ReactOutcome {
    pub success: bool,
    /// 返回给用户的文本（成功时可能附带操作清单）
    pub response: String,
    /// 通过校验的最终答案原文
    pub answer: Option<String>,
    pub iterations_used: usize,
    pub phase: LoopPhase,
    pub transcript: ReasoningTranscript,
}

/// ReAct 会话配置
pub struct ReactSession<'a> {
    pub planner: &'a Planner,
    pub executor: &'a ToolExecutor,
    pub critic: &'a AnswerCritic,
    pub recovery: &'a RecoveryEngine,
    pub max_iterations: usize,
    /// 成功时是否在回复后附加操作清单
    pub append_trace: bool,
    pub cancel_token: Option<CancellationToken>,
    pub event_tx: Option<&'a UnboundedSender<ReactEvent>>,
    pub broadcaster: Option<&'a dyn Broadcaster>,
    pub room: &'a str,
}

impl<'a> ReactSession<'a> {
    pub fn new(
        planner: &'a Planner,
        executor: &'a ToolExecutor,
        critic: &'a AnswerCritic,
        recovery: &'a RecoveryEngine,
        max_iterations: usize,
    ) -> Self {
        Self {
            planner,
            executor,
            critic,
            recovery,
            max_iterations,
            append_trace: true,
            cancel_token: None,
            event_tx: None,
            broadcaster: None,
            room: "main",
        }
    }

    pub fn with_append_trace(mut self, append: bool) -> Self {
        self.append_trace = append;
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: &'a dyn Broadcaster, room: &'a str) -> Self {
        self.broadcaster = Some(broadcaster);
        self.room = room;
        self
    }

    fn send_event(&self, ev: ReactEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

fn advance(phase: &mut LoopPhase, next: LoopPhase) {
    debug_assert!(
        phase.can_transition_to(next),
        "illegal transition {phase:?} -> {next:?}"
    );
    *phase = next;
}

/// 执行 ReAct 循环
///
/// 至多调用 max_iterations 次模型；返回 Ok 时 success 表示是否得到通过校验的答案。
pub async fn react_loop(
    session: &ReactSession<'_>,
    question: &str,
) -> Result<ReactOutcome, AgentError> {
    let mut transcript = ReasoningTranscript::new();
    let mut phase = LoopPhase::Reasoning;
    let (init_prompt, init_completion, _) = session.planner.token_usage();

    for iteration in 1..=session.max_iterations {
        if session.is_cancelled() {
            session.send_event(ReactEvent::Error {
                text: "Cancelled".to_string(),
            });
            return Err(AgentError::Cancelled);
        }
        session.send_event(ReactEvent::StepUpdate {
            step: iteration,
            max_steps: session.max_iterations,
        });
        session.send_event(ReactEvent::Thinking);

        let output = match session.planner.next_step(question, &transcript).await {
            Ok(o) => o,
            Err(e) => {
                let err = AgentError::Llm(e);
                tracing::warn!(iteration, error = %err, "model call failed");
                match session.recovery.handle(&err) {
                    RecoveryAction::RetryWithPrompt(prompt) => {
                        session.send_event(ReactEvent::Recovery {
                            action: "RetryWithPrompt".to_string(),
                            detail: prompt.clone(),
                        });
                        transcript.push(TranscriptStep {
                            model_output: String::new(),
                            action: None,
                            observation: prompt,
                            tool_succeeded: false,
                        });
                        continue;
                    }
                    RecoveryAction::Abort => {
                        advance(&mut phase, LoopPhase::Failed);
                        session.send_event(ReactEvent::Recovery {
                            action: "Abort".to_string(),
                            detail: err.to_string(),
                        });
                        session.send_event(ReactEvent::Error {
                            text: err.to_string(),
                        });
                        return Err(err);
                    }
                }
            }
        };

        session.send_event(ReactEvent::ThinkingContent {
            text: preview(&output, THINKING_PREVIEW_CHARS),
        });

        match parse_action(&output) {
            Ok(Action::FinalAnswer { text }) => {
                match session.critic.evaluate(&text, &transcript) {
                    CriticResult::Approved => {
                        advance(&mut phase, LoopPhase::Answered);
                        let response = if session.append_trace && transcript.has_tool_success() {
                            format!(
                                "{text}\n\n---\nOperations performed:\n{}",
                                transcript.operations_summary()
                            )
                        } else {
                            text.clone()
                        };
                        session.send_event(ReactEvent::FinalAnswer { text: text.clone() });
                        let (cur_prompt, cur_completion, _) = session.planner.token_usage();
                        let prompt_tokens = cur_prompt.saturating_sub(init_prompt);
                        let completion_tokens = cur_completion.saturating_sub(init_completion);
                        session.send_event(ReactEvent::TokenUsage {
                            prompt_tokens,
                            completion_tokens,
                            total_tokens: prompt_tokens + completion_tokens,
                        });
                        if let Some(b) = session.broadcaster {
                            if let Err(e) = b.emit(&text, "ai", session.room) {
                                tracing::warn!(error = %e, "broadcast failed");
                            }
                        }
                        tracing::info!(iterations = iteration, "final answer accepted");
                        return Ok(ReactOutcome {
                            success: true,
                            response,
                            answer: Some(text),
                            iterations_used: iteration,
                            phase,
                            transcript,
                        });
                    }
                    CriticResult::Correction(correction) => {
                        let err = AgentError::AnswerRejected(correction.clone());
                        tracing::warn!(iteration, %correction, "final answer rejected");
                        session.send_event(ReactEvent::AnswerRejected { correction });
                        let observation = retry_text(session.recovery, &err);
                        transcript.push(TranscriptStep {
                            model_output: output,
                            action: Some(Action::FinalAnswer { text }),
                            observation,
                            tool_succeeded: false,
                        });
                    }
                }
            }
            Ok(action) => {
                advance(&mut phase, LoopPhase::ActionPending);
                if let Some((tool, args)) = action.tool_call() {
                    session.send_event(ReactEvent::ToolCall {
                        tool: tool.to_string(),
                        args,
                    });
                }
                let observation = session.executor.execute(&action).await;
                advance(&mut phase, LoopPhase::Observing);
                if let Some((tool, _)) = action.tool_call() {
                    session.send_event(ReactEvent::Observation {
                        tool: tool.to_string(),
                        preview: preview(&observation.text, OBSERVATION_PREVIEW_CHARS),
                        success: observation.success,
                    });
                }
                transcript.push(TranscriptStep {
                    model_output: output,
                    action: Some(action),
                    observation: observation.text,
                    tool_succeeded: observation.success,
                });
            }
            Err(failure) => {
                tracing::debug!(iteration, reason = %failure.reason, "unparseable model output");
                session.send_event(ReactEvent::ParseFailure {
                    reason: failure.reason.clone(),
                });
                let observation = retry_text(session.recovery, &failure.into());
                transcript.push(TranscriptStep {
                    model_output: output,
                    action: None,
                    observation,
                    tool_succeeded: false,
                });
            }
        }

        if phase == LoopPhase::Observing {
            advance(&mut phase, LoopPhase::Reasoning);
        }
    }

    advance(&mut phase, LoopPhase::Exhausted);
    let n = session.max_iterations;
    let response = if transcript.has_tool_success() {
        format!(
            "Unable to complete request after maximum iterations ({n}). \
             Tools returned results, but no acceptable final answer was produced."
        )
    } else {
        format!(
            "Unable to complete request after maximum iterations ({n}). \
             No tool was executed successfully, so no grounded answer could be produced."
        )
    };
    tracing::warn!(iterations = n, "react loop exhausted");
    session.send_event(ReactEvent::Exhausted { iterations: n });
    Ok(ReactOutcome {
        success: false,
        response,
        answer: None,
        iterations_used: n,
        phase,
        transcript,
    })
}

/// 可恢复错误的纠正文本
fn retry_text(recovery: &RecoveryEngine, err: &AgentError) -> String {
    match recovery.handle(err) {
        RecoveryAction::RetryWithPrompt(text) => text,
        RecoveryAction::Abort => format!("Error: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::broadcast::ChannelBroadcaster;
    use crate::llm::{LlmError, MockLlmClient};
    use crate::react::DEFAULT_PLACEHOLDER_PATTERNS;
    use crate::storage::SqliteStore;
    use crate::tools::{SqlQueryTool, ToolRegistry};

    fn executor() -> ToolExecutor {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let mut registry = ToolRegistry::new();
        registry.register(SqlQueryTool::new(store));
        ToolExecutor::new(registry, 5)
    }

    struct Fixture {
        llm: Arc<MockLlmClient>,
        planner: Planner,
        executor: ToolExecutor,
        critic: AnswerCritic,
        recovery: RecoveryEngine,
    }

    async fn fixture(script: Vec<&str>) -> Fixture {
        let llm = Arc::new(MockLlmClient::new(script));
        let executor = executor();
        Fixture {
            planner: Planner::new(llm.clone(), executor.catalogue()),
            llm,
            executor,
            critic: AnswerCritic::new(DEFAULT_PLACEHOLDER_PATTERNS, true).unwrap(),
            recovery: RecoveryEngine::new(),
        }
    }

    impl Fixture {
        fn session(&self, max: usize) -> ReactSession<'_> {
            ReactSession::new(&self.planner, &self.executor, &self.critic, &self.recovery, max)
        }
    }

    #[tokio::test]
    async fn test_tool_then_answer() {
        let f = fixture(vec![
            "Thought: count\nAction: sql_query\nAction Input: SELECT COUNT(*) AS n FROM skills",
            "Thought: done\nFinal Answer: You have 0 skills recorded.",
        ])
        .await;
        let out = react_loop(&f.session(5), "How many skills?").await.unwrap();
        assert!(out.success);
        assert_eq!(out.phase, LoopPhase::Answered);
        assert_eq!(out.iterations_used, 2);
        assert_eq!(out.answer.as_deref(), Some("You have 0 skills recorded."));
        assert!(out.response.contains("Operations performed:\n1. sql_query("));
        assert!(f.llm.prompts()[1].contains("\"results\":[{\"n\":0}]"));
    }

    #[tokio::test]
    async fn test_answer_without_tool_is_rejected_then_exhausts() {
        let f = fixture(vec![]).await;
        let llm = MockLlmClient::repeating("Final Answer: You went to MSU.");
        let planner = Planner::new(Arc::new(llm), f.executor.catalogue());
        let session = ReactSession::new(&planner, &f.executor, &f.critic, &f.recovery, 3);
        let out = react_loop(&session, "Where did I study?").await.unwrap();
        assert!(!out.success);
        assert_eq!(out.phase, LoopPhase::Exhausted);
        assert_eq!(out.transcript.len(), 3);
        assert!(out.response.starts_with("Unable to complete request after maximum iterations (3)."));
        assert!(out.response.contains("No tool was executed successfully"));
    }

    #[tokio::test]
    async fn test_tool_success_then_placeholders_exhausts() {
        let f = fixture(vec![
            "Action: sql_query\nAction Input: SELECT COUNT(*) AS n FROM skills",
            "Final Answer: Your top skill is [skill name].",
            "Thought: still thinking",
            "Final Answer: You know {{skills}}.",
        ])
        .await;
        let out = react_loop(&f.session(4), "What are my skills?").await.unwrap();
        assert!(!out.success);
        assert!(out.answer.is_none());
        assert_eq!(out.phase, LoopPhase::Exhausted);
        assert_eq!(out.iterations_used, 4);
        assert!(out.response.starts_with("Unable to complete request after maximum iterations (4)."));
        assert!(out
            .response
            .contains("Tools returned results, but no acceptable final answer was produced."));
    }

    #[tokio::test]
    async fn test_parse_failure_is_fed_back() {
        let f = fixture(vec![
            "I am not sure what to do.",
            "Action: sql_query\nAction Input: SELECT 1 AS one",
            "Final Answer: one",
        ])
        .await;
        let out = react_loop(&f.session(5), "q").await.unwrap();
        assert!(out.success);
        assert!(f.llm.prompts()[1].contains("No valid action found. Please specify an Action."));
    }

    #[tokio::test]
    async fn test_provider_error_aborts() {
        let f = fixture(vec![]).await;
        f.llm.push_error(LlmError::RateLimited("429".into()));
        let err = react_loop(&f.session(5), "q").await.unwrap_err();
        assert!(matches!(err, AgentError::Llm(LlmError::RateLimited(_))));
        assert_eq!(f.llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_call() {
        let f = fixture(vec!["Final Answer: x"]).await;
        let token = CancellationToken::new();
        token.cancel();
        let session = f.session(5).with_cancel_token(token);
        assert!(matches!(
            react_loop(&session, "q").await,
            Err(AgentError::Cancelled)
        ));
        assert_eq!(f.llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_events_and_broadcast() {
        let f = fixture(vec![
            "Action: sql_query\nAction Input: SELECT 1 AS one",
            "Final Answer: one",
        ])
        .await;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let b = ChannelBroadcaster::new(4);
        let mut sub = b.subscribe();
        let session = f
            .session(5)
            .with_append_trace(false)
            .with_event_tx(&tx)
            .with_broadcaster(&b, "lobby");
        let out = react_loop(&session, "q").await.unwrap();
        assert_eq!(out.response, "one");

        let msg = sub.recv().await.unwrap();
        assert_eq!((msg.text.as_str(), msg.room.as_str()), ("one", "lobby"));

        let mut saw_tool = false;
        let mut saw_final = false;
        while let Ok(ev) = rx.try_recv() {
            match ev {
                ReactEvent::ToolCall { tool, .. } => saw_tool = tool == "sql_query",
                ReactEvent::FinalAnswer { text } => saw_final = text == "one",
                _ => {}
            }
        }
        assert!(saw_tool && saw_final);
    }
}
