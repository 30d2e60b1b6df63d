//! Planner：构建 ReAct prompt 并调用 LLM
//!
//! 每轮都是一次无状态补全：prompt 中包含工具目录、表结构说明、检索策略、硬性约束、原始问题与完整 transcript，
//! 不向客户端传入历史消息，连续性完全来自 transcript。

use std::sync::Arc;

use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;
use crate::react::ReasoningTranscript;
use crate::storage::schema::SCHEMA_DESCRIPTION;
use crate::tools::ToolSpec;

const GUIDANCE: &str = "\
Search strategy:
- Users often use abbreviations (e.g. \"MSU\" for Michigan State University, \"ML\" for machine learning). \
Expand them in your head and prefer semantic_search for fuzzy names, nicknames or topics.
- Use sql_query for exact filters, counts and joins once you know the exact names or ids.
- Use crawl_web only when the user gives a URL or asks about a web page.";

const CONSTRAINTS: &str = "\
Rules:
- You MUST execute at least one tool and read its Observation before giving a Final Answer.
- Never write template placeholders such as [list of companies] or {{name}} in a Final Answer.
- Only mention institutions, positions, skills or dates that appear in an Observation.
- Issue exactly one Action per reply, then stop and wait for the Observation.";

const FORMAT: &str = "\
Reply in this format:
Thought: <your reasoning>
Action: <tool name>
Action Input: <tool arguments>

or, when the observations answer the question:
Thought: <your reasoning>
Final Answer: <answer for the user>";

/// 拼装一轮 ReAct prompt
pub fn build_react_prompt(
    tools: &[ToolSpec],
    question: &str,
    transcript: &ReasoningTranscript,
) -> String {
    let catalogue = tools
        .iter()
        .map(|t| {
            format!(
                "- {}: {}\n  Parameters: {}\n  Example: {}",
                t.name, t.description, t.parameters, t.usage
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = format!(
        "You answer questions about a person's résumé stored in a database.\n\n\
         Available tools:\n{catalogue}\n\n\
         {SCHEMA_DESCRIPTION}\n\n\
         {GUIDANCE}\n\n\
         {CONSTRAINTS}\n\n\
         {FORMAT}\n\n\
         Question: {question}\n"
    );
    if !transcript.is_empty() {
        prompt.push_str("\nPrevious steps:\n");
        prompt.push_str(&transcript.to_prompt_section());
    }
    prompt
}

/// Planner：持有 LLM 与工具目录
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    tools: Vec<ToolSpec>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Vec<ToolSpec>) -> Self {
        Self { llm, tools }
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 请求下一步：单条 user 消息，无历史
    pub async fn next_step(
        &self,
        question: &str,
        transcript: &ReasoningTranscript,
    ) -> Result<String, LlmError> {
        let prompt = build_react_prompt(&self.tools, question, transcript);
        tracing::debug!(chars = prompt.len(), steps = transcript.len(), "react prompt");
        self.llm.complete(&[Message::user(prompt)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::react::TranscriptStep;

    fn spec() -> ToolSpec {
        ToolSpec {
            name: "sql_query".into(),
            description: "Run SQL".into(),
            parameters: "sql (string: SQL statement)".into(),
            usage: "Action: sql_query\nAction Input: SELECT 1".into(),
        }
    }

    #[test]
    fn test_prompt_sections() {
        let mut t = ReasoningTranscript::new();
        let prompt = build_react_prompt(&[spec()], "Where did I study?", &t);
        assert!(prompt.contains("- sql_query: Run SQL"));
        assert!(prompt.contains(SCHEMA_DESCRIPTION));
        assert!(prompt.contains("at least one tool"));
        assert!(prompt.contains("Question: Where did I study?"));
        assert!(!prompt.contains("Previous steps"));

        t.push(TranscriptStep {
            model_output: "Action: nope".into(),
            action: None,
            observation: "Error: Unknown action 'nope'".into(),
            tool_succeeded: false,
        });
        let prompt = build_react_prompt(&[spec()], "Where did I study?", &t);
        assert!(prompt.contains("Previous steps:\nAction: nope\nObservation: Error: Unknown action 'nope'"));
    }

    #[tokio::test]
    async fn test_next_step_sends_single_stateless_message() {
        let llm = Arc::new(MockLlmClient::new(["Thought: hi"]));
        let planner = Planner::new(llm.clone(), vec![spec()]);
        let out = planner
            .next_step("q", &ReasoningTranscript::new())
            .await
            .unwrap();
        assert_eq!(out, "Thought: hi");
        assert_eq!(llm.call_count(), 1);
        assert!(llm.prompts()[0].contains("Question: q"));
    }
}
