//! Critic：最终答案校验
//!
//! 不调用模型，只做确定性检查：
//! - 可配置地要求本次请求至少有一次工具调用成功
//! - 答案中出现模板占位符（如 `[list of companies]`）即拒绝
//!
//! 拒绝时返回 Correction，作为下一轮的 Observation 回灌。

use regex::Regex;

use crate::react::ReasoningTranscript;

/// 默认占位符模式（可在配置 `react.placeholder_patterns` 中覆盖）
pub const DEFAULT_PLACEHOLDER_PATTERNS: &[&str] = &[
    r"(?i)\[\s*(?:list of|insert|your|name of|placeholder|company|companies|institution|skill|date|number|value)[^\]]*\]",
    r"\{\{[^}]*\}\}",
    r"(?i)<\s*(?:insert|placeholder|your)[^>]*>",
];

const NO_TOOL_CORRECTION: &str = "Error: You must use at least one tool (semantic_search, sql_query or crawl_web) and base your Final Answer on its results.";

/// Critic 评估结果：通过或需修正
#[derive(Debug, Clone, PartialEq)]
pub enum CriticResult {
    Approved,
    Correction(String),
}

#[derive(Debug)]
pub struct AnswerCritic {
    require_tool: bool,
    placeholders: Vec<Regex>,
}

impl AnswerCritic {
    /// 编译占位符模式；任一模式非法即返回错误
    pub fn new<S: AsRef<str>>(patterns: &[S], require_tool: bool) -> Result<Self, regex::Error> {
        let placeholders = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            require_tool,
            placeholders,
        })
    }

    pub fn evaluate(&self, answer: &str, transcript: &ReasoningTranscript) -> CriticResult {
        if self.require_tool && !transcript.has_tool_success() {
            return CriticResult::Correction(NO_TOOL_CORRECTION.to_string());
        }
        for re in &self.placeholders {
            if let Some(m) = re.find(answer) {
                return CriticResult::Correction(format!(
                    "Error: Your Final Answer contains template placeholder text ('{}'). \
                     Replace it with the actual values from the observations, or call a tool to retrieve them.",
                    m.as_str()
                ));
            }
        }
        CriticResult::Approved
    }
}

impl Default for AnswerCritic {
    fn default() -> Self {
        Self {
            require_tool: true,
            placeholders: DEFAULT_PLACEHOLDER_PATTERNS
                .iter()
                .filter_map(|p| match Regex::new(p) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(pattern = %p, error = %e, "skipping invalid placeholder pattern");
                        None
                    }
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::react::{Action, TranscriptStep};

    fn with_success() -> ReasoningTranscript {
        let mut t = ReasoningTranscript::new();
        t.push(TranscriptStep {
            model_output: "Action: sql_query\nAction Input: SELECT 1".into(),
            action: Some(Action::StructuredQuery {
                query: "SELECT 1".into(),
            }),
            observation: "[{\"1\":1}]".into(),
            tool_succeeded: true,
        });
        t
    }

    #[test]
    fn test_default_patterns_compile() {
        let critic = AnswerCritic::new(DEFAULT_PLACEHOLDER_PATTERNS, true).unwrap();
        assert_eq!(critic.placeholders.len(), DEFAULT_PLACEHOLDER_PATTERNS.len());
        assert_eq!(
            AnswerCritic::default().placeholders.len(),
            DEFAULT_PLACEHOLDER_PATTERNS.len()
        );
    }

    #[test]
    fn test_rejects_without_tool_success() {
        let critic = AnswerCritic::default();
        let r = critic.evaluate("You know Rust.", &ReasoningTranscript::new());
        assert_eq!(r, CriticResult::Correction(NO_TOOL_CORRECTION.to_string()));
    }

    #[test]
    fn test_tool_rule_can_be_disabled() {
        let critic = AnswerCritic::new(DEFAULT_PLACEHOLDER_PATTERNS, false).unwrap();
        assert_eq!(
            critic.evaluate("Hello!", &ReasoningTranscript::new()),
            CriticResult::Approved
        );
    }

    #[test]
    fn test_rejects_placeholder_even_after_tool_success() {
        let critic = AnswerCritic::default();
        for answer in [
            "You worked at [list of companies].",
            "Your skills are {{skills}}.",
            "You studied at <insert institution>.",
        ] {
            match critic.evaluate(answer, &with_success()) {
                CriticResult::Correction(c) => assert!(c.contains("placeholder"), "{c}"),
                CriticResult::Approved => panic!("accepted {answer:?}"),
            }
        }
    }

    #[test]
    fn test_approves_grounded_answer() {
        let critic = AnswerCritic::default();
        assert_eq!(
            critic.evaluate("You studied at Michigan State University [1].", &with_success()),
            CriticResult::Approved
        );
    }

    #[test]
    fn test_invalid_pattern_is_error() {
        assert!(AnswerCritic::new(&["(unclosed"], true).is_err());
    }
}
