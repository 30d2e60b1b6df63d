//! 风险闸门：在编排前筛查破坏性意图
//!
//! 大小写不敏感的子串匹配（delete / remove / clear / drop / destroy / truncate）；
//! 命中即 High，调用方须挂起请求并等待用户 yes/no 确认。

use serde::{Deserialize, Serialize};

/// 默认破坏性关键词
pub const DEFAULT_RISK_KEYWORDS: &[&str] = &["delete", "remove", "clear", "drop", "destroy", "truncate"];
/// 默认确认词
pub const DEFAULT_AFFIRMATIVE: &[&str] = &["yes", "y", "ok", "sure"];
/// 默认取消词
pub const DEFAULT_NEGATIVE: &[&str] = &["no", "n", "cancel"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    High,
    Low,
}

/// 单条消息的风险评估结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub explanation: String,
    pub keywords: Vec<String>,
}

impl RiskAssessment {
    pub fn is_high(&self) -> bool {
        self.level == RiskLevel::High
    }
}

/// 挂起期间用户回复的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationReply {
    Confirm,
    Cancel,
    Unclear,
}

/// 风险闸门：关键词与确认词均可配置
#[derive(Debug, Clone)]
pub struct RiskGate {
    keywords: Vec<String>,
    affirmative: Vec<String>,
    negative: Vec<String>,
}

impl Default for RiskGate {
    fn default() -> Self {
        Self::new(
            DEFAULT_RISK_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_AFFIRMATIVE.iter().map(|s| s.to_string()).collect(),
            DEFAULT_NEGATIVE.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl RiskGate {
    pub fn new(keywords: Vec<String>, affirmative: Vec<String>, negative: Vec<String>) -> Self {
        let lower = |v: Vec<String>| v.into_iter().map(|s| s.trim().to_lowercase()).collect();
        Self {
            keywords: lower(keywords),
            affirmative: lower(affirmative),
            negative: lower(negative),
        }
    }

    /// 纯函数：无副作用、无失败路径
    pub fn assess(&self, message: &str) -> RiskAssessment {
        let lower = message.to_lowercase();
        let found: Vec<String> = self
            .keywords
            .iter()
            .filter(|kw| !kw.is_empty() && lower.contains(kw.as_str()))
            .cloned()
            .collect();

        if found.is_empty() {
            RiskAssessment {
                level: RiskLevel::Low,
                explanation: "This request appears safe to process.".to_string(),
                keywords: found,
            }
        } else {
            RiskAssessment {
                level: RiskLevel::High,
                explanation: format!(
                    "This request contains potentially dangerous operations: {}. This action may modify or delete data.",
                    found.join(", ")
                ),
                keywords: found,
            }
        }
    }

    pub fn classify_reply(&self, reply: &str) -> ConfirmationReply {
        let reply = reply.trim().to_lowercase();
        if self.affirmative.iter().any(|t| *t == reply) {
            ConfirmationReply::Confirm
        } else if self.negative.iter().any(|t| *t == reply) {
            ConfirmationReply::Cancel
        } else {
            ConfirmationReply::Unclear
        }
    }
}

/// 使用默认关键词评估
pub fn assess(message: &str) -> RiskAssessment {
    RiskGate::default().assess(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destructive_keywords_are_high() {
        for msg in [
            "delete my Python skill",
            "Please remove the MSU entry",
            "clear all documents",
            "drop table skills",
            "destroy everything",
            "truncate experiences",
        ] {
            assert!(assess(msg).is_high(), "{msg} should be high risk");
        }
    }

    #[test]
    fn test_case_insensitive() {
        let upper = assess("DELETE my skills");
        let lower = assess("delete my skills");
        assert_eq!(upper.level, lower.level);
        assert_eq!(upper.keywords, vec!["delete".to_string()]);
    }

    #[test]
    fn test_safe_message_is_low() {
        let r = assess("What AI skills do I have?");
        assert_eq!(r.level, RiskLevel::Low);
        assert!(r.keywords.is_empty());
    }

    #[test]
    fn test_explanation_lists_keywords() {
        let r = assess("remove and then drop it");
        assert!(r.explanation.contains("remove"));
        assert!(r.explanation.contains("drop"));
    }

    #[test]
    fn test_substring_match_is_intentional() {
        // 子串匹配：dropdown 也会命中 drop
        assert!(assess("how does the dropdown work").is_high());
    }

    #[test]
    fn test_classify_reply() {
        let gate = RiskGate::default();
        assert_eq!(gate.classify_reply(" YES "), ConfirmationReply::Confirm);
        assert_eq!(gate.classify_reply("ok"), ConfirmationReply::Confirm);
        assert_eq!(gate.classify_reply("Cancel"), ConfirmationReply::Cancel);
        assert_eq!(gate.classify_reply("n"), ConfirmationReply::Cancel);
        assert_eq!(gate.classify_reply("maybe later"), ConfirmationReply::Unclear);
    }
}
