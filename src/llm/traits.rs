//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Groq / Mock）实现 LlmClient::complete（非流式）。
//! 提供方错误一律以 LlmError 返回，不 panic。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::RoleTemplate;
use crate::memory::Message;

/// 模型提供方错误分类
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("API error: {0}")]
    Api(String),
}

impl LlmError {
    /// 根据提供方返回的错误文本归类
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if is_rate_limit_message(&lower) {
            Self::RateLimited(message)
        } else if lower.contains("401")
            || lower.contains("unauthorized")
            || lower.contains("invalid api key")
            || lower.contains("invalid_api_key")
        {
            Self::Auth(message)
        } else {
            Self::Api(message)
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// 限流 / 配额类错误（仅此类错误值得退避重试）
pub fn is_rate_limit_message(lower: &str) -> bool {
    [
        "429",
        "rate limit",
        "rate_limit",
        "ratelimit",
        "quota",
        "too many requests",
    ]
    .iter()
    .any(|kw| lower.contains(kw))
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 单轮无状态调用：若提供角色模板，则先套用模板再发送
pub async fn complete_with_role(
    llm: &dyn LlmClient,
    prompt: &str,
    role: Option<&RoleTemplate>,
) -> Result<String, LlmError> {
    let content = match role {
        Some(template) => template.render(prompt),
        None => prompt.to_string(),
    };
    llm.complete(&[Message::user(content)]).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit() {
        let e = LlmError::classify("HTTP 429 Too Many Requests");
        assert!(e.is_rate_limited());
        assert!(LlmError::classify("Quota exceeded for project").is_rate_limited());
    }

    #[test]
    fn test_classify_auth() {
        assert!(matches!(
            LlmError::classify("invalid_api_key: Incorrect API key provided"),
            LlmError::Auth(_)
        ));
    }

    #[test]
    fn test_classify_other() {
        assert!(matches!(
            LlmError::classify("connection reset by peer"),
            LlmError::Api(_)
        ));
    }
}
