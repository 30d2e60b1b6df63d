//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 按顺序返回预设回复；回复耗尽后重复 fallback。每次调用的 prompt 都会被记录，
//! 便于断言"第 N 次调用看到了什么"。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

const DEFAULT_FALLBACK: &str = "Thought: I have no scripted reply for this turn.";

/// 脚本化 Mock 客户端
#[derive(Debug)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl MockLlmClient {
    pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(|s| Ok(s.into())).collect()),
            fallback: DEFAULT_FALLBACK.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 所有调用都返回同一回复
    pub fn repeating(response: impl Into<String>) -> Self {
        Self::new(Vec::<String>::new()).with_fallback(response)
    }

    /// 第一次调用即返回给定错误
    pub fn failing(error: LlmError) -> Self {
        let mock = Self::default();
        mock.push_error(error);
        mock
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn push_response(&self, response: impl Into<String>) {
        if let Ok(mut q) = self.script.lock() {
            q.push_back(Ok(response.into()));
        }
    }

    pub fn push_error(&self, error: LlmError) {
        if let Ok(mut q) = self.script.lock() {
            q.push_back(Err(error));
        }
    }

    /// 已记录的 prompt（每次调用的最后一条 User 消息）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if let Ok(mut p) = self.prompts.lock() {
            p.push(last_user);
        }

        let next = self.script.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(reply) => reply,
            None => Ok(self.fallback.clone()),
        }
    }
}
