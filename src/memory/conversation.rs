//! 短期记忆：对话历史
//!
//! 保留最近 N 次交换（user/assistant 对），超出时从前端剪枝；每次写入后长度 ≤ max_turns*2。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 有界对话历史，归会话所有
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationMemory {
    messages: Vec<Message>,
    max_turns: usize,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_turns,
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
        self.prune();
    }

    /// 记录一次完整交换
    pub fn push_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.messages.push(Message::user(user));
        self.messages.push(Message::assistant(assistant));
        self.prune();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// 调整窗口大小并立即剪枝；恢复的会话按当前配置生效
    pub fn set_max_turns(&mut self, max_turns: usize) {
        self.max_turns = max_turns;
        self.prune();
    }

    /// 超出 max_turns*2 时丢弃最旧的消息
    fn prune(&mut self) {
        let keep = self.max_turns * 2;
        if self.messages.len() > keep {
            self.messages.drain(..self.messages.len() - keep);
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_exchange_window_keeps_latest_pair() {
        let mut mem = ConversationMemory::new(1);
        for i in 1..=3 {
            mem.push_exchange(format!("q{i}"), format!("a{i}"));
            assert!(mem.len() <= 2);
        }
        assert_eq!(
            mem.messages(),
            &[Message::user("q3"), Message::assistant("a3")]
        );
    }

    #[test]
    fn test_zero_turns_keeps_nothing() {
        let mut mem = ConversationMemory::new(0);
        mem.push(Message::user("hello"));
        assert!(mem.is_empty());
    }

    #[test]
    fn test_shrinking_window_prunes_oldest() {
        let mut mem = ConversationMemory::new(5);
        for i in 1..=4 {
            mem.push_exchange(format!("q{i}"), format!("a{i}"));
        }
        mem.set_max_turns(2);
        assert_eq!(mem.max_turns(), 2);
        assert_eq!(mem.len(), 4);
        assert_eq!(mem.messages()[0], Message::user("q3"));

        mem.set_max_turns(3);
        mem.push_exchange("q5", "a5");
        assert_eq!(mem.len(), 6);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
