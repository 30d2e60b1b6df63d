//! 会话状态：对话历史 + 待确认动作
//!
//! PendingAction 只在风险闸门挂起请求时存在，确认或取消后清除。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::ConversationMemory;

/// 等待 yes/no 确认的原始消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl PendingAction {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionState {
    pub id: String,
    pub history: ConversationMemory,
    #[serde(default)]
    pub pending: Option<PendingAction>,
}

impl SessionState {
    pub fn new(max_history_turns: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            history: ConversationMemory::new(max_history_turns),
            pending: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn take_pending(&mut self) -> Option<PendingAction> {
        self.pending.take()
    }

    /// 清空历史与挂起动作，保留会话 id
    pub fn reset(&mut self) {
        self.history.clear();
        self.pending = None;
    }
}
