//! 智能体间消息追踪（A2A）
//!
//! 编排器向子智能体（目前只有网页抓取）发出请求时登记一条 pending 消息，
//! 收到响应后移除；所有消息按时间顺序保留在有界历史中，便于排查。

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ORCHESTRATOR: &str = "orchestrator";
pub const WEB_CRAWLER_AGENT: &str = "web_crawler_agent";
pub const RESPONSE_ACTION: &str = "response";

const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// 一条智能体间消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct A2aMessage {
    pub message_id: String,
    pub sender: String,
    pub recipient: String,
    pub action: String,
    pub params: Value,
    pub timestamp: DateTime<Utc>,
}

impl A2aMessage {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        action: impl Into<String>,
        params: Value,
    ) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            sender: sender.into(),
            recipient: recipient.into(),
            action: action.into(),
            params,
            timestamp: Utc::now(),
        }
    }

    pub fn is_response(&self) -> bool {
        self.action == RESPONSE_ACTION
    }

    /// 响应消息的 success 标记；请求消息返回 None
    pub fn success(&self) -> Option<bool> {
        if !self.is_response() {
            return None;
        }
        self.params.get("success").and_then(Value::as_bool)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct A2aStats {
    pub pending_requests: usize,
    pub total_messages: usize,
    pub pending_message_ids: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    pending: HashMap<String, A2aMessage>,
    history: VecDeque<A2aMessage>,
}

/// 请求/响应生命周期追踪
#[derive(Debug)]
pub struct A2aTracker {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl Default for A2aTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl A2aTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, inner: &mut Inner, msg: A2aMessage) {
        inner.history.push_back(msg);
        while inner.history.len() > self.capacity {
            inner.history.pop_front();
        }
    }

    /// 登记请求，返回消息（其 message_id 用于配对响应）
    pub fn send_request(
        &self,
        sender: &str,
        recipient: &str,
        action: &str,
        params: Value,
    ) -> A2aMessage {
        let msg = A2aMessage::new(sender, recipient, action, params);
        tracing::debug!(id = %msg.message_id, sender, recipient, action, "a2a request");
        let mut inner = self.lock();
        inner.pending.insert(msg.message_id.clone(), msg.clone());
        self.record(&mut inner, msg.clone());
        msg
    }

    /// 回复 `message_id` 对应的请求并将其移出 pending
    pub fn send_response(
        &self,
        message_id: &str,
        sender: &str,
        recipient: &str,
        result: Value,
        error: Option<&str>,
    ) -> A2aMessage {
        let mut params = serde_json::json!({
            "result": result,
            "original_message_id": message_id,
            "success": error.is_none(),
        });
        if let Some(e) = error {
            params["error"] = Value::String(e.to_string());
        }
        let msg = A2aMessage::new(sender, recipient, RESPONSE_ACTION, params);

        let mut inner = self.lock();
        if inner.pending.remove(message_id).is_none() {
            tracing::warn!(id = message_id, "a2a response for unknown request");
        }
        self.record(&mut inner, msg.clone());
        msg
    }

    pub fn pending_request(&self, message_id: &str) -> Option<A2aMessage> {
        self.lock().pending.get(message_id).cloned()
    }

    /// 最近 `limit` 条消息，按时间正序
    pub fn history(&self, limit: usize) -> Vec<A2aMessage> {
        let inner = self.lock();
        let skip = inner.history.len().saturating_sub(limit);
        inner.history.iter().skip(skip).cloned().collect()
    }

    pub fn clear_history(&self) {
        self.lock().history.clear();
    }

    pub fn stats(&self) -> A2aStats {
        let inner = self.lock();
        let mut pending_message_ids: Vec<String> = inner.pending.keys().cloned().collect();
        pending_message_ids.sort();
        A2aStats {
            pending_requests: inner.pending.len(),
            total_messages: inner.history.len(),
            pending_message_ids,
        }
    }
}
